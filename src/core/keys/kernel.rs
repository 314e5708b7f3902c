// src/core/keys/kernel.rs

//! [`KeyService`] over the Linux `keyctl` system call.

use super::{KeySerial, KeyService};
use std::ffi::CString;
use std::io;
use std::ptr;
use tracing::debug;

const KEYCTL_JOIN_SESSION_KEYRING: libc::c_int = 1;
const KEYCTL_DESCRIBE: libc::c_int = 6;
const KEYCTL_SEARCH: libc::c_int = 10;
const KEYCTL_READ: libc::c_int = 11;
const KEYCTL_INSTANTIATE: libc::c_int = 12;
const KEYCTL_NEGATE: libc::c_int = 13;
const KEYCTL_SET_TIMEOUT: libc::c_int = 15;

/// Lets the kernel pick the keyring a completed key is linked into.
const KEY_REQKEY_DEFL_DEFAULT: libc::c_ulong = 0;

/// The key-management service of the running kernel.
#[derive(Debug, Default, Clone, Copy)]
pub struct KernelKeyring;

impl KernelKeyring {
    pub fn new() -> Self {
        Self
    }
}

fn keyctl(
    op: libc::c_int,
    arg2: libc::c_ulong,
    arg3: libc::c_ulong,
    arg4: libc::c_ulong,
    arg5: libc::c_ulong,
) -> io::Result<libc::c_long> {
    // SAFETY: every pointer argument passed by callers refers to a live,
    // correctly sized buffer or NUL-terminated string for the duration of the call.
    let ret = unsafe { libc::syscall(libc::SYS_keyctl, op, arg2, arg3, arg4, arg5) };
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn serial_arg(key: KeySerial) -> libc::c_ulong {
    // Special serials are negative; the kernel only looks at the low 32 bits.
    key.0 as libc::c_ulong
}

fn c_string(s: &str) -> io::Result<CString> {
    CString::new(s).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// Runs a read-style operation, growing the buffer until the payload fits.
fn read_alloc(op: libc::c_int, key: KeySerial) -> io::Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    loop {
        let ptr = if buf.is_empty() {
            ptr::null_mut()
        } else {
            buf.as_mut_ptr()
        };
        let needed = keyctl(
            op,
            serial_arg(key),
            ptr as libc::c_ulong,
            buf.len() as libc::c_ulong,
            0,
        )? as usize;

        if needed <= buf.len() {
            buf.truncate(needed);
            return Ok(buf);
        }
        // The payload may change between calls, so loop until it fits.
        buf.resize(needed, 0);
    }
}

impl KeyService for KernelKeyring {
    fn describe(&self, key: KeySerial) -> io::Result<String> {
        let mut raw = read_alloc(KEYCTL_DESCRIBE, key)?;
        if raw.last() == Some(&0) {
            raw.pop();
        }
        String::from_utf8(raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn read(&self, key: KeySerial) -> io::Result<Vec<u8>> {
        read_alloc(KEYCTL_READ, key)
    }

    fn search(
        &self,
        keyring: KeySerial,
        key_type: &str,
        description: &str,
    ) -> io::Result<KeySerial> {
        let key_type = c_string(key_type)?;
        let description = c_string(description)?;
        let found = keyctl(
            KEYCTL_SEARCH,
            serial_arg(keyring),
            key_type.as_ptr() as libc::c_ulong,
            description.as_ptr() as libc::c_ulong,
            0,
        )?;
        Ok(KeySerial(found as i32))
    }

    fn instantiate(&self, key: KeySerial, payload: &[u8]) -> io::Result<()> {
        debug!("keyctl instantiate {} ({} bytes)", key, payload.len());
        keyctl(
            KEYCTL_INSTANTIATE,
            serial_arg(key),
            payload.as_ptr() as libc::c_ulong,
            payload.len() as libc::c_ulong,
            KEY_REQKEY_DEFL_DEFAULT,
        )
        .map(drop)
    }

    fn negate(&self, key: KeySerial, timeout_secs: u32) -> io::Result<()> {
        debug!("keyctl negate {} timeout={}s", key, timeout_secs);
        keyctl(
            KEYCTL_NEGATE,
            serial_arg(key),
            timeout_secs as libc::c_ulong,
            KEY_REQKEY_DEFL_DEFAULT,
            0,
        )
        .map(drop)
    }

    fn set_timeout(&self, key: KeySerial, timeout_secs: u32) -> io::Result<()> {
        debug!("keyctl set_timeout {} timeout={}s", key, timeout_secs);
        keyctl(
            KEYCTL_SET_TIMEOUT,
            serial_arg(key),
            timeout_secs as libc::c_ulong,
            0,
            0,
        )
        .map(drop)
    }

    fn join_session(&self, name: Option<&str>) -> io::Result<KeySerial> {
        let name = name.map(c_string).transpose()?;
        let name_ptr = name.as_ref().map_or(ptr::null(), |n| n.as_ptr());
        let serial = keyctl(
            KEYCTL_JOIN_SESSION_KEYRING,
            name_ptr as libc::c_ulong,
            0,
            0,
            0,
        )?;
        Ok(KeySerial(serial as i32))
    }
}
