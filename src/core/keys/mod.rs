// src/core/keys/mod.rs

//! The slice of the kernel key-management service that upcall helpers use.
//!
//! Helpers never own keys. They receive an opaque serial for the key under
//! construction and drive it to a terminal state through [`KeyService`].

pub mod completion;
pub mod kernel;

pub use completion::{Completion, DnsErrorCode, KeyState};
pub use kernel::KernelKeyring;

use crate::core::UpcallError;
use std::fmt;
use std::io;
use std::str::FromStr;

/// An opaque key handle as issued by the key-management service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeySerial(pub i32);

impl KeySerial {
    pub const THREAD_KEYRING: KeySerial = KeySerial(-1);
    pub const PROCESS_KEYRING: KeySerial = KeySerial(-2);
    pub const SESSION_KEYRING: KeySerial = KeySerial(-3);
    pub const USER_KEYRING: KeySerial = KeySerial(-4);
    pub const USER_SESSION_KEYRING: KeySerial = KeySerial(-5);
    pub const GROUP_KEYRING: KeySerial = KeySerial(-6);
    /// The authorisation key of the request being serviced. Reading it
    /// yields the callout info.
    pub const REQKEY_AUTH_KEY: KeySerial = KeySerial(-7);
    pub const REQUESTOR_KEYRING: KeySerial = KeySerial(-8);
}

impl fmt::Display for KeySerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for KeySerial {
    type Err = UpcallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i32>()
            .map(KeySerial)
            .map_err(|_| UpcallError::InvalidKeyId(s.to_string()))
    }
}

/// The operations consumed from the key-management service.
///
/// Failures are reported as OS errors because that is how the kernel
/// reports them; callers decide whether a failure is fatal.
pub trait KeyService {
    /// Returns `type;uid;gid;perm;description`.
    fn describe(&self, key: KeySerial) -> io::Result<String>;

    /// Returns the full payload of a key.
    fn read(&self, key: KeySerial) -> io::Result<Vec<u8>>;

    /// Searches `keyring` recursively for a key of the given type and description.
    fn search(&self, keyring: KeySerial, key_type: &str, description: &str)
    -> io::Result<KeySerial>;

    /// Supplies the payload of a key under construction.
    fn instantiate(&self, key: KeySerial, payload: &[u8]) -> io::Result<()>;

    /// Marks a key under construction as failed for `timeout_secs`.
    fn negate(&self, key: KeySerial, timeout_secs: u32) -> io::Result<()>;

    /// Sets the expiry of a key, in seconds from now. Zero clears it.
    fn set_timeout(&self, key: KeySerial, timeout_secs: u32) -> io::Result<()>;

    /// Joins (or creates) a named session keyring, or an anonymous one for `None`.
    fn join_session(&self, name: Option<&str>) -> io::Result<KeySerial>;
}

/// The decoded form of a `describe` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescription {
    pub key_type: String,
    pub uid: i64,
    pub gid: i64,
    pub perm: u32,
    pub description: String,
}

impl KeyDescription {
    /// Parses `type;uid;gid;perm;description`. The description is everything
    /// after the fourth separator and may itself contain `;`, so splitting
    /// at the last `;` would cut such a description short.
    pub fn parse(raw: &str) -> Result<Self, UpcallError> {
        let bad = || UpcallError::BadDescription(raw.to_string());
        let mut parts = raw.splitn(5, ';');

        let key_type = parts.next().filter(|t| !t.is_empty()).ok_or_else(bad)?;
        let uid = parts
            .next()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(bad)?;
        let gid = parts
            .next()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(bad)?;
        let perm = parts
            .next()
            .and_then(|s| u32::from_str_radix(s, 16).ok())
            .ok_or_else(bad)?;
        let description = parts.next().ok_or_else(bad)?;

        Ok(Self {
            key_type: key_type.to_string(),
            uid,
            gid,
            perm,
            description: description.to_string(),
        })
    }
}
