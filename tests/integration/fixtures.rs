// tests/integration/fixtures.rs

//! Common test fixtures: an in-memory key service, canned directory
//! replies, and a static address resolver.
//!
//! **Note:** Some fixtures may not be used in all tests yet,
//! but they are available for use when needed.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use keyupcall::cli::RequestKeyArgs;
use keyupcall::core::keys::{KeySerial, KeyService};
use keyupcall::dns::message::RecordType;
use keyupcall::dns::{AddressFamily, AddressResolver, DirectoryClient, QueryFailure};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// The key under construction in most tests.
pub const TEST_KEY: KeySerial = KeySerial(123456);
/// The requester's session keyring in most tests.
pub const TEST_SESSION: KeySerial = KeySerial(778899);

/// A key operation as recorded by [`MockKeyring`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOp {
    Instantiate { key: KeySerial, payload: Vec<u8> },
    Negate { key: KeySerial, timeout: u32 },
    SetTimeout { key: KeySerial, timeout: u32 },
    JoinSession { name: Option<String> },
}

/// An in-memory key service that records every mutating call.
#[derive(Default)]
pub struct MockKeyring {
    descriptions: HashMap<KeySerial, String>,
    payloads: HashMap<KeySerial, Vec<u8>>,
    searchable: HashMap<(KeySerial, String, String), KeySerial>,
    fail_instantiate: bool,
    fail_negate: bool,
    ops: RefCell<Vec<KeyOp>>,
}

fn not_found() -> io::Error {
    io::Error::from_raw_os_error(libc::ENOKEY)
}

impl MockKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, key: KeySerial, description: &str) -> Self {
        self.descriptions.insert(key, description.to_string());
        self
    }

    pub fn with_payload(mut self, key: KeySerial, payload: &[u8]) -> Self {
        self.payloads.insert(key, payload.to_vec());
        self
    }

    /// Makes `key` findable in `keyring` under the given type and description.
    pub fn with_searchable(
        mut self,
        keyring: KeySerial,
        key_type: &str,
        description: &str,
        key: KeySerial,
    ) -> Self {
        self.searchable
            .insert((keyring, key_type.to_string(), description.to_string()), key);
        self
    }

    pub fn failing_instantiate(mut self) -> Self {
        self.fail_instantiate = true;
        self
    }

    pub fn failing_negate(mut self) -> Self {
        self.fail_negate = true;
        self
    }

    pub fn ops(&self) -> Vec<KeyOp> {
        self.ops.borrow().clone()
    }

    /// The payload of the last instantiate call, if any.
    pub fn instantiated_payload(&self) -> Option<Vec<u8>> {
        self.ops.borrow().iter().rev().find_map(|op| match op {
            KeyOp::Instantiate { payload, .. } => Some(payload.clone()),
            _ => None,
        })
    }

    /// The timeout of the last set_timeout call, if any.
    pub fn last_timeout(&self) -> Option<u32> {
        self.ops.borrow().iter().rev().find_map(|op| match op {
            KeyOp::SetTimeout { timeout, .. } => Some(*timeout),
            _ => None,
        })
    }
}

impl KeyService for MockKeyring {
    fn describe(&self, key: KeySerial) -> io::Result<String> {
        self.descriptions.get(&key).cloned().ok_or_else(not_found)
    }

    fn read(&self, key: KeySerial) -> io::Result<Vec<u8>> {
        self.payloads.get(&key).cloned().ok_or_else(not_found)
    }

    fn search(
        &self,
        keyring: KeySerial,
        key_type: &str,
        description: &str,
    ) -> io::Result<KeySerial> {
        self.searchable
            .get(&(keyring, key_type.to_string(), description.to_string()))
            .copied()
            .ok_or_else(not_found)
    }

    fn instantiate(&self, key: KeySerial, payload: &[u8]) -> io::Result<()> {
        if self.fail_instantiate {
            return Err(io::Error::from_raw_os_error(libc::EKEYREVOKED));
        }
        self.ops.borrow_mut().push(KeyOp::Instantiate {
            key,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn negate(&self, key: KeySerial, timeout_secs: u32) -> io::Result<()> {
        if self.fail_negate {
            return Err(io::Error::from_raw_os_error(libc::EKEYREVOKED));
        }
        self.ops.borrow_mut().push(KeyOp::Negate {
            key,
            timeout: timeout_secs,
        });
        Ok(())
    }

    fn set_timeout(&self, key: KeySerial, timeout_secs: u32) -> io::Result<()> {
        self.ops.borrow_mut().push(KeyOp::SetTimeout {
            key,
            timeout: timeout_secs,
        });
        Ok(())
    }

    fn join_session(&self, name: Option<&str>) -> io::Result<KeySerial> {
        self.ops.borrow_mut().push(KeyOp::JoinSession {
            name: name.map(str::to_string),
        });
        Ok(TEST_SESSION)
    }
}

/// Arguments as the kernel would pass them for [`TEST_KEY`].
pub fn request_args(operation: &str, callout_info: &str) -> RequestKeyArgs {
    RequestKeyArgs {
        operation: operation.to_string(),
        key_id: TEST_KEY.to_string(),
        uid: "1000".to_string(),
        gid: "1000".to_string(),
        thread_keyring: "0".to_string(),
        process_keyring: "0".to_string(),
        session_keyring: TEST_SESSION.to_string(),
        callout_info: callout_info.to_string(),
        ..RequestKeyArgs::default()
    }
}

/// One AFSDB record for [`afsdb_response`]: subtype, host name, TTL.
pub type AfsdbRecord<'a> = (u16, &'a str, u32);

fn put_name(buf: &mut BytesMut, name: &str) {
    for label in name.split('.').filter(|l| !l.is_empty()) {
        buf.put_u8(label.len() as u8);
        buf.put_slice(label.as_bytes());
    }
    buf.put_u8(0);
}

/// Builds a reply to an AFSDB question for `cell`.
///
/// Record owner names use a compression pointer to the question name, the
/// way real servers write them.
pub fn afsdb_response(id: u16, cell: &str, records: &[AfsdbRecord<'_>]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u16(id);
    buf.put_u16(0x8180);
    buf.put_u16(1);
    buf.put_u16(records.len() as u16);
    buf.put_u16(0);
    buf.put_u16(0);

    put_name(&mut buf, cell);
    buf.put_u16(18);
    buf.put_u16(1);

    for (subtype, host, ttl) in records {
        buf.put_u16(0xc00c);
        buf.put_u16(18);
        buf.put_u16(1);
        buf.put_u32(*ttl);
        let mut rdata = BytesMut::new();
        rdata.put_u16(*subtype);
        put_name(&mut rdata, host);
        buf.put_u16(rdata.len() as u16);
        buf.put_slice(&rdata);
    }
    buf.freeze()
}

/// A directory client that always gives the same answer.
pub struct StaticDirectory {
    reply: Result<Bytes, QueryFailure>,
    queries: Arc<Mutex<Vec<(String, RecordType)>>>,
}

impl StaticDirectory {
    pub fn answering(reply: Bytes) -> Self {
        Self {
            reply: Ok(reply),
            queries: Arc::default(),
        }
    }

    pub fn failing(failure: QueryFailure) -> Self {
        Self {
            reply: Err(failure),
            queries: Arc::default(),
        }
    }

    /// A handle on the questions asked, usable after the client is moved.
    pub fn query_log(&self) -> Arc<Mutex<Vec<(String, RecordType)>>> {
        Arc::clone(&self.queries)
    }
}

#[async_trait]
impl DirectoryClient for StaticDirectory {
    async fn query(&self, name: &str, rtype: RecordType) -> Result<Bytes, QueryFailure> {
        self.queries.lock().unwrap().push((name.to_string(), rtype));
        self.reply.clone()
    }
}

/// An address resolver backed by a fixed host table.
#[derive(Default)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
    lookups: Arc<AtomicUsize>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str, addrs: &[&str]) -> Self {
        let addrs = addrs.iter().map(|a| a.parse().unwrap()).collect();
        self.hosts.insert(host.to_ascii_lowercase(), addrs);
        self
    }

    /// A handle on the lookup count, usable after the resolver is moved.
    pub fn lookup_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.lookups)
    }
}

#[async_trait]
impl AddressResolver for StaticResolver {
    async fn resolve(&self, host: &str, family: AddressFamily) -> io::Result<Option<IpAddr>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let addrs = self
            .hosts
            .get(&host.to_ascii_lowercase())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown host"))?;
        Ok(addrs.iter().copied().find(|a| family.accepts(a)))
    }
}
