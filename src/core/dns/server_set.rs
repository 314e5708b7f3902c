// src/core/dns/server_set.rs

//! Accumulates the servers accepted from one directory answer.

use indexmap::IndexMap;
use std::fmt;
use std::net::IpAddr;

/// Most servers kept for one name.
pub const MAX_SERVERS: usize = 15;
/// Longest textual address (`INET6_ADDRSTRLEN` without its NUL).
pub const MAX_ADDRESS_LEN: usize = 45;
/// Upper bound on a rendered payload: every address plus a separator.
pub const MAX_PAYLOAD_LEN: usize = MAX_SERVERS * (MAX_ADDRESS_LEN + 1);

/// One accepted directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRecord {
    pub name: String,
    pub address: IpAddr,
    pub ttl: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Duplicate,
    Full,
}

/// An insertion-ordered set of servers keyed by their lowercased name,
/// bounded at [`MAX_SERVERS`], tracking the smallest TTL seen.
#[derive(Debug, Clone, Default)]
pub struct ServerSet {
    servers: IndexMap<String, ServerRecord>,
    min_ttl: Option<u32>,
}

fn normalize(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl ServerSet {
    pub fn new() -> Self {
        Self {
            servers: IndexMap::with_capacity(MAX_SERVERS),
            min_ttl: None,
        }
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.servers.len() >= MAX_SERVERS
    }

    /// Whether a server of this name (ignoring ASCII case) was already accepted.
    pub fn contains(&self, name: &str) -> bool {
        self.servers.contains_key(&normalize(name))
    }

    pub fn min_ttl(&self) -> Option<u32> {
        self.min_ttl
    }

    pub fn insert(&mut self, record: ServerRecord) -> Admission {
        let key = normalize(&record.name);
        if self.servers.contains_key(&key) {
            return Admission::Duplicate;
        }
        if self.is_full() {
            return Admission::Full;
        }
        self.min_ttl = Some(self.min_ttl.map_or(record.ttl, |t| t.min(record.ttl)));
        self.servers.insert(key, record);
        Admission::Accepted
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServerRecord> {
        self.servers.values()
    }

    /// The payload for the accepted servers, or `None` when there are none.
    pub fn into_payload(self) -> Option<ResolvedPayload> {
        let ttl = self.min_ttl?;
        Some(ResolvedPayload {
            addresses: self.servers.into_values().map(|s| s.address).collect(),
            ttl,
        })
    }
}

/// The data a resolved key is instantiated with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPayload {
    pub addresses: Vec<IpAddr>,
    /// Smallest TTL among the records the addresses came from.
    pub ttl: u32,
}

impl ResolvedPayload {
    /// The key data: the comma-separated list followed by a NUL.
    pub fn to_key_data(&self) -> Vec<u8> {
        let mut data = self.to_string().into_bytes();
        data.push(0);
        data
    }
}

impl fmt::Display for ResolvedPayload {
    // Commas separate entries because colons already appear inside IPv6 addresses.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, addr) in self.addresses.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{addr}")?;
        }
        Ok(())
    }
}
