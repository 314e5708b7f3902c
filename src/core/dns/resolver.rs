// src/core/dns/resolver.rs

//! Turns server names into numeric addresses.

use async_trait::async_trait;
use std::io;
use std::net::IpAddr;
use strum_macros::{Display, EnumString};
use tokio::net::lookup_host;

/// Which address families a lookup may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum AddressFamily {
    #[default]
    Any,
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// Reads the family restriction carried in the callout info
    /// (`ipv4` or `ipv6`); anything else is unrestricted.
    pub fn from_callout(info: &str) -> Self {
        info.parse().unwrap_or_default()
    }

    pub fn accepts(&self, addr: &IpAddr) -> bool {
        match self {
            AddressFamily::Any => true,
            AddressFamily::Ipv4 => addr.is_ipv4(),
            AddressFamily::Ipv6 => addr.is_ipv6(),
        }
    }
}

#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Returns the first address of `host` in `family`, or `None` when the
    /// host has no such address.
    async fn resolve(&self, host: &str, family: AddressFamily) -> io::Result<Option<IpAddr>>;
}

/// Resolves through the system's name service configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl AddressResolver for SystemResolver {
    async fn resolve(&self, host: &str, family: AddressFamily) -> io::Result<Option<IpAddr>> {
        let addrs = lookup_host((host, 0)).await?;
        Ok(addrs.map(|a| a.ip()).find(|ip| family.accepts(ip)))
    }
}
