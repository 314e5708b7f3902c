// src/core/dns/mod.rs

//! Directory resolution for `dns_resolver` keys.

pub mod client;
pub mod handler;
pub mod message;
pub mod resolver;
pub mod server_set;

pub use client::{DirectoryClient, QueryFailure, ResolvConf, ResolverStatus, StubDirectoryClient};
pub use handler::{DnsResolverHandler, LookupRequest, Resolution};
pub use resolver::{AddressFamily, AddressResolver, SystemResolver};
pub use server_set::{ResolvedPayload, ServerRecord, ServerSet};
