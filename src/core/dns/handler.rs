// src/core/dns/handler.rs

//! The directory resolution handler for `dns_resolver` keys.
//!
//! A key described as `afsdb:<cell>` asks for the volume location servers
//! of an AFS cell. The handler looks up the cell's AFSDB records, resolves
//! each distinct server name, and instantiates the key with the address
//! list and the smallest record TTL. Lookup failures and empty answers
//! still complete the key, with a `#dnserror=` payload.

use super::client::DirectoryClient;
use super::message::{Message, RecordData, RecordType};
use super::resolver::{AddressFamily, AddressResolver};
use super::server_set::{ResolvedPayload, ServerRecord, ServerSet};
use crate::core::UpcallError;
use crate::core::keys::{Completion, DnsErrorCode, KeyDescription, KeyService};
use tracing::{debug, info};

/// The key type this handler services.
pub const KEY_TYPE: &str = "dns_resolver";
/// The only query type supported in key descriptions.
pub const AFSDB_QUERY_TYPE: &str = "afsdb";

/// What is being looked up, decoded from the key and its callout info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub name: String,
    pub family: AddressFamily,
}

impl LookupRequest {
    pub fn from_key(described: &KeyDescription, callout_info: &str) -> Result<Self, UpcallError> {
        if described.key_type != KEY_TYPE {
            return Err(UpcallError::UnsupportedKeyType(described.key_type.clone()));
        }

        let (query_type, name) = described
            .description
            .split_once(':')
            .ok_or_else(|| UpcallError::MissingQueryType(described.description.clone()))?;
        if query_type != AFSDB_QUERY_TYPE {
            return Err(UpcallError::UnsupportedQueryType(query_type.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            family: AddressFamily::from_callout(callout_info),
        })
    }
}

/// How a lookup ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedPayload),
    Failed(DnsErrorCode),
}

pub struct DnsResolverHandler<D, R> {
    directory: D,
    resolver: R,
}

impl<D: DirectoryClient, R: AddressResolver> DnsResolverHandler<D, R> {
    pub fn new(directory: D, resolver: R) -> Self {
        Self {
            directory,
            resolver,
        }
    }

    /// Performs the lookup without touching the key.
    pub async fn resolve(&self, request: &LookupRequest) -> Result<Resolution, UpcallError> {
        debug!(
            "Get AFSDB RR for cell name:'{}', family:'{}'",
            request.name, request.family
        );

        let reply = match self.directory.query(&request.name, RecordType::Afsdb).await {
            Ok(reply) => reply,
            Err(failure) => {
                info!("{}: {}", request.name, failure);
                return Ok(Resolution::Failed(DnsErrorCode::from_status(
                    failure.status.code(),
                )));
            }
        };

        let message = Message::parse(&reply)?;
        debug!("AFSDB RR count is {}", message.answers.len());

        let mut servers = ServerSet::new();
        for record in &message.answers {
            let RecordData::Afsdb { subtype, hostname } = &record.data else {
                continue;
            };
            if servers.is_full() {
                debug!("Server list full, ignoring remaining records");
                break;
            }
            if servers.contains(hostname) {
                continue;
            }

            let address = match self.resolver.resolve(hostname, request.family).await {
                Ok(Some(address)) => address,
                Ok(None) => {
                    debug!(
                        "AFSDB RR has no {} address. subtype:{}, server name:{}",
                        request.family, subtype, hostname
                    );
                    continue;
                }
                Err(e) => {
                    debug!(
                        "AFSDB RR can't resolve. subtype:{}, server name:{} ({})",
                        subtype, hostname, e
                    );
                    continue;
                }
            };

            info!(
                "AFSDB RR subtype:{}, server name:{}, ip:{}, ttl:{}",
                subtype, hostname, address, record.ttl
            );
            servers.insert(ServerRecord {
                name: hostname.clone(),
                address,
                ttl: record.ttl,
            });
        }

        Ok(match servers.into_payload() {
            Some(payload) => {
                info!("DNS query AFSDB RR results:'{}' ttl:{}", payload, payload.ttl);
                Resolution::Resolved(payload)
            }
            None => Resolution::Failed(DnsErrorCode::NoData),
        })
    }

    /// Performs the lookup and completes the key with its result.
    pub async fn complete<K: KeyService + ?Sized>(
        &self,
        request: &LookupRequest,
        completion: &mut Completion<'_, K>,
    ) -> Result<Resolution, UpcallError> {
        let resolution = self.resolve(request).await?;
        match &resolution {
            Resolution::Resolved(payload) => {
                info!("The key instantiation data is '{}'", payload);
                completion.instantiate(&payload.to_key_data(), payload.ttl)?;
            }
            Resolution::Failed(code) => completion.reject_with(*code)?,
        }
        Ok(resolution)
    }
}
