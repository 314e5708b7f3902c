// src/core/router/context.rs

//! The immutable facts of one upcall.

use crate::cli::RequestKeyArgs;
use crate::core::UpcallError;
use crate::core::keys::{KeyDescription, KeySerial, KeyService};
use std::sync::Arc;
use tracing::debug;

/// Description used in place of asking the kernel when debugging.
pub const DEBUG_DESCRIPTION: &str = "user;0;0;1f0000;debug:1234";

/// A context value a single-character macro can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextField {
    Operation,
    KeyId,
    KeyType,
    Description,
    CalloutInfo,
    Uid,
    Gid,
    ThreadKeyring,
    ProcessKeyring,
    SessionKeyring,
}

impl ContextField {
    /// Looks up the field named by a macro character (`%k` → `KeyId`).
    pub fn from_macro(c: char) -> Option<Self> {
        Some(match c {
            'o' => ContextField::Operation,
            'k' => ContextField::KeyId,
            't' => ContextField::KeyType,
            'd' => ContextField::Description,
            'c' => ContextField::CalloutInfo,
            'u' => ContextField::Uid,
            'g' => ContextField::Gid,
            'T' => ContextField::ThreadKeyring,
            'P' => ContextField::ProcessKeyring,
            'S' => ContextField::SessionKeyring,
            _ => return None,
        })
    }
}

/// Everything the router knows about the request being serviced.
///
/// Numeric fields are kept exactly as the kernel passed them so macros
/// reproduce them verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpcallContext {
    pub operation: String,
    pub key: KeySerial,
    pub key_id: String,
    pub key_type: String,
    pub description: String,
    pub callout_info: String,
    pub uid: String,
    pub gid: String,
    pub thread_keyring: String,
    pub process_keyring: String,
    pub session_keyring: String,
}

impl UpcallContext {
    /// Builds the context for an upcall, asking the key service to describe
    /// the key unless a debug description is requested.
    pub fn from_request<K: KeyService + ?Sized>(
        args: &RequestKeyArgs,
        keys: &K,
    ) -> Result<Self, UpcallError> {
        let key: KeySerial = args.key_id.parse()?;

        let raw = if args.debug > 0 {
            DEBUG_DESCRIPTION.to_string()
        } else {
            keys.describe(key)
                .map_err(|e| UpcallError::KeyInaccessible {
                    key,
                    source: Arc::new(e),
                })?
        };
        debug!("Key descriptor: \"{}\"", raw);

        let described = KeyDescription::parse(&raw)?;
        debug!("Key type: {}", described.key_type);
        debug!("Key desc: {}", described.description);

        Ok(Self {
            operation: args.operation.clone(),
            key,
            key_id: args.key_id.clone(),
            key_type: described.key_type,
            description: described.description,
            callout_info: args.callout_info.clone(),
            uid: args.uid.clone(),
            gid: args.gid.clone(),
            thread_keyring: args.thread_keyring.clone(),
            process_keyring: args.process_keyring.clone(),
            session_keyring: args.session_keyring.clone(),
        })
    }

    pub fn field(&self, field: ContextField) -> &str {
        match field {
            ContextField::Operation => &self.operation,
            ContextField::KeyId => &self.key_id,
            ContextField::KeyType => &self.key_type,
            ContextField::Description => &self.description,
            ContextField::CalloutInfo => &self.callout_info,
            ContextField::Uid => &self.uid,
            ContextField::Gid => &self.gid,
            ContextField::ThreadKeyring => &self.thread_keyring,
            ContextField::ProcessKeyring => &self.process_keyring,
            ContextField::SessionKeyring => &self.session_keyring,
        }
    }

    /// The data a routing rule's four patterns are matched against, in order.
    pub fn match_fields(&self) -> [&str; 4] {
        [
            &self.operation,
            &self.key_type,
            &self.description,
            &self.callout_info,
        ]
    }

    /// The requester's session keyring, where secondary lookups search.
    pub fn session_keyring_serial(&self) -> Result<KeySerial, UpcallError> {
        self.session_keyring.parse()
    }
}
