// src/core/errors.rs

//! Defines the primary error type shared by the upcall helpers.

use crate::core::dns::message::MessageError;
use crate::core::keys::{KeySerial, KeyState};
use std::sync::Arc;
use thiserror::Error;

/// Exit status for usage errors.
pub const EXIT_USAGE: u8 = 2;
/// Exit status for every other fatal error.
pub const EXIT_FATAL: u8 = 1;

/// Every failure that ends an upcall abnormally.
///
/// Negative directory results are not represented here: they complete the
/// key with a `#dnserror=` payload and exit successfully.
#[derive(Error, Debug)]
pub enum UpcallError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("{0}")]
    Usage(String),

    #[error("Cannot open {path}: {source}")]
    ConfigUnreadable {
        path: String,
        source: Arc<std::io::Error>,
    },

    /// A problem with a specific line of the routing file.
    #[error("{path}:{line}: {message}")]
    Config {
        path: String,
        line: usize,
        message: String,
    },

    #[error("{path}: No matching action")]
    NoMatchingRule { path: String },

    #[error("Key {key} is inaccessible ({source})")]
    KeyInaccessible {
        key: KeySerial,
        source: Arc<std::io::Error>,
    },

    /// A key-management call failed.
    #[error("{op}: {source}")]
    KeyOperation {
        op: &'static str,
        source: Arc<std::io::Error>,
    },

    #[error("Cannot {op} key in state {state:?}")]
    InvalidTransition { op: &'static str, state: KeyState },

    #[error("Badly formatted key description '{0}'")]
    BadDescription(String),

    #[error("Key type is not supported: '{0}'")]
    UnsupportedKeyType(String),

    #[error("Missing query type: '{0}'")]
    MissingQueryType(String),

    #[error("Query type: \"{0}\" is not supported")]
    UnsupportedQueryType(String),

    #[error("Invalid key ID format: '{0}'")]
    InvalidKeyId(String),

    #[error("Malformed directory response: {0}")]
    Directory(#[from] MessageError),

    #[error("Internal Error: {0}")]
    Internal(String),
}

impl UpcallError {
    /// The process exit status that reports this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            UpcallError::Usage(_) => EXIT_USAGE,
            _ => EXIT_FATAL,
        }
    }

    /// Wraps an errno-style failure of a key-management call.
    pub fn key_op(op: &'static str, source: std::io::Error) -> Self {
        UpcallError::KeyOperation {
            op,
            source: Arc::new(source),
        }
    }

    pub fn config(path: &str, line: usize, message: impl Into<String>) -> Self {
        UpcallError::Config {
            path: path.to_string(),
            line,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for UpcallError {
    fn from(e: std::io::Error) -> Self {
        UpcallError::Io(Arc::new(e))
    }
}
