// src/core/keys/completion.rs

//! The completion protocol: how a helper ends an upcall.
//!
//! A key handed to a helper is `Pending`. Exactly one of `negate` or
//! `instantiate` moves it to a terminal state; nothing moves it back.
//! When a helper dies on a fatal error it calls [`Completion::abandon`]
//! so the key never lingers in `Pending`.

use super::{KeySerial, KeyService};
use crate::core::UpcallError;
use strum_macros::Display;
use tracing::{info, warn};

/// Prefix of a payload that encodes a failed directory lookup.
pub const DNS_ERROR_PREFIX: &str = "#dnserror=";

/// Construction state of the key being serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Pending,
    Negated,
    Instantiated,
}

/// The failure classes a resolver payload can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum DnsErrorCode {
    Refused,
    NoData,
    TryAgain,
}

/// Host-resolver status codes (the `h_errno` space) indexed into error classes.
const STATUS_TABLE: [DnsErrorCode; 5] = [
    DnsErrorCode::Refused,  // internal
    DnsErrorCode::NoData,   // host not found
    DnsErrorCode::TryAgain, // try again
    DnsErrorCode::Refused,  // no recovery
    DnsErrorCode::NoData,   // no data
];

impl DnsErrorCode {
    /// Maps a host-resolver status code. Unknown codes are reported as refused.
    pub fn from_status(status: i32) -> Self {
        usize::try_from(status)
            .ok()
            .and_then(|i| STATUS_TABLE.get(i).copied())
            .unwrap_or(DnsErrorCode::Refused)
    }

    /// The errno value written into the payload.
    pub fn errno(self) -> i32 {
        match self {
            DnsErrorCode::Refused => libc::ECONNREFUSED,
            DnsErrorCode::NoData => libc::ENODATA,
            DnsErrorCode::TryAgain => libc::EAGAIN,
        }
    }

    /// The `#dnserror=<errno>` payload text.
    pub fn payload(self) -> String {
        format!("{DNS_ERROR_PREFIX}{}", self.errno())
    }
}

/// Drives one pending key to a terminal state.
pub struct Completion<'a, K: KeyService + ?Sized> {
    keys: &'a K,
    key: KeySerial,
    state: KeyState,
    negative_timeout: u32,
    dry_run: bool,
}

impl<'a, K: KeyService + ?Sized> Completion<'a, K> {
    /// `negative_timeout` is the cache lifetime, in seconds, of negative results.
    pub fn new(keys: &'a K, key: KeySerial, negative_timeout: u32) -> Self {
        Self {
            keys,
            key,
            state: KeyState::Pending,
            negative_timeout,
            dry_run: false,
        }
    }

    /// In dry-run mode transitions are logged and tracked but no key
    /// operation reaches the service.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn key(&self) -> KeySerial {
        self.key
    }

    pub fn state(&self) -> KeyState {
        self.state
    }

    pub fn negative_timeout(&self) -> u32 {
        self.negative_timeout
    }

    fn ensure_pending(&self, op: &'static str) -> Result<(), UpcallError> {
        match self.state {
            KeyState::Pending => Ok(()),
            state => Err(UpcallError::InvalidTransition { op, state }),
        }
    }

    /// Marks the key failed, cacheable for `timeout_secs`.
    pub fn negate(&mut self, timeout_secs: u32) -> Result<(), UpcallError> {
        self.ensure_pending("negate")?;
        if self.dry_run {
            info!("dry run: negate key {} for {}s", self.key, timeout_secs);
        } else {
            self.keys
                .negate(self.key, timeout_secs)
                .map_err(|e| UpcallError::key_op("keyctl_negate", e))?;
        }
        self.state = KeyState::Negated;
        Ok(())
    }

    /// Sets the key's lifetime, then supplies its payload.
    pub fn instantiate(&mut self, payload: &[u8], timeout_secs: u32) -> Result<(), UpcallError> {
        self.ensure_pending("instantiate")?;
        if self.dry_run {
            info!(
                "dry run: instantiate key {} with {} bytes, timeout {}s",
                self.key,
                payload.len(),
                timeout_secs
            );
        } else {
            self.keys
                .set_timeout(self.key, timeout_secs)
                .map_err(|e| UpcallError::key_op("keyctl_set_timeout", e))?;
            self.keys
                .instantiate(self.key, payload)
                .map_err(|e| UpcallError::key_op("keyctl_instantiate", e))?;
        }
        self.state = KeyState::Instantiated;
        Ok(())
    }

    /// Completes the upcall with a `#dnserror=` payload and the negative
    /// cache lifetime. The key is instantiated, not negated, so readers see
    /// which class of failure occurred.
    pub fn reject_with(&mut self, code: DnsErrorCode) -> Result<(), UpcallError> {
        let payload = code.payload();
        info!("The key instantiation ERROR data is '{}'", payload);
        let mut data = payload.into_bytes();
        data.push(0);
        self.instantiate(&data, self.negative_timeout)
    }

    /// Best-effort negation on the way out of a fatal error.
    pub fn abandon(&mut self) {
        if self.state != KeyState::Pending {
            return;
        }
        if let Err(e) = self.negate(self.negative_timeout) {
            warn!("Failed to negate key {} while abandoning it: {}", self.key, e);
        }
    }
}
