// src/config.rs

//! Manages helper settings: loading, defaults, and validation.
//!
//! These are the helpers' own knobs. The routing rules live in the
//! separate, line-oriented request-key file (see `core::router::rules`).

use crate::core::dns::client::DNS_PORT;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming an explicit settings file.
pub const SETTINGS_ENV: &str = "KEYUPCALL_CONFIG";
/// Settings file consulted when the environment names none. Optional.
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/keyupcall.toml";

/// Resolved helper settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Default tracing filter when neither `RUST_LOG` nor a verbosity flag is given.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// The routing rules consulted by `request-key`.
    #[serde(default = "default_request_key_conf")]
    pub request_key_conf: String,
    /// The routing rules consulted when debugging at level two or above.
    #[serde(default = "default_debug_request_key_conf")]
    pub debug_request_key_conf: String,
    /// Where the directory client reads its name servers and options.
    #[serde(default = "default_resolv_conf")]
    pub resolv_conf: String,
    /// Name servers that replace those in `resolv_conf` when non-empty.
    #[serde(default)]
    pub nameservers: Vec<String>,
    /// Cache lifetime of negative results.
    #[serde(with = "humantime_serde", default = "default_negative_timeout")]
    pub negative_timeout: Duration,
}

fn default_log_level() -> String {
    "warn".to_string()
}
fn default_request_key_conf() -> String {
    "/etc/request-key.conf".to_string()
}
fn default_debug_request_key_conf() -> String {
    "request-key.conf".to_string()
}
fn default_resolv_conf() -> String {
    "/etc/resolv.conf".to_string()
}
fn default_negative_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            request_key_conf: default_request_key_conf(),
            debug_request_key_conf: default_debug_request_key_conf(),
            resolv_conf: default_resolv_conf(),
            nameservers: Vec::new(),
            negative_timeout: default_negative_timeout(),
        }
    }
}

/// Parses `ip` or `ip:port` / `[ip]:port`; a bare address gets the DNS port.
fn parse_nameserver(s: &str) -> Option<SocketAddr> {
    s.parse::<SocketAddr>()
        .ok()
        .or_else(|| s.parse::<IpAddr>().ok().map(|ip| SocketAddr::new(ip, DNS_PORT)))
}

impl Settings {
    /// Loads settings from `$KEYUPCALL_CONFIG`, else from the default path
    /// if it exists, else uses defaults.
    pub fn load() -> Result<Self> {
        match std::env::var(SETTINGS_ENV) {
            Ok(path) => Self::from_file(&path),
            Err(_) => match fs::read_to_string(DEFAULT_SETTINGS_PATH) {
                Ok(contents) => Self::from_toml_str(&contents)
                    .with_context(|| format!("Invalid settings in '{DEFAULT_SETTINGS_PATH}'")),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("No settings file at {}, using defaults", DEFAULT_SETTINGS_PATH);
                    Ok(Self::default())
                }
                Err(e) => Err(e)
                    .with_context(|| format!("Failed to read settings at '{DEFAULT_SETTINGS_PATH}'")),
            },
        }
    }

    /// Reads and validates a TOML settings file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file at '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid settings in '{path}'"))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(contents).context("Failed to parse TOML")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.request_key_conf.trim().is_empty() {
            return Err(anyhow!("request_key_conf cannot be empty"));
        }
        if self.debug_request_key_conf.trim().is_empty() {
            return Err(anyhow!("debug_request_key_conf cannot be empty"));
        }
        if self.resolv_conf.trim().is_empty() {
            return Err(anyhow!("resolv_conf cannot be empty"));
        }
        if self.negative_timeout.is_zero() {
            return Err(anyhow!("negative_timeout must be greater than 0"));
        }
        if self.negative_timeout.as_secs() > u64::from(u32::MAX) {
            return Err(anyhow!("negative_timeout is too large"));
        }
        for server in &self.nameservers {
            if parse_nameserver(server).is_none() {
                return Err(anyhow!("invalid nameserver address '{}'", server));
            }
        }
        Ok(())
    }

    /// The negative cache lifetime in whole seconds, at least one.
    pub fn negative_timeout_secs(&self) -> u32 {
        u32::try_from(self.negative_timeout.as_secs())
            .unwrap_or(u32::MAX)
            .max(1)
    }

    /// The configured name server overrides. Entries are validated on load.
    pub fn nameserver_addrs(&self) -> Vec<SocketAddr> {
        self.nameservers
            .iter()
            .filter_map(|s| parse_nameserver(s))
            .collect()
    }
}
