// src/cli.rs

//! Command-line parsing for both helpers.
//!
//! The kernel invokes the helpers with fixed positional arguments, so the
//! grammar here is small and hand-parsed.

use crate::core::UpcallError;

pub const REQUEST_KEY_USAGE: &str = "Usage: request-key [-dn] <op> <key> <uid> <gid> <threadring> <processring> <sessionring> <info>\n       request-key --version";

pub const RESOLVER_USAGE: &str = "Usage: key.dns_resolver [-v] [-v] <serial>\n       key.dns_resolver -D [-v] [-v] <desc> <calloutinfo>\n       key.dns_resolver -V";

/// Number of positional arguments the kernel passes to `request-key`.
pub const REQUEST_KEY_POSITIONALS: usize = 8;

/// Arguments of `request-key`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestKeyArgs {
    /// Number of `-d` flags seen.
    pub debug: u8,
    pub no_syslog: bool,
    pub version: bool,
    pub operation: String,
    pub key_id: String,
    pub uid: String,
    pub gid: String,
    pub thread_keyring: String,
    pub process_keyring: String,
    pub session_keyring: String,
    pub callout_info: String,
}

impl RequestKeyArgs {
    /// Parses the arguments following the program name.
    pub fn parse<I, S>(args: I) -> Result<Self, UpcallError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter().map(Into::into).peekable();

        while let Some(arg) = args.next_if(|a: &String| a.starts_with('-')) {
            if arg == "--version" {
                parsed.version = true;
                return Ok(parsed);
            }
            let flags = arg
                .strip_prefix('-')
                .filter(|f| !f.is_empty() && !f.starts_with('-'))
                .ok_or_else(|| UpcallError::Usage(format!("unknown option '{arg}'")))?;
            for flag in flags.chars() {
                match flag {
                    'd' => parsed.debug = parsed.debug.saturating_add(1),
                    'n' => parsed.no_syslog = true,
                    other => {
                        return Err(UpcallError::Usage(format!("unknown option '-{other}'")));
                    }
                }
            }
        }

        let positionals: Vec<String> = args.collect();
        let [
            operation,
            key_id,
            uid,
            gid,
            thread_keyring,
            process_keyring,
            session_keyring,
            callout_info,
        ]: [String; REQUEST_KEY_POSITIONALS] = positionals.try_into().map_err(|v: Vec<String>| {
            UpcallError::Usage(format!(
                "expected {} arguments, got {}",
                REQUEST_KEY_POSITIONALS,
                v.len()
            ))
        })?;

        Ok(Self {
            operation,
            key_id,
            uid,
            gid,
            thread_keyring,
            process_keyring,
            session_keyring,
            callout_info,
            ..parsed
        })
    }
}

/// What the resolver was asked to work on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverTarget {
    /// Normal upcall: the key to instantiate.
    Key(String),
    /// Debug mode: a description and callout supplied by hand. No key is touched.
    Manual {
        description: String,
        callout_info: String,
    },
}

/// Arguments of the DNS resolver helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverArgs {
    pub verbosity: u8,
    pub version: bool,
    pub target: Option<ResolverTarget>,
}

impl ResolverArgs {
    pub fn parse<I, S>(args: I) -> Result<Self, UpcallError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut verbosity = 0u8;
        let mut debug_mode = false;
        let mut args = args.into_iter().map(Into::into).peekable();

        while let Some(arg) = args.next_if(|a: &String| a.starts_with('-')) {
            match arg.as_str() {
                "--verbose" => verbosity = verbosity.saturating_add(1),
                "--version" => {
                    return Ok(Self {
                        verbosity,
                        version: true,
                        target: None,
                    });
                }
                "--debug" => debug_mode = true,
                short if short.len() > 1 && !short.starts_with("--") => {
                    for flag in short[1..].chars() {
                        match flag {
                            'v' => verbosity = verbosity.saturating_add(1),
                            'D' => debug_mode = true,
                            'V' => {
                                return Ok(Self {
                                    verbosity,
                                    version: true,
                                    target: None,
                                });
                            }
                            other => {
                                return Err(UpcallError::Usage(format!(
                                    "unknown option '-{other}'"
                                )));
                            }
                        }
                    }
                }
                other => return Err(UpcallError::Usage(format!("unknown option '{other}'"))),
            }
        }

        let positionals: Vec<String> = args.collect();
        let target = match (debug_mode, positionals.as_slice()) {
            (false, [key]) => ResolverTarget::Key(key.clone()),
            (true, [description, callout_info]) => ResolverTarget::Manual {
                description: description.clone(),
                callout_info: callout_info.clone(),
            },
            (debug, rest) => {
                return Err(UpcallError::Usage(format!(
                    "expected {} arguments, got {}",
                    if debug { 2 } else { 1 },
                    rest.len()
                )));
            }
        };

        Ok(Self {
            verbosity,
            version: false,
            target: Some(target),
        })
    }

    pub fn is_debug(&self) -> bool {
        matches!(self.target, Some(ResolverTarget::Manual { .. }))
    }

    /// The tracing level implied by the verbosity flags, if any.
    pub fn log_level(&self) -> Option<&'static str> {
        match self.verbosity {
            0 => None,
            1 => Some("info"),
            _ => Some("debug"),
        }
    }
}
