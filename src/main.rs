// src/main.rs

//! `request-key`: the kernel's generic upcall entry point.
//!
//! Reads the routing rules, picks the first rule matching the upcall and
//! replaces itself with the program that rule names.

use keyupcall::cli::{REQUEST_KEY_USAGE, RequestKeyArgs};
use keyupcall::config::Settings;
use keyupcall::core::UpcallError;
use keyupcall::core::errors::EXIT_FATAL;
use keyupcall::core::keys::{Completion, KernelKeyring, KeySerial, KeyService};
use keyupcall::logging::{self, LogTarget};
use keyupcall::router::{ActionRouter, RuleFile, UpcallContext};
use std::convert::Infallible;
use std::env;
use std::process::ExitCode;
use tracing::{debug, error};

fn main() -> ExitCode {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args = match RequestKeyArgs::parse(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("request-key: {e}");
            eprintln!("{REQUEST_KEY_USAGE}");
            return ExitCode::from(e.exit_code());
        }
    };

    if args.version {
        println!("request-key from keyupcall {VERSION}");
        return ExitCode::SUCCESS;
    }

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("request-key: {e:#}");
            if args.debug == 0 {
                abandon(&args.key_id, Settings::default().negative_timeout_secs());
            }
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let target = LogTarget::detect(!args.no_syslog);
    let level = if args.debug > 0 {
        "debug"
    } else {
        settings.log_level.as_str()
    };
    logging::init(target, c"request-key", libc::LOG_AUTHPRIV, level);

    let keys = KernelKeyring::new();
    let Err(e) = run(&args, &settings, &keys);
    error!("{}", e);

    // A debug run services a made-up key, so there is nothing to negate.
    if args.debug == 0 {
        abandon(&args.key_id, settings.negative_timeout_secs());
    }
    ExitCode::from(e.exit_code())
}

/// Negates the key named on the command line, if it names one.
fn abandon(key_id: &str, timeout_secs: u32) {
    if let Ok(key) = key_id.parse::<KeySerial>() {
        Completion::new(&KernelKeyring::new(), key, timeout_secs).abandon();
    }
}

fn run<K: KeyService>(
    args: &RequestKeyArgs,
    settings: &Settings,
    keys: &K,
) -> Result<Infallible, UpcallError> {
    let ctx = UpcallContext::from_request(args, keys)?;

    let conf_path = if args.debug < 2 {
        &settings.request_key_conf
    } else {
        &settings.debug_request_key_conf
    };
    debug!("Using routing rules from {}", conf_path);

    let rules = RuleFile::load(conf_path)?;
    let plan = ActionRouter::new(&rules, keys).route(&ctx)?;
    plan.replace_process()
}
