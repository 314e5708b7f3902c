// src/bin/key_dns_resolver.rs

//! `key.dns_resolver`: services `dns_resolver` keys by looking up the AFSDB
//! records of a cell and resolving each server to an address.

use keyupcall::cli::{RESOLVER_USAGE, ResolverArgs, ResolverTarget};
use keyupcall::config::Settings;
use keyupcall::core::UpcallError;
use keyupcall::core::errors::{EXIT_FATAL, EXIT_USAGE};
use keyupcall::core::keys::{Completion, KernelKeyring, KeyDescription, KeySerial, KeyService};
use keyupcall::dns::handler::KEY_TYPE;
use keyupcall::dns::{DnsResolverHandler, LookupRequest, ResolvConf, StubDirectoryClient, SystemResolver};
use keyupcall::logging::{self, LogTarget};
use std::env;
use std::process::ExitCode;
use tracing::{error, info};

/// The key serial in an argument list that failed to parse, when it is
/// unambiguous: a normal-mode invocation with a single positional.
fn stray_key(raw: &[String]) -> Option<KeySerial> {
    let debug_flag = raw.iter().any(|a| {
        a == "--debug" || (a.starts_with('-') && !a.starts_with("--") && a.contains('D'))
    });
    if debug_flag {
        return None;
    }
    let mut positionals = raw.iter().filter(|a| !a.starts_with('-'));
    match (positionals.next(), positionals.next()) {
        (Some(only), None) => only.parse().ok(),
        _ => None,
    }
}

fn negative_timeout(settings: Option<&Settings>) -> u32 {
    settings.map_or_else(
        || Settings::default().negative_timeout_secs(),
        Settings::negative_timeout_secs,
    )
}

fn abandon_key(key: KeySerial, timeout_secs: u32) {
    Completion::new(&KernelKeyring::new(), key, timeout_secs).abandon();
}

/// Negates the key of a normal-mode run. Debug runs have no key.
fn abandon_target(target: &ResolverTarget, timeout_secs: u32) {
    if let ResolverTarget::Key(id) = target {
        if let Ok(key) = id.parse::<KeySerial>() {
            abandon_key(key, timeout_secs);
        }
    }
}

/// What the resolver is about to service.
struct Job {
    /// Absent in debug mode, where no real key exists.
    key: Option<KeySerial>,
    description: String,
    callout_info: String,
}

fn job_for<K: KeyService>(target: &ResolverTarget, keys: &K) -> Result<Job, UpcallError> {
    match target {
        ResolverTarget::Key(id) => {
            let key: KeySerial = id.parse()?;
            let description = keys
                .describe(key)
                .map_err(|e| UpcallError::key_op("keyctl_describe", e))?;
            let callout = keys
                .read(KeySerial::REQKEY_AUTH_KEY)
                .map_err(|e| UpcallError::key_op("keyctl_read", e))?;
            let callout_info = String::from_utf8_lossy(&callout)
                .trim_end_matches('\0')
                .to_string();
            Ok(Job {
                key: Some(key),
                description,
                callout_info,
            })
        }
        ResolverTarget::Manual {
            description,
            callout_info,
        } => Ok(Job {
            key: None,
            description: format!("{KEY_TYPE};-1;-1;0;{description}"),
            callout_info: callout_info.clone(),
        }),
    }
}

async fn run<K: KeyService>(
    job: &Job,
    completion: &mut Completion<'_, K>,
    settings: &Settings,
) -> Result<(), UpcallError> {
    info!("Key description: '{}'", job.description);
    info!("Callout info: '{}'", job.callout_info);

    let described = KeyDescription::parse(&job.description)?;
    let request = LookupRequest::from_key(&described, &job.callout_info)?;
    info!(
        "Do DNS query of AFSDB type for:'{}' mask:'{}'",
        request.name, job.callout_info
    );

    let conf = ResolvConf::load(&settings.resolv_conf).with_nameservers(settings.nameserver_addrs());
    let handler = DnsResolverHandler::new(StubDirectoryClient::new(conf), SystemResolver);
    handler.complete(&request, completion).await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let raw: Vec<String> = env::args().skip(1).collect();
    let args = match ResolverArgs::parse(raw.iter().cloned()) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("key.dns_resolver: {e}");
            eprintln!("{RESOLVER_USAGE}");
            if let Some(key) = stray_key(&raw) {
                let settings = Settings::load().ok();
                abandon_key(key, negative_timeout(settings.as_ref()));
            }
            return ExitCode::from(e.exit_code());
        }
    };
    if args.version {
        println!("version: {VERSION}");
        return ExitCode::SUCCESS;
    }
    let Some(target) = args.target.as_ref() else {
        eprintln!("{RESOLVER_USAGE}");
        return ExitCode::from(EXIT_USAGE);
    };

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("key.dns_resolver: {e:#}");
            abandon_target(target, negative_timeout(None));
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let level = args.log_level().unwrap_or(settings.log_level.as_str());
    logging::init(LogTarget::detect(true), c"key.dns_resolver", libc::LOG_DAEMON, level);

    let keys = KernelKeyring::new();
    let job = match job_for(target, &keys) {
        Ok(job) => job,
        Err(e) => {
            error!("{}", e);
            abandon_target(target, settings.negative_timeout_secs());
            return ExitCode::from(e.exit_code());
        }
    };

    let mut completion = Completion::new(
        &keys,
        job.key.unwrap_or(KeySerial(0)),
        settings.negative_timeout_secs(),
    )
    .dry_run(args.is_debug());

    match run(&job, &mut completion, &settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            completion.abandon();
            ExitCode::from(e.exit_code())
        }
    }
}
