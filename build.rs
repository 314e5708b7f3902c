// build.rs

use std::env;

fn main() {
    // Packagers stamp the helpers with the distribution's version string.
    let version = match env::var("KEYUPCALL_VERSION") {
        Ok(v) if !v.trim().is_empty() => v,
        _ => env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "dev".to_string()),
    };

    println!("cargo:rustc-env=CARGO_PKG_VERSION={version}");
    println!("cargo:rerun-if-env-changed=KEYUPCALL_VERSION");
}
