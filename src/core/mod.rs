// src/core/mod.rs

//! The central module containing the upcall logic: key service access,
//! request routing, and directory resolution.

pub mod dns;
pub mod errors;
pub mod keys;
pub mod router;

pub use errors::UpcallError;
pub use keys::{KeySerial, KeyService};
