// src/lib.rs

pub mod cli;
pub mod config;
pub mod core;
pub mod logging;

// Re-export
pub use crate::core::{dns, keys, router};
