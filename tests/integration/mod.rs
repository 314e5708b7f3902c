// tests/integration/mod.rs

//! Integration tests module
//!
//! This module contains end-to-end tests that drive the router and the
//! directory resolution handler against in-memory collaborators.

pub mod dns_handler_test;
pub mod fixtures;
