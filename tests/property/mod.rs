// tests/property/mod.rs

//! Property-based tests for the upcall helpers
//!
//! These tests use property-based testing to verify invariants and properties
//! that should always hold, regardless of input values.

pub mod address_format_test;
