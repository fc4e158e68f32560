//! Integration tests for lexigen.
//!
//! Everything runs against in-memory or temp-dir SQLite databases and the
//! mock LLM client; no network access is required.
//!
//! Run with: `cargo test --test integration_tests`

mod integration;
