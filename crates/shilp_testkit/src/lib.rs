//! # Shilp Testkit
//!
//! Test utilities for the Shilp client.
//!
//! This crate provides:
//! - [`FakeShilp`], a stateful in-memory server on `wiremock`
//! - Fixtures for records, oplog batches and upload files
//! - Property-based generators for well-formed oplogs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shilp_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn flush_after_insert() {
//!     let server = FakeShilp::start().await;
//!     server.seed_collection("docs");
//!     let client = ShilpClient::new(server.uri()).unwrap();
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fake_server;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fake_server::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fake_server::*;
pub use fixtures::*;
pub use generators::*;
