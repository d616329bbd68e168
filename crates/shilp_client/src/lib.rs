//! # Shilp Client
//!
//! Async HTTP client for the Shilp vector-search server.
//!
//! This crate provides:
//! - [`ShilpClient`] with borrowed endpoint groups: collections, data,
//!   debug, health and oplog
//! - The oplog replication contract: ordered fetches, a per-replica
//!   heartbeat watermark guard, and serialized replica lifecycle calls
//! - [`ReplicaSync`], a follower that pulls, applies and heartbeats
//! - [`DiscoveryClient`] for the discovery control plane
//! - Abortable byte and line streams for exports and ingest statistics
//!
//! ## Errors
//!
//! Every call returns [`ClientResult`]. Connection faults and timeouts are
//! [`ClientError::Transport`], non-2xx statuses are [`ClientError::Api`]
//! with the raw body, and bad JSON is [`ClientError::Decode`]. Local
//! argument checks fail with [`ClientError::Validation`] before anything is
//! sent. The transport never retries; [`ReplicaSync::sync_with_retry`] is
//! the opt-in retry layer.
//!
//! ## Example
//!
//! ```no_run
//! # async fn run() -> shilp_client::ClientResult<()> {
//! use shilp_client::{MemoryOplogApplier, ReplicaConfig, ReplicaSync, ShilpClient};
//!
//! let client = ShilpClient::new("http://localhost:3000")?;
//! let replica = ReplicaSync::new(
//!     client.clone(),
//!     ReplicaConfig::new("replica-a", "docs"),
//!     MemoryOplogApplier::new(),
//! );
//! replica.start().await?;
//! let cycle = replica.sync_with_retry().await?;
//! println!("applied {} entries up to lsn {}", cycle.applied, cycle.applied_lsn);
//! replica.stop().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod collections;
mod config;
mod data;
mod debug;
mod discovery;
mod error;
mod health;
mod oplog;
mod replica;
mod stream;
mod transport;

pub use client::ShilpClient;
pub use collections::CollectionsApi;
pub use config::{ClientConfig, ReplicaConfig, RetryConfig, UnregisterRoute, DEFAULT_TIMEOUT};
pub use data::DataApi;
pub use debug::DebugApi;
pub use discovery::DiscoveryClient;
pub use error::{ClientError, ClientResult};
pub use health::HealthApi;
pub use oplog::{OplogApi, ReplicaGuard};
pub use replica::{
    MemoryOplogApplier, OplogApplier, ReplicaCycleResult, ReplicaState, ReplicaStats, ReplicaSync,
};
pub use stream::{sse_data, AbortHandle, ByteStream, IngestStatsStream, LineStream};
pub use transport::{segment, ApiRequest, Transport};

pub use reqwest::Method;
pub use shilp_protocol as protocol;
