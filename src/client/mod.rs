//! Client side of the change-detection protocol
//!
//! Provides the components a subscribing process needs:
//! - [`ConfigListener`] - callback trait with optional structured-diff capability
//! - [`CacheData`] - per-key record of content, fingerprint and listeners
//! - [`ClientPollWorker`] - batched long-polling tasks over the cache table
//! - [`ConfigTransport`] - seam to the host's HTTP stack
//! - [`LocalConfigStore`] - failover/snapshot files for offline operation

mod cache;
mod diff;
mod failover;
mod filter;
mod listener;
mod transport;
mod worker;

pub use cache::*;
pub use diff::*;
pub use failover::*;
pub use filter::*;
pub use listener::*;
pub use transport::*;
pub use worker::*;
