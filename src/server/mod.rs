//! Server side of the change-detection protocol
//!
//! - [`FingerprintStore`] - authoritative key -> fingerprint map, fed by the
//!   external dump layer
//! - [`ConfigChangeEvent`] - change notification with beta/tag targeting
//! - [`ServerPollHub`] - immediate-or-suspend probe handling with
//!   event-driven early release

mod event;
mod hub;
mod store;

pub use event::*;
pub use hub::*;
pub use store::*;

#[cfg(test)]
mod hub_test;
