//! Wire-level building blocks of the change-detection protocol
//!
//! - [`fingerprint`] - deterministic content hash used as a change fingerprint
//! - [`ConfigKey`] - the `(data_id, group, tenant)` identity triple
//! - [`wire`] - probe/change-list encode and decode

mod fingerprint;
mod key;
pub mod wire;

pub use fingerprint::*;
pub use key::*;
pub use wire::*;

#[cfg(test)]
mod key_test;
