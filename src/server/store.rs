use std::sync::Arc;

use dashmap::DashMap;

use crate::ConfigKey;
use crate::NIL_FINGERPRINT;

/// Authoritative in-memory fingerprint per configuration key.
///
/// The persistence/dump layer owns the truth and pushes every change here
/// before emitting a [`crate::ConfigChangeEvent`]; the poll hub only ever
/// reads. Absent keys compare as the nil fingerprint, so a client probing
/// for a never-published key is told nothing changed.
#[derive(Debug, Clone, Default)]
pub struct FingerprintStore {
    inner: Arc<DashMap<ConfigKey, String>>,
}

impl FingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(
        &self,
        key: ConfigKey,
        fingerprint: String,
    ) {
        self.inner.insert(key, fingerprint);
    }

    pub fn remove(
        &self,
        key: &ConfigKey,
    ) -> Option<String> {
        self.inner.remove(key).map(|(_, fingerprint)| fingerprint)
    }

    pub fn get(
        &self,
        key: &ConfigKey,
    ) -> Option<String> {
        self.inner.get(key).map(|entry| entry.clone())
    }

    /// Does the declared fingerprint differ from the authoritative one?
    pub fn is_stale(
        &self,
        key: &ConfigKey,
        declared: &str,
    ) -> bool {
        match self.inner.get(key) {
            Some(authoritative) => authoritative.as_str() != declared,
            None => declared != NIL_FINGERPRINT,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
