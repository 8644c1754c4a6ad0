//! Per-key cache record and listener notification.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use parking_lot::RwLock;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::diff::compute_diff;
use crate::fingerprint;
use crate::ConfigFilterChain;
use crate::ConfigKey;
use crate::ConfigListener;
use crate::ConfigResponse;
use crate::ConfigType;
use crate::FirstAttachNotify;
use crate::LocalConfigStore;
use crate::NIL_FINGERPRINT;

/// Content and fingerprint guarded together: no reader ever observes a pair
/// that did not co-occur.
struct ContentState {
    content: Option<String>,
    fingerprint: String,
    content_type: ConfigType,
}

#[derive(Clone)]
struct ContentSnapshot {
    content: Option<String>,
    fingerprint: String,
    content_type: ConfigType,
}

/// Per-listener delivery state, owned by exactly one [`CacheData`].
///
/// Identity is the listener `Arc` itself; the ack fingerprint and the last
/// delivered content are shared with in-flight delivery jobs, which mutate
/// them only after the callback succeeds.
#[derive(Clone)]
struct ListenerRecord {
    listener: Arc<dyn ConfigListener>,
    last_ack_fingerprint: Arc<Mutex<String>>,
    last_content: Arc<Mutex<Option<String>>>,
}

/// Cache record for one `(data_id, group, tenant)` configuration item.
///
/// Holds the last-known content with its fingerprint, the local-override
/// state, and the set of registered listeners. Identity fields are fixed at
/// construction; everything else is interior-mutable so the record can be
/// shared between the poll loop and registration paths.
pub struct CacheData {
    pub data_id: String,
    pub group: String,
    pub tenant: String,

    name: String,
    bucket_id: usize,
    filter_chain: ConfigFilterChain,

    state: RwLock<ContentState>,
    listeners: RwLock<Vec<ListenerRecord>>,

    /// True until the first reconciliation against the server completes
    initializing: AtomicBool,
    use_local_config: AtomicBool,
    local_config_version: AtomicU64,
}

impl CacheData {
    pub(crate) fn new(
        name: &str,
        key: ConfigKey,
        bucket_id: usize,
        filter_chain: ConfigFilterChain,
        initial_content: Option<String>,
    ) -> Self {
        let fp = fingerprint(initial_content.as_deref());
        Self {
            data_id: key.data_id,
            group: key.group,
            tenant: key.tenant,
            name: name.to_string(),
            bucket_id,
            filter_chain,
            state: RwLock::new(ContentState {
                content: initial_content,
                fingerprint: fp,
                content_type: ConfigType::default(),
            }),
            listeners: RwLock::new(Vec::new()),
            initializing: AtomicBool::new(true),
            use_local_config: AtomicBool::new(false),
            local_config_version: AtomicU64::new(0),
        }
    }

    pub fn key(&self) -> ConfigKey {
        ConfigKey::with_tenant(&self.data_id, &self.group, &self.tenant)
    }

    pub fn bucket_id(&self) -> usize {
        self.bucket_id
    }

    pub fn content(&self) -> Option<String> {
        self.state.read().content.clone()
    }

    pub fn fingerprint(&self) -> String {
        self.state.read().fingerprint.clone()
    }

    pub fn content_type(&self) -> ConfigType {
        self.state.read().content_type
    }

    /// Replace the content and recompute the fingerprint under one write
    /// lock.
    pub fn set_content(
        &self,
        content: Option<String>,
    ) {
        let mut state = self.state.write();
        state.fingerprint = fingerprint(content.as_deref());
        state.content = content;
    }

    pub fn set_content_type(
        &self,
        content_type: ConfigType,
    ) {
        self.state.write().content_type = content_type;
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::SeqCst)
    }

    pub fn set_initializing(
        &self,
        initializing: bool,
    ) {
        self.initializing.store(initializing, Ordering::SeqCst);
    }

    pub fn uses_local_config(&self) -> bool {
        self.use_local_config.load(Ordering::SeqCst)
    }

    fn set_use_local_config(
        &self,
        active: bool,
    ) {
        self.use_local_config.store(active, Ordering::SeqCst);
        if !active {
            self.local_config_version.store(0, Ordering::SeqCst);
        }
    }

    pub fn local_config_version(&self) -> u64 {
        self.local_config_version.load(Ordering::SeqCst)
    }

    /// Register a listener; idempotent by listener identity.
    ///
    /// The seed of the ack fingerprint decides whether an already-current
    /// value triggers a notification on the very next check, governed by the
    /// injected policy. A diff-capable listener under `Suppress` also
    /// captures the current content so its first diff has a real baseline.
    pub fn add_listener(
        &self,
        listener: Arc<dyn ConfigListener>,
        policy: FirstAttachNotify,
    ) {
        let (current_fp, current_content) = {
            let state = self.state.read();
            (state.fingerprint.clone(), state.content.clone())
        };

        let mut listeners = self.listeners.write();
        if listeners
            .iter()
            .any(|record| Arc::ptr_eq(&record.listener, &listener))
        {
            return;
        }

        let seed_fp = match policy {
            FirstAttachNotify::Suppress => current_fp,
            FirstAttachNotify::Immediate => NIL_FINGERPRINT.to_string(),
        };
        let seed_content = if listener.wants_diff() && policy == FirstAttachNotify::Suppress {
            current_content
        } else {
            None
        };

        listeners.push(ListenerRecord {
            listener,
            last_ack_fingerprint: Arc::new(Mutex::new(seed_fp)),
            last_content: Arc::new(Mutex::new(seed_content)),
        });
        info!(
            "[{}] [add-listener] ok, tenant={}, dataId={}, group={}, cnt={}",
            self.name,
            self.tenant,
            self.data_id,
            self.group,
            listeners.len()
        );
    }

    /// Remove a listener by identity; returns the remaining count so the
    /// owner can drop the whole entry when it reaches zero.
    pub fn remove_listener(
        &self,
        listener: &Arc<dyn ConfigListener>,
    ) -> usize {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|record| !Arc::ptr_eq(&record.listener, listener));
        if listeners.len() < before {
            info!(
                "[{}] [remove-listener] ok, dataId={}, group={}, cnt={}",
                self.name,
                self.data_id,
                self.group,
                listeners.len()
            );
        }
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver the current value to every listener whose ack fingerprint
    /// differs from the cache's. A failed delivery leaves the ack untouched,
    /// so the next check retries it.
    pub fn notify_stale_listeners(&self) {
        let snapshot = {
            let state = self.state.read();
            ContentSnapshot {
                content: state.content.clone(),
                fingerprint: state.fingerprint.clone(),
                content_type: state.content_type,
            }
        };
        let records: Vec<ListenerRecord> = self.listeners.read().clone();
        for record in records {
            let acked = record.last_ack_fingerprint.lock().clone();
            if acked != snapshot.fingerprint {
                self.safe_notify_listener(&snapshot, record);
            }
        }
    }

    fn safe_notify_listener(
        &self,
        snapshot: &ContentSnapshot,
        record: ListenerRecord,
    ) {
        let executor = record.listener.executor();

        let listener = record.listener;
        let last_ack = record.last_ack_fingerprint;
        let last_content = record.last_content;
        let filter_chain = self.filter_chain.clone();
        let name = self.name.clone();
        let data_id = self.data_id.clone();
        let group = self.group.clone();
        let tenant = self.tenant.clone();
        let content = snapshot.content.clone();
        let content_type = snapshot.content_type;
        let fp = snapshot.fingerprint.clone();

        let job = move || {
            let mut response = ConfigResponse {
                data_id: data_id.clone(),
                group: group.clone(),
                tenant,
                content: content.clone(),
                content_type,
                fingerprint: fp.clone(),
            };
            if let Err(e) = filter_chain.do_filter(&mut response) {
                error!(
                    "[{}] [notify-error] filter chain failed, dataId={}, group={}, fingerprint={}, err={}",
                    name, data_id, group, fp, e
                );
                return;
            }
            if let Err(e) = listener.receive_config_info(response.content.as_deref()) {
                error!(
                    "[{}] [notify-error] dataId={}, group={}, fingerprint={}, err={}",
                    name, data_id, group, fp, e
                );
                return;
            }
            if listener.wants_diff() {
                let previous = last_content.lock().clone();
                let event = compute_diff(previous.as_deref(), content.as_deref(), content_type);
                if let Err(e) = listener.receive_config_diff(event) {
                    error!(
                        "[{}] [notify-error] diff delivery failed, dataId={}, group={}, fingerprint={}, err={}",
                        name, data_id, group, fp, e
                    );
                    return;
                }
                *last_content.lock() = content;
            }
            *last_ack.lock() = fp.clone();
            debug!(
                "[{}] [notify-ok] dataId={}, group={}, fingerprint={}",
                name, data_id, group, fp
            );
        };

        // The listener decides where delivery runs; inline delivery throttles
        // only this entry's bucket
        match executor {
            Some(handle) => {
                handle.spawn(async move { job() });
            }
            None => job(),
        }
    }

    /// Reconcile against the local failover file: adopt it when it appears,
    /// reload it when it changes, fall back to server-origin content when it
    /// disappears. Disk errors leave the override inactive for this cycle.
    pub fn reconcile_local_override(
        &self,
        store: &LocalConfigStore,
    ) {
        let key = self.key();
        let mtime = match store.failover_mtime_millis(&key) {
            Ok(mtime) => mtime,
            Err(e) => {
                warn!(
                    "[{}] [failover-error] probing failover file failed, dataId={}, group={}, err={}",
                    self.name, self.data_id, self.group, e
                );
                if self.uses_local_config() {
                    self.set_use_local_config(false);
                }
                return;
            }
        };

        match mtime {
            // none -> present: adopt the local override
            Some(version) if !self.uses_local_config() => {
                self.adopt_failover(store, &key, version, "created");
            }
            // present -> changed: reload
            Some(version)
                if self.uses_local_config() && self.local_config_version() != version =>
            {
                self.adopt_failover(store, &key, version, "changed");
            }
            // present -> none: back to server-origin content
            None if self.uses_local_config() => {
                self.set_use_local_config(false);
                warn!(
                    "[{}] [failover-change] failover file deleted. dataId={}, group={}, tenant={}",
                    self.name, self.data_id, self.group, self.tenant
                );
            }
            _ => {}
        }
    }

    fn adopt_failover(
        &self,
        store: &LocalConfigStore,
        key: &ConfigKey,
        version: u64,
        transition: &str,
    ) {
        match store.read_failover(key) {
            Ok(Some(content)) => {
                self.set_use_local_config(true);
                self.local_config_version.store(version, Ordering::SeqCst);
                self.set_content(Some(content));
                warn!(
                    "[{}] [failover-change] failover file {}. dataId={}, group={}, tenant={}, fingerprint={}",
                    self.name,
                    transition,
                    self.data_id,
                    self.group,
                    self.tenant,
                    self.fingerprint()
                );
            }
            // vanished between the mtime probe and the read
            Ok(None) => {
                if self.uses_local_config() {
                    self.set_use_local_config(false);
                }
            }
            Err(e) => {
                warn!(
                    "[{}] [failover-error] reading failover file failed, dataId={}, group={}, err={}",
                    self.name, self.data_id, self.group, e
                );
                if self.uses_local_config() {
                    self.set_use_local_config(false);
                }
            }
        }
    }
}

impl std::fmt::Debug for CacheData {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CacheData")
            .field("data_id", &self.data_id)
            .field("group", &self.group)
            .field("tenant", &self.tenant)
            .field("bucket_id", &self.bucket_id)
            .field("fingerprint", &self.fingerprint())
            .field("initializing", &self.is_initializing())
            .field("use_local_config", &self.uses_local_config())
            .finish_non_exhaustive()
    }
}
