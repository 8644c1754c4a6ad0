//! Batched long-polling worker owning the client cache table.
//!
//! Every cache entry is assigned to one polling bucket at creation; each
//! bucket runs one perpetual task that probes the server with the bucket's
//! fingerprints, fetches changed items, and flushes listener notifications.
//! A low-frequency scheduler grows the bucket count as the table grows;
//! buckets are never torn down, they just idle.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::constants::CONFIG_PATH;
use crate::constants::CONFIG_TYPE_HEADER;
use crate::constants::IDLE_CYCLE_DELAY_MS;
use crate::constants::LISTENER_PATH;
use crate::constants::LONG_POLLING_HEADER;
use crate::constants::LONG_POLLING_NO_HANGUP_HEADER;
use crate::constants::PROBE_FIELD;
use crate::wire;
use crate::CacheData;
use crate::ClientConfig;
use crate::ConfigFilterChain;
use crate::ConfigKey;
use crate::ConfigListener;
use crate::ConfigTransport;
use crate::ConfigType;
use crate::Error;
use crate::FetchError;
use crate::LocalConfigStore;
use crate::ProbeEntry;
use crate::Result;
use crate::DEFAULT_GROUP;

struct WorkerInner {
    transport: Arc<dyn ConfigTransport>,
    filter_chain: ConfigFilterChain,
    local_store: LocalConfigStore,
    config: ClientConfig,

    /// groupKey -> cache entry; mutated copy-on-write under `map_lock`,
    /// read through lock-free snapshots
    cache_map: ArcSwap<HashMap<ConfigKey, Arc<CacheData>>>,
    map_lock: Mutex<()>,

    /// Bucket tasks spawned so far; grows monotonically
    spawned_buckets: AtomicUsize,
    healthy: AtomicBool,
    started: AtomicBool,
}

/// Client poll worker: owns the cache table and the long-polling tasks.
///
/// Cloning is cheap and shares the same table; `start()` spawns the bucket
/// scheduler onto the current tokio runtime and returns immediately. The
/// worker has no shutdown path in steady state - it runs for the process
/// lifetime, like the daemon threads it replaces.
#[derive(Clone)]
pub struct ClientPollWorker {
    inner: Arc<WorkerInner>,
}

impl ClientPollWorker {
    pub fn new(
        transport: Arc<dyn ConfigTransport>,
        filter_chain: ConfigFilterChain,
        config: ClientConfig,
    ) -> Self {
        let local_store = LocalConfigStore::new(&config.local_dir, &config.agent_name);
        Self {
            inner: Arc::new(WorkerInner {
                transport,
                filter_chain,
                local_store,
                config,
                cache_map: ArcSwap::from_pointee(HashMap::new()),
                map_lock: Mutex::new(()),
                spawned_buckets: AtomicUsize::new(0),
                healthy: AtomicBool::new(true),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn the bucket scheduler. Idempotent; must run inside a tokio
    /// runtime.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let worker = self.clone();
        let period = Duration::from_millis(self.inner.config.bucket_check_interval_ms);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                worker.spawn_missing_buckets();
            }
        });
    }

    /// True until a probe or fetch fails at the transport level; flips back
    /// on the next successful probe
    pub fn is_healthy(&self) -> bool {
        self.inner.healthy.load(Ordering::SeqCst)
    }

    fn set_healthy(
        &self,
        healthy: bool,
    ) {
        self.inner.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn cache_count(&self) -> usize {
        self.inner.cache_map.load().len()
    }

    pub fn get_cache(
        &self,
        key: &ConfigKey,
    ) -> Option<Arc<CacheData>> {
        self.inner.cache_map.load().get(key).cloned()
    }

    /// Register listeners for one key, creating its cache entry on first use
    pub async fn add_listeners(
        &self,
        key: ConfigKey,
        listeners: Vec<Arc<dyn ConfigListener>>,
    ) -> Result<()> {
        let key = normalize_key(key);
        let cache = self.add_cache_if_absent(&key).await?;
        for listener in listeners {
            cache.add_listener(listener, self.inner.config.first_attach_notify);
        }
        Ok(())
    }

    /// Register listeners and seed the cache content in the same step, so a
    /// caller that already fetched the value is not re-notified with it
    pub async fn add_listeners_with_content(
        &self,
        key: ConfigKey,
        content: &str,
        listeners: Vec<Arc<dyn ConfigListener>>,
    ) -> Result<()> {
        let key = normalize_key(key);
        let cache = self.add_cache_if_absent(&key).await?;
        cache.set_content(Some(content.to_string()));
        for listener in listeners {
            cache.add_listener(listener, self.inner.config.first_attach_notify);
        }
        Ok(())
    }

    /// Remove one listener; the cache entry is dropped with its last listener
    pub fn remove_listener(
        &self,
        key: ConfigKey,
        listener: &Arc<dyn ConfigListener>,
    ) {
        let key = normalize_key(key);
        if let Some(cache) = self.get_cache(&key) {
            if cache.remove_listener(listener) == 0 {
                self.remove_cache(&key);
            }
        }
    }

    /// Read one item with local-first precedence: failover file, then the
    /// server (snapshotting the result), then the last snapshot when no
    /// server is reachable. Server-reported outcomes (409, 403, other
    /// non-2xx) surface to the caller instead of falling back.
    pub async fn get_config(
        &self,
        key: ConfigKey,
    ) -> Result<Option<String>> {
        let key = normalize_key(key);
        let inner = &self.inner;

        if inner.config.enable_failover {
            match inner.local_store.read_failover(&key) {
                Ok(Some(content)) => {
                    warn!(
                        "[{}] [get-config] failover file used. dataId={}, group={}, tenant={}",
                        inner.config.agent_name, key.data_id, key.group, key.tenant
                    );
                    return Ok(Some(content));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        "[{}] [get-config] failover read failed. dataId={}, group={}, err={}",
                        inner.config.agent_name, key.data_id, key.group, e
                    );
                }
            }
        }

        match self.get_server_config(&key, inner.config.fetch_timeout()).await {
            Ok((content, _)) => Ok(content),
            Err(e @ Error::Fetch(_)) => Err(e),
            Err(e) => {
                warn!(
                    "[{}] [get-config] server fetch failed, trying snapshot. dataId={}, group={}, err={}",
                    inner.config.agent_name, key.data_id, key.group, e
                );
                match inner.local_store.read_snapshot(&key) {
                    Ok(content) => Ok(content),
                    Err(_) => Err(e),
                }
            }
        }
    }

    fn remove_cache(
        &self,
        key: &ConfigKey,
    ) {
        let inner = &self.inner;
        {
            let _guard = inner.map_lock.lock();
            let mut copy: HashMap<ConfigKey, Arc<CacheData>> = (**inner.cache_map.load()).clone();
            copy.remove(key);
            inner.cache_map.store(Arc::new(copy));
        }
        info!("[{}] [unsubscribe] {}", inner.config.agent_name, key);
    }

    async fn add_cache_if_absent(
        &self,
        key: &ConfigKey,
    ) -> Result<Arc<CacheData>> {
        if let Some(cache) = self.get_cache(key) {
            return Ok(cache);
        }
        let inner = &self.inner;
        let initial_content = self.load_initial_content(key);

        let (cache, created) = {
            let _guard = inner.map_lock.lock();
            // Double check: a concurrent registration for the same key must
            // reuse the winner's entry
            if let Some(existing) = self.get_cache(key) {
                // Reset so the server answers this entry's next probe
                // immediately instead of hanging it
                existing.set_initializing(true);
                (existing, false)
            } else {
                let map = inner.cache_map.load();
                let bucket_id = map.len() / inner.config.per_bucket_capacity;
                let cache = Arc::new(CacheData::new(
                    &inner.config.agent_name,
                    key.clone(),
                    bucket_id,
                    inner.filter_chain.clone(),
                    initial_content,
                ));
                let mut copy: HashMap<ConfigKey, Arc<CacheData>> = (**map).clone();
                copy.insert(key.clone(), cache.clone());
                inner.cache_map.store(Arc::new(copy));
                (cache, true)
            }
        };

        if created {
            info!("[{}] [subscribe] {}", inner.config.agent_name, key);
            if inner.config.enable_remote_sync {
                let (content, content_type) =
                    self.get_server_config(key, inner.config.fetch_timeout()).await?;
                cache.set_content(content);
                if let Some(content_type) = content_type {
                    cache.set_content_type(content_type);
                }
            }
        }
        Ok(cache)
    }

    fn load_initial_content(
        &self,
        key: &ConfigKey,
    ) -> Option<String> {
        let inner = &self.inner;
        if inner.config.enable_failover {
            match inner.local_store.read_failover(key) {
                Ok(Some(content)) => return Some(content),
                Ok(None) => {}
                Err(e) => warn!(
                    "[{}] [subscribe] failover read failed for {}: {}",
                    inner.config.agent_name, key, e
                ),
            }
        }
        match inner.local_store.read_snapshot(key) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    "[{}] [subscribe] snapshot read failed for {}: {}",
                    inner.config.agent_name, key, e
                );
                None
            }
        }
    }

    /// Fetch one item from the server. 404 is a delete, not an error; 409
    /// surfaces as a retryable conflict; snapshots are written best-effort.
    pub async fn get_server_config(
        &self,
        key: &ConfigKey,
        timeout: Duration,
    ) -> Result<(Option<String>, Option<ConfigType>)> {
        let inner = &self.inner;
        let mut params = vec![
            ("dataId".to_string(), key.data_id.clone()),
            ("group".to_string(), key.group.clone()),
        ];
        if key.has_tenant() {
            params.push(("tenant".to_string(), key.tenant.clone()));
        }

        let response = inner
            .transport
            .http_get(CONFIG_PATH, Vec::new(), params, timeout)
            .await
            .map_err(|e| {
                error!(
                    "[{}] [sub-server] get server config exception, dataId={}, group={}, tenant={}, err={}",
                    inner.config.agent_name, key.data_id, key.group, key.tenant, e
                );
                e
            })?;

        match response.status {
            200 => {
                if let Err(e) = inner.local_store.save_snapshot(key, Some(&response.body)) {
                    warn!(
                        "[{}] [snapshot] save failed for {}: {}",
                        inner.config.agent_name, key, e
                    );
                }
                let content_type = response.header(CONFIG_TYPE_HEADER).map(ConfigType::from_header);
                Ok((Some(response.body), content_type))
            }
            404 => {
                if let Err(e) = inner.local_store.save_snapshot(key, None) {
                    warn!(
                        "[{}] [snapshot] clear failed for {}: {}",
                        inner.config.agent_name, key, e
                    );
                }
                Ok((None, None))
            }
            409 => {
                error!(
                    "[{}] [sub-server-error] get server config being modified concurrently, dataId={}, group={}, tenant={}",
                    inner.config.agent_name, key.data_id, key.group, key.tenant
                );
                Err(FetchError::Conflict {
                    key: key.to_key_string(),
                }
                .into())
            }
            403 => {
                error!(
                    "[{}] [sub-server-error] no right, dataId={}, group={}, tenant={}",
                    inner.config.agent_name, key.data_id, key.group, key.tenant
                );
                Err(FetchError::Forbidden {
                    key: key.to_key_string(),
                    message: response.body,
                }
                .into())
            }
            code => {
                error!(
                    "[{}] [sub-server-error] dataId={}, group={}, tenant={}, code={}",
                    inner.config.agent_name, key.data_id, key.group, key.tenant, code
                );
                Err(FetchError::Status {
                    key: key.to_key_string(),
                    code,
                    body: response.body,
                }
                .into())
            }
        }
    }

    /// Probe the server with this batch's fingerprints and return the keys
    /// it reports changed
    async fn check_update_keys(
        &self,
        entries: &[ProbeEntry],
        no_hangup: bool,
    ) -> Result<Vec<ConfigKey>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let inner = &self.inner;

        let mut headers = vec![(
            LONG_POLLING_HEADER.to_string(),
            inner.config.poll_timeout().as_millis().to_string(),
        )];
        if no_hangup {
            // A fresh entry must not wait a whole hold window for its first
            // value
            headers.push((LONG_POLLING_NO_HANGUP_HEADER.to_string(), "true".to_string()));
        }
        let params = vec![(PROBE_FIELD.to_string(), wire::encode_probe(entries))];

        match inner
            .transport
            .http_post(LISTENER_PATH, headers, params, inner.config.probe_read_timeout())
            .await
        {
            Ok(response) if response.status == 200 => {
                self.set_healthy(true);
                Ok(wire::decode_changed_keys(&response.body))
            }
            Ok(response) => {
                self.set_healthy(false);
                error!(
                    "[{}] [check-update] get changed keys error, code: {}",
                    inner.config.agent_name, response.status
                );
                Ok(Vec::new())
            }
            Err(e) => {
                self.set_healthy(false);
                error!(
                    "[{}] [check-update] get changed keys exception: {}",
                    inner.config.agent_name, e
                );
                Err(e)
            }
        }
    }

    /// One full probe/fetch/notify pass over a bucket
    pub(crate) async fn poll_cycle(
        &self,
        bucket_id: usize,
    ) -> Result<()> {
        let inner = &self.inner;
        let snapshot = inner.cache_map.load_full();
        let owned: Vec<Arc<CacheData>> = snapshot
            .values()
            .filter(|cache| cache.bucket_id() == bucket_id)
            .cloned()
            .collect();

        let mut entries = Vec::new();
        let mut initializing_keys: HashSet<ConfigKey> = HashSet::new();
        for cache in &owned {
            if inner.config.enable_failover {
                cache.reconcile_local_override(&inner.local_store);
            }
            if cache.uses_local_config() {
                // Server bypassed entirely while the override is active
                cache.notify_stale_listeners();
                continue;
            }
            entries.push(ProbeEntry {
                key: cache.key(),
                fingerprint: cache.fingerprint(),
            });
            if cache.is_initializing() {
                initializing_keys.insert(cache.key());
            }
        }

        if entries.is_empty() {
            tokio::time::sleep(Duration::from_millis(IDLE_CYCLE_DELAY_MS)).await;
            return Ok(());
        }

        let changed = self
            .check_update_keys(&entries, !initializing_keys.is_empty())
            .await?;
        if !changed.is_empty() {
            info!(
                "[{}] [polling-resp] config changed: {:?}",
                inner.config.agent_name,
                changed.iter().map(ConfigKey::to_key_string).collect::<Vec<_>>()
            );
        }

        for key in &changed {
            match self.get_server_config(key, inner.config.fetch_timeout()).await {
                Ok((content, content_type)) => {
                    if let Some(cache) = self.get_cache(key) {
                        cache.set_content(content);
                        if let Some(content_type) = content_type {
                            cache.set_content_type(content_type);
                        }
                        info!(
                            "[{}] [data-received] dataId={}, group={}, tenant={}, fingerprint={}",
                            inner.config.agent_name,
                            key.data_id,
                            key.group,
                            key.tenant,
                            cache.fingerprint()
                        );
                    }
                }
                Err(e) => {
                    error!(
                        "[{}] [get-update] get changed config failed. dataId={}, group={}, tenant={}, err={}",
                        inner.config.agent_name, key.data_id, key.group, key.tenant, e
                    );
                }
            }
        }

        for cache in &owned {
            if !cache.is_initializing() || initializing_keys.contains(&cache.key()) {
                cache.notify_stale_listeners();
                cache.set_initializing(false);
            }
        }
        Ok(())
    }

    fn spawn_missing_buckets(&self) {
        let inner = &self.inner;
        let size = inner.cache_map.load().len();
        let capacity = inner.config.per_bucket_capacity;
        let needed = (size + capacity - 1) / capacity;
        let current = inner.spawned_buckets.load(Ordering::SeqCst);
        if needed > current {
            for bucket_id in current..needed {
                self.spawn_bucket_task(bucket_id);
            }
            inner.spawned_buckets.store(needed, Ordering::SeqCst);
        }
    }

    fn spawn_bucket_task(
        &self,
        bucket_id: usize,
    ) {
        let worker = self.clone();
        tokio::spawn(async move {
            debug!(
                "[{}] [longpoll-task] bucket {} started",
                worker.inner.config.agent_name, bucket_id
            );
            loop {
                if let Err(e) = worker.poll_cycle(bucket_id).await {
                    // Penalize the failed cycle instead of hammering the
                    // server in a tight loop
                    worker.set_healthy(false);
                    error!(
                        "[{}] [longpoll-error] bucket {} cycle failed: {}",
                        worker.inner.config.agent_name, bucket_id, e
                    );
                    tokio::time::sleep(worker.inner.config.task_penalty()).await;
                }
            }
        });
    }
}

fn normalize_key(mut key: ConfigKey) -> ConfigKey {
    let trimmed = key.group.trim().to_string();
    key.group = if trimmed.is_empty() {
        DEFAULT_GROUP.to_string()
    } else {
        trimmed
    };
    key
}
