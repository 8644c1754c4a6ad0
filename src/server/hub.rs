//! Poll hub: holds client probes open until a change or a timeout.
//!
//! Suspension is a pending future plus one timer task, never a blocked
//! thread, so tens of thousands of concurrent holds are cheap. Resolution
//! is exactly-once by construction: whoever removes the request from the
//! table owns its responder, and the timeout task is cancelled synchronously
//! with removal.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use crate::ConfigChangeEvent;
use crate::ConfigKey;
use crate::FingerprintStore;
use crate::PollPolicy;
use crate::ProbeEntry;

/// One incoming probe, parsed by the hosting HTTP layer
#[derive(Debug)]
pub struct PollRequest {
    /// What the client claims to hold, per key
    pub fingerprints: HashMap<ConfigKey, String>,

    /// Hold duration declared in the long-poll header
    pub requested_timeout: Duration,

    /// Forces an immediate answer even when nothing changed
    pub no_hangup: bool,

    pub client_ip: String,
    pub app_name: Option<String>,
    pub tag: Option<String>,
}

impl PollRequest {
    pub fn new(
        entries: Vec<ProbeEntry>,
        requested_timeout: Duration,
        client_ip: &str,
    ) -> Self {
        Self {
            fingerprints: entries
                .into_iter()
                .map(|entry| (entry.key, entry.fingerprint))
                .collect(),
            requested_timeout,
            no_hangup: false,
            client_ip: client_ip.to_string(),
            app_name: None,
            tag: None,
        }
    }

    pub fn no_hangup(mut self) -> Self {
        self.no_hangup = true;
        self
    }

    pub fn with_app_name(
        mut self,
        app_name: &str,
    ) -> Self {
        self.app_name = Some(app_name.to_string());
        self
    }

    pub fn with_tag(
        mut self,
        tag: &str,
    ) -> Self {
        self.tag = Some(tag.to_string());
        self
    }
}

/// One client poll waiting for a change. Lives in the hub table for at most
/// one request/response cycle; removed by exactly one of timeout or event
/// match.
struct SuspendedRequest {
    fingerprints: HashMap<ConfigKey, String>,
    client_ip: String,
    app_name: Option<String>,
    tag: Option<String>,
    created_at: Instant,
    responder: oneshot::Sender<Vec<ConfigKey>>,
    cancel: CancellationToken,
}

struct HubInner {
    store: FingerprintStore,
    policy: ArcSwap<PollPolicy>,
    subs: DashMap<u64, SuspendedRequest>,
    next_id: AtomicU64,
}

/// Server poll hub.
///
/// Cloning is cheap and shares the suspended-request table. The injected
/// [`PollPolicy`] is re-read on every request, so flipping fixed-polling
/// mode affects the next probe without touching requests already held.
#[derive(Clone)]
pub struct ServerPollHub {
    inner: Arc<HubInner>,
}

impl ServerPollHub {
    pub fn new(
        store: FingerprintStore,
        policy: PollPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(HubInner {
                store,
                policy: ArcSwap::from_pointee(policy),
                subs: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn update_policy(
        &self,
        policy: PollPolicy,
    ) {
        self.inner.policy.store(Arc::new(policy));
    }

    /// Answer one probe: immediately when something already differs or the
    /// client refuses to hang, otherwise suspend until a matching change
    /// event or the hold timeout. The returned future is the suspension -
    /// the hosting server just awaits it.
    pub async fn poll(
        &self,
        request: PollRequest,
    ) -> Vec<ConfigKey> {
        let inner = &self.inner;
        let policy = inner.policy.load_full();

        if !policy.fixed_polling {
            let changed = compare(&inner.store, &request.fingerprints);
            if !changed.is_empty() {
                debug!(
                    client_ip = %request.client_ip,
                    probed = request.fingerprints.len(),
                    changed = changed.len(),
                    "[long-pulling] instant response"
                );
                return changed;
            }
            if request.no_hangup {
                debug!(
                    client_ip = %request.client_ip,
                    probed = request.fingerprints.len(),
                    "[long-pulling] nohangup response"
                );
                return Vec::new();
            }
        }

        let hold = policy.hold_duration(request.requested_timeout);
        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (responder, receiver) = oneshot::channel();
        let cancel = CancellationToken::new();

        inner.subs.insert(
            id,
            SuspendedRequest {
                fingerprints: request.fingerprints,
                client_ip: request.client_ip,
                app_name: request.app_name,
                tag: request.tag,
                created_at: Instant::now(),
                responder,
                cancel: cancel.clone(),
            },
        );
        debug!(request_id = id, hold = ?hold, "[long-pulling] request suspended");

        let hub = inner.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(hold) => {
                    if let Some((_, sub)) = hub.subs.remove(&id) {
                        // Fixed-polling clients get no event-driven wake, so
                        // the comparison re-runs at the fixed interval
                        let changed = if hub.policy.load().fixed_polling {
                            compare(&hub.store, &sub.fingerprints)
                        } else {
                            Vec::new()
                        };
                        debug!(
                            request_id = id,
                            held = ?sub.created_at.elapsed(),
                            changed = changed.len(),
                            "[long-pulling] timeout"
                        );
                        let _ = sub.responder.send(changed);
                    }
                }
            }
        });

        receiver.await.unwrap_or_default()
    }

    /// React to one change event: release every suspended request that
    /// references the key and is inside the event's targeting scope.
    pub fn notify_change(
        &self,
        event: &ConfigChangeEvent,
    ) {
        let inner = &self.inner;
        if inner.policy.load().fixed_polling {
            // Degraded mode trades push latency for a flat load profile
            return;
        }

        let matched: Vec<u64> = inner
            .subs
            .iter()
            .filter(|entry| {
                let sub = entry.value();
                sub.fingerprints.contains_key(&event.key)
                    && event.targets(&sub.client_ip, sub.tag.as_deref())
            })
            .map(|entry| *entry.key())
            .collect();

        for id in matched {
            if let Some((_, sub)) = inner.subs.remove(&id) {
                // Cancel the timeout task before building the response;
                // removal decided the race, the cancel just reaps the timer
                sub.cancel.cancel();
                info!(
                    request_id = id,
                    key = %event.key,
                    held = ?sub.created_at.elapsed(),
                    "[long-pulling] in-advance release"
                );
                let _ = sub.responder.send(vec![event.key.clone()]);
            }
        }
    }

    /// Consume change events from the dump layer's bus
    pub fn spawn_change_listener(
        &self,
        mut events: mpsc::UnboundedReceiver<ConfigChangeEvent>,
    ) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                hub.notify_change(&event);
            }
            debug!("[long-pulling] change event bus closed");
        })
    }

    pub fn suspended_count(&self) -> usize {
        self.inner.subs.len()
    }

    /// Fingerprints currently declared for one key, per waiting client IP
    pub fn subscriber_fingerprints(
        &self,
        key: &ConfigKey,
    ) -> Vec<(String, String)> {
        self.inner
            .subs
            .iter()
            .filter_map(|entry| {
                let sub = entry.value();
                sub.fingerprints
                    .get(key)
                    .map(|fp| (sub.client_ip.clone(), fp.clone()))
            })
            .collect()
    }

    /// Keys currently watched per declaring application
    pub fn app_subscriptions(&self) -> HashMap<String, HashSet<ConfigKey>> {
        let mut result: HashMap<String, HashSet<ConfigKey>> = HashMap::new();
        for entry in self.inner.subs.iter() {
            let sub = entry.value();
            let Some(app_name) = &sub.app_name else {
                continue;
            };
            result
                .entry(app_name.clone())
                .or_default()
                .extend(sub.fingerprints.keys().cloned());
        }
        result
    }

    /// Everything one client IP is currently waiting on
    pub fn subscriptions_by_ip(
        &self,
        client_ip: &str,
    ) -> HashMap<ConfigKey, String> {
        let mut result = HashMap::new();
        for entry in self.inner.subs.iter() {
            let sub = entry.value();
            if sub.client_ip == client_ip {
                for (key, fp) in &sub.fingerprints {
                    result.insert(key.clone(), fp.clone());
                }
            }
        }
        result
    }
}

fn compare(
    store: &FingerprintStore,
    fingerprints: &HashMap<ConfigKey, String>,
) -> Vec<ConfigKey> {
    fingerprints
        .iter()
        .filter(|(key, declared)| store.is_stale(key, declared))
        .map(|(key, _)| key.clone())
        .collect()
}
