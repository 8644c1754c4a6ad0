use std::time::Duration;

use tokio::sync::mpsc;

use super::*;
use crate::wire::encode_changed_keys;
use crate::ConfigKey;
use crate::PollPolicy;
use crate::ProbeEntry;

const REQUESTED: Duration = Duration::from_secs(30);

fn probe(
    key: &ConfigKey,
    fingerprint: &str,
) -> ProbeEntry {
    ProbeEntry {
        key: key.clone(),
        fingerprint: fingerprint.to_string(),
    }
}

fn hub_with(policy: PollPolicy) -> (ServerPollHub, FingerprintStore) {
    let store = FingerprintStore::new();
    let hub = ServerPollHub::new(store.clone(), policy);
    (hub, store)
}

async fn settle() {
    // Let spawned tasks reach their suspension points
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test]
async fn test_instant_response_when_fingerprint_differs() {
    let (hub, store) = hub_with(PollPolicy::default());
    let key = ConfigKey::new("A", "G");
    store.put(key.clone(), "fp1".to_string());

    let request = PollRequest::new(vec![probe(&key, "fp0")], REQUESTED, "10.0.0.1");
    let changed = hub.poll(request).await;

    assert_eq!(changed, vec![key]);
    assert_eq!(hub.suspended_count(), 0);
    // Exact body the hosting layer writes back
    assert_eq!(encode_changed_keys(&changed), "A\u{2}G\u{1}");
}

#[tokio::test]
async fn test_no_hangup_yields_immediate_empty_response() {
    let (hub, store) = hub_with(PollPolicy::default());
    let key = ConfigKey::new("A", "G");
    store.put(key.clone(), "fp0".to_string());

    let request = PollRequest::new(vec![probe(&key, "fp0")], REQUESTED, "10.0.0.1").no_hangup();
    let changed = hub.poll(request).await;

    assert!(changed.is_empty());
    assert_eq!(hub.suspended_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_probe_suspends_until_timeout() {
    let (hub, store) = hub_with(PollPolicy::default());
    let key = ConfigKey::new("A", "G");
    store.put(key.clone(), "fp0".to_string());

    let request = PollRequest::new(vec![probe(&key, "fp0")], REQUESTED, "10.0.0.1");
    let pending = tokio::spawn({
        let hub = hub.clone();
        async move { hub.poll(request).await }
    });

    settle().await;
    assert_eq!(hub.suspended_count(), 1);

    // Auto-advance runs the clock to the hold deadline (requested - margin)
    let changed = pending.await.unwrap();
    assert!(changed.is_empty());
    assert_eq!(hub.suspended_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_change_event_releases_before_timeout() {
    let (hub, store) = hub_with(PollPolicy::default());
    let key = ConfigKey::new("A", "G");
    store.put(key.clone(), "fp0".to_string());

    let started = tokio::time::Instant::now();
    let request = PollRequest::new(vec![probe(&key, "fp0")], REQUESTED, "10.0.0.1");
    let pending = tokio::spawn({
        let hub = hub.clone();
        async move { hub.poll(request).await }
    });
    settle().await;
    assert_eq!(hub.suspended_count(), 1);

    store.put(key.clone(), "fp1".to_string());
    hub.notify_change(&ConfigChangeEvent::new(key.clone()));

    let changed = pending.await.unwrap();
    assert_eq!(changed, vec![key]);
    assert_eq!(hub.suspended_count(), 0);
    // Released by the event, not the clock
    assert!(started.elapsed() < REQUESTED);
}

#[tokio::test(start_paused = true)]
async fn test_event_for_unrelated_key_keeps_request_suspended() {
    let (hub, store) = hub_with(PollPolicy::default());
    let key = ConfigKey::new("A", "G");
    store.put(key.clone(), "fp0".to_string());

    let request = PollRequest::new(vec![probe(&key, "fp0")], REQUESTED, "10.0.0.1");
    let pending = tokio::spawn({
        let hub = hub.clone();
        async move { hub.poll(request).await }
    });
    settle().await;

    hub.notify_change(&ConfigChangeEvent::new(ConfigKey::new("B", "G")));
    settle().await;
    assert_eq!(hub.suspended_count(), 1);

    let changed = pending.await.unwrap();
    assert!(changed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_timeout_and_event_resolve_exactly_once() {
    let (hub, store) = hub_with(PollPolicy::default());
    let key = ConfigKey::new("A", "G");
    store.put(key.clone(), "fp0".to_string());

    let request = PollRequest::new(vec![probe(&key, "fp0")], REQUESTED, "10.0.0.1");
    let pending = tokio::spawn({
        let hub = hub.clone();
        async move { hub.poll(request).await }
    });
    settle().await;

    // Walk the clock to just short of the hold deadline, then race the event
    tokio::time::advance(REQUESTED - Duration::from_millis(600)).await;
    hub.notify_change(&ConfigChangeEvent::new(key.clone()));
    // Past the deadline: the timeout task wakes and must find nothing to do
    tokio::time::advance(Duration::from_secs(1)).await;
    settle().await;

    let changed = pending.await.unwrap();
    assert_eq!(changed, vec![key.clone()]);
    assert_eq!(hub.suspended_count(), 0);

    // The mirror ordering: a request that already timed out is invisible to
    // a late event
    let request = PollRequest::new(vec![probe(&key, "fp1")], REQUESTED, "10.0.0.1");
    store.put(key.clone(), "fp1".to_string());
    let pending = tokio::spawn({
        let hub = hub.clone();
        async move { hub.poll(request).await }
    });
    settle().await;
    let changed = pending.await.unwrap();
    assert!(changed.is_empty());
    hub.notify_change(&ConfigChangeEvent::new(key));
    assert_eq!(hub.suspended_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fixed_polling_holds_and_rechecks_at_interval() {
    let policy = PollPolicy {
        fixed_polling: true,
        ..Default::default()
    };
    let (hub, store) = hub_with(policy);
    let key = ConfigKey::new("A", "G");
    // The fingerprint already differs, but fixed mode never answers early
    store.put(key.clone(), "fp1".to_string());

    let request = PollRequest::new(vec![probe(&key, "fp0")], REQUESTED, "10.0.0.1");
    let pending = tokio::spawn({
        let hub = hub.clone();
        async move { hub.poll(request).await }
    });
    settle().await;
    assert_eq!(hub.suspended_count(), 1);

    // Change events are ignored in fixed mode
    hub.notify_change(&ConfigChangeEvent::new(key.clone()));
    settle().await;
    assert_eq!(hub.suspended_count(), 1);

    // At the fixed interval the comparison re-runs and reports the change
    let changed = pending.await.unwrap();
    assert_eq!(changed, vec![key]);
}

#[tokio::test(start_paused = true)]
async fn test_beta_targeting_scopes_early_release() {
    let (hub, store) = hub_with(PollPolicy::default());
    let key = ConfigKey::new("A", "G");
    store.put(key.clone(), "fp0".to_string());

    let in_scope = tokio::spawn({
        let hub = hub.clone();
        let request = PollRequest::new(vec![probe(&key, "fp0")], REQUESTED, "10.0.0.1");
        async move { hub.poll(request).await }
    });
    let out_of_scope = tokio::spawn({
        let hub = hub.clone();
        let request = PollRequest::new(vec![probe(&key, "fp0")], REQUESTED, "10.0.0.2");
        async move { hub.poll(request).await }
    });
    settle().await;
    assert_eq!(hub.suspended_count(), 2);

    let event = ConfigChangeEvent::new(key.clone()).with_beta_ips(vec!["10.0.0.1".to_string()]);
    hub.notify_change(&event);
    settle().await;

    assert_eq!(in_scope.await.unwrap(), vec![key]);
    assert_eq!(hub.suspended_count(), 1);

    // The out-of-scope client waits out its own timeout
    assert!(out_of_scope.await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_tag_targeting_scopes_early_release() {
    let (hub, store) = hub_with(PollPolicy::default());
    let key = ConfigKey::new("A", "G");
    store.put(key.clone(), "fp0".to_string());

    let tagged = tokio::spawn({
        let hub = hub.clone();
        let request =
            PollRequest::new(vec![probe(&key, "fp0")], REQUESTED, "10.0.0.1").with_tag("canary");
        async move { hub.poll(request).await }
    });
    let untagged = tokio::spawn({
        let hub = hub.clone();
        let request = PollRequest::new(vec![probe(&key, "fp0")], REQUESTED, "10.0.0.2");
        async move { hub.poll(request).await }
    });
    settle().await;

    hub.notify_change(&ConfigChangeEvent::new(key.clone()).with_tag("canary"));
    settle().await;

    assert_eq!(tagged.await.unwrap(), vec![key]);
    assert!(untagged.await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_change_listener_drains_event_bus() {
    let (hub, store) = hub_with(PollPolicy::default());
    let key = ConfigKey::new("A", "G");
    store.put(key.clone(), "fp0".to_string());

    let (events, receiver) = mpsc::unbounded_channel();
    hub.spawn_change_listener(receiver);

    let pending = tokio::spawn({
        let hub = hub.clone();
        let request = PollRequest::new(vec![probe(&key, "fp0")], REQUESTED, "10.0.0.1");
        async move { hub.poll(request).await }
    });
    settle().await;

    events.send(ConfigChangeEvent::new(key.clone())).unwrap();
    assert_eq!(pending.await.unwrap(), vec![key]);
}

#[tokio::test(start_paused = true)]
async fn test_live_table_inspection() {
    let (hub, store) = hub_with(PollPolicy::default());
    let key = ConfigKey::new("A", "G");
    store.put(key.clone(), "fp0".to_string());

    let _pending = tokio::spawn({
        let hub = hub.clone();
        let request = PollRequest::new(vec![probe(&key, "fp0")], REQUESTED, "10.0.0.1")
            .with_app_name("billing");
        async move { hub.poll(request).await }
    });
    settle().await;

    let subscribers = hub.subscriber_fingerprints(&key);
    assert_eq!(subscribers, vec![("10.0.0.1".to_string(), "fp0".to_string())]);

    let by_ip = hub.subscriptions_by_ip("10.0.0.1");
    assert_eq!(by_ip.get(&key).map(String::as_str), Some("fp0"));
    assert!(hub.subscriptions_by_ip("10.0.0.9").is_empty());

    let by_app = hub.app_subscriptions();
    assert!(by_app.get("billing").is_some_and(|keys| keys.contains(&key)));
}
