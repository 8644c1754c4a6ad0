use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;

use crate::constants::MIN_LONG_POLL_TIMEOUT_MS;
use crate::Error;
use crate::Result;

/// Whether a freshly attached listener is notified with the value the cache
/// already holds.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FirstAttachNotify {
    /// Seed the listener's ack fingerprint to the cache's current
    /// fingerprint: an already-current listener is not notified until the
    /// next real change.
    #[default]
    Suppress,

    /// Seed to the nil fingerprint: the listener receives one notification
    /// with the current value as soon as the cache holds anything.
    Immediate,
}

/// Client poll-worker parameters
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Name of this agent; scopes log lines and the local file store
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// Long-poll hold the client asks the server for (unit: milliseconds);
    /// values below the protocol floor are raised to it
    #[serde(default = "default_long_poll_timeout_ms")]
    pub long_poll_timeout_ms: u64,

    /// Delay before re-running a bucket cycle that failed (unit: milliseconds)
    #[serde(default = "default_task_penalty_ms")]
    pub task_penalty_ms: u64,

    /// Cache entries served by one polling bucket
    #[serde(default = "default_per_bucket_capacity")]
    pub per_bucket_capacity: usize,

    /// Timeout of one point fetch (unit: milliseconds)
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Seed a newly created cache entry with a server fetch at registration
    #[serde(default)]
    pub enable_remote_sync: bool,

    /// Consult local failover files at all
    #[serde(default = "default_enable_failover")]
    pub enable_failover: bool,

    /// Root of the failover/snapshot file store
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,

    /// First-attach notification policy
    #[serde(default)]
    pub first_attach_notify: FirstAttachNotify,

    /// Period of the bucket-count check (unit: milliseconds)
    #[serde(default = "default_bucket_check_interval_ms")]
    pub bucket_check_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            agent_name: default_agent_name(),
            long_poll_timeout_ms: default_long_poll_timeout_ms(),
            task_penalty_ms: default_task_penalty_ms(),
            per_bucket_capacity: default_per_bucket_capacity(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            enable_remote_sync: false,
            enable_failover: default_enable_failover(),
            local_dir: default_local_dir(),
            first_attach_notify: FirstAttachNotify::default(),
            bucket_check_interval_ms: default_bucket_check_interval_ms(),
        }
    }
}

impl ClientConfig {
    /// Hold duration declared in the probe's long-poll header
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.long_poll_timeout_ms.max(MIN_LONG_POLL_TIMEOUT_MS))
    }

    /// Read timeout of the probe request. Deliberately longer than the poll
    /// timeout so server-side scheduling jitter is not mistaken for a dead
    /// connection.
    pub fn probe_read_timeout(&self) -> Duration {
        let timeout = self.poll_timeout();
        timeout + timeout / 2
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn task_penalty(&self) -> Duration {
        Duration::from_millis(self.task_penalty_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.agent_name.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "Agent name must not be empty".to_string(),
            )));
        }
        if self.per_bucket_capacity == 0 {
            return Err(Error::Config(ConfigError::Message(
                "Per-bucket capacity must be at least 1".to_string(),
            )));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "Fetch timeout must be non-zero".to_string(),
            )));
        }
        if self.task_penalty_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "Task penalty must be non-zero".to_string(),
            )));
        }
        Ok(())
    }
}

fn default_agent_name() -> String {
    "default".to_string()
}
fn default_long_poll_timeout_ms() -> u64 {
    30_000
}
fn default_task_penalty_ms() -> u64 {
    2_000
}
fn default_per_bucket_capacity() -> usize {
    3_000
}
fn default_fetch_timeout_ms() -> u64 {
    6_000
}
fn default_enable_failover() -> bool {
    true
}
fn default_local_dir() -> PathBuf {
    PathBuf::from("confsync-data")
}
fn default_bucket_check_interval_ms() -> u64 {
    10
}
