use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;

use crate::Error;
use crate::Result;

/// Server poll-hub hold policy.
///
/// Injected into [`crate::ServerPollHub`] at construction and re-read on
/// every request, so an operator can flip fixed-polling mode at runtime
/// without touching in-flight requests.
#[derive(Debug, Deserialize, Clone)]
pub struct PollPolicy {
    /// Degraded mode: every request holds for a fixed interval and change
    /// events never release a request early. Trades push latency for a flat
    /// load profile under very large fleets.
    #[serde(default)]
    pub fixed_polling: bool,

    /// Hold duration in fixed-polling mode (unit: milliseconds)
    #[serde(default = "default_fixed_polling_interval_ms")]
    pub fixed_polling_interval_ms: u64,

    /// Margin subtracted from the requested hold so the server always
    /// answers before the client's own read timeout (unit: milliseconds)
    #[serde(default = "default_delay_margin_ms")]
    pub delay_margin_ms: u64,

    /// Lower bound on any hold duration (unit: milliseconds)
    #[serde(default = "default_min_hold_ms")]
    pub min_hold_ms: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            fixed_polling: false,
            fixed_polling_interval_ms: default_fixed_polling_interval_ms(),
            delay_margin_ms: default_delay_margin_ms(),
            min_hold_ms: default_min_hold_ms(),
        }
    }
}

impl PollPolicy {
    /// How long a suspended request is held before its timeout resolves it
    pub fn hold_duration(
        &self,
        requested: Duration,
    ) -> Duration {
        let floor = Duration::from_millis(self.min_hold_ms);
        if self.fixed_polling {
            floor.max(Duration::from_millis(self.fixed_polling_interval_ms))
        } else {
            floor.max(requested.saturating_sub(Duration::from_millis(self.delay_margin_ms)))
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_hold_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "Minimum hold must be non-zero".to_string(),
            )));
        }
        if self.fixed_polling && self.fixed_polling_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "Fixed polling interval must be non-zero".to_string(),
            )));
        }
        Ok(())
    }
}

fn default_fixed_polling_interval_ms() -> u64 {
    10_000
}
fn default_delay_margin_ms() -> u64 {
    500
}
fn default_min_hold_ms() -> u64 {
    10_000
}
