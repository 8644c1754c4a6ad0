// -
// Wire format

/// Field separator inside one probe/change line (ASCII STX, never legal in
/// a data id, group, tenant or fingerprint)
pub const WORD_SEPARATOR: char = '\u{2}';

/// Line separator between probe/change entries (ASCII SOH)
pub const LINE_SEPARATOR: char = '\u{1}';

/// Form field carrying the batched probe body
pub(crate) const PROBE_FIELD: &str = "Listening-Configs";

// -
// HTTP surface

/// Opt-in header for long-poll behavior; absence means legacy immediate mode
pub const LONG_POLLING_HEADER: &str = "Long-Pulling-Timeout";

/// Forces an immediate response even when nothing changed
pub const LONG_POLLING_NO_HANGUP_HEADER: &str = "Long-Pulling-Timeout-No-Hangup";

/// Response header carrying the content type of a fetched item
pub const CONFIG_TYPE_HEADER: &str = "Config-Type";

pub(crate) const CONFIG_PATH: &str = "/v1/cs/configs";
pub(crate) const LISTENER_PATH: &str = "/v1/cs/configs/listener";

// -
// Timing floors

/// Lower bound on the client long-poll timeout
pub(crate) const MIN_LONG_POLL_TIMEOUT_MS: u64 = 10_000;

/// Delay before re-running a bucket cycle that had nothing to probe
pub(crate) const IDLE_CYCLE_DELAY_MS: u64 = 10;

// -
// Defaults

/// Group applied when a caller leaves the group blank
pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";
