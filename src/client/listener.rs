use serde::Deserialize;

use crate::ConfigDiffEvent;

/// Error raised by a listener callback or a content filter. Never escapes
/// the notification routine; it only blocks the ack-fingerprint advance so
/// delivery is retried on the next check.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Declared format of a configuration item, carried in the point-fetch
/// response header.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    #[default]
    Text,
    Properties,
    Json,
    Yaml,
    Xml,
    Html,
}

impl ConfigType {
    pub fn from_header(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "properties" => ConfigType::Properties,
            "json" => ConfigType::Json,
            "yaml" | "yml" => ConfigType::Yaml,
            "xml" => ConfigType::Xml,
            "html" => ConfigType::Html,
            _ => ConfigType::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigType::Text => "text",
            ConfigType::Properties => "properties",
            ConfigType::Json => "json",
            ConfigType::Yaml => "yaml",
            ConfigType::Xml => "xml",
            ConfigType::Html => "html",
        }
    }
}

/// Immutable snapshot handed through the filter chain to a listener for one
/// delivery. Filters may rewrite `content`; identity fields are fixed.
#[derive(Debug, Clone)]
pub struct ConfigResponse {
    pub data_id: String,
    pub group: String,
    pub tenant: String,
    /// `None` means the item was deleted on the server
    pub content: Option<String>,
    pub content_type: ConfigType,
    pub fingerprint: String,
}

/// Callback registered against one configuration item.
///
/// Capabilities are queried, not downcast: a listener that wants the
/// structured key/value diff returns `true` from [`wants_diff`] and receives
/// a [`ConfigDiffEvent`] after every content delivery. A listener that wants
/// delivery off the poll loop returns a runtime handle from [`executor`].
///
/// [`wants_diff`]: ConfigListener::wants_diff
/// [`executor`]: ConfigListener::executor
pub trait ConfigListener: Send + Sync + 'static {
    /// Receive the (possibly filter-rewritten) content of a changed item.
    /// `None` means the item no longer exists.
    fn receive_config_info(
        &self,
        content: Option<&str>,
    ) -> std::result::Result<(), ListenerError>;

    /// Structured-diff capability
    fn wants_diff(&self) -> bool {
        false
    }

    /// Receive the key/value diff against the previously delivered content.
    /// Only called when [`ConfigListener::wants_diff`] returns `true`.
    fn receive_config_diff(
        &self,
        _event: ConfigDiffEvent,
    ) -> std::result::Result<(), ListenerError> {
        Ok(())
    }

    /// Runtime the delivery job is handed to. `None` runs delivery inline on
    /// the poll loop: a slow listener then throttles its own bucket, nobody
    /// else's.
    fn executor(&self) -> Option<tokio::runtime::Handle> {
        None
    }
}
