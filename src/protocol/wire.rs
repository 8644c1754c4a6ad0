//! Line-oriented probe and change-list bodies.
//!
//! One probe line asserts the fingerprint a client holds for one key:
//! `data_id␂group␂fingerprint␁` or `data_id␂group␂fingerprint␂tenant␁`.
//! One change line names a key whose content differs from the client's:
//! `data_id␂group␁` or `data_id␂group␂tenant␁`.

use tracing::error;
use tracing::warn;

use crate::constants::LINE_SEPARATOR;
use crate::constants::WORD_SEPARATOR;
use crate::ConfigKey;

/// One entry of a batched probe body
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeEntry {
    pub key: ConfigKey,
    pub fingerprint: String,
}

/// Encode a batched probe body (client side)
pub fn encode_probe(entries: &[ProbeEntry]) -> String {
    let mut body = String::new();
    for entry in entries {
        body.push_str(&entry.key.data_id);
        body.push(WORD_SEPARATOR);
        body.push_str(&entry.key.group);
        body.push(WORD_SEPARATOR);
        body.push_str(&entry.fingerprint);
        if entry.key.has_tenant() {
            body.push(WORD_SEPARATOR);
            body.push_str(&entry.key.tenant);
        }
        body.push(LINE_SEPARATOR);
    }
    body
}

/// Decode a batched probe body (server side); malformed lines are skipped
pub fn decode_probe(body: &str) -> Vec<ProbeEntry> {
    let mut entries = Vec::new();
    for line in body.split(LINE_SEPARATOR) {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(WORD_SEPARATOR).collect();
        match fields.as_slice() {
            [data_id, group, fingerprint] => entries.push(ProbeEntry {
                key: ConfigKey::new(data_id, group),
                fingerprint: fingerprint.to_string(),
            }),
            [data_id, group, fingerprint, tenant] => entries.push(ProbeEntry {
                key: ConfigKey::with_tenant(data_id, group, tenant),
                fingerprint: fingerprint.to_string(),
            }),
            _ => {
                error!("[probe] invalid probe line: {:?}", line);
            }
        }
    }
    entries
}

/// Encode the list of changed keys into a response body (server side)
pub fn encode_changed_keys(keys: &[ConfigKey]) -> String {
    let mut body = String::new();
    for key in keys {
        body.push_str(&key.data_id);
        body.push(WORD_SEPARATOR);
        body.push_str(&key.group);
        if key.has_tenant() {
            body.push(WORD_SEPARATOR);
            body.push_str(&key.tenant);
        }
        body.push(LINE_SEPARATOR);
    }
    body
}

/// Decode a change-list response body (client side).
///
/// The body arrives percent-encoded; a body that cannot be decoded is
/// treated as raw, and malformed lines are logged and skipped so one bad
/// entry never discards the rest of the round.
pub fn decode_changed_keys(body: &str) -> Vec<ConfigKey> {
    let decoded = match urlencoding::decode(body) {
        Ok(text) => text,
        Err(e) => {
            error!("[polling-resp] decode changed-keys body error: {}", e);
            std::borrow::Cow::Borrowed(body)
        }
    };

    let mut keys = Vec::new();
    for line in decoded.split(LINE_SEPARATOR) {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(WORD_SEPARATOR).collect();
        match fields.as_slice() {
            [data_id, group] => keys.push(ConfigKey::new(data_id, group)),
            [data_id, group, tenant] => keys.push(ConfigKey::with_tenant(data_id, group, tenant)),
            _ => {
                warn!("[polling-resp] invalid change line: {:?}", line);
            }
        }
    }
    keys
}
