//! Structured diff between two delivered contents.
//!
//! Properties-format items are parsed line by line (`key=value`, `#`/`!`
//! comments) and diffed per key; every other format collapses into one
//! whole-content item, so diff-capable listeners still get a usable event.

use std::collections::HashMap;

use crate::ConfigType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

/// One changed entry of a key/value configuration item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChangeItem {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub change_type: ChangeType,
}

/// Secondary event delivered to diff-capable listeners
#[derive(Debug, Clone, Default)]
pub struct ConfigDiffEvent {
    pub items: Vec<ConfigChangeItem>,
}

impl ConfigDiffEvent {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(
        &self,
        key: &str,
    ) -> Option<&ConfigChangeItem> {
        self.items.iter().find(|item| item.key == key)
    }
}

/// Compute the diff between the previously delivered content and the new one
pub(crate) fn compute_diff(
    old: Option<&str>,
    new: Option<&str>,
    content_type: ConfigType,
) -> ConfigDiffEvent {
    if old == new {
        return ConfigDiffEvent::default();
    }
    match content_type {
        ConfigType::Properties => diff_properties(old, new),
        _ => whole_content_diff(old, new),
    }
}

fn whole_content_diff(
    old: Option<&str>,
    new: Option<&str>,
) -> ConfigDiffEvent {
    let change_type = match (old, new) {
        (None, Some(_)) => ChangeType::Added,
        (Some(_), None) => ChangeType::Removed,
        _ => ChangeType::Modified,
    };
    ConfigDiffEvent {
        items: vec![ConfigChangeItem {
            key: "content".to_string(),
            old_value: old.map(str::to_string),
            new_value: new.map(str::to_string),
            change_type,
        }],
    }
}

fn diff_properties(
    old: Option<&str>,
    new: Option<&str>,
) -> ConfigDiffEvent {
    let old_map = parse_properties(old.unwrap_or_default());
    let new_map = parse_properties(new.unwrap_or_default());

    let mut items = Vec::new();
    for (key, old_value) in &old_map {
        match new_map.get(key) {
            None => items.push(ConfigChangeItem {
                key: key.clone(),
                old_value: Some(old_value.clone()),
                new_value: None,
                change_type: ChangeType::Removed,
            }),
            Some(new_value) if new_value != old_value => items.push(ConfigChangeItem {
                key: key.clone(),
                old_value: Some(old_value.clone()),
                new_value: Some(new_value.clone()),
                change_type: ChangeType::Modified,
            }),
            Some(_) => {}
        }
    }
    for (key, new_value) in &new_map {
        if !old_map.contains_key(key) {
            items.push(ConfigChangeItem {
                key: key.clone(),
                old_value: None,
                new_value: Some(new_value.clone()),
                change_type: ChangeType::Added,
            });
        }
    }
    items.sort_by(|a, b| a.key.cmp(&b.key));
    ConfigDiffEvent { items }
}

fn parse_properties(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            map.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    map
}
