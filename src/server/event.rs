use crate::ConfigKey;

/// One "configuration changed" notification from the dump layer.
///
/// Beta and tag fields narrow which suspended clients may be released
/// early: a beta rollout names the client IPs it covers, a tag rollout
/// names the client tag it targets. An event with neither targets everyone.
#[derive(Debug, Clone)]
pub struct ConfigChangeEvent {
    pub key: ConfigKey,

    /// Non-empty for a beta rollout: only these client IPs are in scope
    pub beta_ips: Vec<String>,

    /// Set for a tag rollout: only clients declaring this tag are in scope
    pub tag: Option<String>,
}

impl ConfigChangeEvent {
    pub fn new(key: ConfigKey) -> Self {
        Self {
            key,
            beta_ips: Vec::new(),
            tag: None,
        }
    }

    pub fn with_beta_ips(
        mut self,
        beta_ips: Vec<String>,
    ) -> Self {
        self.beta_ips = beta_ips;
        self
    }

    pub fn with_tag(
        mut self,
        tag: &str,
    ) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    /// Is a client with this identity inside the event's targeting scope?
    pub(crate) fn targets(
        &self,
        client_ip: &str,
        client_tag: Option<&str>,
    ) -> bool {
        if !self.beta_ips.is_empty() && !self.beta_ips.iter().any(|ip| ip == client_ip) {
            return false;
        }
        if let Some(tag) = &self.tag {
            if client_tag != Some(tag.as_str()) {
                return false;
            }
        }
        true
    }
}
