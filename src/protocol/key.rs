use serde::Deserialize;
use serde::Serialize;

/// Identity of one configuration item: `(data_id, group, tenant)`.
///
/// An empty `tenant` means the item lives in the default namespace and is
/// omitted from wire lines and key strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigKey {
    pub data_id: String,
    pub group: String,
    pub tenant: String,
}

impl ConfigKey {
    pub fn new(
        data_id: &str,
        group: &str,
    ) -> Self {
        Self::with_tenant(data_id, group, "")
    }

    pub fn with_tenant(
        data_id: &str,
        group: &str,
        tenant: &str,
    ) -> Self {
        Self {
            data_id: data_id.to_string(),
            group: group.to_string(),
            tenant: tenant.to_string(),
        }
    }

    pub fn has_tenant(&self) -> bool {
        !self.tenant.is_empty()
    }

    /// Canonical string form: `data_id+group` or `data_id+group+tenant`
    pub fn to_key_string(&self) -> String {
        if self.tenant.is_empty() {
            format!("{}+{}", self.data_id, self.group)
        } else {
            format!("{}+{}+{}", self.data_id, self.group, self.tenant)
        }
    }

    /// Parse the canonical string form back into a key
    pub fn parse(key_string: &str) -> Option<Self> {
        let parts: Vec<&str> = key_string.split('+').collect();
        match parts.as_slice() {
            [data_id, group] => Some(Self::new(data_id, group)),
            [data_id, group, tenant] => Some(Self::with_tenant(data_id, group, tenant)),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.to_key_string())
    }
}
