//! CredentialSet - ログインで得た cookie の集合
//!
//! 中身は不透明な key-value。タスク実行中は読み取り専用のスナップショットとして扱う。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One persisted cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_path() -> String {
    "/".into()
}

/// Accumulated cookies keyed by name; later inserts win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialSet {
    entries: BTreeMap<String, Credential>,
}

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty names or values are ignored.
    pub fn insert(&mut self, credential: Credential) {
        if credential.name.is_empty() || credential.value.is_empty() {
            return;
        }
        self.entries.insert(credential.name.clone(), credential);
    }

    pub fn merge(&mut self, other: CredentialSet) {
        for (_, credential) in other.entries {
            self.insert(credential);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|c| c.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.entries.values()
    }

    /// Render as a `Cookie:` header value.
    pub fn cookie_header(&self) -> String {
        self.entries
            .values()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Parse a `name=value; name2=value2` header into credentials for `domain`.
    pub fn from_cookie_header(header: &str, domain: &str) -> Self {
        let mut set = Self::new();
        for part in header.split(';') {
            let Some((name, value)) = part.trim().split_once('=') else {
                continue;
            };
            set.insert(Credential {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
                domain: domain.to_string(),
                path: default_path(),
            });
        }
        set
    }
}

impl FromIterator<Credential> for CredentialSet {
    fn from_iter<I: IntoIterator<Item = Credential>>(iter: I) -> Self {
        let mut set = Self::new();
        for credential in iter {
            set.insert(credential);
        }
        set
    }
}
