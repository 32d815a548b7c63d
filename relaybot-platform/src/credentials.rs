// ABOUTME: App state credential model: the cookie list exported from a logged-in browser.
// ABOUTME: Identifies the remote account through the c_user cookie and redacts values in Debug.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Cookie key whose value is the remote account id.
pub const IDENTITY_COOKIE: &str = "c_user";

/// One exported cookie. Browser exports carry more than key/value
/// (domain, path, expiry, ...); those are preserved in `extra`.
/// `value` is kept as raw JSON: exports may hold null, numbers or no value at all.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StateEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Value::String(value.into()),
            extra: Map::new(),
        }
    }

    /// The value as text. Strings as-is, numbers in decimal, anything else `None`.
    pub fn text(&self) -> Option<String> {
        match &self.value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

// Cookie values are session secrets
impl std::fmt::Debug for StateEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateEntry")
            .field("key", &self.key)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Exported browser session used as the login credential.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppState(Vec<StateEntry>);

impl AppState {
    pub fn new(entries: Vec<StateEntry>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[StateEntry] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether any entry has the given key
    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|entry| entry.key == key)
    }

    /// Text value of the first entry with the given key.
    pub fn get(&self, key: &str) -> Option<String> {
        self.0
            .iter()
            .find(|entry| entry.key == key)
            .and_then(StateEntry::text)
    }

    /// The remote account id carried by the identity cookie, trimmed.
    /// `None` when the cookie is absent, blank or not a string or number.
    pub fn identity(&self) -> Option<String> {
        self.get(IDENTITY_COOKIE)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

impl FromIterator<StateEntry> for AppState {
    fn from_iter<I: IntoIterator<Item = StateEntry>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
