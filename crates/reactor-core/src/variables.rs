//! Script variables.
//!
//! Text scripts reference variables with `${Key}` tokens that are replaced
//! verbatim before execution. Code-generated scripts read the same set through
//! typed getters instead.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use regex_lite::Regex;

use crate::error::{ReactorError, Result};

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.\-]*)\}").unwrap())
}

/// Immutable key/value set threaded read-only through script generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    values: Arc<BTreeMap<String, String>>,
}

impl Variables {
    /// Create a variable set from key/value pairs.
    pub fn new<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: Arc::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Get the raw value for a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace every `${Key}` token whose key is defined.
    ///
    /// Unknown tokens are left in place rather than replaced with an empty
    /// string.
    pub fn substitute(&self, text: &str) -> String {
        token_pattern()
            .replace_all(text, |caps: &regex_lite::Captures<'_>| {
                match self.values.get(&caps[1]) {
                    Some(value) => value.clone(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Keys referenced by `${Key}` tokens in `text` that have no value.
    pub fn unresolved(&self, text: &str) -> Vec<String> {
        let mut missing: Vec<String> = token_pattern()
            .captures_iter(text)
            .map(|caps| caps[1].to_string())
            .filter(|key| !self.values.contains_key(key))
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    /// String value, or `default` when the key is missing.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    /// String value that must be present.
    pub fn require_string(&self, key: &str) -> Result<String> {
        self.get(key)
            .map(str::to_string)
            .ok_or_else(|| missing(key))
    }

    /// Integer value, or `default` when the key is missing.
    ///
    /// A present but unparsable value is an error, not the default.
    pub fn get_int(&self, key: &str, default: i64) -> Result<i64> {
        match self.get(key) {
            Some(raw) => parse_int(key, raw),
            None => Ok(default),
        }
    }

    /// Integer value that must be present and valid.
    pub fn require_int(&self, key: &str) -> Result<i64> {
        let raw = self.get(key).ok_or_else(|| missing(key))?;
        parse_int(key, raw)
    }

    /// Boolean value, or `default` when the key is missing.
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            Some(raw) => parse_bool(key, raw),
            None => Ok(default),
        }
    }

    /// Boolean value that must be present and valid.
    pub fn require_bool(&self, key: &str) -> Result<bool> {
        let raw = self.get(key).ok_or_else(|| missing(key))?;
        parse_bool(key, raw)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Variables {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::new(iter)
    }
}

fn missing(key: &str) -> ReactorError {
    ReactorError::Validation(format!("Missing required variable '{}'", key))
}

fn invalid(key: &str, raw: &str, expected: &str) -> ReactorError {
    ReactorError::Validation(format!(
        "Invalid variable '{}': expected {}, got '{}'",
        key, expected, raw
    ))
}

fn parse_int(key: &str, raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| invalid(key, raw, "an integer"))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, raw, "a boolean")),
    }
}
