//! Line-prefix response grammar shared by all reflection levels.
//!
//! Model output is parsed into closed-field records; callers never
//! pattern-match on prose. Rules: case-sensitive prefix match on a line's
//! leading key, value after `:` trimmed, `NONE`/`none` means empty,
//! comma-separated values yield a list, unknown prefixes are ignored so
//! future levels can add fields without breaking existing parsers.

use std::collections::HashMap;

/// Parsed key/value fields from one reflection response.
///
/// Only the first occurrence of a key is kept.
#[derive(Debug, Clone, Default)]
pub struct Fields {
    values: HashMap<String, String>,
}

impl Fields {
    /// Parse a raw model response.
    pub fn parse(text: &str) -> Self {
        let mut values = HashMap::new();
        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            // Keys are upper-snake identifiers; anything else is prose
            // that happened to contain a colon.
            if key.is_empty()
                || !key
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
            {
                continue;
            }
            values
                .entry(key.to_string())
                .or_insert_with(|| value.trim().to_string());
        }
        Self { values }
    }

    /// The raw trimmed value for `key`, if present.
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// A free-text value; `NONE`/`none` and absence both yield `None`.
    pub fn optional(&self, key: &str) -> Option<String> {
        let value = self.raw(key)?;
        if value.is_empty() || is_none(value) {
            None
        } else {
            Some(value.to_string())
        }
    }

    /// A comma-separated list; `NONE`/`none` and absence yield empty.
    pub fn list(&self, key: &str) -> Vec<String> {
        let Some(value) = self.raw(key) else {
            return Vec::new();
        };
        if is_none(value) {
            return Vec::new();
        }
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty() && !is_none(s))
            .map(String::from)
            .collect()
    }

    /// A YES/NO flag; anything else (or absence) yields the default.
    pub fn flag(&self, key: &str, default: bool) -> bool {
        match self.raw(key) {
            Some("YES") | Some("yes") => true,
            Some("NO") | Some("no") => false,
            _ => default,
        }
    }

    /// A float clamped into [0, 1]; parse failure yields the default.
    pub fn score(&self, key: &str, default: f64) -> f64 {
        self.raw(key)
            .and_then(|v| v.parse::<f64>().ok())
            .map(|v| v.clamp(0.0, 1.0))
            .unwrap_or(default)
    }
}

fn is_none(value: &str) -> bool {
    value == "NONE" || value == "none"
}
