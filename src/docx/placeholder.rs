//! Placeholder keys and the values substituted for them.

use regex_lite::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Matches `[$name]`, capturing `name`.
pub(crate) fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\$([A-Za-z0-9_]+)\]").expect("placeholder pattern is valid"))
}

/// The template token for a parameter name, e.g. `total_sales` -> `[$total_sales]`.
pub fn placeholder_for(name: &str) -> String {
    format!("[${}]", name)
}

/// Placeholder keys found in `text`, in order of appearance (duplicates kept).
pub fn find_placeholders(text: &str) -> Vec<String> {
    placeholder_regex()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// The value written in place of a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum Substitution {
    /// Query result (or the no-data text), written with the template's styling.
    Value(String),
    /// Error marker, written in a distinctly styled run.
    Error(String),
}

impl Substitution {
    pub fn text(&self) -> &str {
        match self {
            Substitution::Value(s) | Substitution::Error(s) => s,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Substitution::Error(_))
    }
}

/// Mapping from placeholder key (parameter name) to its substitution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Substitutions(BTreeMap<String, Substitution>);

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a substitution for `key`. The first one for a key wins; returns
    /// false if the key was already present.
    pub fn insert(&mut self, key: impl Into<String>, value: Substitution) -> bool {
        match self.0.entry(key.into()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Substitution> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Substitution)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn error_count(&self) -> usize {
        self.0.values().filter(|s| s.is_error()).count()
    }
}

impl<K: Into<String>> FromIterator<(K, Substitution)> for Substitutions {
    fn from_iter<I: IntoIterator<Item = (K, Substitution)>>(iter: I) -> Self {
        let mut subs = Substitutions::new();
        for (k, v) in iter {
            subs.insert(k, v);
        }
        subs
    }
}
