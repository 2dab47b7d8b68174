use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Values debuggers print in place of a variable they cannot read.
const UNAVAILABLE_MARKERS: &[&str] = &[
    "optimized out",
    "variable not available",
    "(timespec)",
    "incomplete sequence",
    "Could not evaluate",
    "failed to read memory",
];

/// Variables visible at one stop, keyed by (dotted) name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarSnapshot {
    values: BTreeMap<String, String>,
}

impl VarSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Names present in both snapshots, with both values.
    pub fn shared<'a>(&'a self, other: &'a Self) -> impl Iterator<Item = (&'a str, &'a str, &'a str)> {
        self.values.iter().filter_map(|(name, value)| {
            other
                .values
                .get(name)
                .map(|theirs| (name.as_str(), value.as_str(), theirs.as_str()))
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VarSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

static FAILED_READ_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Whether a printed value means "the debugger could not read this".
pub fn is_unavailable(value: &str) -> bool {
    let failed_read =
        FAILED_READ_PATTERN.get_or_init(|| Regex::new(r"read memory from 0x[0-9a-fA-F]+ failed").unwrap());
    UNAVAILABLE_MARKERS.iter().any(|marker| value.contains(marker)) || failed_read.is_match(value)
}
