//! Required-groups parsing
//!
//! Shifts arrive from bulk import and manual entry with their headcount
//! requirement in one of three shapes:
//!
//! - a JSON object: `{"Medical": 2, "Security": "1"}`
//! - a list of tokens: `["Medical", "Security:2"]`
//! - a delimited string: `"Medical:2|Security"` or `"Medical:2, Security"`
//!
//! Everything is folded into one canonical [`RequiredGroups`] map here, at the
//! boundary. Core logic only ever sees the canonical form.
//!
//! Malformed counts never fail the parse; they contribute zero.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Canonical `{group: required headcount}` map
///
/// An empty map (or one whose counts are all zero) means the shift has no
/// requirement and is open to everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RequiredGroups(BTreeMap<String, u32>);

impl RequiredGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` to the requirement for `group` (repeated groups accumulate)
    pub fn add(&mut self, group: &str, count: u32) {
        let group = group.trim();
        if group.is_empty() {
            return;
        }
        let entry = self.0.entry(group.to_string()).or_insert(0);
        *entry = entry.saturating_add(count);
    }

    /// Builder form of [`RequiredGroups::add`]
    pub fn with(mut self, group: &str, count: u32) -> Self {
        self.add(group, count);
        self
    }

    /// Required headcount for a single group (0 when absent)
    pub fn get(&self, group: &str) -> u32 {
        self.0.get(group).copied().unwrap_or(0)
    }

    /// Sum of all required headcounts
    pub fn total(&self) -> u32 {
        self.0.values().fold(0u32, |acc, c| acc.saturating_add(*c))
    }

    /// True when the shift imposes no headcount requirement
    pub fn is_unconstrained(&self) -> bool {
        self.total() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(g, c)| (g.as_str(), *c))
    }

    pub fn as_map(&self) -> &BTreeMap<String, u32> {
        &self.0
    }

    /// Parse the delimited textual encoding (`,` or `|` separated tokens)
    pub fn parse_str(raw: &str) -> Self {
        let mut groups = Self::new();
        for token in raw.split([',', '|']) {
            groups.add_token(token);
        }
        groups
    }

    /// Parse any accepted JSON shape (object, token list, delimited string)
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) => {
                let mut groups = Self::new();
                for (group, count) in map {
                    groups.add(group, count_from_json(count));
                }
                groups
            }
            Value::Array(items) => {
                let mut groups = Self::new();
                for item in items {
                    if let Value::String(token) = item {
                        groups.add_token(token);
                    }
                }
                groups
            }
            Value::String(raw) => Self::parse_str(raw),
            _ => Self::new(),
        }
    }

    fn add_token(&mut self, token: &str) {
        let token = token.trim();
        if token.is_empty() {
            return;
        }
        match token.split_once(':') {
            Some((group, count)) => {
                let count = count.trim().parse::<u32>().unwrap_or(0);
                self.add(group, count);
            }
            None => self.add(token, 1),
        }
    }
}

fn count_from_json(value: &Value) -> u32 {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                u.min(u32::MAX as u64) as u32
            } else {
                // Negative or fractional counts
                n.as_f64()
                    .filter(|f| f.is_finite() && *f > 0.0)
                    .map(|f| f.floor().min(u32::MAX as f64) as u32)
                    .unwrap_or(0)
            }
        }
        Value::String(s) => s.trim().parse::<u32>().unwrap_or(0),
        _ => 0,
    }
}

impl<'de> Deserialize<'de> for RequiredGroups {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_json(&value))
    }
}

impl FromIterator<(String, u32)> for RequiredGroups {
    fn from_iter<T: IntoIterator<Item = (String, u32)>>(iter: T) -> Self {
        let mut groups = Self::new();
        for (group, count) in iter {
            groups.add(&group, count);
        }
        groups
    }
}

/// Parse an allowed/excluded group list from an array or a delimited string
pub fn group_list_from_json(value: &Value) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |g: &str| {
        let g = g.trim();
        if !g.is_empty() && !out.iter().any(|existing| existing == g) {
            out.push(g.to_string());
        }
    };
    match value {
        Value::Array(items) => {
            for item in items {
                if let Value::String(s) = item {
                    push(s);
                }
            }
        }
        Value::String(raw) => {
            for token in raw.split([',', '|']) {
                push(token);
            }
        }
        _ => {}
    }
    out
}

/// Serde adapter for group-list fields accepting an array or delimited string
pub fn deserialize_group_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(group_list_from_json(&value))
}
