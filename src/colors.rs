//! Stable name → color assignments for the presentation layer. The analyzers
//! never read it.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PALETTE: [&str; 12] = [
    "#0284c7", "#14b8a6", "#f97316", "#6d28d9", "#475569", "#db2777", "#0ea5e9", "#22c55e",
    "#8b5cf6", "#38bdf8", "#4ade80", "#a78bfa",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ColorMap(BTreeMap<String, String>);

impl ColorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overrides the color of a single name.
    pub fn set_color(&mut self, name: &str, color: &str) {
        self.0.insert(name.to_string(), color.to_string());
    }
}

/// Returns `existing` plus a palette color for every name it does not know
/// yet. Existing entries are never changed.
pub fn assign_colors<'a, I>(names: I, existing: &ColorMap) -> ColorMap
where
    I: IntoIterator<Item = &'a str>,
{
    let mut map = existing.clone();
    for name in names {
        let name = name.trim();
        if name.is_empty() || map.0.contains_key(name) {
            continue;
        }
        let color = PALETTE[map.len() % PALETTE.len()];
        map.0.insert(name.to_string(), color.to_string());
    }
    map
}
