//! Group-by-sum/count shared by every analyzer.
//!
//! An [`Aggregation`] keeps one entry per key, sorted by descending total. Keys
//! with equal totals keep the order in which they were first encountered.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AggregateEntry {
    pub name: String,
    pub total: f64,
    pub count: usize,
}

/// A slice of a distribution chart. `percentage` is a fraction of the grand total (0..=1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShareEntry {
    pub name: String,
    pub value: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Aggregation {
    pub entries: Vec<AggregateEntry>,
    pub grand_total: f64,
    pub record_count: usize,
}

/// The N largest entries plus one remainder entry for every other key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TopSplit {
    pub top: Vec<AggregateEntry>,
    /// `grand_total - sum(top)`; absent when no key was left out.
    pub other: Option<AggregateEntry>,
}

impl Aggregation {
    pub fn group_sum<'a, R, I, K, V>(records: I, mut key: K, mut value: V) -> Self
    where
        R: 'a,
        I: IntoIterator<Item = &'a R>,
        K: FnMut(&R) -> String,
        V: FnMut(&R) -> f64,
    {
        let mut entries: Vec<AggregateEntry> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut record_count = 0;

        for record in records {
            let name = key(record);
            let amount = value(record);
            record_count += 1;

            match index.get(&name) {
                Some(&idx) => {
                    entries[idx].total += amount;
                    entries[idx].count += 1;
                }
                None => {
                    index.insert(name.clone(), entries.len());
                    entries.push(AggregateEntry {
                        name,
                        total: amount,
                        count: 1,
                    });
                }
            }
        }

        let grand_total = entries.iter().map(|e| e.total).sum();

        // `sort_by` is stable, so ties keep first-encountered order.
        entries.sort_by(|a, b| b.total.total_cmp(&a.total));

        Self {
            entries,
            grand_total,
            record_count,
        }
    }

    /// Counts records per key.
    pub fn group_count<'a, R, I, K>(records: I, key: K) -> Self
    where
        R: 'a,
        I: IntoIterator<Item = &'a R>,
        K: FnMut(&R) -> String,
    {
        Self::group_sum(records, key, |_| 1.0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<&AggregateEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn total_for(&self, name: &str) -> f64 {
        self.get(name).map(|e| e.total).unwrap_or(0.0)
    }

    pub fn top(&self, n: usize) -> Vec<AggregateEntry> {
        self.entries.iter().take(n).cloned().collect()
    }

    /// Fraction of the grand total per key. Empty when the grand total is zero.
    pub fn shares(&self) -> Vec<ShareEntry> {
        to_shares(&self.entries, self.grand_total)
    }

    pub fn top_with_other(&self, n: usize, other_label: &str) -> TopSplit {
        if self.entries.len() <= n {
            return TopSplit {
                top: self.entries.clone(),
                other: None,
            };
        }

        let top: Vec<AggregateEntry> = self.entries[..n].to_vec();
        let top_total: f64 = top.iter().map(|e| e.total).sum();
        let top_count: usize = top.iter().map(|e| e.count).sum();

        TopSplit {
            top,
            other: Some(AggregateEntry {
                name: other_label.to_string(),
                total: self.grand_total - top_total,
                count: self.record_count - top_count,
            }),
        }
    }

    /// Pie-ready distribution with at most `n` named slices plus the remainder.
    pub fn top_shares_with_other(&self, n: usize, other_label: &str) -> Vec<ShareEntry> {
        let split = self.top_with_other(n, other_label);
        to_shares(&split.entries(), self.grand_total)
    }
}

impl TopSplit {
    /// Top entries followed by the remainder, if any.
    pub fn entries(&self) -> Vec<AggregateEntry> {
        let mut entries = self.top.clone();
        if let Some(other) = &self.other {
            entries.push(other.clone());
        }
        entries
    }

    pub fn total(&self) -> f64 {
        self.top.iter().map(|e| e.total).sum::<f64>()
            + self.other.as_ref().map(|o| o.total).unwrap_or(0.0)
    }
}

fn to_shares(entries: &[AggregateEntry], grand_total: f64) -> Vec<ShareEntry> {
    if grand_total == 0.0 {
        return Vec::new();
    }
    entries
        .iter()
        .map(|e| ShareEntry {
            name: e.name.clone(),
            value: e.total,
            percentage: e.total / grand_total,
        })
        .collect()
}
