//! Interactive category → subcategory selection over an already-filtered set.

use crate::config::EngineConfig;
use crate::schema::ExpenseRecord;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DrillPath {
    pub category: Option<String>,
    pub subcategory: Option<String>,
}

impl DrillPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.category.is_none() && self.subcategory.is_none()
    }

    /// Selects `category`, or clears it when it is already selected.
    /// Either way the subcategory selection is dropped.
    pub fn toggle_category(&mut self, category: &str) {
        if self.category.as_deref() == Some(category) {
            self.category = None;
        } else {
            self.category = Some(category.to_string());
        }
        self.subcategory = None;
    }

    /// Selects or clears a subcategory. Ignored while no category is selected.
    pub fn toggle_subcategory(&mut self, subcategory: &str) {
        if self.category.is_none() {
            return;
        }
        if self.subcategory.as_deref() == Some(subcategory) {
            self.subcategory = None;
        } else {
            self.subcategory = Some(subcategory.to_string());
        }
    }

    pub fn clear(&mut self) {
        self.category = None;
        self.subcategory = None;
    }

    /// Selections hold the labels shown in the aggregation tables, so blank
    /// values are matched through the configured missing label.
    pub fn matches(&self, record: &ExpenseRecord, config: &EngineConfig) -> bool {
        self.category
            .as_deref()
            .map_or(true, |c| config.label_or_missing(&record.category) == c)
            && self
                .subcategory
                .as_deref()
                .map_or(true, |s| config.label_or_missing(&record.subcategory) == s)
    }

    /// Narrows an already-filtered slice to the current selection.
    pub fn scope<'a>(
        &self,
        records: &'a [ExpenseRecord],
        config: &EngineConfig,
    ) -> Vec<&'a ExpenseRecord> {
        records.iter().filter(|r| self.matches(r, config)).collect()
    }
}
