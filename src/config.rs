use crate::error::{AnalyticsError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MONTH_NAMES: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

/// Tunables shared by every analyzer.
///
/// Every field has a default, so an empty JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    #[schemars(
        description = "Expense categories counted as tax burden instead of operating expense. Matched case-insensitively."
    )]
    pub tax_categories: Vec<String>,

    #[schemars(
        description = "Document-type codes or phrases that identify a credit note (e.g. 'NC', 'Nota de Crédito')."
    )]
    pub credit_note_codes: Vec<String>,

    #[schemars(
        description = "Document-type codes or phrases that identify a debit note. Debit notes are excluded from revenue."
    )]
    pub debit_note_codes: Vec<String>,

    #[schemars(description = "Twelve localized month names, January first.")]
    pub month_names: Vec<String>,

    #[schemars(description = "Number of entries kept in rankings (top clients, providers, ...).")]
    pub top_n: usize,

    #[schemars(description = "Number of named slices in a 'top N + other' distribution.")]
    pub pie_slices: usize,

    #[schemars(description = "Label of the remainder slice in a 'top N + other' distribution.")]
    pub other_label: String,

    #[schemars(description = "Label used when a dimension value is blank.")]
    pub missing_label: String,

    #[schemars(description = "Quiet period in milliseconds before a filter change triggers recomputation.")]
    pub debounce_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tax_categories: vec![
                "TRIBUTOS Y TASAS".to_string(),
                "TRIBUTOS MUNICIPALES".to_string(),
                "TRIBUTOS NACIONALES".to_string(),
                "TRIBUTOS PROVINCIALES".to_string(),
            ],
            credit_note_codes: vec![
                "NC".to_string(),
                "N/C".to_string(),
                "NCA".to_string(),
                "NCB".to_string(),
                "NCC".to_string(),
                "NOTA DE CREDITO".to_string(),
                "NOTA CREDITO".to_string(),
            ],
            debit_note_codes: vec![
                "ND".to_string(),
                "N/D".to_string(),
                "NDA".to_string(),
                "NDB".to_string(),
                "NDC".to_string(),
                "NOTA DE DEBITO".to_string(),
                "NOTA DEBITO".to_string(),
            ],
            month_names: DEFAULT_MONTH_NAMES.iter().map(|m| m.to_string()).collect(),
            top_n: 10,
            pie_slices: 8,
            other_label: "Otros".to_string(),
            missing_label: "N/A".to_string(),
            debounce_ms: 500,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.month_names.len() != 12 {
            return Err(AnalyticsError::InvalidConfig(format!(
                "Expected 12 month names, got {}",
                self.month_names.len()
            )));
        }
        if self.month_names.iter().any(|m| m.trim().is_empty()) {
            return Err(AnalyticsError::InvalidConfig(
                "Month names must not be blank".to_string(),
            ));
        }
        if self.top_n == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "top_n must be at least 1".to_string(),
            ));
        }
        if self.pie_slices == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "pie_slices must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Localized name for a 1-based month. Out-of-range months yield an empty string.
    pub fn month_name(&self, month: u32) -> &str {
        month
            .checked_sub(1)
            .and_then(|idx| self.month_names.get(idx as usize))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn is_tax_category(&self, category: &str) -> bool {
        let upper = category.trim().to_uppercase();
        self.tax_categories
            .iter()
            .any(|c| c.trim().to_uppercase() == upper)
    }

    /// Substitutes `missing_label` for blank dimension values.
    pub fn label_or_missing(&self, value: &str) -> String {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            self.missing_label.clone()
        } else {
            trimmed.to_string()
        }
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(EngineConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::json_schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_yields_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.month_name(1), "Enero");
        assert_eq!(config.month_name(12), "Diciembre");
        assert_eq!(config.month_name(13), "");
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let config = EngineConfig::from_json_str(r#"{"top_n": 5, "theme": "dark"}"#).unwrap();
        assert_eq!(config.top_n, 5);
    }

    #[test]
    fn test_rejects_wrong_month_count() {
        let err = EngineConfig::from_json_str(r#"{"month_names": ["Jan", "Feb"]}"#).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidConfig(_)));
    }

    #[test]
    fn test_tax_category_is_case_insensitive() {
        let config = EngineConfig::default();
        assert!(config.is_tax_category("Tributos Municipales"));
        assert!(config.is_tax_category(" tributos y tasas "));
        assert!(!config.is_tax_category("Alquileres"));
    }

    #[test]
    fn test_schema_generation() {
        let schema = EngineConfig::schema_as_json().unwrap();
        assert!(schema.contains("tax_categories"));
        assert!(schema.contains("debounce_ms"));
    }
}
