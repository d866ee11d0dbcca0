//! Classification of sales documents and their signed revenue contribution.
//!
//! Every revenue sum in the crate (KPIs, series, rankings, goal actuals) goes
//! through [`SignNormalizer::signed_total`].

use crate::config::EngineConfig;
use crate::schema::SaleRecord;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum DocumentKind {
    Sale,
    CreditNote,
    DebitNote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignNormalizer {
    credit_codes: Vec<String>,
    debit_codes: Vec<String>,
}

impl Default for SignNormalizer {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl SignNormalizer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            credit_codes: normalize_vocabulary(&config.credit_note_codes),
            debit_codes: normalize_vocabulary(&config.debit_note_codes),
        }
    }

    pub fn classify(&self, document_type: &str) -> DocumentKind {
        let normalized = normalize_document_type(document_type);
        if matches_vocabulary(&normalized, &self.credit_codes) {
            DocumentKind::CreditNote
        } else if matches_vocabulary(&normalized, &self.debit_codes) {
            DocumentKind::DebitNote
        } else {
            DocumentKind::Sale
        }
    }

    pub fn kind(&self, record: &SaleRecord) -> DocumentKind {
        self.classify(&record.document_type)
    }

    pub fn is_credit_note(&self, record: &SaleRecord) -> bool {
        self.kind(record) == DocumentKind::CreditNote
    }

    pub fn is_debit_note(&self, record: &SaleRecord) -> bool {
        self.kind(record) == DocumentKind::DebitNote
    }

    /// Whether the record takes part in revenue sums at all (debit notes do not).
    pub fn affects_revenue(&self, record: &SaleRecord) -> bool {
        !self.is_debit_note(record)
    }

    /// `+|total|` for a sale, `-|total|` for a credit note, `0` for a debit note.
    pub fn signed_total(&self, record: &SaleRecord) -> f64 {
        apply_sign(self.kind(record), record.total)
    }

    /// Units with the same sign convention as [`Self::signed_total`].
    pub fn signed_quantity(&self, record: &SaleRecord) -> i64 {
        match self.kind(record) {
            DocumentKind::Sale => record.quantity.abs(),
            DocumentKind::CreditNote => -record.quantity.abs(),
            DocumentKind::DebitNote => 0,
        }
    }

    /// Net revenue of a record set.
    pub fn net_revenue<'a, I>(&self, records: I) -> f64
    where
        I: IntoIterator<Item = &'a SaleRecord>,
    {
        records.into_iter().map(|r| self.signed_total(r)).sum()
    }
}

pub fn apply_sign(kind: DocumentKind, total: f64) -> f64 {
    match kind {
        DocumentKind::Sale => total.abs(),
        DocumentKind::CreditNote => -total.abs(),
        DocumentKind::DebitNote => 0.0,
    }
}

/// Upper-cases, strips Spanish accents and dots, and collapses separators to single spaces.
fn normalize_document_type(raw: &str) -> String {
    let folded: String = raw
        .chars()
        .filter(|c| *c != '.')
        .map(|c| match c {
            'á' | 'Á' => 'A',
            'é' | 'É' => 'E',
            'í' | 'Í' => 'I',
            'ó' | 'Ó' => 'O',
            'ú' | 'Ú' | 'ü' | 'Ü' => 'U',
            '-' | '_' => ' ',
            other => other,
        })
        .collect::<String>()
        .to_uppercase();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_vocabulary(codes: &[String]) -> Vec<String> {
    codes
        .iter()
        .map(|c| normalize_document_type(c))
        .filter(|c| !c.is_empty())
        .collect()
}

/// Exact match, or the code followed by a letter/number suffix ("NOTA DE CREDITO A").
fn matches_vocabulary(normalized: &str, codes: &[String]) -> bool {
    codes.iter().any(|code| {
        normalized == code
            || normalized
                .strip_prefix(code.as_str())
                .is_some_and(|rest| rest.starts_with(' '))
    })
}
