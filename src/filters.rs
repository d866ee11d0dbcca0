//! Filter specifications and the record predicates compiled from them.
//!
//! Every multi-select option follows one rule: **an empty selection means no
//! restriction**. Selecting nothing selects everything. Options are combined
//! with AND, date bounds are inclusive and a missing bound is unbounded.
//! Missing keys in a JSON filter default to "no restriction"; unknown keys are
//! ignored.

use crate::schema::{Dated, ExpenseRecord, FiscalType, HrRecord, PurchaseRecord, SaleRecord, StockRecord};
use chrono::{Datelike, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeSet;

/// A multi-select value. Empty means "all".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: Ord + Deserialize<'de>"
))]
pub struct Selection<T>(BTreeSet<T>);

impl<T> Default for Selection<T> {
    fn default() -> Self {
        Self(BTreeSet::new())
    }
}

impl<T: Ord> Selection<T> {
    pub fn all() -> Self {
        Self(BTreeSet::new())
    }

    pub fn only<I: IntoIterator<Item = T>>(values: I) -> Self {
        Self(values.into_iter().collect())
    }

    pub fn allows<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.0.is_empty() || self.0.contains(value)
    }

    pub fn is_unrestricted(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }

    /// Adds the value if absent, removes it if present.
    pub fn toggle(&mut self, value: T) {
        if !self.0.remove(&value) {
            self.0.insert(value);
        }
    }
}

impl<T: Ord> FromIterator<T> for Selection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::only(iter)
    }
}

/// Inclusive date range. `None` bounds are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// A compiled per-record inclusion test.
pub trait RecordFilter<R> {
    fn matches(&self, record: &R) -> bool;

    fn is_unrestricted(&self) -> bool;

    /// Copies the matching records; the input is left untouched.
    fn apply(&self, records: &[R]) -> Vec<R>
    where
        R: Clone,
    {
        if self.is_unrestricted() {
            return records.to_vec();
        }
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SalesFilters {
    pub branches: Selection<String>,
    pub salespeople: Selection<String>,
    pub years: Selection<i32>,
    pub months: Selection<u32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl SalesFilters {
    pub fn date_range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }

    /// Same branch and salesperson selection with every period restriction removed.
    pub fn without_period(&self) -> Self {
        Self {
            branches: self.branches.clone(),
            salespeople: self.salespeople.clone(),
            ..Self::default()
        }
    }
}

impl RecordFilter<SaleRecord> for SalesFilters {
    fn matches(&self, record: &SaleRecord) -> bool {
        self.branches.allows(record.branch.as_str())
            && self.salespeople.allows(record.salesperson.as_str())
            && self.years.allows(&record.year())
            && self.months.allows(&record.month())
            && self.date_range().contains(record.date)
    }

    fn is_unrestricted(&self) -> bool {
        self.branches.is_unrestricted()
            && self.salespeople.is_unrestricted()
            && self.years.is_unrestricted()
            && self.months.is_unrestricted()
            && self.date_range().is_unbounded()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PurchaseFilters {
    pub providers: Selection<String>,
    pub years: Selection<i32>,
    pub months: Selection<u32>,
    pub modalities: Selection<FiscalType>,
}

impl RecordFilter<PurchaseRecord> for PurchaseFilters {
    fn matches(&self, record: &PurchaseRecord) -> bool {
        self.providers.allows(record.provider.as_str())
            && self.years.allows(&record.year)
            && self.months.allows(&record.month)
            && self.modalities.allows(&record.modality)
    }

    fn is_unrestricted(&self) -> bool {
        self.providers.is_unrestricted()
            && self.years.is_unrestricted()
            && self.months.is_unrestricted()
            && self.modalities.is_unrestricted()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ExpenseFilters {
    pub categories: Selection<String>,
    pub subcategories: Selection<String>,
    pub years: Selection<i32>,
    pub months: Selection<u32>,
}

impl ExpenseFilters {
    /// Selects a single year and month, as applied after a fresh upload.
    pub fn for_period(year: i32, month: u32) -> Self {
        Self {
            years: Selection::only([year]),
            months: Selection::only([month]),
            ..Self::default()
        }
    }
}

impl RecordFilter<ExpenseRecord> for ExpenseFilters {
    fn matches(&self, record: &ExpenseRecord) -> bool {
        self.categories.allows(record.category.as_str())
            && self.subcategories.allows(record.subcategory.as_str())
            && self.years.allows(&record.year)
            && self.months.allows(&record.month)
    }

    fn is_unrestricted(&self) -> bool {
        self.categories.is_unrestricted()
            && self.subcategories.is_unrestricted()
            && self.years.is_unrestricted()
            && self.months.is_unrestricted()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct HrFilters {
    pub years: Selection<i32>,
    pub months: Selection<u32>,
    pub areas: Selection<String>,
    pub activities: Selection<String>,
    pub types: Selection<String>,
}

impl HrFilters {
    pub fn for_period(year: i32, month: u32) -> Self {
        Self {
            years: Selection::only([year]),
            months: Selection::only([month]),
            ..Self::default()
        }
    }

    /// Whether a roster date (hire, termination) falls in the selected years and months.
    pub fn period_allows(&self, date: NaiveDate) -> bool {
        self.years.allows(&date.year()) && self.months.allows(&date.month())
    }
}

impl RecordFilter<HrRecord> for HrFilters {
    fn matches(&self, record: &HrRecord) -> bool {
        self.years.allows(&record.year)
            && self.months.allows(&record.month)
            && self.areas.allows(record.area.as_str())
            && self.activities.allows(record.activity.as_str())
            && self.types.allows(record.kind.as_str())
    }

    fn is_unrestricted(&self) -> bool {
        self.years.is_unrestricted()
            && self.months.is_unrestricted()
            && self.areas.is_unrestricted()
            && self.activities.is_unrestricted()
            && self.types.is_unrestricted()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StockFilters {
    pub years: Selection<i32>,
    pub months: Selection<u32>,
    pub branches: Selection<String>,
    pub rubros: Selection<String>,
}

impl StockFilters {
    pub fn for_period(year: i32, month: u32) -> Self {
        Self {
            years: Selection::only([year]),
            months: Selection::only([month]),
            ..Self::default()
        }
    }

    /// Same branch and rubro selection with the period restriction removed.
    pub fn without_period(&self) -> Self {
        Self {
            branches: self.branches.clone(),
            rubros: self.rubros.clone(),
            ..Self::default()
        }
    }
}

impl RecordFilter<StockRecord> for StockFilters {
    fn matches(&self, record: &StockRecord) -> bool {
        self.years.allows(&record.year)
            && self.months.allows(&record.month)
            && self.branches.allows(record.branch.as_str())
            && self.rubros.allows(record.rubro.as_str())
    }

    fn is_unrestricted(&self) -> bool {
        self.years.is_unrestricted()
            && self.months.is_unrestricted()
            && self.branches.is_unrestricted()
            && self.rubros.is_unrestricted()
    }
}

/// One filter specification per dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DashboardFilters {
    pub sales: SalesFilters,
    pub purchases: PurchaseFilters,
    pub expenses: ExpenseFilters,
    pub hr: HrFilters,
    pub stock: StockFilters,
}

impl DashboardFilters {
    pub fn from_json_str(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(DashboardFilters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sale(branch: &str, salesperson: &str, date: NaiveDate) -> SaleRecord {
        SaleRecord {
            branch: branch.to_string(),
            document_type: "FACTURA A".to_string(),
            quantity: 1,
            date,
            total: 100.0,
            client: "CLIENTE".to_string(),
            salesperson_id: 1,
            salesperson: salesperson.to_string(),
            fiscal_type: FiscalType::Declared,
        }
    }

    #[test]
    fn test_empty_selection_allows_everything() {
        let selection: Selection<String> = Selection::all();
        assert!(selection.allows("anything"));

        let only = Selection::only(["A".to_string()]);
        assert!(only.allows("A"));
        assert!(!only.allows("B"));
    }

    #[test]
    fn test_toggle_twice_restores_selection() {
        let mut selection = Selection::only([2023]);
        selection.toggle(2024);
        assert!(selection.allows(&2024));
        selection.toggle(2024);
        assert_eq!(selection, Selection::only([2023]));
    }

    #[test]
    fn test_unrestricted_filter_keeps_every_record() {
        let records = vec![
            sale("A", "ANA", d(2023, 1, 5)),
            sale("B", "LUIS", d(2024, 6, 30)),
        ];
        let filters = SalesFilters::default();
        assert!(filters.is_unrestricted());
        assert_eq!(filters.apply(&records), records);
    }

    #[test]
    fn test_sales_filters_are_conjunctive() {
        let records = vec![
            sale("A", "ANA", d(2024, 1, 5)),
            sale("A", "LUIS", d(2024, 1, 6)),
            sale("B", "ANA", d(2024, 1, 7)),
            sale("A", "ANA", d(2024, 2, 1)),
        ];
        let filters = SalesFilters {
            branches: Selection::only(["A".to_string()]),
            salespeople: Selection::only(["ANA".to_string()]),
            months: Selection::only([1]),
            ..SalesFilters::default()
        };

        let kept = filters.apply(&records);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].date, d(2024, 1, 5));
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let range = DateRange::new(Some(d(2024, 1, 1)), Some(d(2024, 1, 31)));
        assert!(range.contains(d(2024, 1, 1)));
        assert!(range.contains(d(2024, 1, 31)));
        assert!(!range.contains(d(2024, 2, 1)));
        assert!(DateRange::default().contains(d(1900, 1, 1)));
    }

    #[test]
    fn test_json_filters_ignore_unknown_keys() {
        let filters = DashboardFilters::from_json_str(
            r#"{"sales": {"branches": ["A"], "start_date": "2024-01-01", "colour": "red"}, "extra": 1}"#,
        )
        .unwrap();

        assert!(filters.sales.branches.allows("A"));
        assert!(!filters.sales.branches.allows("B"));
        assert_eq!(filters.sales.start_date, Some(d(2024, 1, 1)));
        assert!(filters.purchases.is_unrestricted());
    }

    #[test]
    fn test_purchase_modalities() {
        let purchase = PurchaseRecord::new(d(2024, 1, 1), FiscalType::Undeclared, "P", 1.0, 0.0, 0.0, 1.0);
        let filters = PurchaseFilters {
            modalities: Selection::only([FiscalType::Declared]),
            ..PurchaseFilters::default()
        };
        assert!(!filters.matches(&purchase));
    }
}
