//! Caller-owned state: immutable dataset snapshots, the goal list and the
//! color map, plus the debounce and memoization helpers a dashboard needs
//! around the analyzers.
//!
//! Nothing here is held by the engine between calls. The caller persists a
//! [`Workspace`] through [`Workspace::to_json`] and hands its slices to the
//! analyzers.

use crate::analyzers::CrossDomainData;
use crate::colors::{assign_colors, ColorMap};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::filters::{DashboardFilters, ExpenseFilters, HrFilters, StockFilters};
use crate::goals::{GoalBook, SalesGoal};
use crate::periods::PeriodKey;
use crate::schema::{Dated, ExpenseRecord, HrRecord, PurchaseRecord, SaleRecord, StockRecord};
use crate::sign::SignNormalizer;
use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// A generation never handed out before in this process. Clones share their
/// source's generation; anything built, replaced or deserialized gets a new one.
fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// An immutable record snapshot. Replacing it swaps the whole collection and
/// takes a new generation; the records themselves are never edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct Dataset<T> {
    records: Arc<[T]>,
    #[serde(skip, default = "next_generation")]
    generation: u64,
}

impl<T> Default for Dataset<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> Dataset<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self {
            records: Arc::from(records),
            generation: next_generation(),
        }
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    /// A cheap shared handle on the current snapshot.
    pub fn snapshot(&self) -> Arc<[T]> {
        Arc::clone(&self.records)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn replace(&mut self, records: Vec<T>) {
        self.records = Arc::from(records);
        self.generation = next_generation();
    }
}

/// Generation of every dataset, usable as part of a memoization key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Generations {
    pub sales: u64,
    pub purchases: u64,
    pub expenses: u64,
    pub hr: u64,
    pub stock: u64,
    pub goals: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Workspace {
    pub sales: Dataset<SaleRecord>,
    pub purchases: Dataset<PurchaseRecord>,
    pub expenses: Dataset<ExpenseRecord>,
    pub hr: Dataset<HrRecord>,
    pub stock: Dataset<StockRecord>,
    goals: GoalBook,
    #[serde(skip, default = "next_generation")]
    goals_generation: u64,
    pub colors: ColorMap,
}

impl Default for Workspace {
    fn default() -> Self {
        Self {
            sales: Dataset::default(),
            purchases: Dataset::default(),
            expenses: Dataset::default(),
            hr: Dataset::default(),
            stock: Dataset::default(),
            goals: GoalBook::default(),
            goals_generation: next_generation(),
            colors: ColorMap::default(),
        }
    }
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn goals(&self) -> &GoalBook {
        &self.goals
    }

    /// Replaces the sales, recomputes every goal's actual amount and gives
    /// new branches, salespeople and clients a color.
    pub fn replace_sales(&mut self, records: Vec<SaleRecord>, normalizer: &SignNormalizer) {
        self.sales.replace(records);
        self.goals.recompute_actuals(self.sales.records(), normalizer);
        self.goals_generation = next_generation();

        let options = SalesFilterOptions::from_records(self.sales.records());
        let names = options
            .branches
            .iter()
            .chain(&options.salespeople)
            .chain(&options.clients)
            .map(String::as_str);
        self.colors = assign_colors(names, &self.colors);

        info!("Sales replaced: {} records", self.sales.len());
    }

    pub fn replace_purchases(&mut self, records: Vec<PurchaseRecord>) {
        self.purchases.replace(records);
        info!("Purchases replaced: {} records", self.purchases.len());
    }

    pub fn replace_expenses(&mut self, records: Vec<ExpenseRecord>) {
        self.expenses.replace(records);
        info!("Expenses replaced: {} records", self.expenses.len());
    }

    pub fn replace_hr(&mut self, records: Vec<HrRecord>) {
        self.hr.replace(records);
        info!("HR replaced: {} records", self.hr.len());
    }

    pub fn replace_stock(&mut self, records: Vec<StockRecord>) {
        self.stock.replace(records);
        info!("Stock replaced: {} records", self.stock.len());
    }

    /// Installs an ingested batch. On error the current sales stay in place.
    pub fn apply_sales_upload(
        &mut self,
        upload: Result<Vec<SaleRecord>>,
        normalizer: &SignNormalizer,
    ) -> Result<usize> {
        let records = upload?;
        let count = records.len();
        self.replace_sales(records, normalizer);
        Ok(count)
    }

    pub fn apply_purchases_upload(&mut self, upload: Result<Vec<PurchaseRecord>>) -> Result<usize> {
        let records = upload?;
        let count = records.len();
        self.replace_purchases(records);
        Ok(count)
    }

    pub fn apply_expenses_upload(&mut self, upload: Result<Vec<ExpenseRecord>>) -> Result<usize> {
        let records = upload?;
        let count = records.len();
        self.replace_expenses(records);
        Ok(count)
    }

    pub fn apply_hr_upload(&mut self, upload: Result<Vec<HrRecord>>) -> Result<usize> {
        let records = upload?;
        let count = records.len();
        self.replace_hr(records);
        Ok(count)
    }

    pub fn apply_stock_upload(&mut self, upload: Result<Vec<StockRecord>>) -> Result<usize> {
        let records = upload?;
        let count = records.len();
        self.replace_stock(records);
        Ok(count)
    }

    pub fn add_goal(&mut self, branch: &str, year: i32, month: u32, goal_amount: f64) -> Result<()> {
        self.goals.add(branch, year, month, goal_amount)?;
        self.goals_generation = next_generation();
        Ok(())
    }

    pub fn update_goal_target(&mut self, id: &str, goal_amount: f64) -> Result<()> {
        self.goals.update_target(id, goal_amount)?;
        self.goals_generation = next_generation();
        Ok(())
    }

    pub fn remove_goal(&mut self, id: &str) -> Result<SalesGoal> {
        let removed = self.goals.remove(id)?;
        self.goals_generation = next_generation();
        Ok(removed)
    }

    /// Merges imported goals (last write wins). Actuals are recomputed when
    /// sales are loaded.
    pub fn import_goals(&mut self, goals: Vec<SalesGoal>, normalizer: &SignNormalizer) -> usize {
        let count = self.goals.import(goals);
        if !self.sales.is_empty() {
            self.goals.recompute_actuals(self.sales.records(), normalizer);
        }
        self.goals_generation = next_generation();
        count
    }

    pub fn set_color(&mut self, name: &str, color: &str) {
        self.colors.set_color(name, color);
    }

    pub fn generations(&self) -> Generations {
        Generations {
            sales: self.sales.generation(),
            purchases: self.purchases.generation(),
            expenses: self.expenses.generation(),
            hr: self.hr.generation(),
            stock: self.stock.generation(),
            goals: self.goals_generation,
        }
    }

    /// Every dataset but stock, for the stock join.
    pub fn cross_domain(&self) -> CrossDomainData<'_> {
        CrossDomainData {
            sales: self.sales.records(),
            purchases: self.purchases.records(),
            expenses: self.expenses.records(),
            hr: self.hr.records(),
        }
    }

    pub fn filter_options(&self) -> FilterOptions {
        FilterOptions {
            sales: SalesFilterOptions::from_records(self.sales.records()),
            purchases: PurchaseFilterOptions::from_records(self.purchases.records()),
            expenses: ExpenseFilterOptions::from_records(self.expenses.records()),
            hr: HrFilterOptions::from_records(self.hr.records()),
            stock: StockFilterOptions::from_records(self.stock.records()),
        }
    }

    /// Filters that select the latest expense period, as shown after an upload.
    pub fn default_expense_filters(&self) -> Option<ExpenseFilters> {
        latest_period(self.expenses.records()).map(|p| ExpenseFilters::for_period(p.year, p.month))
    }

    pub fn default_hr_filters(&self) -> Option<HrFilters> {
        latest_period(self.hr.records()).map(|p| HrFilters::for_period(p.year, p.month))
    }

    pub fn default_stock_filters(&self) -> Option<StockFilters> {
        latest_period(self.stock.records()).map(|p| StockFilters::for_period(p.year, p.month))
    }

    /// Serializes the engine inputs (records, goals, colors) for storage.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let workspace: Workspace = serde_json::from_str(json)?;
        info!(
            "Workspace loaded: {} sales, {} purchases, {} expenses, {} HR, {} stock records, {} goals",
            workspace.sales.len(),
            workspace.purchases.len(),
            workspace.expenses.len(),
            workspace.hr.len(),
            workspace.stock.len(),
            workspace.goals.len()
        );
        Ok(workspace)
    }
}

/// Year-month of the most recent record.
pub fn latest_period<R: Dated>(records: &[R]) -> Option<PeriodKey> {
    records.iter().map(|r| r.date()).max().map(PeriodKey::from_date)
}

fn distinct_sorted<'a, I: IntoIterator<Item = &'a str>>(values: I) -> Vec<String> {
    values
        .into_iter()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Distinct years, newest first.
fn years_desc<R: Dated>(records: &[R]) -> Vec<i32> {
    let years: BTreeSet<i32> = records.iter().map(|r| r.year()).collect();
    years.into_iter().rev().collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SalesFilterOptions {
    pub branches: Vec<String>,
    pub salespeople: Vec<String>,
    pub years: Vec<i32>,
    pub clients: Vec<String>,
}

impl SalesFilterOptions {
    pub fn from_records(records: &[SaleRecord]) -> Self {
        Self {
            branches: distinct_sorted(records.iter().map(|r| r.branch.as_str())),
            salespeople: distinct_sorted(records.iter().map(|r| r.salesperson.as_str())),
            years: years_desc(records),
            clients: distinct_sorted(records.iter().map(|r| r.client.as_str())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PurchaseFilterOptions {
    pub providers: Vec<String>,
    pub years: Vec<i32>,
}

impl PurchaseFilterOptions {
    pub fn from_records(records: &[PurchaseRecord]) -> Self {
        Self {
            providers: distinct_sorted(records.iter().map(|r| r.provider.as_str())),
            years: years_desc(records),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExpenseFilterOptions {
    pub categories: Vec<String>,
    pub subcategories: Vec<String>,
    pub years: Vec<i32>,
}

impl ExpenseFilterOptions {
    pub fn from_records(records: &[ExpenseRecord]) -> Self {
        Self {
            categories: distinct_sorted(records.iter().map(|r| r.category.as_str())),
            subcategories: distinct_sorted(records.iter().map(|r| r.subcategory.as_str())),
            years: years_desc(records),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HrFilterOptions {
    pub years: Vec<i32>,
    pub areas: Vec<String>,
    pub activities: Vec<String>,
    pub types: Vec<String>,
}

impl HrFilterOptions {
    pub fn from_records(records: &[HrRecord]) -> Self {
        Self {
            years: years_desc(records),
            areas: distinct_sorted(records.iter().map(|r| r.area.as_str())),
            activities: distinct_sorted(records.iter().map(|r| r.activity.as_str())),
            types: distinct_sorted(records.iter().map(|r| r.kind.as_str())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StockFilterOptions {
    pub years: Vec<i32>,
    pub branches: Vec<String>,
    pub rubros: Vec<String>,
}

impl StockFilterOptions {
    pub fn from_records(records: &[StockRecord]) -> Self {
        Self {
            years: years_desc(records),
            branches: distinct_sorted(records.iter().map(|r| r.branch.as_str())),
            rubros: distinct_sorted(records.iter().map(|r| r.rubro.as_str())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FilterOptions {
    pub sales: SalesFilterOptions,
    pub purchases: PurchaseFilterOptions,
    pub expenses: ExpenseFilterOptions,
    pub hr: HrFilterOptions,
    pub stock: StockFilterOptions,
}

/// Holds back rapidly changing values until they have been stable for the
/// configured delay. A newer value replaces the pending one; nothing already
/// released is affected.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(Duration::from_millis(config.debounce_ms))
    }

    pub fn submit(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now));
    }

    /// Releases the pending value once `delay` has passed since it was submitted.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let ready = self
            .pending
            .as_ref()
            .is_some_and(|(_, at)| now.saturating_duration_since(*at) >= self.delay);
        if ready {
            self.pending.take().map(|(value, _)| value)
        } else {
            None
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Single-slot cache: the value is recomputed whenever the key changes.
#[derive(Debug, Clone)]
pub struct Memo<K, V> {
    slot: Option<(K, V)>,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self { slot: None }
    }
}

impl<K: PartialEq, V> Memo<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute<F>(&mut self, key: K, compute: F) -> &V
    where
        F: FnOnce() -> V,
    {
        if !self.is_cached(&key) {
            self.slot = None;
        }
        &self.slot.get_or_insert_with(|| (key, compute())).1
    }

    pub fn is_cached(&self, key: &K) -> bool {
        self.slot.as_ref().is_some_and(|(k, _)| k == key)
    }

    pub fn invalidate(&mut self) {
        self.slot = None;
    }
}

/// Memoization key for a full dashboard computation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisKey {
    pub generations: Generations,
    pub filters: DashboardFilters,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalyticsError;
    use crate::filters::{SalesFilters, Selection};
    use crate::goals::goal_compliance;
    use crate::schema::FiscalType;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sale(branch: &str, date: NaiveDate, total: f64) -> SaleRecord {
        SaleRecord {
            branch: branch.to_string(),
            document_type: "FACTURA".to_string(),
            quantity: 1,
            date,
            total,
            client: "CLIENTE".to_string(),
            salesperson_id: 1,
            salesperson: "ANA".to_string(),
            fiscal_type: FiscalType::Declared,
        }
    }

    #[test]
    fn test_failed_upload_keeps_dataset() {
        let normalizer = SignNormalizer::default();
        let mut workspace = Workspace::new();
        workspace
            .apply_sales_upload(Ok(vec![sale("A", d(2024, 1, 5), 10.0)]), &normalizer)
            .unwrap();
        let generation = workspace.sales.generation();

        let result = workspace.apply_sales_upload(
            Err(AnalyticsError::EmptyUpload("sales".to_string())),
            &normalizer,
        );
        assert!(result.is_err());
        assert_eq!(workspace.sales.len(), 1);
        assert_eq!(workspace.sales.generation(), generation);
    }

    #[test]
    fn test_replacing_sales_recomputes_goals_and_colors() {
        let normalizer = SignNormalizer::default();
        let mut workspace = Workspace::new();
        workspace.add_goal("A", 2024, 1, 1000.0).unwrap();

        workspace.replace_sales(vec![sale("A", d(2024, 1, 5), 600.0)], &normalizer);
        assert_eq!(workspace.goals().get("A-2024-1").unwrap().actual_amount, 600.0);
        assert!(workspace.colors.get("A").is_some());
        assert!(workspace.colors.get("ANA").is_some());

        let before = workspace.generations();
        workspace.replace_sales(vec![], &normalizer);
        assert_eq!(workspace.goals().get("A-2024-1").unwrap().actual_amount, 0.0);
        assert_ne!(workspace.generations(), before);
    }

    #[test]
    fn test_snapshots_are_not_affected_by_replacement() {
        let mut dataset = Dataset::new(vec![1, 2, 3]);
        let snapshot = dataset.snapshot();
        let before = dataset.generation();
        dataset.replace(vec![4]);
        assert_eq!(&*snapshot, &[1, 2, 3]);
        assert_eq!(dataset.records(), &[4]);
        assert_ne!(dataset.generation(), before);
        assert_eq!(dataset.clone().generation(), dataset.generation());
    }

    #[test]
    fn test_default_filters_select_latest_period() {
        let mut workspace = Workspace::new();
        assert!(workspace.default_expense_filters().is_none());

        workspace.replace_expenses(vec![
            ExpenseRecord::new(d(2024, 3, 1), "A", "a", "x", 1.0),
            ExpenseRecord::new(d(2024, 5, 20), "A", "a", "x", 1.0),
            ExpenseRecord::new(d(2023, 12, 31), "A", "a", "x", 1.0),
        ]);
        assert_eq!(
            workspace.default_expense_filters(),
            Some(ExpenseFilters::for_period(2024, 5))
        );
    }

    #[test]
    fn test_filter_options() {
        let normalizer = SignNormalizer::default();
        let mut workspace = Workspace::new();
        workspace.replace_sales(
            vec![
                sale("B", d(2023, 1, 5), 1.0),
                sale("A", d(2024, 1, 5), 1.0),
                sale("B", d(2024, 2, 5), 1.0),
            ],
            &normalizer,
        );
        let options = workspace.filter_options();
        assert_eq!(options.sales.branches, vec!["A", "B"]);
        assert_eq!(options.sales.years, vec![2024, 2023]);
        assert!(options.stock.years.is_empty());
    }

    #[test]
    fn test_json_round_trip_keeps_inputs_only() {
        let normalizer = SignNormalizer::default();
        let mut workspace = Workspace::new();
        workspace.replace_sales(vec![sale("A", d(2024, 1, 5), 600.0)], &normalizer);
        workspace.add_goal("A", 2024, 1, 1000.0).unwrap();
        workspace.set_color("A", "#123456");

        let json = workspace.to_json().unwrap();
        let restored = Workspace::from_json(&json).unwrap();

        assert_eq!(restored.sales.records(), workspace.sales.records());
        assert_eq!(restored.goals(), workspace.goals());
        assert_eq!(restored.colors.get("A"), Some("#123456"));
        assert_ne!(restored.generations(), workspace.generations());

        let empty = Workspace::from_json("{}").unwrap();
        assert!(empty.sales.is_empty());
    }

    #[test]
    fn test_loaded_workspaces_never_share_generations() {
        let json = r#"{"sales": [], "goals": []}"#;
        let first = Workspace::from_json(json).unwrap();
        let second = Workspace::from_json(json).unwrap();
        let fresh = Workspace::new();

        let (a, b, c) = (first.generations(), second.generations(), fresh.generations());
        assert_ne!(a.sales, b.sales);
        assert_ne!(a.goals, b.goals);
        assert_ne!(a.sales, c.sales);
        assert_ne!(a, b);
    }

    #[test]
    fn test_loading_goals_keeps_one_goal_per_id() {
        let json = r#"{
            "goals": [
                {"id": "A-2024-1", "branch": "A", "year": 2024, "month": 1, "goal_amount": 1000.0},
                {"id": "A-2024-1", "branch": "A", "year": 2024, "month": 1, "goal_amount": 1200.0},
                {"id": "stale", "branch": " a ", "year": 2024, "month": 1, "goal_amount": 900.0},
                {"id": "B-2024-1", "branch": "B", "year": 2024, "month": 1, "goal_amount": 500.0}
            ]
        }"#;
        let mut workspace = Workspace::from_json(json).unwrap();
        assert_eq!(workspace.goals().len(), 2);

        let goal = workspace.goals().get("A-2024-1").unwrap();
        assert_eq!(goal.goal_amount, 900.0);
        assert_eq!(goal.branch, "A");
        assert!(workspace.goals().get("stale").is_none());

        let normalizer = SignNormalizer::default();
        workspace.replace_sales(vec![sale("A", d(2024, 1, 5), 800.0)], &normalizer);
        let summary = goal_compliance(
            workspace.goals().goals(),
            workspace.sales.records(),
            &SalesFilters {
                branches: Selection::only(["A".to_string()]),
                ..SalesFilters::default()
            },
            &normalizer,
        )
        .unwrap();
        assert_eq!(summary.total_goal, 900.0);
        assert_eq!(summary.total_actual, 800.0);
    }

    #[test]
    fn test_debouncer_releases_only_latest_after_quiet_period() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(500));

        debouncer.submit("a", start);
        debouncer.submit("ab", start + Duration::from_millis(200));
        assert_eq!(debouncer.poll(start + Duration::from_millis(600)), None);
        assert_eq!(debouncer.poll(start + Duration::from_millis(700)), Some("ab"));
        assert!(!debouncer.is_pending());
        assert_eq!(debouncer.poll(start + Duration::from_millis(2000)), None);
    }

    #[test]
    fn test_memo_recomputes_on_key_change() {
        let mut memo: Memo<u64, usize> = Memo::new();
        let mut calls = 0;

        assert_eq!(*memo.get_or_compute(1, || { calls += 1; 10 }), 10);
        assert_eq!(*memo.get_or_compute(1, || { calls += 1; 20 }), 10);
        assert_eq!(*memo.get_or_compute(2, || { calls += 1; 30 }), 30);
        assert_eq!(calls, 2);

        memo.invalidate();
        assert!(!memo.is_cached(&2));
    }
}
