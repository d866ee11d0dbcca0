//! Stock valuation, placed in the context of what else happened in the same
//! year-month (and branch, where the other domain has one).
//!
//! Every other domain is indexed once per call by `PeriodKey` or
//! `(PeriodKey, branch)`; stock rows then look their context up by key.

use crate::aggregate::{Aggregation, ShareEntry};
use crate::config::EngineConfig;
use crate::filters::{RecordFilter, StockFilters};
use crate::periods::{
    month_over_month_change, monthly_series, pivot_year_over_year, PeriodKey, YearOverYear,
};
use crate::schema::{Dated, ExpenseRecord, HrRecord, PurchaseRecord, SaleRecord, StockRecord};
use crate::sign::SignNormalizer;
use crate::utils::{percentage, ratio};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// The other datasets a stock analysis is joined against. Usually the full,
/// unfiltered collections.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossDomainData<'a> {
    pub sales: &'a [SaleRecord],
    pub purchases: &'a [PurchaseRecord],
    pub expenses: &'a [ExpenseRecord],
    pub hr: &'a [HrRecord],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StockKpis {
    /// Latest year-month present in the filtered snapshots.
    pub period: PeriodKey,
    pub label: String,
    pub total_cost: f64,
    pub valued_usd_system: f64,
    pub valued_usd_official: f64,
    pub valued_ars_official: f64,
    /// Mean of (official - system) / system over the latest snapshots, in %.
    pub average_exchange_gap: f64,
    /// Month-over-month % change of total cost.
    pub cost_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StockPoint {
    pub period: PeriodKey,
    pub label: String,
    pub cost: f64,
    pub valued_usd_system: f64,
    pub valued_usd_official: f64,
    pub valued_ars_official: f64,
}

/// Stock of one branch in one period next to that branch's net sales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StockContextRow {
    pub period: PeriodKey,
    pub branch: String,
    pub stock_cost: f64,
    pub valued_ars_official: f64,
    pub sales: f64,
    /// Stock cost over net sales; months of sales the stock represents.
    pub stock_to_sales: f64,
}

/// Stock of one period next to every other domain's totals for that period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PeriodContext {
    pub period: PeriodKey,
    pub label: String,
    pub stock_cost: f64,
    pub sales: f64,
    pub purchases_gross: f64,
    pub expenses_total: f64,
    /// Distinct employees with at least one HR record in the period.
    pub headcount: usize,
    pub stock_to_sales: f64,
    pub stock_to_purchases: f64,
    pub stock_per_employee: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StockAnalysis {
    /// `None` when no snapshot passed the filters.
    pub kpis: Option<StockKpis>,
    pub valuation_over_time: Vec<StockPoint>,
    pub by_rubro: Aggregation,
    pub by_branch: Aggregation,
    /// Top rubros of the latest period plus an "other" slice.
    pub rubro_distribution: Vec<ShareEntry>,
    pub branch_context: Vec<StockContextRow>,
    /// Built from the filtered snapshots, or from the period-free history when
    /// the filters leave nothing.
    pub period_context: Vec<PeriodContext>,
    /// Cost over every snapshot of the selected branches and rubros.
    pub yearly_comparison: YearOverYear,
}

#[derive(Default)]
struct Valuation {
    cost: f64,
    usd_system: f64,
    usd_official: f64,
    ars_official: f64,
}

impl Valuation {
    fn add(&mut self, record: &StockRecord) {
        self.cost += record.cost;
        self.usd_system += record.valued_usd_system;
        self.usd_official += record.valued_usd_official;
        self.ars_official += record.valued_ars_official;
    }
}

/// Indexes built once per analysis.
struct ContextIndex<'a> {
    sales: HashMap<PeriodKey, f64>,
    sales_by_branch: HashMap<(PeriodKey, String), f64>,
    purchases: HashMap<PeriodKey, f64>,
    expenses: HashMap<PeriodKey, f64>,
    employees: HashMap<PeriodKey, HashSet<&'a str>>,
}

impl<'a> ContextIndex<'a> {
    fn build(related: CrossDomainData<'a>, normalizer: &SignNormalizer) -> Self {
        let mut sales = HashMap::new();
        let mut sales_by_branch = HashMap::new();
        for record in related.sales {
            let signed = normalizer.signed_total(record);
            *sales.entry(record.period()).or_insert(0.0) += signed;
            *sales_by_branch
                .entry((record.period(), branch_key(&record.branch)))
                .or_insert(0.0) += signed;
        }

        let mut purchases = HashMap::new();
        for record in related.purchases {
            *purchases.entry(record.period()).or_insert(0.0) += record.gross_amount;
        }

        let mut expenses = HashMap::new();
        for record in related.expenses {
            *expenses.entry(record.period()).or_insert(0.0) += record.amount;
        }

        let mut employees: HashMap<PeriodKey, HashSet<&'a str>> = HashMap::new();
        for record in related.hr {
            employees
                .entry(record.period())
                .or_default()
                .insert(record.employee.as_str());
        }

        Self {
            sales,
            sales_by_branch,
            purchases,
            expenses,
            employees,
        }
    }

    fn sales_for(&self, period: PeriodKey) -> f64 {
        self.sales.get(&period).copied().unwrap_or(0.0)
    }

    fn branch_sales_for(&self, period: PeriodKey, branch: &str) -> f64 {
        self.sales_by_branch
            .get(&(period, branch_key(branch)))
            .copied()
            .unwrap_or(0.0)
    }

    fn headcount_for(&self, period: PeriodKey) -> usize {
        self.employees.get(&period).map_or(0, |e| e.len())
    }
}

fn branch_key(branch: &str) -> String {
    branch.trim().to_uppercase()
}

/// Analyzes the filtered stock snapshots. `None` only when no stock is loaded;
/// an empty filtered set still gets the history-based tables.
pub fn analyze_stock(
    filtered: &[StockRecord],
    all_stock: &[StockRecord],
    filters: &StockFilters,
    related: CrossDomainData<'_>,
    normalizer: &SignNormalizer,
    config: &EngineConfig,
) -> Option<StockAnalysis> {
    if all_stock.is_empty() {
        return None;
    }
    let latest = filtered.iter().map(|r| r.period()).max();

    debug!(
        "Analyzing {} of {} stock records, latest period {:?}",
        filtered.len(),
        all_stock.len(),
        latest.map(|p| p.key())
    );

    let history_filter = filters.without_period();
    let history: Vec<&StockRecord> = all_stock
        .iter()
        .filter(|r| history_filter.matches(r))
        .collect();

    let mut by_period: BTreeMap<PeriodKey, Valuation> = BTreeMap::new();
    let mut by_period_branch: BTreeMap<(PeriodKey, String), Valuation> = BTreeMap::new();
    for record in filtered {
        by_period.entry(record.period()).or_default().add(record);
        by_period_branch
            .entry((record.period(), branch_key(&record.branch)))
            .or_default()
            .add(record);
    }

    let mut context_periods: BTreeMap<PeriodKey, Valuation> = BTreeMap::new();
    if filtered.is_empty() {
        for record in &history {
            context_periods.entry(record.period()).or_default().add(record);
        }
    }
    let context_source = if filtered.is_empty() {
        &context_periods
    } else {
        &by_period
    };

    let valuation_over_time: Vec<StockPoint> = by_period
        .iter()
        .map(|(period, v)| StockPoint {
            period: *period,
            label: period.label(config),
            cost: v.cost,
            valued_usd_system: v.usd_system,
            valued_usd_official: v.usd_official,
            valued_ars_official: v.ars_official,
        })
        .collect();

    let latest_records: Vec<&StockRecord> = filtered
        .iter()
        .filter(|r| Some(r.period()) == latest)
        .collect();

    let kpis = latest.map(|period| stock_kpis(period, &latest_records, filtered, config));

    let by_rubro = Aggregation::group_sum(
        latest_records.iter().copied(),
        |r| config.label_or_missing(&r.rubro),
        |r| r.cost,
    );
    let by_branch = Aggregation::group_sum(
        latest_records.iter().copied(),
        |r| config.label_or_missing(&branch_key(&r.branch)),
        |r| r.cost,
    );

    let index = ContextIndex::build(related, normalizer);

    let branch_context = by_period_branch
        .iter()
        .map(|((period, branch), v)| {
            let sales = index.branch_sales_for(*period, branch);
            StockContextRow {
                period: *period,
                branch: config.label_or_missing(branch),
                stock_cost: v.cost,
                valued_ars_official: v.ars_official,
                sales,
                stock_to_sales: positive_ratio(v.cost, sales),
            }
        })
        .collect();

    let period_context = context_source
        .iter()
        .map(|(period, v)| {
            let sales = index.sales_for(*period);
            let purchases_gross = index.purchases.get(period).copied().unwrap_or(0.0);
            let headcount = index.headcount_for(*period);
            PeriodContext {
                period: *period,
                label: period.label(config),
                stock_cost: v.cost,
                sales,
                purchases_gross,
                expenses_total: index.expenses.get(period).copied().unwrap_or(0.0),
                headcount,
                stock_to_sales: positive_ratio(v.cost, sales),
                stock_to_purchases: positive_ratio(v.cost, purchases_gross),
                stock_per_employee: ratio(v.cost, headcount as f64),
            }
        })
        .collect();

    let yearly_comparison =
        pivot_year_over_year(&monthly_series(history, |r| r.cost, config), config);

    Some(StockAnalysis {
        kpis,
        valuation_over_time,
        rubro_distribution: by_rubro.top_shares_with_other(config.pie_slices, &config.other_label),
        by_rubro,
        by_branch,
        branch_context,
        period_context,
        yearly_comparison,
    })
}

fn stock_kpis(
    latest: PeriodKey,
    latest_records: &[&StockRecord],
    filtered: &[StockRecord],
    config: &EngineConfig,
) -> StockKpis {
    let mut valuation = Valuation::default();
    let mut gaps = Vec::new();
    for record in latest_records {
        valuation.add(record);
        if record.system_rate > 0.0 {
            gaps.push(percentage(
                record.official_rate - record.system_rate,
                record.system_rate,
            ));
        }
    }

    let cost_series = monthly_series(filtered, |r| r.cost, config);

    StockKpis {
        period: latest,
        label: latest.label(config),
        total_cost: valuation.cost,
        valued_usd_system: valuation.usd_system,
        valued_usd_official: valuation.usd_official,
        valued_ars_official: valuation.ars_official,
        average_exchange_gap: ratio(gaps.iter().sum(), gaps.len() as f64),
        cost_change: month_over_month_change(&cost_series),
    }
}

/// Ratio that is zero unless the denominator is positive.
fn positive_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        ratio(numerator, denominator)
    } else {
        0.0
    }
}
