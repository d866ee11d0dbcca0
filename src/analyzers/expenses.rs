use crate::aggregate::{AggregateEntry, Aggregation, ShareEntry};
use crate::config::EngineConfig;
use crate::drilldown::DrillPath;
use crate::periods::{
    month_over_month_change, monthly_series, pivot_year_over_year, top_month, MonthlyPoint,
    TopMonth, YearOverYear,
};
use crate::schema::ExpenseRecord;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExpensesKpis {
    pub total_expenses: f64,
    /// Month-over-month % change of the total.
    pub total_change: f64,
    /// Total minus tax-category expenses.
    pub opex_total: f64,
    pub tax_total: f64,
    pub top_month: Option<TopMonth>,
}

impl ExpensesKpis {
    fn compute<'a, I>(records: I, series: &[MonthlyPoint], config: &EngineConfig) -> Self
    where
        I: IntoIterator<Item = &'a ExpenseRecord>,
    {
        let mut total_expenses = 0.0;
        let mut tax_total = 0.0;
        for record in records {
            total_expenses += record.amount;
            if config.is_tax_category(&record.category) {
                tax_total += record.amount;
            }
        }

        Self {
            total_expenses,
            total_change: month_over_month_change(series),
            opex_total: total_expenses - tax_total,
            tax_total,
            top_month: top_month(series),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExpensesAnalysis {
    pub kpis: ExpensesKpis,
    pub expenses_over_time: Vec<MonthlyPoint>,
    pub by_category: Aggregation,
    pub by_subcategory: Aggregation,
    pub by_detail: Aggregation,
    pub top_subcategories: Vec<AggregateEntry>,
    pub category_shares: Vec<ShareEntry>,
    /// Built from every expense on file, not only the filtered ones.
    pub yearly_comparison: YearOverYear,
    pub available_years: Vec<i32>,
    /// The filtered records, kept so drill-down never goes back to the full dataset.
    pub records: Vec<ExpenseRecord>,
}

/// What the dashboard shows for a given drill-down selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExpenseDrillView {
    pub path: DrillPath,
    pub kpis: ExpensesKpis,
    pub expenses_over_time: Vec<MonthlyPoint>,
    /// Categories at the root, subcategories under a category, details under a subcategory.
    pub distribution: Vec<ShareEntry>,
    pub subcategories: Aggregation,
    pub details: Aggregation,
    pub top_items: Vec<AggregateEntry>,
}

/// Analyzes the filtered expenses. `None` when nothing passed the filters.
pub fn analyze_expenses(
    filtered: &[ExpenseRecord],
    all: &[ExpenseRecord],
    config: &EngineConfig,
) -> Option<ExpensesAnalysis> {
    if filtered.is_empty() {
        return None;
    }

    debug!(
        "Analyzing {} of {} expense records",
        filtered.len(),
        all.len()
    );

    let expenses_over_time = monthly_series(filtered, |r| r.amount, config);
    let kpis = ExpensesKpis::compute(filtered, &expenses_over_time, config);

    let by_category = Aggregation::group_sum(
        filtered,
        |r| config.label_or_missing(&r.category),
        |r| r.amount,
    );
    let by_subcategory = Aggregation::group_sum(
        filtered,
        |r| config.label_or_missing(&r.subcategory),
        |r| r.amount,
    );
    let by_detail = Aggregation::group_sum(
        filtered,
        |r| config.label_or_missing(&r.detail),
        |r| r.amount,
    );

    let yearly_comparison =
        pivot_year_over_year(&monthly_series(all, |r| r.amount, config), config);
    let mut available_years: Vec<i32> = all.iter().map(|r| r.year).collect();
    available_years.sort_unstable_by(|a, b| b.cmp(a));
    available_years.dedup();

    Some(ExpensesAnalysis {
        kpis,
        expenses_over_time,
        top_subcategories: by_subcategory.top(config.top_n),
        category_shares: by_category.shares(),
        by_category,
        by_subcategory,
        by_detail,
        yearly_comparison,
        available_years,
        records: filtered.to_vec(),
    })
}

impl ExpensesAnalysis {
    /// Re-aggregates the kept records for a drill-down selection.
    pub fn drill_down(&self, path: &DrillPath, config: &EngineConfig) -> ExpenseDrillView {
        if path.is_root() {
            return ExpenseDrillView {
                path: path.clone(),
                kpis: self.kpis.clone(),
                expenses_over_time: self.expenses_over_time.clone(),
                distribution: self.category_shares.clone(),
                subcategories: self.by_subcategory.clone(),
                details: self.by_detail.clone(),
                top_items: self.top_subcategories.clone(),
            };
        }

        let scoped = path.scope(&self.records, config);
        debug!(
            "Drill-down {:?}/{:?} keeps {} of {} records",
            path.category,
            path.subcategory,
            scoped.len(),
            self.records.len()
        );

        // The subcategory table only narrows by category; the detail table follows the full path.
        let category_only = DrillPath {
            category: path.category.clone(),
            subcategory: None,
        };
        let subcategories = Aggregation::group_sum(
            category_only.scope(&self.records, config),
            |r| config.label_or_missing(&r.subcategory),
            |r| r.amount,
        );
        let details = Aggregation::group_sum(
            scoped.iter().copied(),
            |r| config.label_or_missing(&r.detail),
            |r| r.amount,
        );

        let series = monthly_series(scoped.iter().copied(), |r| r.amount, config);
        let kpis = ExpensesKpis::compute(scoped.iter().copied(), &series, config);

        let (distribution, top_items) = if path.subcategory.is_some() {
            (details.shares(), details.top(config.top_n))
        } else {
            let in_category = Aggregation::group_sum(
                scoped.iter().copied(),
                |r| config.label_or_missing(&r.subcategory),
                |r| r.amount,
            );
            (in_category.shares(), in_category.top(config.top_n))
        };

        ExpenseDrillView {
            path: path.clone(),
            kpis,
            expenses_over_time: series,
            distribution,
            subcategories,
            details,
            top_items,
        }
    }
}
