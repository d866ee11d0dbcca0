use super::distinct_count;
use crate::aggregate::{AggregateEntry, Aggregation, ShareEntry};
use crate::config::EngineConfig;
use crate::filters::{RecordFilter, SalesFilters};
use crate::periods::{
    month_over_month_change, monthly_series, pivot_year_over_year, top_month, MonthlyPoint,
    TopMonth, YearOverYear,
};
use crate::schema::{FiscalType, SaleRecord};
use crate::sign::{DocumentKind, SignNormalizer};
use crate::utils::ratio;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SalesKpis {
    /// Net revenue: sales minus credit notes, debit notes excluded.
    pub total_revenue: f64,
    /// Month-over-month % change of net revenue.
    pub revenue_change: f64,
    pub total_units: i64,
    pub sales_count: usize,
    pub credit_note_count: usize,
    /// Absolute amount reversed by credit notes.
    pub credit_note_amount: f64,
    pub debit_note_count: usize,
    /// Net revenue per ordinary sale document.
    pub average_ticket: f64,
    pub unique_clients: usize,
    pub declared_revenue: f64,
    pub undeclared_revenue: f64,
    pub top_month: Option<TopMonth>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BranchSeries {
    pub branch: String,
    pub points: Vec<MonthlyPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SalesAnalysis {
    pub kpis: SalesKpis,
    pub sales_over_time: Vec<MonthlyPoint>,
    pub by_branch: Aggregation,
    pub branch_shares: Vec<ShareEntry>,
    pub by_salesperson: Aggregation,
    pub top_salespeople: Vec<AggregateEntry>,
    pub by_client: Aggregation,
    pub top_clients: Vec<AggregateEntry>,
    /// Top clients plus an "other" slice.
    pub client_distribution: Vec<ShareEntry>,
    pub fiscal_type_shares: Vec<ShareEntry>,
    pub branch_over_time: Vec<BranchSeries>,
    /// Built from the full history, restricted to the selected branches and salespeople.
    pub yearly_comparison: YearOverYear,
}

/// Analyzes the filtered sales. `None` when nothing passed the filters.
pub fn analyze_sales(
    filtered: &[SaleRecord],
    filters: &SalesFilters,
    all: &[SaleRecord],
    normalizer: &SignNormalizer,
    config: &EngineConfig,
) -> Option<SalesAnalysis> {
    if filtered.is_empty() {
        return None;
    }

    debug!(
        "Analyzing {} of {} sales records",
        filtered.len(),
        all.len()
    );

    let revenue: Vec<&SaleRecord> = filtered
        .iter()
        .filter(|r| normalizer.affects_revenue(r))
        .collect();

    let sales_over_time = monthly_series(
        revenue.iter().copied(),
        |r| normalizer.signed_total(r),
        config,
    );

    let kpis = sales_kpis(filtered, &revenue, &sales_over_time, normalizer);

    let by_branch = Aggregation::group_sum(
        revenue.iter().copied(),
        |r| config.label_or_missing(&r.branch),
        |r| normalizer.signed_total(r),
    );
    let by_salesperson = Aggregation::group_sum(
        revenue.iter().copied(),
        |r| config.label_or_missing(&r.salesperson),
        |r| normalizer.signed_total(r),
    );
    let by_client = Aggregation::group_sum(
        revenue.iter().copied(),
        |r| config.label_or_missing(&r.client),
        |r| normalizer.signed_total(r),
    );
    let by_fiscal_type = Aggregation::group_sum(
        revenue.iter().copied(),
        |r| r.fiscal_type.label().to_string(),
        |r| normalizer.signed_total(r),
    );

    let branch_over_time = by_branch
        .entries
        .iter()
        .map(|entry| BranchSeries {
            branch: entry.name.clone(),
            points: monthly_series(
                revenue
                    .iter()
                    .copied()
                    .filter(|r| config.label_or_missing(&r.branch) == entry.name),
                |r| normalizer.signed_total(r),
                config,
            ),
        })
        .collect();

    let entity_filter = filters.without_period();
    let history: Vec<&SaleRecord> = all
        .iter()
        .filter(|r| entity_filter.matches(r) && normalizer.affects_revenue(r))
        .collect();
    let yearly_comparison = pivot_year_over_year(
        &monthly_series(history, |r| normalizer.signed_total(r), config),
        config,
    );

    Some(SalesAnalysis {
        kpis,
        sales_over_time,
        branch_shares: by_branch.shares(),
        top_salespeople: by_salesperson.top(config.top_n),
        top_clients: by_client.top(config.top_n),
        client_distribution: by_client.top_shares_with_other(config.pie_slices, &config.other_label),
        fiscal_type_shares: by_fiscal_type.shares(),
        by_branch,
        by_salesperson,
        by_client,
        branch_over_time,
        yearly_comparison,
    })
}

fn sales_kpis(
    filtered: &[SaleRecord],
    revenue: &[&SaleRecord],
    series: &[MonthlyPoint],
    normalizer: &SignNormalizer,
) -> SalesKpis {
    let mut sales_count = 0;
    let mut credit_note_count = 0;
    let mut credit_note_amount = 0.0;
    let mut debit_note_count = 0;
    let mut declared_revenue = 0.0;
    let mut undeclared_revenue = 0.0;
    let mut total_units = 0;

    for record in filtered {
        let kind = normalizer.kind(record);
        match kind {
            DocumentKind::Sale => sales_count += 1,
            DocumentKind::CreditNote => {
                credit_note_count += 1;
                credit_note_amount += record.total.abs();
            }
            DocumentKind::DebitNote => {
                debit_note_count += 1;
                continue;
            }
        }

        let signed = normalizer.signed_total(record);
        match record.fiscal_type {
            FiscalType::Declared => declared_revenue += signed,
            FiscalType::Undeclared => undeclared_revenue += signed,
        }
        total_units += normalizer.signed_quantity(record);
    }

    let total_revenue = declared_revenue + undeclared_revenue;

    SalesKpis {
        total_revenue,
        revenue_change: month_over_month_change(series),
        total_units,
        sales_count,
        credit_note_count,
        credit_note_amount,
        debit_note_count,
        average_ticket: ratio(total_revenue, sales_count as f64),
        unique_clients: distinct_count(revenue.iter().map(|r| r.client.as_str())),
        declared_revenue,
        undeclared_revenue,
        top_month: top_month(series),
    }
}
