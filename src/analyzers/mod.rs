//! Per-domain analyzers. Each one is a pure function of its record slices,
//! filters and configuration.

pub mod expenses;
pub mod hr;
pub mod purchases;
pub mod sales;
pub mod stock;

pub use expenses::{analyze_expenses, ExpenseDrillView, ExpensesAnalysis, ExpensesKpis};
pub use hr::{analyze_hr, BandCount, HrActivityKpis, HrAnalysis, RosterMetrics};
pub use purchases::{analyze_purchases, PurchasePoint, PurchasesAnalysis, PurchasesKpis};
pub use sales::{analyze_sales, BranchSeries, SalesAnalysis, SalesKpis};
pub use stock::{
    analyze_stock, CrossDomainData, PeriodContext, StockAnalysis, StockContextRow, StockKpis,
    StockPoint,
};

use std::collections::HashSet;

fn distinct_count<'a, I>(values: I) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    values.into_iter().collect::<HashSet<_>>().len()
}
