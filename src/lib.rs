//! # Business Analytics Engine
//!
//! Aggregation core for a multi-domain business intelligence dashboard. Flat
//! tabular exports (sales, purchases, expenses, HR events, stock snapshots and
//! sales goals) are filtered, sign-normalized, bucketed by month and reduced into
//! KPI cards, rankings, pies and year-over-year tables.
//!
//! ## Core Concepts
//!
//! - **Records**: Immutable rows per domain, ingested once from CSV exports
//! - **Filters**: Set-membership predicates where an empty selection means "no restriction"
//! - **Sign Normalization**: Credit notes subtract from revenue, debit notes are ignored
//! - **Period Keys**: `YYYY-MM` buckets that sort chronologically as text
//! - **Goals**: Monthly sales targets per branch, reconciled against the net sales on file
//!
//! ## Example
//!
//! ```rust,ignore
//! use business_analytics_engine::*;
//! use std::fs::File;
//!
//! let engine = AnalyticsEngine::new(EngineConfig::default())?;
//!
//! let mut workspace = Workspace::new();
//! workspace.apply_sales_upload(read_sales(File::open("ventas.csv")?), engine.normalizer())?;
//! workspace.add_goal("CENTRO", 2024, 3, 1_500_000.0)?;
//!
//! let mut filters = DashboardFilters::default();
//! filters.sales.branches = Selection::only(["CENTRO".to_string()]);
//!
//! let results = engine.analyze_workspace(&workspace, &filters);
//! if let Some(sales) = &results.sales {
//!     println!("Net revenue: {:.2}", sales.kpis.total_revenue);
//! }
//! ```

pub mod aggregate;
pub mod analyzers;
pub mod colors;
pub mod config;
pub mod drilldown;
pub mod error;
pub mod filters;
pub mod goals;
pub mod ingestion;
pub mod periods;
pub mod schema;
pub mod session;
pub mod sign;
pub mod utils;

pub use aggregate::{AggregateEntry, Aggregation, ShareEntry, TopSplit};
pub use analyzers::{
    BandCount, BranchSeries, CrossDomainData, ExpenseDrillView, ExpensesAnalysis, ExpensesKpis,
    HrActivityKpis, HrAnalysis, PeriodContext, PurchasePoint, PurchasesAnalysis, PurchasesKpis,
    RosterMetrics, SalesAnalysis, SalesKpis, StockAnalysis, StockContextRow, StockKpis,
    StockPoint,
};
pub use colors::{assign_colors, ColorMap, PALETTE};
pub use config::EngineConfig;
pub use drilldown::DrillPath;
pub use error::{AnalyticsError, Result};
pub use filters::*;
pub use goals::{
    compliance_report, goal_compliance, BranchCompliance, ComplianceReport, ComplianceStatus,
    GoalBook, GoalComplianceRow, GoalKey, GoalSummary, SalesGoal,
};
pub use ingestion::*;
pub use periods::{MonthlyPoint, PeriodKey, TopMonth, YearOverYear, YearOverYearRow};
pub use schema::*;
pub use session::{
    AnalysisKey, Debouncer, Dataset, FilterOptions, Generations, Memo, Workspace,
};
pub use sign::{DocumentKind, SignNormalizer};

use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Every dashboard computed for one set of filters. A domain without data is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardResults {
    pub sales: Option<SalesAnalysis>,
    pub goals: Option<GoalSummary>,
    pub goal_report: ComplianceReport,
    pub purchases: Option<PurchasesAnalysis>,
    pub expenses: Option<ExpensesAnalysis>,
    pub hr: Option<HrAnalysis>,
    pub stock: Option<StockAnalysis>,
}

pub struct AnalyticsEngine {
    config: EngineConfig,
    normalizer: SignNormalizer,
}

impl Default for AnalyticsEngine {
    fn default() -> Self {
        let config = EngineConfig::default();
        let normalizer = SignNormalizer::new(&config);
        Self { config, normalizer }
    }
}

impl AnalyticsEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let normalizer = SignNormalizer::new(&config);
        debug!(
            "Engine configured with {} credit-note codes, {} debit-note codes, {} tax categories",
            config.credit_note_codes.len(),
            config.debit_note_codes.len(),
            config.tax_categories.len()
        );
        Ok(Self { config, normalizer })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &SignNormalizer {
        &self.normalizer
    }

    pub fn analyze_sales(
        &self,
        all: &[SaleRecord],
        filters: &SalesFilters,
    ) -> Option<SalesAnalysis> {
        let filtered = filters.apply(all);
        info!("Analyzing sales: {} of {} records selected", filtered.len(), all.len());
        analyzers::analyze_sales(&filtered, filters, all, &self.normalizer, &self.config)
    }

    /// `all_sales` feeds the same-period sales overlay and is not filtered.
    pub fn analyze_purchases(
        &self,
        all: &[PurchaseRecord],
        filters: &PurchaseFilters,
        all_sales: &[SaleRecord],
    ) -> Option<PurchasesAnalysis> {
        let filtered = filters.apply(all);
        info!(
            "Analyzing purchases: {} of {} records selected",
            filtered.len(),
            all.len()
        );
        analyzers::analyze_purchases(&filtered, all_sales, &self.normalizer, &self.config)
    }

    pub fn analyze_expenses(
        &self,
        all: &[ExpenseRecord],
        filters: &ExpenseFilters,
    ) -> Option<ExpensesAnalysis> {
        let filtered = filters.apply(all);
        info!(
            "Analyzing expenses: {} of {} records selected",
            filtered.len(),
            all.len()
        );
        analyzers::analyze_expenses(&filtered, all, &self.config)
    }

    pub fn analyze_hr(&self, all: &[HrRecord], filters: &HrFilters) -> HrAnalysis {
        let filtered = filters.apply(all);
        info!("Analyzing HR: {} of {} records selected", filtered.len(), all.len());
        analyzers::analyze_hr(&filtered, all, filters, &self.config)
    }

    pub fn analyze_stock(
        &self,
        all: &[StockRecord],
        filters: &StockFilters,
        related: CrossDomainData<'_>,
    ) -> Option<StockAnalysis> {
        let filtered = filters.apply(all);
        info!("Analyzing stock: {} of {} records selected", filtered.len(), all.len());
        analyzers::analyze_stock(
            &filtered,
            all,
            filters,
            related,
            &self.normalizer,
            &self.config,
        )
    }

    /// Aggregate compliance of the goals that pass the sales filters, with actuals
    /// recomputed from every sale on file.
    pub fn goal_summary(
        &self,
        goals: &[SalesGoal],
        all_sales: &[SaleRecord],
        filters: &SalesFilters,
    ) -> Option<GoalSummary> {
        goal_compliance(goals, all_sales, filters, &self.normalizer)
    }

    pub fn goal_report(
        &self,
        goals: &[SalesGoal],
        all_sales: &[SaleRecord],
        filters: &SalesFilters,
    ) -> ComplianceReport {
        let reconciled = goals::recompute_actuals(goals, all_sales, &self.normalizer);
        compliance_report(&reconciled, filters, &self.config)
    }

    pub fn analyze_workspace(
        &self,
        workspace: &Workspace,
        filters: &DashboardFilters,
    ) -> DashboardResults {
        let sales = workspace.sales.records();
        let goals = workspace.goals().goals();

        let hr = if workspace.hr.is_empty() {
            None
        } else {
            Some(self.analyze_hr(workspace.hr.records(), &filters.hr))
        };

        DashboardResults {
            sales: self.analyze_sales(sales, &filters.sales),
            goals: self.goal_summary(goals, sales, &filters.sales),
            goal_report: self.goal_report(goals, sales, &filters.sales),
            purchases: self.analyze_purchases(
                workspace.purchases.records(),
                &filters.purchases,
                sales,
            ),
            expenses: self.analyze_expenses(workspace.expenses.records(), &filters.expenses),
            hr,
            stock: self.analyze_stock(
                workspace.stock.records(),
                &filters.stock,
                workspace.cross_domain(),
            ),
        }
    }

    /// Same as [`Self::analyze_workspace`], reusing the memoized results while
    /// neither the datasets nor the filters have changed.
    pub fn analyze_workspace_cached<'m>(
        &self,
        memo: &'m mut Memo<AnalysisKey, DashboardResults>,
        workspace: &Workspace,
        filters: &DashboardFilters,
    ) -> &'m DashboardResults {
        let key = AnalysisKey {
            generations: workspace.generations(),
            filters: filters.clone(),
        };
        if memo.is_cached(&key) {
            debug!("Reusing memoized dashboard results");
        }
        memo.get_or_compute(key, || self.analyze_workspace(workspace, filters))
    }
}

pub fn analyze_dashboard(
    workspace: &Workspace,
    filters: &DashboardFilters,
    config: &EngineConfig,
) -> Result<DashboardResults> {
    Ok(AnalyticsEngine::new(config.clone())?.analyze_workspace(workspace, filters))
}

pub fn goal_report(
    goals: &[SalesGoal],
    all_sales: &[SaleRecord],
    filters: &SalesFilters,
    config: &EngineConfig,
) -> Result<ComplianceReport> {
    Ok(AnalyticsEngine::new(config.clone())?.goal_report(goals, all_sales, filters))
}
