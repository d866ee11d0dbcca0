//! Sales goals: reconciliation of targets against sign-normalized sales,
//! compliance summaries and the caller-owned goal list.

use crate::config::EngineConfig;
use crate::error::{AnalyticsError, Result};
use crate::filters::SalesFilters;
use crate::periods::PeriodKey;
use crate::schema::{Dated, SaleRecord};
use crate::sign::SignNormalizer;
use crate::utils::percentage;
use chrono::NaiveDate;
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Achievement (in %) from which a goal that is not yet met counts as on track.
pub const ON_TRACK_THRESHOLD: f64 = 80.0;

/// Composite identity of a goal. Branches are compared trimmed and upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub struct GoalKey {
    pub branch: String,
    pub year: i32,
    pub month: u32,
}

impl GoalKey {
    pub fn new(branch: &str, year: i32, month: u32) -> Self {
        Self {
            branch: branch.trim().to_uppercase(),
            year,
            month,
        }
    }

    /// `BRANCH-YEAR-MONTH`, e.g. `CENTRO-2024-1`.
    pub fn id(&self) -> String {
        format!("{}-{}-{}", self.branch, self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SalesGoal {
    #[schemars(description = "Composite id 'BRANCH-YEAR-MONTH'")]
    pub id: String,
    pub branch: String,
    pub year: i32,
    pub month: u32,

    #[schemars(description = "Sales target for the branch and month")]
    pub goal_amount: f64,

    #[schemars(
        description = "Net sales of the branch and month. Recomputed from the sales dataset, never taken as truth."
    )]
    #[serde(default)]
    pub actual_amount: f64,
}

impl SalesGoal {
    /// Builds a goal with a positive target and no actual sales yet.
    pub fn new(branch: &str, year: i32, month: u32, goal_amount: f64) -> Result<Self> {
        if goal_amount <= 0.0 || !goal_amount.is_finite() {
            return Err(AnalyticsError::InvalidGoal(format!(
                "Target must be greater than zero, got {}",
                goal_amount
            )));
        }
        Self::with_amounts(branch, year, month, goal_amount, 0.0)
    }

    /// Builds a goal as found in an import: zero targets are accepted.
    pub fn with_amounts(
        branch: &str,
        year: i32,
        month: u32,
        goal_amount: f64,
        actual_amount: f64,
    ) -> Result<Self> {
        let key = GoalKey::new(branch, year, month);
        if key.branch.is_empty() {
            return Err(AnalyticsError::InvalidGoal("Branch is required".to_string()));
        }
        if !(2000..=2100).contains(&year) {
            return Err(AnalyticsError::InvalidGoal(format!(
                "Year {} is outside 2000-2100",
                year
            )));
        }
        if !(1..=12).contains(&month) {
            return Err(AnalyticsError::InvalidMonth(month));
        }
        if goal_amount < 0.0 || !goal_amount.is_finite() {
            return Err(AnalyticsError::InvalidGoal(format!(
                "Target must not be negative, got {}",
                goal_amount
            )));
        }

        Ok(Self {
            id: key.id(),
            branch: key.branch,
            year,
            month,
            goal_amount,
            actual_amount,
        })
    }

    pub fn key(&self) -> GoalKey {
        GoalKey::new(&self.branch, self.year, self.month)
    }

    /// Rewrites `branch` and `id` from the composite key, discarding a stored
    /// id that disagrees with the branch, year and month.
    fn normalize_identity(&mut self) {
        let key = self.key();
        self.id = key.id();
        self.branch = key.branch;
    }

    /// The 15th of the goal's month, used against date-range filters.
    pub fn representative_date(&self) -> Option<NaiveDate> {
        PeriodKey::new(self.year, self.month)
            .ok()
            .and_then(|p| p.representative_date())
    }

    pub fn achievement(&self) -> f64 {
        percentage(self.actual_amount, self.goal_amount)
    }

    pub fn difference(&self) -> f64 {
        self.actual_amount - self.goal_amount
    }
}

/// Net sales per (branch, year, month).
pub fn sales_by_branch_period(
    sales: &[SaleRecord],
    normalizer: &SignNormalizer,
) -> HashMap<GoalKey, f64> {
    let mut totals: HashMap<GoalKey, f64> = HashMap::new();
    for record in sales {
        if !normalizer.affects_revenue(record) {
            continue;
        }
        let key = GoalKey::new(&record.branch, record.year(), record.month());
        *totals.entry(key).or_insert(0.0) += normalizer.signed_total(record);
    }
    totals
}

/// Copies of `goals` with `actual_amount` taken from the sales. A goal without
/// matching sales gets zero.
pub fn recompute_actuals(
    goals: &[SalesGoal],
    sales: &[SaleRecord],
    normalizer: &SignNormalizer,
) -> Vec<SalesGoal> {
    let totals = sales_by_branch_period(sales, normalizer);
    goals
        .iter()
        .map(|goal| SalesGoal {
            actual_amount: totals.get(&goal.key()).copied().unwrap_or(0.0),
            ..goal.clone()
        })
        .collect()
}

/// Whether the goal's branch and month pass the active sales filters. The
/// salesperson selection does not apply to goals.
pub fn goal_matches(goal: &SalesGoal, filters: &SalesFilters) -> bool {
    let range = filters.date_range();
    let in_range = range.is_unbounded()
        || goal
            .representative_date()
            .map_or(false, |date| range.contains(date));

    filters.branches.allows(goal.branch.as_str())
        && filters.years.allows(&goal.year)
        && filters.months.allows(&goal.month)
        && in_range
}

pub fn relevant_goals<'a>(goals: &'a [SalesGoal], filters: &SalesFilters) -> Vec<&'a SalesGoal> {
    goals.iter().filter(|g| goal_matches(g, filters)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GoalSummary {
    pub total_goal: f64,
    pub total_actual: f64,
    /// `total_actual / total_goal * 100`, zero without targets.
    pub achievement: f64,
    pub difference: f64,
}

/// `None` when there is no goal to summarize.
pub fn summarize_goals<'a, I>(goals: I) -> Option<GoalSummary>
where
    I: IntoIterator<Item = &'a SalesGoal>,
{
    let mut count = 0;
    let mut total_goal = 0.0;
    let mut total_actual = 0.0;
    for goal in goals {
        count += 1;
        total_goal += goal.goal_amount;
        total_actual += goal.actual_amount;
    }

    if count == 0 {
        return None;
    }

    Some(GoalSummary {
        total_goal,
        total_actual,
        achievement: percentage(total_actual, total_goal),
        difference: total_actual - total_goal,
    })
}

/// Recomputes actuals from every sale on file, keeps the goals that pass the
/// sales filters and summarizes them.
pub fn goal_compliance(
    goals: &[SalesGoal],
    all_sales: &[SaleRecord],
    filters: &SalesFilters,
    normalizer: &SignNormalizer,
) -> Option<GoalSummary> {
    let reconciled = recompute_actuals(goals, all_sales, normalizer);
    let relevant = relevant_goals(&reconciled, filters);
    debug!(
        "{} of {} goals match the sales filters",
        relevant.len(),
        goals.len()
    );
    summarize_goals(relevant)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ComplianceStatus {
    Achieved,
    OnTrack,
    Behind,
}

impl ComplianceStatus {
    pub fn from_achievement(achievement: f64) -> Self {
        if achievement >= 100.0 {
            Self::Achieved
        } else if achievement >= ON_TRACK_THRESHOLD {
            Self::OnTrack
        } else {
            Self::Behind
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GoalComplianceRow {
    pub id: String,
    pub branch: String,
    pub period: PeriodKey,
    pub label: String,
    pub goal_amount: f64,
    pub actual_amount: f64,
    pub achievement: f64,
    pub difference: f64,
    pub status: ComplianceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BranchCompliance {
    pub branch: String,
    pub summary: GoalSummary,
    pub goal_count: usize,
    pub achieved_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ComplianceReport {
    pub summary: Option<GoalSummary>,
    /// Newest period first, then by branch.
    pub rows: Vec<GoalComplianceRow>,
    pub by_branch: Vec<BranchCompliance>,
}

/// Per-goal and per-branch compliance for the goals that pass the filters.
/// Actuals are taken as they are on the goals.
pub fn compliance_report(
    goals: &[SalesGoal],
    filters: &SalesFilters,
    config: &EngineConfig,
) -> ComplianceReport {
    let mut relevant = relevant_goals(goals, filters);
    relevant.sort_by(|a, b| newest_first(a, b));

    let rows = relevant
        .iter()
        .filter_map(|goal| {
            let period = PeriodKey::new(goal.year, goal.month).ok()?;
            let achievement = goal.achievement();
            Some(GoalComplianceRow {
                id: goal.id.clone(),
                branch: goal.branch.clone(),
                period,
                label: period.label(config),
                goal_amount: goal.goal_amount,
                actual_amount: goal.actual_amount,
                achievement,
                difference: goal.difference(),
                status: ComplianceStatus::from_achievement(achievement),
            })
        })
        .collect();

    let mut per_branch: BTreeMap<&str, Vec<&SalesGoal>> = BTreeMap::new();
    for goal in relevant.iter().copied() {
        per_branch.entry(goal.branch.as_str()).or_default().push(goal);
    }

    let by_branch = per_branch
        .into_iter()
        .filter_map(|(branch, goals)| {
            let summary = summarize_goals(goals.iter().copied())?;
            Some(BranchCompliance {
                branch: branch.to_string(),
                goal_count: goals.len(),
                achieved_count: goals
                    .iter()
                    .filter(|g| {
                        ComplianceStatus::from_achievement(g.achievement())
                            == ComplianceStatus::Achieved
                    })
                    .count(),
                summary,
            })
        })
        .collect();

    ComplianceReport {
        summary: summarize_goals(relevant.iter().copied()),
        rows,
        by_branch,
    }
}

fn newest_first(a: &SalesGoal, b: &SalesGoal) -> std::cmp::Ordering {
    b.year
        .cmp(&a.year)
        .then(b.month.cmp(&a.month))
        .then_with(|| a.branch.cmp(&b.branch))
}

/// The caller-owned goal list, with the uniqueness rule on the composite id.
///
/// Deserializing goes through [`GoalBook::from_goals`], so stored lists with
/// repeated ids load as one goal per id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct GoalBook {
    goals: Vec<SalesGoal>,
}

impl<'de> Deserialize<'de> for GoalBook {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let goals = Vec::<SalesGoal>::deserialize(deserializer)?;
        Ok(Self::from_goals(goals))
    }
}

impl GoalBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a book from stored goals, keeping the last goal for a repeated id.
    pub fn from_goals(goals: Vec<SalesGoal>) -> Self {
        let mut book = Self::new();
        book.import(goals);
        book
    }

    pub fn goals(&self) -> &[SalesGoal] {
        &self.goals
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&SalesGoal> {
        self.goals.iter().find(|g| g.id == id)
    }

    /// Adds a goal. Fails when the branch and month already have one or the
    /// target is not positive.
    pub fn add(&mut self, branch: &str, year: i32, month: u32, goal_amount: f64) -> Result<&SalesGoal> {
        let goal = SalesGoal::new(branch, year, month, goal_amount)?;
        if self.get(&goal.id).is_some() {
            return Err(AnalyticsError::DuplicateGoal {
                branch: goal.branch,
                year,
                month,
            });
        }

        info!("Adding goal {} with target {}", goal.id, goal_amount);
        self.goals.push(goal);
        let last = self.goals.len() - 1;
        Ok(&self.goals[last])
    }

    /// Changes the target of an existing goal. Its identity never changes.
    pub fn update_target(&mut self, id: &str, goal_amount: f64) -> Result<()> {
        if goal_amount <= 0.0 || !goal_amount.is_finite() {
            return Err(AnalyticsError::InvalidGoal(format!(
                "Target must be greater than zero, got {}",
                goal_amount
            )));
        }
        let goal = self
            .goals
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| AnalyticsError::GoalNotFound(id.to_string()))?;
        goal.goal_amount = goal_amount;
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<SalesGoal> {
        let idx = self
            .goals
            .iter()
            .position(|g| g.id == id)
            .ok_or_else(|| AnalyticsError::GoalNotFound(id.to_string()))?;
        Ok(self.goals.remove(idx))
    }

    /// Merges imported goals. An imported goal replaces the existing one with
    /// the same id in place; new ids are appended. Returns how many were merged.
    pub fn import(&mut self, imported: Vec<SalesGoal>) -> usize {
        let mut index: HashMap<String, usize> = self
            .goals
            .iter()
            .enumerate()
            .map(|(idx, g)| (g.id.clone(), idx))
            .collect();

        let count = imported.len();
        for mut goal in imported {
            goal.normalize_identity();
            match index.get(&goal.id) {
                Some(&idx) => self.goals[idx] = goal,
                None => {
                    index.insert(goal.id.clone(), self.goals.len());
                    self.goals.push(goal);
                }
            }
        }

        info!("Imported {} goals, {} on file", count, self.goals.len());
        count
    }

    /// Newest year first, then newest month, then branch.
    pub fn sorted(&self) -> Vec<&SalesGoal> {
        let mut goals: Vec<&SalesGoal> = self.goals.iter().collect();
        goals.sort_by(|a, b| newest_first(a, b));
        goals
    }

    pub fn recompute_actuals(&mut self, sales: &[SaleRecord], normalizer: &SignNormalizer) {
        self.goals = recompute_actuals(&self.goals, sales, normalizer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::Selection;
    use crate::schema::FiscalType;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sale(branch: &str, doc: &str, date: NaiveDate, total: f64) -> SaleRecord {
        SaleRecord {
            branch: branch.to_string(),
            document_type: doc.to_string(),
            quantity: 1,
            date,
            total,
            client: "C".to_string(),
            salesperson_id: 1,
            salesperson: "ANA".to_string(),
            fiscal_type: FiscalType::Declared,
        }
    }

    #[test]
    fn test_goal_summary_example() {
        let goals = vec![SalesGoal::new("A", 2024, 1, 1000.0).unwrap()];
        let sales = vec![
            sale("A", "FACTURA", d(2024, 1, 5), 900.0),
            sale("A", "NC", d(2024, 1, 6), 100.0),
            sale("A", "ND", d(2024, 1, 7), 5000.0),
            sale("B", "FACTURA", d(2024, 1, 7), 5000.0),
        ];

        let summary = goal_compliance(
            &goals,
            &sales,
            &SalesFilters::default(),
            &SignNormalizer::default(),
        )
        .unwrap();

        assert_eq!(summary.total_goal, 1000.0);
        assert_eq!(summary.total_actual, 800.0);
        assert!((summary.achievement - 80.0).abs() < 1e-9);
        assert_eq!(summary.difference, -200.0);
    }

    #[test]
    fn test_goal_without_sales_is_unmet_not_omitted() {
        let goals = vec![
            SalesGoal::new("A", 2024, 1, 1000.0).unwrap(),
            SalesGoal::new("B", 2024, 1, 500.0).unwrap(),
        ];
        let sales = vec![sale("A", "FACTURA", d(2024, 1, 5), 1000.0)];
        let reconciled = recompute_actuals(&goals, &sales, &SignNormalizer::default());

        assert_eq!(reconciled[1].actual_amount, 0.0);
        let summary = summarize_goals(&reconciled).unwrap();
        assert_eq!(summary.total_goal, 1500.0);
        assert_eq!(summary.total_actual, 1000.0);
    }

    #[test]
    fn test_no_relevant_goals_yields_none() {
        let goals = vec![SalesGoal::new("A", 2024, 1, 1000.0).unwrap()];
        let filters = SalesFilters {
            branches: Selection::only(["B".to_string()]),
            ..SalesFilters::default()
        };
        assert!(goal_compliance(&goals, &[], &filters, &SignNormalizer::default()).is_none());
        assert!(summarize_goals(&[]).is_none());
    }

    #[test]
    fn test_zero_targets_give_zero_achievement() {
        let goals = vec![SalesGoal::with_amounts("A", 2024, 1, 0.0, 50.0).unwrap()];
        let summary = summarize_goals(&goals).unwrap();
        assert_eq!(summary.achievement, 0.0);
        assert_eq!(summary.difference, 50.0);
    }

    #[test]
    fn test_date_range_uses_mid_month() {
        let goal = SalesGoal::new("A", 2024, 3, 100.0).unwrap();
        let mut filters = SalesFilters {
            start_date: Some(d(2024, 3, 15)),
            end_date: Some(d(2024, 3, 31)),
            ..SalesFilters::default()
        };
        assert!(goal_matches(&goal, &filters));

        filters.start_date = Some(d(2024, 3, 16));
        assert!(!goal_matches(&goal, &filters));

        filters.start_date = Some(d(2024, 3, 1));
        filters.end_date = Some(d(2024, 3, 14));
        assert!(!goal_matches(&goal, &filters));
    }

    #[test]
    fn test_salesperson_selection_does_not_apply() {
        let goal = SalesGoal::new("A", 2024, 3, 100.0).unwrap();
        let filters = SalesFilters {
            salespeople: Selection::only(["NADIE".to_string()]),
            ..SalesFilters::default()
        };
        assert!(goal_matches(&goal, &filters));
    }

    #[test]
    fn test_book_rejects_duplicates_and_bad_targets() {
        let mut book = GoalBook::new();
        assert_eq!(book.add(" centro ", 2024, 1, 1000.0).unwrap().id, "CENTRO-2024-1");

        let err = book.add("CENTRO", 2024, 1, 2000.0).unwrap_err();
        assert!(matches!(err, AnalyticsError::DuplicateGoal { .. }));
        assert!(book.add("CENTRO", 2024, 2, 0.0).is_err());
        assert!(book.add("CENTRO", 2024, 13, 10.0).is_err());
        assert!(book.add("", 2024, 2, 10.0).is_err());
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_book_update_and_remove() {
        let mut book = GoalBook::new();
        book.add("A", 2024, 1, 1000.0).unwrap();

        book.update_target("A-2024-1", 1500.0).unwrap();
        assert_eq!(book.get("A-2024-1").unwrap().goal_amount, 1500.0);
        assert!(book.update_target("A-2024-1", -1.0).is_err());
        assert!(matches!(
            book.update_target("B-2024-1", 10.0),
            Err(AnalyticsError::GoalNotFound(_))
        ));

        let removed = book.remove("A-2024-1").unwrap();
        assert_eq!(removed.branch, "A");
        assert!(book.is_empty());
        assert!(book.remove("A-2024-1").is_err());
    }

    #[test]
    fn test_import_is_last_write_wins() {
        let mut book = GoalBook::new();
        book.add("A", 2024, 1, 1000.0).unwrap();
        book.add("B", 2024, 1, 500.0).unwrap();

        let merged = book.import(vec![
            SalesGoal::with_amounts("B", 2024, 1, 700.0, 0.0).unwrap(),
            SalesGoal::with_amounts("C", 2024, 2, 300.0, 0.0).unwrap(),
            SalesGoal::with_amounts("C", 2024, 2, 350.0, 0.0).unwrap(),
        ]);

        assert_eq!(merged, 3);
        assert_eq!(book.len(), 3);
        assert_eq!(book.goals()[1].goal_amount, 700.0);
        assert_eq!(book.get("C-2024-2").unwrap().goal_amount, 350.0);
    }

    #[test]
    fn test_sorted_listing() {
        let mut book = GoalBook::new();
        book.add("B", 2023, 12, 1.0).unwrap();
        book.add("B", 2024, 1, 1.0).unwrap();
        book.add("A", 2024, 1, 1.0).unwrap();
        book.add("A", 2024, 2, 1.0).unwrap();

        let ids: Vec<&str> = book.sorted().iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["A-2024-2", "A-2024-1", "B-2024-1", "B-2023-12"]);
    }

    #[test]
    fn test_compliance_report() {
        let goals = vec![
            SalesGoal::with_amounts("A", 2024, 1, 1000.0, 1200.0).unwrap(),
            SalesGoal::with_amounts("A", 2024, 2, 1000.0, 850.0).unwrap(),
            SalesGoal::with_amounts("B", 2024, 2, 1000.0, 100.0).unwrap(),
        ];
        let report = compliance_report(&goals, &SalesFilters::default(), &EngineConfig::default());

        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.rows[0].id, "A-2024-2");
        assert_eq!(report.rows[0].status, ComplianceStatus::OnTrack);
        assert_eq!(report.rows[0].label, "Febrero 2024");
        assert_eq!(report.rows[1].status, ComplianceStatus::Behind);
        assert_eq!(report.rows[2].status, ComplianceStatus::Achieved);

        assert_eq!(report.by_branch.len(), 2);
        assert_eq!(report.by_branch[0].branch, "A");
        assert_eq!(report.by_branch[0].achieved_count, 1);
        assert_eq!(report.by_branch[0].summary.total_actual, 2050.0);
        assert_eq!(report.summary.unwrap().total_goal, 3000.0);
    }
}
