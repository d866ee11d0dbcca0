//! HR analysis. Roster metrics come from every record on file; activity
//! metrics come from the filtered events. An empty filtered set still yields a
//! result, with `has_activity == false`.

use super::distinct_count;
use crate::aggregate::{AggregateEntry, Aggregation};
use crate::config::EngineConfig;
use crate::filters::HrFilters;
use crate::periods::{
    month_over_month_change, monthly_series, pivot_year_over_year, MonthlyPoint, YearOverYear,
};
use crate::schema::HrRecord;
use crate::utils::{fractional_years_between, ratio, whole_years_between};
use chrono::NaiveDate;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const TENURE_BANDS: [(&str, f64); 5] = [
    ("< 1 año", 1.0),
    ("1-3 años", 3.0),
    ("3-5 años", 5.0),
    ("5-10 años", 10.0),
    ("10+ años", f64::INFINITY),
];

const AGE_BANDS: [(&str, u32); 5] = [
    ("< 25", 25),
    ("25-34", 35),
    ("35-44", 45),
    ("45-54", 55),
    ("55+", u32::MAX),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BandCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RosterMetrics {
    /// Latest event date on file. Tenure, age and activity status are measured here.
    pub reference_date: Option<NaiveDate>,
    pub employees_on_file: usize,
    pub active_employees: usize,
    pub terminated_employees: usize,
    pub average_tenure_years: f64,
    pub average_age_years: f64,
    pub tenure_bands: Vec<BandCount>,
    pub age_bands: Vec<BandCount>,
    /// Employees whose entry date falls in the selected years and months.
    pub hires_in_period: usize,
    /// Employees whose termination date falls in the selected years and months.
    pub terminations_in_period: usize,
    pub headcount_by_area: Aggregation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HrActivityKpis {
    pub event_count: usize,
    /// Month-over-month % change of the event count.
    pub event_change: f64,
    pub employees_with_events: usize,
    pub events_per_active_employee: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HrAnalysis {
    pub roster: RosterMetrics,
    pub has_activity: bool,
    pub activity: HrActivityKpis,
    pub events_over_time: Vec<MonthlyPoint>,
    pub by_area: Aggregation,
    pub by_activity: Aggregation,
    pub by_type: Aggregation,
    pub top_employees: Vec<AggregateEntry>,
    /// Event counts over every record on file.
    pub yearly_comparison: YearOverYear,
}

pub fn analyze_hr(
    filtered: &[HrRecord],
    all: &[HrRecord],
    filters: &HrFilters,
    config: &EngineConfig,
) -> HrAnalysis {
    debug!(
        "Analyzing {} of {} HR records",
        filtered.len(),
        all.len()
    );

    let roster = roster_metrics(all, filters, config);

    let events_over_time = monthly_series(filtered, |_| 1.0, config);
    let by_employee = Aggregation::group_count(filtered, |r| config.label_or_missing(&r.employee));

    let activity = HrActivityKpis {
        event_count: filtered.len(),
        event_change: month_over_month_change(&events_over_time),
        employees_with_events: distinct_count(filtered.iter().map(|r| r.employee.as_str())),
        events_per_active_employee: ratio(filtered.len() as f64, roster.active_employees as f64),
    };

    HrAnalysis {
        has_activity: !filtered.is_empty(),
        activity,
        events_over_time,
        by_area: Aggregation::group_count(filtered, |r| config.label_or_missing(&r.area)),
        by_activity: Aggregation::group_count(filtered, |r| config.label_or_missing(&r.activity)),
        by_type: Aggregation::group_count(filtered, |r| config.label_or_missing(&r.kind)),
        top_employees: by_employee.top(config.top_n),
        yearly_comparison: pivot_year_over_year(&monthly_series(all, |_| 1.0, config), config),
        roster,
    }
}

/// The most recent record of each employee carries their current roster data.
fn latest_per_employee(all: &[HrRecord]) -> Vec<&HrRecord> {
    let mut latest: HashMap<&str, &HrRecord> = HashMap::new();
    for record in all {
        latest
            .entry(record.employee.as_str())
            .and_modify(|current| {
                if record.date >= current.date {
                    *current = record;
                }
            })
            .or_insert(record);
    }

    let mut roster: Vec<&HrRecord> = latest.into_values().collect();
    roster.sort_by(|a, b| a.employee.cmp(&b.employee));
    roster
}

fn is_active(record: &HrRecord, reference: NaiveDate) -> bool {
    record.termination_date.map_or(true, |t| t > reference)
}

fn roster_metrics(all: &[HrRecord], filters: &HrFilters, config: &EngineConfig) -> RosterMetrics {
    let roster = latest_per_employee(all);
    let reference_date = all.iter().map(|r| r.date).max();

    let mut tenure_counts = [0usize; TENURE_BANDS.len()];
    let mut age_counts = [0usize; AGE_BANDS.len()];
    let mut tenure_sum = 0.0;
    let mut age_sum = 0.0;
    let mut active: Vec<&HrRecord> = Vec::new();

    if let Some(reference) = reference_date {
        for record in roster.iter().copied().filter(|r| is_active(r, reference)) {
            let tenure = fractional_years_between(record.entry_date, reference);
            let age = whole_years_between(record.birth_date, reference);
            tenure_sum += tenure;
            age_sum += age as f64;

            if let Some(idx) = TENURE_BANDS.iter().position(|(_, upper)| tenure < *upper) {
                tenure_counts[idx] += 1;
            }
            if let Some(idx) = AGE_BANDS.iter().position(|(_, upper)| age < *upper) {
                age_counts[idx] += 1;
            }
            active.push(record);
        }
    }

    let hires_in_period = roster
        .iter()
        .filter(|r| filters.period_allows(r.entry_date))
        .count();
    let terminations_in_period = roster
        .iter()
        .filter_map(|r| r.termination_date)
        .filter(|d| filters.period_allows(*d))
        .count();

    RosterMetrics {
        reference_date,
        employees_on_file: roster.len(),
        active_employees: active.len(),
        terminated_employees: roster.len() - active.len(),
        average_tenure_years: ratio(tenure_sum, active.len() as f64),
        average_age_years: ratio(age_sum, active.len() as f64),
        tenure_bands: bands(&TENURE_BANDS.map(|(label, _)| label), &tenure_counts),
        age_bands: bands(&AGE_BANDS.map(|(label, _)| label), &age_counts),
        hires_in_period,
        terminations_in_period,
        headcount_by_area: Aggregation::group_count(active.iter().copied(), |r| {
            config.label_or_missing(&r.area)
        }),
    }
}

fn bands(labels: &[&str], counts: &[usize]) -> Vec<BandCount> {
    labels
        .iter()
        .zip(counts)
        .map(|(label, count)| BandCount {
            label: label.to_string(),
            count: *count,
        })
        .collect()
}
