//! Year-month bucketing: `YYYY-MM` keys, localized labels, monthly series,
//! month-over-month deltas and year-over-year pivots.
//!
//! Keys are built from the record's own date components. When a key has to be
//! turned back into a date it is anchored on the 15th, so that no timezone or
//! rounding shift can push it into a neighbouring month.

use crate::config::EngineConfig;
use crate::error::{AnalyticsError, Result};
use crate::schema::Dated;
use crate::utils::{first_day_of_month, last_day_of_month, percentage};
use chrono::{Datelike, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Day used when a year-month key is reconstructed into a date.
pub const REPRESENTATIVE_DAY: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeriodKey {
    pub year: i32,
    pub month: u32,
}

impl PeriodKey {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(AnalyticsError::InvalidMonth(month));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parses a `YYYY-MM` key.
    pub fn parse(key: &str) -> Result<Self> {
        let trimmed = key.trim();
        let (year, month) = trimmed
            .split_once('-')
            .ok_or_else(|| AnalyticsError::InvalidPeriodKey(key.to_string()))?;

        if year.len() != 4 || month.len() != 2 {
            return Err(AnalyticsError::InvalidPeriodKey(key.to_string()));
        }

        let year: i32 = year
            .parse()
            .map_err(|_| AnalyticsError::InvalidPeriodKey(key.to_string()))?;
        let month: u32 = month
            .parse()
            .map_err(|_| AnalyticsError::InvalidPeriodKey(key.to_string()))?;

        Self::new(year, month).map_err(|_| AnalyticsError::InvalidPeriodKey(key.to_string()))
    }

    pub fn key(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    /// The 15th of the month; `None` only for years outside chrono's range.
    pub fn representative_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, REPRESENTATIVE_DAY)
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        first_day_of_month(self.year, self.month)
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        last_day_of_month(self.year, self.month)
    }

    /// Localized "Month Year" label, e.g. "Marzo 2024".
    pub fn label(&self, config: &EngineConfig) -> String {
        format!("{} {}", config.month_name(self.month), self.year)
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl JsonSchema for PeriodKey {
    fn schema_name() -> String {
        "PeriodKey".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for PeriodKey {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PeriodKey {
    type Error = AnalyticsError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PeriodKey> for String {
    fn from(key: PeriodKey) -> Self {
        key.key()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MonthlyPoint {
    pub period: PeriodKey,
    pub label: String,
    pub value: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TopMonth {
    pub period: PeriodKey,
    pub name: String,
    pub total: f64,
}

/// Sums `value` per year-month, chronologically ordered.
pub fn monthly_series<'a, R, I, V>(records: I, mut value: V, config: &EngineConfig) -> Vec<MonthlyPoint>
where
    R: Dated + 'a,
    I: IntoIterator<Item = &'a R>,
    V: FnMut(&R) -> f64,
{
    let mut buckets: BTreeMap<PeriodKey, (f64, usize)> = BTreeMap::new();
    for record in records {
        let slot = buckets.entry(record.period()).or_insert((0.0, 0));
        slot.0 += value(record);
        slot.1 += 1;
    }

    buckets
        .into_iter()
        .map(|(period, (value, count))| MonthlyPoint {
            period,
            label: period.label(config),
            value,
            count,
        })
        .collect()
}

/// Percent change of the last bucket against the one before it.
///
/// Zero with fewer than two buckets, or when the previous bucket is not positive.
pub fn month_over_month_change(series: &[MonthlyPoint]) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }
    let last = series[series.len() - 1].value;
    let previous = series[series.len() - 2].value;
    if previous <= 0.0 {
        return 0.0;
    }
    percentage(last - previous, previous)
}

/// The bucket with the highest value; the earliest wins ties.
pub fn top_month(series: &[MonthlyPoint]) -> Option<TopMonth> {
    let mut best: Option<&MonthlyPoint> = None;
    for point in series {
        match best {
            Some(current) if point.value <= current.value => {}
            _ => best = Some(point),
        }
    }
    best.map(|p| TopMonth {
        period: p.period,
        name: p.label.clone(),
        total: p.value,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct YearOverYearRow {
    pub month: u32,
    pub month_name: String,
    /// Value per year. Years without data for this month are absent.
    pub values: BTreeMap<i32, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct YearOverYear {
    pub years: Vec<i32>,
    pub rows: Vec<YearOverYearRow>,
}

impl YearOverYear {
    pub fn value(&self, year: i32, month: u32) -> Option<f64> {
        self.rows
            .iter()
            .find(|r| r.month == month)
            .and_then(|r| r.values.get(&year).copied())
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }
}

/// Pivots a year-month series into a 12-row month × year matrix.
pub fn pivot_year_over_year(series: &[MonthlyPoint], config: &EngineConfig) -> YearOverYear {
    if series.is_empty() {
        return YearOverYear::default();
    }

    let mut years: Vec<i32> = series.iter().map(|p| p.period.year).collect();
    years.sort();
    years.dedup();

    let mut rows: Vec<YearOverYearRow> = (1..=12)
        .map(|month| YearOverYearRow {
            month,
            month_name: config.month_name(month).to_string(),
            values: BTreeMap::new(),
        })
        .collect();

    for point in series {
        let row = &mut rows[(point.period.month - 1) as usize];
        *row.values.entry(point.period.year).or_insert(0.0) += point.value;
    }

    YearOverYear { years, rows }
}
