use chrono::{Datelike, Months, NaiveDate};

pub fn first_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    first_day_of_month(year, month)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
}

/// Completed years from `from` to `to` (birthday arithmetic). Zero when `to` precedes `from`.
pub fn whole_years_between(from: NaiveDate, to: NaiveDate) -> u32 {
    if to <= from {
        return 0;
    }
    let mut years = to.year() - from.year();
    if (to.month(), to.day()) < (from.month(), from.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

/// Elapsed time in fractional years, using the mean Gregorian year.
pub fn fractional_years_between(from: NaiveDate, to: NaiveDate) -> f64 {
    if to <= from {
        return 0.0;
    }
    (to - from).num_days() as f64 / 365.25
}

/// Returns `numerator / denominator * 100`, or zero when the denominator is zero.
pub fn percentage(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator * 100.0
    }
}

/// Returns `numerator / denominator`, or zero when the denominator is zero.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(last_day_of_month(2023, 2), Some(d(2023, 2, 28)));
        assert_eq!(last_day_of_month(2024, 2), Some(d(2024, 2, 29)));
        assert_eq!(last_day_of_month(2023, 12), Some(d(2023, 12, 31)));
        assert_eq!(last_day_of_month(2023, 13), None);
    }

    #[test]
    fn test_whole_years_between() {
        assert_eq!(whole_years_between(d(1990, 6, 15), d(2024, 6, 14)), 33);
        assert_eq!(whole_years_between(d(1990, 6, 15), d(2024, 6, 15)), 34);
        assert_eq!(whole_years_between(d(2024, 1, 1), d(2023, 1, 1)), 0);
    }

    #[test]
    fn test_guarded_division() {
        assert_eq!(percentage(800.0, 1000.0), 80.0);
        assert_eq!(percentage(5.0, 0.0), 0.0);
        assert_eq!(ratio(1.0, 0.0), 0.0);
        assert!(!percentage(0.0, 0.0).is_nan());
    }
}
