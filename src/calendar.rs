//! Month arithmetic shared by the schedule and reservation views.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};

use crate::error::{AppError, Result};
use crate::tables::Dated;

/// A calendar month written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(AppError::invalid(format!("invalid month {year}-{month}")));
        }
        Ok(YearMonth { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        YearMonth {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    pub fn days(self) -> u32 {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|next| next.pred_opt())
            .map(|last| last.day())
            .unwrap_or(31)
    }

    /// Whether a `YYYY-MM-DD` string falls in this month.
    pub fn contains(self, date: &str) -> bool {
        date.starts_with(self.to_string().as_str())
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        let bytes = value.as_bytes();
        if !value.is_ascii() || bytes.len() != 7 || bytes[4] != b'-' {
            return Err(AppError::invalid(format!(
                "expected a month as YYYY-MM, got `{value}`"
            )));
        }
        let year = value[..4].parse::<i32>();
        let month = value[5..].parse::<u32>();
        match (year, month) {
            (Ok(year), Ok(month)) => YearMonth::new(year, month),
            _ => Err(AppError::invalid(format!(
                "expected a month as YYYY-MM, got `{value}`"
            ))),
        }
    }
}

/// Parses a `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::invalid(format!("expected a date as YYYY-MM-DD, got `{value}`")))
}

/// Canonical `YYYY-MM-DD` form of a date string.
pub fn normalize_date(value: &str) -> Result<String> {
    Ok(parse_date(value)?.format("%Y-%m-%d").to_string())
}

/// Groups rows by day of `month`. Every day `1..=days` is present, empty
/// when nothing falls on it. Rows from other months or with unreadable dates
/// are left out.
pub fn month_buckets<T, I>(rows: I, month: YearMonth) -> BTreeMap<u32, Vec<T>>
where
    T: Dated,
    I: IntoIterator<Item = T>,
{
    let mut buckets: BTreeMap<u32, Vec<T>> =
        (1..=month.days()).map(|day| (day, Vec::new())).collect();
    for row in rows {
        let Ok(date) = NaiveDate::parse_from_str(row.date(), "%Y-%m-%d") else {
            continue;
        };
        if YearMonth::of(date) != month {
            continue;
        }
        if let Some(bucket) = buckets.get_mut(&date.day()) {
            bucket.push(row);
        }
    }
    buckets
}

/// Blank cells before day 1 in a Sunday-first month grid.
pub fn leading_blanks(month: YearMonth) -> u32 {
    NaiveDate::from_ymd_opt(month.year, month.month, 1)
        .map(|first| first.weekday().num_days_from_sunday())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::tables::Shift;

    fn shift(id: u64, date: &str) -> Shift {
        Shift {
            id,
            date: date.to_string(),
            user: "Kim".to_string(),
            start_time: "09:00".to_string(),
            end_time: "13:00".to_string(),
            color: "blue".to_string(),
        }
    }

    #[test]
    fn buckets_cover_every_day_of_the_month() {
        let may: YearMonth = "2024-05".parse().unwrap();
        let rows = vec![
            shift(1, "2024-05-01"),
            shift(2, "2024-05-15"),
            shift(3, "2024-06-01"),
            shift(4, "not a date"),
        ];
        let buckets = month_buckets(rows, may);
        assert_eq!(buckets.len(), 31);
        assert!(buckets.keys().copied().eq(1..=31));
        assert_eq!(buckets[&1].len(), 1);
        assert_eq!(buckets[&15].len(), 1);
        assert_eq!(buckets[&15][0].id, 2);
        let filled = buckets.values().filter(|rows| !rows.is_empty()).count();
        assert_eq!(filled, 2);
    }

    #[rstest]
    #[case("2024-02", 29)]
    #[case("2023-02", 28)]
    #[case("2024-04", 30)]
    #[case("2024-12", 31)]
    fn days_in_month(#[case] month: &str, #[case] expected: u32) {
        assert_eq!(month.parse::<YearMonth>().unwrap().days(), expected);
    }

    #[rstest]
    #[case("2024-05", 3)]
    #[case("2024-09", 0)]
    #[case("2024-06", 6)]
    fn leading_blanks_follow_the_first_weekday(#[case] month: &str, #[case] expected: u32) {
        assert_eq!(leading_blanks(month.parse().unwrap()), expected);
    }

    #[rstest]
    #[case("2024-13")]
    #[case("2024-5")]
    #[case("24-05-01")]
    #[case("")]
    fn rejects_malformed_months(#[case] raw: &str) {
        assert!(raw.parse::<YearMonth>().is_err());
    }

    #[test]
    fn contains_matches_the_date_prefix() {
        let may: YearMonth = "2024-05".parse().unwrap();
        assert!(may.contains("2024-05-31"));
        assert!(!may.contains("2024-06-01"));
        assert_eq!(may.to_string(), "2024-05");
    }

    #[test]
    fn dates_are_normalized() {
        assert_eq!(normalize_date(" 2024-05-01 ").unwrap(), "2024-05-01");
        assert!(parse_date("2024-02-30").is_err());
    }
}
