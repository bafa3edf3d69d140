//! Calendar and business-day arithmetic.
//!
//! All functions work on whole local calendar days; there is no timezone
//! component to normalize. Shifts that leave chrono's supported calendar
//! range return `DateOutOfRange` instead of panicking.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// A date shift landed outside the representable calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateOutOfRange {
    pub date: NaiveDate,
    pub days: i64,
}

impl Display for DateOutOfRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "shifting {} by {} days leaves the supported calendar range",
            self.date, self.days
        )
    }
}

impl Error for DateOutOfRange {}

/// Shifts `date` by `days` calendar days. `days` may be negative.
pub fn add_calendar_days(date: NaiveDate, days: i64) -> Result<NaiveDate, DateOutOfRange> {
    Duration::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .ok_or(DateOutOfRange { date, days })
}

/// Shifts `date` by `days` business days, skipping Saturdays and Sundays.
///
/// Counts only weekdays while stepping one calendar day at a time, so a
/// start on a weekend lands on the `days`-th following weekday. Negative
/// `days` walk backward with the same rule. `days == 0` returns `date`.
///
/// Any seven consecutive days hold exactly five weekdays, so whole weeks are
/// jumped arithmetically and at most five single steps remain.
pub fn add_business_days(date: NaiveDate, days: i64) -> Result<NaiveDate, DateOutOfRange> {
    if days == 0 {
        return Ok(date);
    }
    let out_of_range = DateOutOfRange { date, days };
    let step = days.signum();
    let total = days.unsigned_abs();
    // Keep 1..=5 days for the walk so the result is a weekday.
    let weeks = (total - 1) / 5;
    let mut remaining = total - weeks * 5;

    let jump = i64::try_from(weeks)
        .ok()
        .and_then(|weeks| weeks.checked_mul(7))
        .ok_or(out_of_range)?;
    let mut cursor = add_calendar_days(date, step * jump).map_err(|_| out_of_range)?;
    while remaining > 0 {
        cursor = add_calendar_days(cursor, step).map_err(|_| out_of_range)?;
        if !is_weekend(cursor) {
            remaining -= 1;
        }
    }
    Ok(cursor)
}

/// Absolute number of calendar days between two dates.
pub fn days_between(a: NaiveDate, b: NaiveDate) -> i64 {
    (b - a).num_days().abs()
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::{add_business_days, add_calendar_days, days_between, is_weekend, DateOutOfRange};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    /// Reference rule: one calendar day at a time, counting weekdays only.
    fn step_business_days(date: NaiveDate, days: i64) -> NaiveDate {
        let step = if days < 0 { -1 } else { 1 };
        let mut remaining = days.abs();
        let mut cursor = date;
        while remaining > 0 {
            cursor = cursor + chrono::Duration::days(step);
            if !is_weekend(cursor) {
                remaining -= 1;
            }
        }
        cursor
    }

    #[test]
    fn calendar_days_cross_month_and_go_backward() {
        assert_eq!(add_calendar_days(date(2024, 1, 30), 3), Ok(date(2024, 2, 2)));
        assert_eq!(add_calendar_days(date(2024, 3, 1), -1), Ok(date(2024, 2, 29)));
        assert_eq!(add_calendar_days(date(2024, 3, 1), 0), Ok(date(2024, 3, 1)));
    }

    #[test]
    fn calendar_days_out_of_range_is_an_error() {
        let start = date(2024, 1, 1);
        assert_eq!(
            add_calendar_days(start, 1_000_000_000),
            Err(DateOutOfRange {
                date: start,
                days: 1_000_000_000,
            })
        );
        assert!(add_calendar_days(start, i64::MIN).is_err());
        assert!(add_calendar_days(NaiveDate::MAX, 1).is_err());
    }

    #[test]
    fn business_days_skip_weekends() {
        // 2024-03-01 is a Friday.
        assert_eq!(add_business_days(date(2024, 3, 1), 1), Ok(date(2024, 3, 4)));
        assert_eq!(add_business_days(date(2024, 3, 1), 5), Ok(date(2024, 3, 8)));
        assert_eq!(add_business_days(date(2024, 3, 4), 10), Ok(date(2024, 3, 18)));
    }

    #[test]
    fn business_days_from_weekend_land_on_weekday() {
        // Saturday + 1 business day is Monday, + 5 is the next Friday.
        assert_eq!(add_business_days(date(2024, 3, 2), 1), Ok(date(2024, 3, 4)));
        assert_eq!(add_business_days(date(2024, 3, 2), 5), Ok(date(2024, 3, 8)));
        assert_eq!(add_business_days(date(2024, 3, 2), 0), Ok(date(2024, 3, 2)));
    }

    #[test]
    fn business_days_walk_backward() {
        // Monday - 1 business day is the previous Friday.
        assert_eq!(add_business_days(date(2024, 3, 4), -1), Ok(date(2024, 3, 1)));
    }

    #[test]
    fn week_jumps_match_day_by_day_walk() {
        for offset in 0..7 {
            let start = date(2024, 3, 2 + offset);
            for days in -23..=23 {
                assert_eq!(
                    add_business_days(start, days),
                    Ok(step_business_days(start, days)),
                    "start={start} days={days}"
                );
            }
        }
    }

    #[test]
    fn huge_business_day_counts_fail_fast() {
        let start = date(2024, 3, 1);
        assert!(add_business_days(start, i64::MAX).is_err());
        assert!(add_business_days(start, i64::MIN).is_err());
        assert!(add_business_days(start, 1_000_000_000).is_err());
    }

    #[test]
    fn days_between_is_order_independent() {
        assert_eq!(days_between(date(2024, 1, 1), date(2024, 1, 31)), 30);
        assert_eq!(days_between(date(2024, 1, 31), date(2024, 1, 1)), 30);
        assert_eq!(days_between(date(2024, 2, 28), date(2024, 3, 1)), 2);
    }

    #[test]
    fn weekend_detection() {
        assert!(is_weekend(date(2024, 3, 2)));
        assert!(is_weekend(date(2024, 3, 3)));
        assert!(!is_weekend(date(2024, 3, 4)));
    }
}
