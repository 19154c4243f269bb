//! Calendar rules for the birthday voucher sweep.

use chrono::{Datelike, NaiveDate};

/// Month/day pairs whose birthdays are celebrated on `today`.
///
/// Year-independent. Members born on 29 February are celebrated on
/// 28 February in years without a leap day.
pub fn celebrated_dates(today: NaiveDate) -> Vec<(u32, u32)> {
    let mut dates = vec![(today.month(), today.day())];
    if today.month() == 2 && today.day() == 28 && !is_leap_year(today.year()) {
        dates.push((2, 29));
    }
    dates
}

pub fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}
