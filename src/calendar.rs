use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Number of numbered weeks in a school year.
pub const WEEKS_PER_YEAR: u32 = 36;

const START_MONTH: u32 = 9;

/// First Monday on or after September 1 of the academic year containing `today`.
///
/// Dates in January..August belong to the academic year that started the
/// previous September.
pub fn academic_year_start(today: NaiveDate) -> NaiveDate {
    let year = if today.month() >= START_MONTH {
        today.year()
    } else {
        today.year() - 1
    };
    let mut day = NaiveDate::from_ymd_opt(year, START_MONTH, 1).expect("september 1 is a valid date");
    while day.weekday() != Weekday::Mon {
        day += Duration::days(1);
    }
    day
}

/// Active academic week for `today`, always clamped into [1, 36].
///
/// Dates before the academic start report week 1; dates past week 36 report
/// week 36. Week boundaries fall on Mondays because the start is a Monday.
pub fn academic_week(today: NaiveDate) -> u32 {
    let start = academic_year_start(today);
    let days = (today - start).num_days();
    let week = days.div_euclid(7) + 1;
    week.clamp(1, i64::from(WEEKS_PER_YEAR)) as u32
}

/// Calendar year the academic year started in. Used as the stable year key
/// for work plans and digests (`2025` covers Sep 2025 .. Aug 2026).
pub fn school_year(today: NaiveDate) -> i32 {
    if today.month() >= START_MONTH {
        today.year()
    } else {
        today.year() - 1
    }
}

/// Inclusive Monday..Sunday date window of the given week number.
pub fn week_bounds(start: NaiveDate, week: u32) -> (NaiveDate, NaiveDate) {
    let week = week.clamp(1, WEEKS_PER_YEAR);
    let monday = start + Duration::days(7 * (i64::from(week) - 1));
    (monday, monday + Duration::days(6))
}
