//! Relative-duration resolution.
//!
//! Review listings show contribution dates as free text relative to "now"
//! (`"a month ago"`, `"3 weeks ago"`). [`resolve`] turns such text into an
//! absolute calendar date using the run's anchor date. Month and year
//! arithmetic is calendar-aware: subtracting one month from 31 Jan lands on
//! 31 Dec, and subtracting one month from 31 Mar lands on the last day of
//! February.

use chrono::{Days, Duration, Months, NaiveDate, NaiveTime};

use crate::error::{Result, ScrapeError};

/// The fixed output pattern, e.g. `31 Dec 2023`.
pub const DATE_FORMAT: &str = "%d %b %Y";

/// Format a date in the tabular output pattern.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Resolve `duration` (e.g. `"3 weeks ago"`) against `anchor`.
///
/// # Arguments
///
/// * `anchor` - The date of the current run
/// * `duration` - Free text in the form `<quantity> <unit> [ago]`
///
/// # Returns
///
/// The anchor minus the duration. Empty (or all-whitespace) input returns the
/// anchor unchanged. Units finer than a day are taken from midnight of the
/// anchor, so any positive quantity lands on the previous day or earlier.
///
/// # Errors
///
/// [`ScrapeError::SchemaMismatch`] when the quantity is not `a`/`an` or an
/// integer, when the unit is unknown, or when the result underflows the
/// calendar.
pub fn resolve(anchor: NaiveDate, duration: &str) -> Result<NaiveDate> {
    let mut tokens = duration.split_whitespace();
    let Some(quantity_token) = tokens.next() else {
        return Ok(anchor);
    };
    let unit_token = tokens
        .next()
        .ok_or_else(|| ScrapeError::schema(format!("relative date {duration:?} has no unit")))?;

    let quantity: u32 = if quantity_token.eq_ignore_ascii_case("a")
        || quantity_token.eq_ignore_ascii_case("an")
    {
        1
    } else {
        quantity_token.parse().map_err(|_| {
            ScrapeError::schema(format!("relative date {duration:?} has no quantity"))
        })?
    };

    let unit = pluralize(&unit_token.to_ascii_lowercase());
    let resolved = match unit.as_str() {
        "seconds" => before_midnight(anchor, Duration::try_seconds(quantity.into())),
        "minutes" => before_midnight(anchor, Duration::try_minutes(quantity.into())),
        "hours" => before_midnight(anchor, Duration::try_hours(quantity.into())),
        "days" => anchor.checked_sub_days(Days::new(quantity.into())),
        "weeks" => anchor.checked_sub_days(Days::new(u64::from(quantity) * 7)),
        "months" => anchor.checked_sub_months(Months::new(quantity)),
        "years" => quantity
            .checked_mul(12)
            .and_then(|m| anchor.checked_sub_months(Months::new(m))),
        _ => {
            return Err(ScrapeError::schema(format!(
                "relative date {duration:?} uses unknown unit {unit_token:?}"
            )));
        }
    };

    resolved.ok_or_else(|| ScrapeError::schema(format!("relative date {duration:?} out of range")))
}

/// Resolve and format in one step; this is what the record tables store.
pub fn resolve_formatted(anchor: NaiveDate, duration: &str) -> Result<String> {
    resolve(anchor, duration).map(format_date)
}

fn before_midnight(anchor: NaiveDate, span: Option<Duration>) -> Option<NaiveDate> {
    anchor
        .and_time(NaiveTime::MIN)
        .checked_sub_signed(span?)
        .map(|at| at.date())
}

fn pluralize(unit: &str) -> String {
    if unit.ends_with('s') {
        unit.to_string()
    } else {
        format!("{unit}s")
    }
}
