//! Local-day window filters.
//!
//! Date columns are filtered by the calendar day the user picked in their own
//! time zone. The window bounds are the local wall-clock times `00:00:00.000`
//! and `23:59:59.000`, rendered in ISO form with a `Z` suffix. They are not
//! converted to UTC: a user at UTC+2 picking 2024-03-15 gets
//! `2024-03-15T00:00:00.000Z`, not `2024-03-14T22:00:00.000Z`.
//!
//! Two renderings exist because the list backends disagree on the grammar:
//!
//! | Function                | Lower | Upper | Conjunction |
//! |-------------------------|-------|-------|-------------|
//! | [`date_filter`]         | `>=`  | `<`   | ` AND `     |
//! | [`date_filter_encoded`] | `>`   | `<`   | `+AND+`     |

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};

/// Rendered in place of a bound when the input date could not be parsed.
pub const INVALID_DATE: &str = "Invalid Date";

const LOCAL_ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Seconds from local midnight to the window's upper bound (23:59:59).
const END_OF_DAY_SECS: i64 = 86_399;

/// The local wall-clock bounds of one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DayWindow {
    pub fn for_date(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN);
        Self {
            start,
            end: start + TimeDelta::seconds(END_OF_DAY_SECS),
        }
    }

    /// The window of the calendar day `instant` falls on in its own time zone.
    pub fn containing<Tz: TimeZone>(instant: &DateTime<Tz>) -> Self {
        Self::for_date(instant.date_naive())
    }

    pub fn start_iso(&self) -> String {
        to_local_iso(&self.start)
    }

    pub fn end_iso(&self) -> String {
        to_local_iso(&self.end)
    }
}

/// Render a local wall-clock time as ISO 8601 with millisecond precision.
pub fn to_local_iso(local: &NaiveDateTime) -> String {
    local.format(LOCAL_ISO_FORMAT).to_string()
}

/// How a [`DayWindow`] is written into a filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRangeStyle {
    /// `(>="start" AND <"end")`
    Inclusive,
    /// `(>"start"+AND+<"end")`
    Encoded,
}

impl DateRangeStyle {
    /// Render a window, or a pair of [`INVALID_DATE`] bounds when absent.
    pub fn render(&self, window: Option<&DayWindow>) -> String {
        let (start, end) = match window {
            Some(w) => (w.start_iso(), w.end_iso()),
            None => (INVALID_DATE.to_string(), INVALID_DATE.to_string()),
        };
        match self {
            DateRangeStyle::Inclusive => format!(r#"(>="{start}" AND <"{end}")"#),
            DateRangeStyle::Encoded => format!(r#"(>"{start}"+AND+<"{end}")"#),
        }
    }
}

/// Day filter with an inclusive lower bound, used by
/// [`convert_filters_to_api`](super::convert_filters_to_api).
pub fn date_filter<Tz: TimeZone>(instant: &DateTime<Tz>) -> String {
    DateRangeStyle::Inclusive.render(Some(&DayWindow::containing(instant)))
}

/// Day filter with exclusive bounds and a URL-encoded conjunction, used by
/// [`format_filter_query`](super::format_filter_query).
pub fn date_filter_encoded<Tz: TimeZone>(instant: &DateTime<Tz>) -> String {
    DateRangeStyle::Encoded.render(Some(&DayWindow::containing(instant)))
}

/// Parse a textual date into the calendar day it denotes locally.
///
/// Accepts RFC 3339 timestamps (the day is taken in the timestamp's own
/// offset), naive ISO date-times and plain `YYYY-MM-DD` dates.
pub fn parse_local_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, Utc};

    use super::*;

    fn at(offset_hours: i32, rfc3339: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&FixedOffset::east_opt(offset_hours * 3600).unwrap())
    }

    #[test]
    fn test_local_day_window_is_not_utc_shifted() {
        let noon = at(2, "2024-03-15T12:00:00+02:00");
        assert_eq!(
            date_filter(&noon),
            r#"(>="2024-03-15T00:00:00.000Z" AND <"2024-03-15T23:59:59.000Z")"#
        );
    }

    #[test]
    fn test_day_is_taken_in_local_time() {
        // 04:30 UTC on the 16th is still the 15th at UTC-5.
        let late_evening = at(-5, "2024-03-16T04:30:00Z");
        let window = DayWindow::containing(&late_evening);
        assert_eq!(window.start_iso(), "2024-03-15T00:00:00.000Z");
        assert_eq!(window.end_iso(), "2024-03-15T23:59:59.000Z");
    }

    #[test]
    fn test_encoded_variant() {
        let noon = at(0, "2024-03-15T12:00:00Z");
        assert_eq!(
            date_filter_encoded(&noon),
            r#"(>"2024-03-15T00:00:00.000Z"+AND+<"2024-03-15T23:59:59.000Z")"#
        );
    }

    #[test]
    fn test_utc_instant() {
        let instant = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(
            date_filter(&instant),
            r#"(>="2023-12-31T00:00:00.000Z" AND <"2023-12-31T23:59:59.000Z")"#
        );
    }

    #[test]
    fn test_invalid_window_renders_invalid_date() {
        assert_eq!(
            DateRangeStyle::Inclusive.render(None),
            r#"(>="Invalid Date" AND <"Invalid Date")"#
        );
        assert_eq!(
            DateRangeStyle::Encoded.render(None),
            r#"(>"Invalid Date"+AND+<"Invalid Date")"#
        );
    }

    #[test]
    fn test_parse_local_date() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(parse_local_date("2024-03-15"), Some(day));
        assert_eq!(parse_local_date("2024-03-15T08:00:00"), Some(day));
        assert_eq!(parse_local_date("2024-03-15T23:30:00-05:00"), Some(day));
        assert_eq!(parse_local_date("yesterday"), None);
    }
}
