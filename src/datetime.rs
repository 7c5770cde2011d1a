use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::LazyLock;

static DATE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}\.\d{2}\.\d{4}$").expect("date shape regex must compile"));
static TIME_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}:\d{2}$").expect("time shape regex must compile"));

/// Parses a strict `DD.MM.YYYY` date. Impossible calendar dates are rejected.
pub fn parse_date(date_str: &str) -> Option<NaiveDate> {
    let date_str = date_str.trim();
    if !DATE_SHAPE.is_match(date_str) {
        return None;
    }
    NaiveDate::parse_from_str(date_str, "%d.%m.%Y").ok()
}

/// Parses a strict 24-hour `HH:MM` time.
pub fn parse_time(time_str: &str) -> Option<NaiveTime> {
    let time_str = time_str.trim();
    if !TIME_SHAPE.is_match(time_str) {
        return None;
    }
    NaiveTime::parse_from_str(time_str, "%H:%M").ok()
}

/// Civil datetime of a listing entry in `tz`. A missing or malformed time
/// falls back to midnight; a missing or invalid date yields `None`.
pub fn parse_datetime(
    date_str: Option<&str>,
    time_str: Option<&str>,
    tz: Tz,
) -> Option<DateTime<Tz>> {
    let date = parse_date(date_str?)?;
    let time = time_str.and_then(parse_time).unwrap_or_default();
    localize(date.and_time(time), tz)
}

/// Attaches `tz` to a wall-clock time. Ambiguous times (autumn fold) take the
/// earlier instant; times inside the spring gap are moved forward by an hour.
pub fn localize(value: NaiveDateTime, tz: Tz) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&value)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(value + Duration::hours(1))).earliest())
}

/// Compact UTC form used by calendar properties, e.g. `20260312T170000Z`.
pub fn format_utc_compact<T: TimeZone>(value: &DateTime<T>) -> String {
    let utc = value.with_timezone(&Utc);
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        utc.year(),
        utc.month(),
        utc.day(),
        utc.hour(),
        utc.minute(),
        utc.second()
    )
}

/// ISO-8601 UTC with second precision and an explicit `Z`.
pub fn format_utc_iso(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
