use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

static MONTH_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\s*/\s*(\d{1,2})").unwrap());

static TIME_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2}):(\d{2})\s*[-‐‑–—―~〜ー]\s*(\d{1,2}):(\d{2})").unwrap()
});

/// Parses the first `M/D` in `label` as a date in `year`.
///
/// There is no cross-year inference: a December schedule viewed in
/// January resolves to the wrong year.
pub fn parse_month_day(label: &str, year: i32) -> Option<NaiveDate> {
    let caps = MONTH_DAY.captures(label)?;
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Splits `HH:MM - HH:MM` into zero-padded start and end times.
pub fn parse_time_range(text: &str) -> Option<(String, String)> {
    let caps = TIME_RANGE.captures(text)?;
    let start = hh_mm(&caps[1], &caps[2])?;
    let end = hh_mm(&caps[3], &caps[4])?;
    Some((start, end))
}

fn hh_mm(hour: &str, minute: &str) -> Option<String> {
    let h: u32 = hour.parse().ok()?;
    let m: u32 = minute.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(format!("{:02}:{:02}", h, m))
}
