use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;

const MILLIS_PER_HOUR: i64 = 3_600_000;
pub const SECONDS_PER_HOUR: u32 = 3_600;

pub fn local_time(now: DateTime<Utc>, tz: Tz) -> DateTime<Tz> {
    now.with_timezone(&tz)
}

pub fn local_day(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    local_time(now, tz).date_naive()
}

pub fn local_hour(now: DateTime<Utc>, tz: Tz) -> u32 {
    local_time(now, tz).hour()
}

/// Whole seconds from `now` until the next wall-clock hour in `tz`, in `1..=3600`.
pub fn seconds_until_next_hour(now: DateTime<Utc>, tz: Tz) -> u32 {
    let local = local_time(now, tz);
    let into_hour = local.minute() * 60 + local.second();
    SECONDS_PER_HOUR - into_hour.min(SECONDS_PER_HOUR - 1)
}

pub fn day_progress_percent(hour: u32) -> u8 {
    ((f64::from(hour.min(24)) / 24.0) * 100.0).round() as u8
}

pub fn time_of_day(hour: u32) -> &'static str {
    if hour < 12 {
        "morning"
    } else if hour < 17 {
        "afternoon"
    } else {
        "evening"
    }
}

pub fn twelve_hour_label(hour: u32) -> String {
    let suffix = if hour % 24 >= 12 { "PM" } else { "AM" };
    let display = match hour % 12 {
        0 => 12,
        value => value,
    };
    format!("{display}{suffix}")
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct HoursLeft {
    pub today: i64,
    pub this_week: i64,
    pub this_month: i64,
    pub this_year: i64,
}

pub fn hours_left(now: DateTime<Utc>, tz: Tz) -> HoursLeft {
    let today = local_day(now, tz);
    let days_until_sunday = (7 - today.weekday().num_days_from_sunday()) % 7;
    let end_of_week = today + Duration::days(i64::from(days_until_sunday));
    let end_of_month = last_day_of_month(today.year(), today.month()).unwrap_or(today);
    let end_of_year = NaiveDate::from_ymd_opt(today.year(), 12, 31).unwrap_or(today);

    HoursLeft {
        today: hours_until_end_of(now, today, tz),
        this_week: hours_until_end_of(now, end_of_week, tz),
        this_month: hours_until_end_of(now, end_of_month, tz),
        this_year: hours_until_end_of(now, end_of_year, tz),
    }
}

pub fn hours_left_today(now: DateTime<Utc>, tz: Tz) -> i64 {
    hours_until_end_of(now, local_day(now, tz), tz)
}

fn hours_until_end_of(now: DateTime<Utc>, day: NaiveDate, tz: Tz) -> i64 {
    let Some(end) = day
        .and_hms_milli_opt(23, 59, 59, 999)
        .and_then(|naive| resolve_local(naive, tz))
    else {
        return 0;
    };
    let remaining_ms = (end - now).num_milliseconds().max(0);
    (remaining_ms + MILLIS_PER_HOUR - 1) / MILLIS_PER_HOUR
}

fn resolve_local(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .latest()
        .map(|value| value.with_timezone(&Utc))
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1).map(|first| first - Duration::days(1))
}
