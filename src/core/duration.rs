//! Elapsed-time computation and natural-language rendering.
//!
//! Durations are whole milliseconds rounded to nearest (halves round away
//! from zero). Anything a minute or longer is described from the calendar
//! difference between the two instants, so "2 months" means two calendar
//! months rather than sixty days.

use chrono::{DateTime, Datelike, Months, TimeDelta, Utc};
use regex::Regex;
use std::sync::LazyLock;

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: i64 = 24 * SECONDS_PER_HOUR;
const SECONDS_PER_WEEK: i64 = 7 * SECONDS_PER_DAY;

/// Number of adjacent units rendered by [`timesince`].
const TIMESINCE_DEPTH: usize = 2;

const TIMESINCE_UNITS: [(&str, &str); 6] = [
    ("year", "years"),
    ("month", "months"),
    ("week", "weeks"),
    ("day", "days"),
    ("hour", "hours"),
    ("minute", "minutes"),
];

/// Abbreviations applied when a short natural duration is requested.
/// Milliseconds must be rewritten before seconds.
static SHORT_UNITS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\s*milliseconds?", "ms"),
        (r"\s*seconds?", "s"),
        (r"\s*minutes?", "m"),
        (r"\s*hours?", "h"),
        (r"\s*days?", "d"),
        (r"\s*weeks?", "wk"),
        (r"\s*months?", "mth"),
        (r"\s*years?", "y"),
    ]
    .into_iter()
    .map(|(pattern, short)| {
        let unit = Regex::new(pattern).expect("unit abbreviation pattern is a valid regex");
        (unit, short)
    })
    .collect()
});

/// Milliseconds elapsed between `start` and `end` (now when omitted).
///
/// # Example
///
/// ```rust
/// use chrono::{TimeDelta, Utc};
/// use sts::core::get_duration;
///
/// let start = Utc::now();
/// let end = start + TimeDelta::microseconds(2_500_600);
/// assert_eq!(get_duration(start, Some(end)), 2501);
/// ```
pub fn get_duration(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> i64 {
    let end = end.unwrap_or_else(Utc::now);
    delta_millis(end - start)
}

/// Human readable duration between `start` and `end` (now when omitted).
///
/// Under a second renders as milliseconds, under a minute as whole seconds,
/// and anything longer as a calendar-relative phrase such as `"3 days, 4 hours"`.
/// With `short` set, unit words are abbreviated (`"3d, 4h"`).
///
/// # Example
///
/// ```rust
/// use chrono::{TimeDelta, Utc};
/// use sts::core::get_natural_duration;
///
/// let start = Utc::now();
/// let end = start + TimeDelta::milliseconds(500);
/// assert_eq!(get_natural_duration(start, Some(end), false), "500 milliseconds");
/// assert_eq!(get_natural_duration(start, Some(end), true), "500ms");
/// ```
pub fn get_natural_duration(
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    short: bool,
) -> String {
    let end = end.unwrap_or_else(Utc::now);
    let millis = get_duration(start, Some(end));

    let phrase = if millis < 1000 {
        format!("{millis} milliseconds")
    } else if millis < 60_000 {
        format!("{} seconds", round_div(millis, 1000))
    } else {
        timesince(start, end)
    };

    if short {
        shorten_units(&phrase)
    } else {
        phrase
    }
}

/// Calendar-relative description of the time between two instants.
///
/// Renders up to two adjacent non-zero units, largest first. Differences under
/// a minute (or negative ones) render as `"0 minutes"`.
pub fn timesince(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    if end <= start {
        return zero_minutes();
    }

    let months = whole_months_between(start, end);
    let pivot = start
        .checked_add_months(Months::new(months))
        .unwrap_or(start);
    let remaining = (end - pivot).num_seconds().max(0);

    let partials = [
        i64::from(months / 12),
        i64::from(months % 12),
        remaining / SECONDS_PER_WEEK,
        remaining % SECONDS_PER_WEEK / SECONDS_PER_DAY,
        remaining % SECONDS_PER_DAY / SECONDS_PER_HOUR,
        remaining % SECONDS_PER_HOUR / SECONDS_PER_MINUTE,
    ];

    let Some(first) = partials.iter().position(|value| *value != 0) else {
        return zero_minutes();
    };

    partials[first..]
        .iter()
        .zip(&TIMESINCE_UNITS[first..])
        .take(TIMESINCE_DEPTH)
        .take_while(|(value, _)| **value != 0)
        .map(|(value, unit)| pluralize(*value, *unit))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Abbreviate unit words in a natural duration phrase.
///
/// Matching tolerates leading whitespace and plural forms, so both
/// `"1 minute"` and `"2 minutes"` collapse to `"1m"` / `"2m"`.
pub fn shorten_units(phrase: &str) -> String {
    SHORT_UNITS
        .iter()
        .fold(phrase.to_string(), |acc, (re, short)| {
            re.replace_all(&acc, *short).into_owned()
        })
}

fn delta_millis(delta: TimeDelta) -> i64 {
    if let Some(nanos) = delta.num_nanoseconds() {
        round_div(nanos, 1_000_000)
    } else if let Some(micros) = delta.num_microseconds() {
        round_div(micros, 1_000)
    } else {
        delta.num_milliseconds()
    }
}

/// Integer division rounding to nearest, halves away from zero.
fn round_div(value: i64, divisor: i64) -> i64 {
    let quotient = value / divisor;
    let remainder = value % divisor;
    if remainder.abs() * 2 >= divisor {
        quotient + value.signum()
    } else {
        quotient
    }
}

fn whole_months_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    let span = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
    let mut months = u32::try_from(span.max(0)).unwrap_or(0);

    while months > 0 {
        match start.checked_add_months(Months::new(months)) {
            Some(pivot) if pivot <= end => break,
            _ => months -= 1,
        }
    }
    months
}

fn pluralize(value: i64, (singular, plural): (&str, &str)) -> String {
    if value == 1 {
        format!("{value} {singular}")
    } else {
        format!("{value} {plural}")
    }
}

fn zero_minutes() -> String {
    pluralize(0, TIMESINCE_UNITS[5])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn duration_uses_sub_second_precision() {
        let start = at(2024, 1, 1, 0, 0, 0);
        assert_eq!(
            get_duration(start, Some(start + TimeDelta::microseconds(1_499))),
            1
        );
        assert_eq!(
            get_duration(start, Some(start + TimeDelta::microseconds(1_500))),
            2
        );
        assert_eq!(get_duration(start, Some(start + TimeDelta::seconds(2))), 2000);
    }

    #[test]
    fn negative_durations_round_symmetrically() {
        let start = at(2024, 1, 1, 0, 0, 0);
        let end = start - TimeDelta::microseconds(2_500);
        assert_eq!(get_duration(start, Some(end)), -3);
    }

    #[test]
    fn omitted_end_defaults_to_now() {
        let start = Utc::now() - TimeDelta::seconds(1);
        let millis = get_duration(start, None);
        assert!((1000..5000).contains(&millis));
    }

    #[test]
    fn natural_duration_under_a_second_is_milliseconds() {
        let start = at(2024, 1, 1, 0, 0, 0);
        let end = start + TimeDelta::milliseconds(500);
        assert_eq!(get_natural_duration(start, Some(end), false), "500 milliseconds");
    }

    #[test]
    fn natural_duration_rounds_half_seconds_up() {
        let start = at(2024, 1, 1, 0, 0, 0);
        let end = start + TimeDelta::milliseconds(2500);
        assert_eq!(get_natural_duration(start, Some(end), false), "3 seconds");

        let end = start + TimeDelta::milliseconds(2499);
        assert_eq!(get_natural_duration(start, Some(end), false), "2 seconds");
    }

    #[test]
    fn natural_duration_over_a_minute_is_calendar_relative() {
        let start = at(2024, 1, 1, 0, 0, 0);
        let end = start + TimeDelta::milliseconds(90_000);
        assert_eq!(get_natural_duration(start, Some(end), false), "1 minute");
    }

    #[test]
    fn timesince_renders_two_adjacent_units() {
        let start = at(2024, 1, 1, 0, 0, 0);
        assert_eq!(timesince(start, at(2024, 1, 4, 4, 0, 0)), "3 days, 4 hours");
        assert_eq!(timesince(start, at(2024, 1, 15, 0, 0, 0)), "2 weeks");
        assert_eq!(timesince(start, at(2024, 1, 1, 2, 5, 0)), "2 hours, 5 minutes");
    }

    #[test]
    fn timesince_stops_at_a_zero_unit() {
        let start = at(2024, 1, 1, 0, 0, 0);
        // one day and five minutes: hours are zero, so minutes are not shown
        assert_eq!(timesince(start, at(2024, 1, 2, 0, 5, 0)), "1 day");
    }

    #[test]
    fn timesince_counts_calendar_months() {
        let start = at(2024, 1, 15, 0, 0, 0);
        assert_eq!(timesince(start, at(2024, 3, 15, 0, 0, 0)), "2 months");
        assert_eq!(timesince(start, at(2025, 2, 15, 0, 0, 0)), "1 year, 1 month");
        // not yet a full month
        assert_eq!(timesince(start, at(2024, 2, 14, 0, 0, 0)), "4 weeks, 2 days");
    }

    #[test]
    fn timesince_clamps_month_ends() {
        let start = at(2024, 1, 31, 0, 0, 0);
        assert_eq!(timesince(start, at(2024, 2, 29, 0, 0, 0)), "1 month");
    }

    #[test]
    fn timesince_of_reversed_range_is_zero_minutes() {
        let start = at(2024, 1, 2, 0, 0, 0);
        assert_eq!(timesince(start, at(2024, 1, 1, 0, 0, 0)), "0 minutes");
        assert_eq!(timesince(start, start + TimeDelta::seconds(30)), "0 minutes");
    }

    #[test]
    fn short_units_abbreviate_every_unit() {
        assert_eq!(shorten_units("500 milliseconds"), "500ms");
        assert_eq!(shorten_units("3 seconds"), "3s");
        assert_eq!(shorten_units("1 minute"), "1m");
        assert_eq!(shorten_units("3 days, 4 hours"), "3d, 4h");
        assert_eq!(shorten_units("2 weeks"), "2wk");
        assert_eq!(shorten_units("1 year, 1 month"), "1y, 1mth");
    }

    #[test]
    fn short_unit_table_has_every_unit() {
        assert_eq!(SHORT_UNITS.len(), 8);
        let phrases = [
            ("1 millisecond", "1ms"),
            ("2 seconds", "2s"),
            ("5 minutes", "5m"),
            ("1 hour", "1h"),
            ("1 day", "1d"),
            ("1 week", "1wk"),
            ("3 months", "3mth"),
            ("2 years", "2y"),
        ];
        for (long, short) in phrases {
            assert_eq!(shorten_units(long), short, "abbreviating {long}");
        }
    }

    #[test]
    fn short_natural_duration() {
        let start = at(2024, 1, 1, 0, 0, 0);
        let end = at(2024, 1, 4, 4, 0, 0);
        assert_eq!(get_natural_duration(start, Some(end), true), "3d, 4h");
    }
}
