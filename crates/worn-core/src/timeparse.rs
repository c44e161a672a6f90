//! Time-expression parsing.
//!
//! Turns the heterogeneous date/time inputs accepted on the command line
//! into absolute local instants: epoch values (seconds or concatenated
//! seconds+millis), stream timestamp-ids, pseudo-values (`now`, `today`,
//! `yesterday`), weekday names, `"<N> <unit> ago"`, dates, datetimes with
//! optional weekday prefix and am/pm suffix, and bare clock times.

use chrono::{
    DateTime, Datelike, Duration, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Timelike, Weekday,
};
use thiserror::Error;

use crate::id::is_timestamp_id;

/// Errors produced while parsing a time expression.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeParseError {
    /// The input looked numeric or date-like but was malformed.
    #[error("invalid timestamp {input:?} supplied")]
    InvalidTimestamp { input: String },

    /// The input string is not any recognized form.
    #[error("unknown time format for input value {input:?}")]
    InvalidTimeFormat { input: String },

    /// The input value itself is unusable (e.g. a non-finite number).
    #[error("invalid input for timestamp: {reason}")]
    InvalidInputType { reason: String },
}

/// A time expression before parsing.
///
/// Callers construct the variant matching what they were handed; word
/// lists (e.g. unjoined CLI arguments) are joined with single spaces and
/// re-parsed, so `["2024-03-29", "9:33:13"]` works.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeInput {
    /// Epoch seconds, possibly fractional.
    Seconds(f64),
    /// Epoch milliseconds.
    Millis(i64),
    /// A textual expression.
    Text(String),
    /// Words to be joined with spaces and re-parsed.
    List(Vec<String>),
    /// Already an instant; passed through unchanged.
    Instant(DateTime<Local>),
}

impl From<&str> for TimeInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<DateTime<Local>> for TimeInput {
    fn from(dt: DateTime<Local>) -> Self {
        Self::Instant(dt)
    }
}

/// Parses a time expression against the current wall clock.
pub fn parse(input: &TimeInput) -> Result<DateTime<Local>, TimeParseError> {
    parse_at(input, Local::now())
}

/// Parses a time expression against an explicit "now".
///
/// Relative forms (`now`, `today`, `yesterday`, weekday names,
/// `"<N> <unit> ago"`, bare clock times) are resolved against `now`, which
/// makes the parser deterministic under a frozen clock.
///
/// A weekday name equal to today's weekday resolves to one full week ago,
/// at the current time of day.
pub fn parse_at(input: &TimeInput, now: DateTime<Local>) -> Result<DateTime<Local>, TimeParseError> {
    match input {
        TimeInput::Seconds(secs) => from_epoch_seconds(*secs),
        TimeInput::Millis(millis) => from_epoch_millis(*millis),
        TimeInput::Text(text) => parse_text(text, now),
        TimeInput::List(words) => parse_text(&words.join(" "), now),
        TimeInput::Instant(dt) => Ok(*dt),
    }
}

/// Renders an instant as an epoch `seconds.millis` string that
/// [`parse`] accepts back.
pub fn render_epoch(dt: DateTime<Local>) -> String {
    format!("{}.{:03}", dt.timestamp(), dt.timestamp_subsec_millis())
}

fn invalid_timestamp(input: &str) -> TimeParseError {
    TimeParseError::InvalidTimestamp {
        input: input.to_string(),
    }
}

fn invalid_format(input: &str) -> TimeParseError {
    TimeParseError::InvalidTimeFormat {
        input: input.to_string(),
    }
}

fn from_epoch_seconds(secs: f64) -> Result<DateTime<Local>, TimeParseError> {
    if !secs.is_finite() {
        return Err(TimeParseError::InvalidInputType {
            reason: format!("non-finite epoch value {secs}"),
        });
    }
    #[allow(clippy::cast_possible_truncation)]
    from_epoch_millis((secs * 1_000.0).round() as i64)
}

fn from_epoch_millis(millis: i64) -> Result<DateTime<Local>, TimeParseError> {
    match Local.timestamp_millis_opt(millis) {
        LocalResult::Single(dt) => Ok(dt),
        _ => Err(invalid_timestamp(&millis.to_string())),
    }
}

fn parse_text(raw: &str, now: DateTime<Local>) -> Result<DateTime<Local>, TimeParseError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(invalid_timestamp(raw));
    }

    let dots = s.matches('.').count();
    if dots > 1 {
        return Err(invalid_timestamp(s));
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        // Epoch seconds, or concatenated seconds+millis ("1710262561568").
        if s.len() < 10 {
            return Err(invalid_timestamp(s));
        }
        let (secs, frac) = s.split_at(10);
        return epoch_from_parts(secs, frac, s);
    }

    if is_timestamp_id(s) {
        // Only the millis component matters; the serial is an ordering
        // tiebreak, not part of the instant.
        let millis = &s[..s.find('-').unwrap_or(s.len())];
        return parse_text(millis, now);
    }

    if dots == 1 {
        let (secs, frac) = s.split_once('.').unwrap_or((s, ""));
        if secs.len() > 10
            || secs.is_empty()
            || !secs.bytes().all(|b| b.is_ascii_digit())
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid_timestamp(s));
        }
        return epoch_from_parts(secs, frac, s);
    }

    if s.contains(' ') {
        return parse_spaced(s, now);
    }

    let hyphens = s.matches('-').count();
    if hyphens > 1 {
        if hyphens == 2 {
            let date =
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| invalid_timestamp(s))?;
            return local_midnight(date, s);
        }
        return Err(invalid_format(s));
    }

    let colons = s.matches(':').count();
    if colons > 0 {
        // A bare clock time means today at that time, which can land in
        // the future; that is the caller's risk, not an error.
        if colons > 2 {
            return Err(invalid_format(s));
        }
        let time = parse_clock(s, None).ok_or_else(|| invalid_format(s))?;
        return resolve_local(now.date_naive().and_time(time), s);
    }

    let lower = s.to_lowercase();
    if let Some(target) = weekday_from_name(&lower) {
        return Ok(previous_weekday(target, now));
    }

    match lower.as_str() {
        "now" => Ok(now),
        "today" => local_midnight(now.date_naive(), s),
        "yesterday" => local_midnight(now.date_naive() - Duration::days(1), s),
        _ => Err(invalid_format(s)),
    }
}

fn epoch_from_parts(secs: &str, frac: &str, input: &str) -> Result<DateTime<Local>, TimeParseError> {
    let secs: i64 = secs.parse().map_err(|_| invalid_timestamp(input))?;
    let frac_millis = if frac.is_empty() {
        0
    } else {
        let scaled: f64 = format!("0.{frac}")
            .parse()
            .map_err(|_| invalid_timestamp(input))?;
        #[allow(clippy::cast_possible_truncation)]
        let millis = (scaled * 1_000.0).round() as i64;
        millis
    };
    from_epoch_millis(secs * 1_000 + frac_millis)
}

/// `[Weekday ]YYYY-MM-DD HH:MM[:SS][ am|pm]` or `"<N> <unit> ago"`.
fn parse_spaced(s: &str, now: DateTime<Local>) -> Result<DateTime<Local>, TimeParseError> {
    let spaces = s.matches(' ').count();
    if spaces > 3 {
        return Err(invalid_format(s));
    }

    let lower = s.to_lowercase();
    if spaces == 2 && lower.ends_with(" ago") {
        return parse_ago(&lower, now).ok_or_else(|| invalid_format(s));
    }

    let mut tokens: Vec<&str> = s.split(' ').filter(|t| !t.is_empty()).collect();

    let mut pm = None;
    if let Some(last) = tokens.last() {
        match last.to_ascii_lowercase().as_str() {
            "am" => {
                pm = Some(false);
                tokens.pop();
            }
            "pm" => {
                pm = Some(true);
                tokens.pop();
            }
            _ => {}
        }
    }

    let mut weekday = None;
    if let Some(first) = tokens.first() {
        if let Some(wd) = weekday_from_name(&first.to_lowercase()) {
            weekday = Some(wd);
            tokens.remove(0);
        }
    }

    if tokens.len() != 2 {
        return Err(invalid_format(s));
    }

    let date = NaiveDate::parse_from_str(tokens[0], "%Y-%m-%d").map_err(|_| invalid_format(s))?;
    let time = parse_clock(tokens[1], pm).ok_or_else(|| invalid_format(s))?;

    if let Some(wd) = weekday {
        if date.weekday() != wd {
            return Err(invalid_format(s));
        }
    }

    resolve_local(date.and_time(time), s)
}

fn parse_ago(lower: &str, now: DateTime<Local>) -> Option<DateTime<Local>> {
    let mut parts = lower.split(' ');
    let amount = parts.next()?;
    let unit = parts.next()?;
    if parts.next()? != "ago" || parts.next().is_some() {
        return None;
    }
    if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: i64 = amount.parse().ok()?;
    let delta = match unit {
        "weeks" => Duration::weeks(n),
        "days" => Duration::days(n),
        "hours" => Duration::hours(n),
        "minutes" => Duration::minutes(n),
        "seconds" => Duration::seconds(n),
        _ => return None,
    };
    Some(now - delta)
}

/// `HH:MM` or `HH:MM:SS`, optionally on a 12-hour clock when an am/pm
/// suffix was present.
fn parse_clock(t: &str, pm: Option<bool>) -> Option<NaiveTime> {
    let fmt = match t.matches(':').count() {
        1 => "%H:%M",
        2 => "%H:%M:%S",
        _ => return None,
    };
    let time = NaiveTime::parse_from_str(t, fmt).ok()?;
    match pm {
        None => Some(time),
        Some(is_pm) => {
            // A 12-hour clock has no hour 0; "12" is noon or midnight.
            if !(1..=12).contains(&time.hour()) {
                return None;
            }
            let hour = time.hour() % 12 + if is_pm { 12 } else { 0 };
            time.with_hour(hour)
        }
    }
}

fn weekday_from_name(lower: &str) -> Option<Weekday> {
    const DAYS: [(&str, Weekday); 7] = [
        ("monday", Weekday::Mon),
        ("tuesday", Weekday::Tue),
        ("wednesday", Weekday::Wed),
        ("thursday", Weekday::Thu),
        ("friday", Weekday::Fri),
        ("saturday", Weekday::Sat),
        ("sunday", Weekday::Sun),
    ];
    DAYS.iter()
        .find(|(name, _)| *name == lower || name[..3] == *lower)
        .map(|(_, wd)| *wd)
}

/// The most recent occurrence of `target` strictly before today, at the
/// current time of day. Today's own weekday steps back a full week.
fn previous_weekday(target: Weekday, now: DateTime<Local>) -> DateTime<Local> {
    let current = i64::from(now.date_naive().weekday().num_days_from_monday());
    let target = i64::from(target.num_days_from_monday());
    let back = if current <= target {
        7 - (target - current)
    } else {
        current - target
    };
    now - Duration::days(back)
}

fn local_midnight(date: NaiveDate, input: &str) -> Result<DateTime<Local>, TimeParseError> {
    resolve_local(date.and_time(NaiveTime::MIN), input)
}

/// Resolves a naive local datetime, taking the earlier instant when DST
/// makes it ambiguous and sliding forward an hour when it does not exist.
fn resolve_local(naive: NaiveDateTime, input: &str) -> Result<DateTime<Local>, TimeParseError> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Ok(dt),
        LocalResult::None => match Local.from_local_datetime(&(naive + Duration::hours(1))) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Ok(dt),
            LocalResult::None => Err(invalid_timestamp(input)),
        },
    }
}

/// Help text describing every accepted form.
pub const FORMAT_HELP: &str = "\
Accepted date/time expressions (case is ignored):

  Pseudo-values
    now          Right now, including fractional seconds.
    today        Midnight local time today.
    yesterday    Midnight local time one day ago.

  Weekday names and three-letter abbreviations
    The most recent occurrence of that weekday before today, at the
    current time of day. Naming today's weekday means one week ago.
    examples: monday, Tuesday, fri

  Relative offsets
    '<N> <unit> ago' with unit one of weeks, days, hours, minutes,
    seconds.  example: '5 days ago'

  Epoch values
    Unix timestamps in seconds, optionally with fractional millis,
    either as '1710262561.568' or concatenated as '1710262561568'.

  Stream timestamp ids
    '<millis>-<serial>' as stored in the event log; only the millis
    component is used.  example: '1710478747033-0'

  Dates and datetimes
    YYYY-MM-DD                      midnight on that date
    YYYY-MM-DD HH:MM[:SS]           24-hour clock
    YYYY-MM-DD HH:MM[:SS] am|pm     12-hour clock
    Weekday YYYY-MM-DD HH:MM[:SS]   leading weekday is cross-checked

  Bare clock times
    HH:MM[:SS] means today at that time, which may be in the future;
    the value is taken as given.";

#[cfg(test)]
mod tests {
    use super::*;

    fn frozen() -> DateTime<Local> {
        // Thursday.
        Local.with_ymd_and_hms(2024, 3, 14, 15, 30, 45).unwrap()
    }

    fn parse_str(s: &str) -> Result<DateTime<Local>, TimeParseError> {
        parse_at(&TimeInput::from(s), frozen())
    }

    #[test]
    fn now_returns_the_frozen_clock_exactly() {
        assert_eq!(parse_str("now").unwrap(), frozen());
        assert_eq!(parse_str("NOW").unwrap(), frozen());
    }

    #[test]
    fn today_is_local_midnight() {
        let dt = parse_str("today").unwrap();
        assert_eq!(dt, Local.with_ymd_and_hms(2024, 3, 14, 0, 0, 0).unwrap());
    }

    #[test]
    fn yesterday_is_midnight_minus_one_day() {
        let dt = parse_str("yesterday").unwrap();
        assert_eq!(dt, Local.with_ymd_and_hms(2024, 3, 13, 0, 0, 0).unwrap());
    }

    #[test]
    fn epoch_seconds_digits() {
        let dt = parse_str("1710430245").unwrap();
        assert_eq!(dt.timestamp(), 1_710_430_245);
    }

    #[test]
    fn concatenated_seconds_and_millis() {
        let dt = parse_str("1710430245568").unwrap();
        assert_eq!(dt.timestamp_millis(), 1_710_430_245_568);
    }

    #[test]
    fn fractional_epoch_string() {
        let dt = parse_str("1710430245.568").unwrap();
        assert_eq!(dt.timestamp_millis(), 1_710_430_245_568);
    }

    #[test]
    fn short_digit_runs_are_rejected() {
        assert!(matches!(
            parse_str("12345"),
            Err(TimeParseError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn multiple_dots_are_rejected() {
        assert!(matches!(
            parse_str("1710430245.5.68"),
            Err(TimeParseError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn malformed_fraction_is_rejected() {
        assert!(matches!(
            parse_str("171043a.568"),
            Err(TimeParseError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn timestamp_id_uses_millis_component() {
        let dt = parse_str("1710430245568-3").unwrap();
        assert_eq!(dt.timestamp_millis(), 1_710_430_245_568);
        let dt = parse_str("1710430245568-*").unwrap();
        assert_eq!(dt.timestamp_millis(), 1_710_430_245_568);
    }

    #[test]
    fn units_ago() {
        assert_eq!(
            parse_str("5 days ago").unwrap(),
            frozen() - Duration::days(5)
        );
        assert_eq!(
            parse_str("2 weeks ago").unwrap(),
            frozen() - Duration::weeks(2)
        );
        assert_eq!(
            parse_str("90 seconds ago").unwrap(),
            frozen() - Duration::seconds(90)
        );
    }

    #[test]
    fn bad_ago_forms_are_rejected() {
        assert!(parse_str("5 fortnights ago").is_err());
        assert!(parse_str("5.5 days ago").is_err());
        assert!(parse_str("x days ago").is_err());
    }

    #[test]
    fn absolute_date() {
        let dt = parse_str("2024-03-01").unwrap();
        assert_eq!(dt, Local.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn date_with_time() {
        let dt = parse_str("2024-03-01 09:33").unwrap();
        assert_eq!(dt, Local.with_ymd_and_hms(2024, 3, 1, 9, 33, 0).unwrap());
        let dt = parse_str("2024-03-01 09:33:13").unwrap();
        assert_eq!(dt, Local.with_ymd_and_hms(2024, 3, 1, 9, 33, 13).unwrap());
    }

    #[test]
    fn twelve_hour_clock_suffix() {
        let dt = parse_str("2024-03-14 11:54:02 pm").unwrap();
        assert_eq!(dt, Local.with_ymd_and_hms(2024, 3, 14, 23, 54, 2).unwrap());
        let dt = parse_str("2024-03-14 12:15 am").unwrap();
        assert_eq!(dt, Local.with_ymd_and_hms(2024, 3, 14, 0, 15, 0).unwrap());
    }

    #[test]
    fn weekday_prefix_is_cross_checked() {
        // 2024-03-14 is a Thursday.
        let dt = parse_str("Thu 2024-03-14 09:00").unwrap();
        assert_eq!(dt, Local.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap());
        assert!(parse_str("Mon 2024-03-14 09:00").is_err());
    }

    #[test]
    fn bare_time_means_today() {
        let dt = parse_str("9:33:13").unwrap();
        assert_eq!(dt, Local.with_ymd_and_hms(2024, 3, 14, 9, 33, 13).unwrap());
        // May land in the future relative to "now"; still accepted.
        let dt = parse_str("22:22").unwrap();
        assert_eq!(dt, Local.with_ymd_and_hms(2024, 3, 14, 22, 22, 0).unwrap());
    }

    #[test]
    fn weekday_earlier_in_the_week() {
        // Frozen clock is Thursday; Monday is three days back.
        let dt = parse_str("monday").unwrap();
        assert_eq!(dt, frozen() - Duration::days(3));
        assert_eq!(parse_str("mon").unwrap(), dt);
    }

    #[test]
    fn todays_weekday_steps_back_a_full_week() {
        let dt = parse_str("thursday").unwrap();
        assert_eq!(dt, frozen() - Duration::days(7));
    }

    #[test]
    fn later_weekday_wraps_to_last_week() {
        // Friday relative to a Thursday is six days back.
        let dt = parse_str("friday").unwrap();
        assert_eq!(dt, frozen() - Duration::days(6));
    }

    #[test]
    fn list_inputs_are_joined_and_reparsed() {
        let input = TimeInput::List(vec!["2024-03-29".into(), "9:33:13".into()]);
        let dt = parse_at(&input, frozen()).unwrap();
        assert_eq!(dt, Local.with_ymd_and_hms(2024, 3, 29, 9, 33, 13).unwrap());
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            parse_str(""),
            Err(TimeParseError::InvalidTimestamp { .. })
        ));
        assert!(parse_str("   ").is_err());
    }

    #[test]
    fn unknown_tokens_are_rejected() {
        assert!(matches!(
            parse_str("whenever"),
            Err(TimeParseError::InvalidTimeFormat { .. })
        ));
    }

    #[test]
    fn non_finite_numeric_input_is_a_type_error() {
        assert!(matches!(
            parse_at(&TimeInput::Seconds(f64::NAN), frozen()),
            Err(TimeParseError::InvalidInputType { .. })
        ));
    }

    #[test]
    fn numeric_inputs() {
        let dt = parse_at(&TimeInput::Seconds(1_710_430_245.5), frozen()).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_710_430_245_500);
        let dt = parse_at(&TimeInput::Millis(1_710_430_245_568), frozen()).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_710_430_245_568);
    }

    #[test]
    fn epoch_render_round_trips() {
        for input in ["1710430245", "1710430245568", "1710430245.568"] {
            let parsed = parse_str(input).unwrap();
            let rendered = render_epoch(parsed);
            assert_eq!(parse_str(&rendered).unwrap(), parsed, "via {rendered}");
        }
    }

    #[test]
    fn three_hyphen_garbage_is_rejected() {
        assert!(parse_str("2024-03-14-99").is_err());
    }
}
