//! Wall-clock timestamps and the explicit timezone they are rendered in.
//!
//! `Time` is always UTC with millisecond precision. Anything calendar-shaped
//! (day names, "today", entry times) goes through a `TimeZone` value the caller
//! passes in; there is no process-wide zone.

use crate::error::{Error, Result};
use chrono::{
    DateTime, Datelike, Days, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime,
    Offset, SecondsFormat, TimeZone as _, Utc, Weekday,
};
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag_no_case, take_while_m_n},
    character::complete::{char, digit1, space1},
    combinator::{all_consuming, map, map_opt, map_res, opt, value},
    error::VerboseError,
    sequence::{preceded, terminated, tuple},
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

/* -------------------------------- Time -------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(DateTime<Utc>);

impl Time {
    /// Current time, truncated to the millisecond so it survives a round-trip.
    pub fn now() -> Self {
        Self::truncate(Utc::now())
    }

    pub fn from_millis(ms: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_millis(ms).map(Self)
    }

    pub fn millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    pub fn utc(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn add_days(self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }

    pub fn add_hours(self, hours: i64) -> Self {
        Self(self.0 + Duration::hours(hours))
    }

    /// Accepts RFC 3339 with an explicit offset, or integer milliseconds.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if let Ok(ms) = text.parse::<i64>() {
            return Self::from_millis(ms).ok_or_else(|| Error::InvalidTime(text.to_string()));
        }
        DateTime::parse_from_rfc3339(text)
            .map(|dt| Self::truncate(dt.with_timezone(&Utc)))
            .map_err(|_| Error::InvalidTime(text.to_string()))
    }

    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, false)
    }

    fn truncate(dt: DateTime<Utc>) -> Self {
        let ms = dt.timestamp_millis();
        Self(DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or(dt))
    }
}

impl From<DateTime<Utc>> for Time {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::truncate(dt)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl Serialize for Time {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Time {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Older roots stored bare epoch milliseconds.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Millis(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Time::from_millis(ms)
                .ok_or_else(|| serde::de::Error::custom(format!("timestamp {ms} out of range"))),
            Raw::Text(text) => Time::parse(&text).map_err(serde::de::Error::custom),
        }
    }
}

/* ------------------------------ TimeZone ------------------------------ */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeZone {
    offset: FixedOffset,
}

impl Default for TimeZone {
    fn default() -> Self {
        Self::utc()
    }
}

impl TimeZone {
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// Offset of the host's local zone right now.
    pub fn local() -> Self {
        Self {
            offset: *Local::now().offset(),
        }
    }

    pub fn from_offset(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn from_hours(hours: i32) -> Result<Self> {
        hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .map(Self::from_offset)
            .ok_or_else(|| Error::InvalidTime(format!("utc offset {hours}h")))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn localize(&self, time: Time) -> DateTime<FixedOffset> {
        time.utc().with_timezone(&self.offset)
    }

    pub fn date(&self, time: Time) -> NaiveDate {
        self.localize(time).date_naive()
    }

    pub fn format_date(&self, time: Time) -> String {
        self.localize(time).format(DATE_FORMAT).to_string()
    }

    pub fn format_time(&self, time: Time) -> String {
        self.localize(time).format(TIME_FORMAT).to_string()
    }

    pub fn format_date_time(&self, time: Time) -> String {
        self.localize(time)
            .format(&format!("{DATE_FORMAT} {TIME_FORMAT}"))
            .to_string()
    }

    /// The instant at which the local wall clock reads `date time`; `None`
    /// when that instant falls outside the calendar's range.
    pub fn at(&self, date: NaiveDate, time: NaiveTime) -> Option<Time> {
        let local = NaiveDateTime::new(date, time);
        let utc = local
            .checked_sub_signed(Duration::seconds(i64::from(self.offset.local_minus_utc())))?;
        Some(Time(Utc.from_utc_datetime(&utc)))
    }

    pub fn start_of_day(&self, date: NaiveDate) -> Option<Time> {
        self.at(date, NaiveTime::MIN)
    }

    pub fn end_of_day(&self, date: NaiveDate) -> Option<Time> {
        let last = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        self.at(date, last)
    }

    /// Local date `days` days before `now`; `None` past the calendar's range.
    pub fn days_ago(&self, now: Time, days: u64) -> Option<NaiveDate> {
        self.date(now).checked_sub_days(Days::new(days))
    }
}

/// Strict `YYYY-MM-DD`.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    if text.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(text, DATE_FORMAT).ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/* -------------------------- Colloquial dates -------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DayExpr {
    Offset(i64),
    NextWeek,
    Weekday { day: Weekday, skip_week: bool },
    Date(NaiveDate),
}

type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Parse phrases such as `today`, `tomorrow at 9:30`, `friday`, `next monday`,
/// `in 3 days`, `next week` or `2024-05-01 17:00` relative to `now`.
///
/// A bare weekday is the next such day strictly after today; `next <weekday>`
/// is one week later than that. Without an explicit time the result is the end
/// of the local day.
pub fn parse_colloquial(input: &str, now: Time, tz: &TimeZone) -> Result<Time> {
    let text = input.trim();
    let (_, (expr, time)) =
        parse_when(text).map_err(|_| Error::InvalidTime(input.to_string()))?;

    let today = tz.date(now);
    let date = match expr {
        DayExpr::Offset(days) => shift(today, days),
        DayExpr::NextWeek => shift(today, 7),
        DayExpr::Date(date) => Some(date),
        DayExpr::Weekday { day, skip_week } => {
            let ahead = (7 + day.num_days_from_monday() as i64
                - today.weekday().num_days_from_monday() as i64)
                % 7;
            let ahead = if ahead == 0 { 7 } else { ahead };
            shift(today, if skip_week { ahead + 7 } else { ahead })
        }
    }
    .ok_or_else(|| Error::InvalidTime(input.to_string()))?;

    match time {
        Some(t) => tz.at(date, t),
        None => tz.end_of_day(date),
    }
    .ok_or_else(|| Error::InvalidTime(input.to_string()))
}

fn shift(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    if days >= 0 {
        date.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}

fn parse_when(i: &str) -> PResult<'_, (DayExpr, Option<NaiveTime>)> {
    all_consuming(tuple((
        day_expr,
        opt(preceded(
            tuple((space1, opt(terminated(tag_no_case("at"), space1)))),
            clock_time,
        )),
    )))(i)
}

fn day_expr(i: &str) -> PResult<'_, DayExpr> {
    alt((
        value(DayExpr::Offset(0), tag_no_case("today")),
        value(DayExpr::Offset(1), tag_no_case("tomorrow")),
        value(DayExpr::Offset(-1), tag_no_case("yesterday")),
        value(DayExpr::NextWeek, tag_no_case("next week")),
        map(
            preceded(tuple((tag_no_case("next"), space1)), weekday),
            |day| DayExpr::Weekday {
                day,
                skip_week: true,
            },
        ),
        map(weekday, |day| DayExpr::Weekday {
            day,
            skip_week: false,
        }),
        in_days,
        map(calendar_date, DayExpr::Date),
    ))(i)
}

fn weekday(i: &str) -> PResult<'_, Weekday> {
    alt((
        value(Weekday::Mon, alt((tag_no_case("monday"), tag_no_case("mon")))),
        value(Weekday::Tue, alt((tag_no_case("tuesday"), tag_no_case("tue")))),
        value(Weekday::Wed, alt((tag_no_case("wednesday"), tag_no_case("wed")))),
        value(Weekday::Thu, alt((tag_no_case("thursday"), tag_no_case("thu")))),
        value(Weekday::Fri, alt((tag_no_case("friday"), tag_no_case("fri")))),
        value(Weekday::Sat, alt((tag_no_case("saturday"), tag_no_case("sat")))),
        value(Weekday::Sun, alt((tag_no_case("sunday"), tag_no_case("sun")))),
    ))(i)
}

fn in_days(i: &str) -> PResult<'_, DayExpr> {
    map_opt(
        tuple((
            tag_no_case("in"),
            space1,
            map_res(digit1, |s: &str| s.parse::<i64>()),
            space1,
            alt((
                value(7_i64, alt((tag_no_case("weeks"), tag_no_case("week")))),
                value(1_i64, alt((tag_no_case("days"), tag_no_case("day")))),
            )),
        )),
        |(_, _, n, _, unit)| n.checked_mul(unit).map(DayExpr::Offset),
    )(i)
}

fn calendar_date(i: &str) -> PResult<'_, NaiveDate> {
    map_opt(
        take_while_m_n(10, 10, |c: char| c.is_ascii_digit() || c == '-'),
        parse_date,
    )(i)
}

fn clock_time(i: &str) -> PResult<'_, NaiveTime> {
    map_opt(
        tuple((
            map_res(digit1, |s: &str| s.parse::<u32>()),
            char(':'),
            map_res(digit1, |s: &str| s.parse::<u32>()),
        )),
        |(h, _, m)| NaiveTime::from_hms_opt(h, m, 0),
    )(i)
}
