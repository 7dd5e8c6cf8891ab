//! Zoneinfo types
//!
//! The value types found in the columns of `Rule` and `Zone` lines along with
//! the date specification shared by a rule's `IN ON AT` columns and a zone's
//! `[UNTIL]` column.

use alloc::borrow::ToOwned;

use crate::{
    parser::{ContextParse, LineParseContext, TryFromStr, ZoneInfoParseError},
    utils,
};

mod rule;
mod zone;

pub use rule::{parse_optional, parse_year};
pub use zone::{RulesReference, UntilDateTime};

const MILLIS_PER_SECOND: i64 = 1_000;
const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;

/// A signed clock time, stored as milliseconds.
///
/// Parsed from `[-]H[:MM[:SS[.fff]]]`. Parsing is lenient in the same way
/// zoneinfo columns are: once a numeric prefix has been read, any trailing
/// text (e.g. a time suffix letter) is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    millis: i64,
}

impl Time {
    pub const ZERO: Self = Self { millis: 0 };

    pub const fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    pub const fn as_millis(self) -> i64 {
        self.millis
    }

    /// Parses the numeric prefix of `s`, returning `None` when no digits
    /// could be read where the hour is expected.
    pub fn parse_prefix(s: &str) -> Option<Self> {
        let (s, negative) = match s.strip_prefix('-') {
            Some(stripped) => (stripped, true),
            None => (s, false),
        };
        let mut cursor = Digits::new(s);
        let hour = cursor.integer()?;
        let mut millis = hour.checked_mul(MILLIS_PER_HOUR)?;
        if let Some(minute) = cursor.integer_after(b':') {
            millis = millis.checked_add(minute.checked_mul(MILLIS_PER_MINUTE)?)?;
            if let Some(second) = cursor.integer_after(b':') {
                millis = millis.checked_add(second.checked_mul(MILLIS_PER_SECOND)?)?;
                if let Some(fraction) = cursor.fraction() {
                    millis = millis.checked_add(fraction)?;
                }
            }
        }
        Some(Self {
            millis: if negative { -millis } else { millis },
        })
    }
}

impl TryFromStr<LineParseContext> for Time {
    type Error = ZoneInfoParseError;
    fn try_from_str(s: &str, ctx: &mut LineParseContext) -> Result<Self, Self::Error> {
        Self::parse_prefix(s)
            .ok_or_else(|| ZoneInfoParseError::InvalidTime(ctx.line_number, s.to_owned()))
    }
}

// Small cursor over ASCII digits and separators.
struct Digits<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Digits<'a> {
    fn new(s: &'a str) -> Self {
        Self {
            bytes: s.as_bytes(),
            position: 0,
        }
    }

    fn integer(&mut self) -> Option<i64> {
        let start = self.position;
        let mut value: i64 = 0;
        while let Some(digit) = self.bytes.get(self.position).filter(|b| b.is_ascii_digit()) {
            value = value.checked_mul(10)?.checked_add(i64::from(digit - b'0'))?;
            self.position += 1;
        }
        (self.position > start).then_some(value)
    }

    fn integer_after(&mut self, separator: u8) -> Option<i64> {
        if self.bytes.get(self.position) != Some(&separator) {
            return None;
        }
        let checkpoint = self.position;
        self.position += 1;
        let value = self.integer();
        if value.is_none() {
            self.position = checkpoint;
        }
        value
    }

    // Fractional seconds, truncated to milliseconds.
    fn fraction(&mut self) -> Option<i64> {
        if !matches!(self.bytes.get(self.position), Some(b'.' | b',')) {
            return None;
        }
        let digits = self.bytes[self.position + 1..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .collect::<alloc::vec::Vec<_>>();
        if digits.is_empty() {
            return None;
        }
        self.position += 1 + digits.len();
        let mut millis = 0;
        for (index, digit) in digits.iter().take(3).enumerate() {
            millis += i64::from(**digit - b'0') * [100, 10, 1][index];
        }
        Some(millis)
    }
}

/// The kind of clock a time of day is measured against, selected by the
/// time's suffix letter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum QualifiedTimeKind {
    /// Local wall clock time, including savings (`w` or no suffix).
    #[default]
    Local,
    /// Local standard time, excluding savings (`s`).
    Standard,
    /// Universal time (`u`, `g`, or `z`).
    Universal,
}

impl QualifiedTimeKind {
    /// Selects the kind from the last character of a time token.
    pub fn from_suffix(c: char) -> Self {
        match c {
            's' | 'S' => Self::Standard,
            'u' | 'U' | 'g' | 'G' | 'z' | 'Z' => Self::Universal,
            _ => Self::Local,
        }
    }

    pub const fn as_char(self) -> char {
        match self {
            Self::Local => 'w',
            Self::Standard => 's',
            Self::Universal => 'u',
        }
    }

    /// The offset between universal time and this clock.
    pub const fn offset(self, standard_offset: i64, savings: i64) -> i64 {
        match self {
            Self::Local => standard_offset + savings,
            Self::Standard => standard_offset,
            Self::Universal => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Month {
    Jan = 1,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

const MONTH_NAMES: [(&str, Month); 12] = [
    ("january", Month::Jan),
    ("february", Month::Feb),
    ("march", Month::Mar),
    ("april", Month::Apr),
    ("may", Month::May),
    ("june", Month::Jun),
    ("july", Month::Jul),
    ("august", Month::Aug),
    ("september", Month::Sep),
    ("october", Month::Oct),
    ("november", Month::Nov),
    ("december", Month::Dec),
];

impl Month {
    /// Resolves an English month name, full or three letter abbreviation,
    /// ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        MONTH_NAMES
            .iter()
            .find(|(full, _)| matches_name(name, full))
            .map(|(_, month)| *month)
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        MONTH_NAMES
            .get(usize::from(value).checked_sub(1)?)
            .map(|(_, month)| *month)
    }
}

impl TryFromStr<LineParseContext> for Month {
    type Error = ZoneInfoParseError;
    fn try_from_str(s: &str, ctx: &mut LineParseContext) -> Result<Self, Self::Error> {
        Self::from_name(s)
            .ok_or_else(|| ZoneInfoParseError::InvalidDateSpec(ctx.line_number, s.to_owned()))
    }
}

/// An ISO week day, Monday (1) through Sunday (7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum WeekDay {
    Mon = 1,
    Tues,
    Wed,
    Thurs,
    Fri,
    Sat,
    Sun,
}

const WEEK_DAY_NAMES: [(&str, WeekDay); 7] = [
    ("monday", WeekDay::Mon),
    ("tuesday", WeekDay::Tues),
    ("wednesday", WeekDay::Wed),
    ("thursday", WeekDay::Thurs),
    ("friday", WeekDay::Fri),
    ("saturday", WeekDay::Sat),
    ("sunday", WeekDay::Sun),
];

impl WeekDay {
    /// Resolves an English week day name, full or three letter abbreviation,
    /// ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        WEEK_DAY_NAMES
            .iter()
            .find(|(full, _)| matches_name(name, full))
            .map(|(_, day)| *day)
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        WEEK_DAY_NAMES
            .get(usize::from(value).checked_sub(1)?)
            .map(|(_, day)| *day)
    }
}

impl TryFromStr<LineParseContext> for WeekDay {
    type Error = ZoneInfoParseError;
    fn try_from_str(s: &str, ctx: &mut LineParseContext) -> Result<Self, Self::Error> {
        Self::from_name(s)
            .ok_or_else(|| ZoneInfoParseError::InvalidDateSpec(ctx.line_number, s.to_owned()))
    }
}

fn matches_name(name: &str, full: &str) -> bool {
    name.eq_ignore_ascii_case(full) || (name.len() == 3 && name.eq_ignore_ascii_case(&full[..3]))
}

/// The day of the month as listed by the `ON` column of a rule line or
/// the day of an `[UNTIL]` column.
///
/// The values can be a day, a GE or LE identifier (Sun>=8), or "lastSun", which
/// represents the last sunday of the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DayOfMonth {
    Last(WeekDay),
    WeekDayGEThanMonthDay(WeekDay, u8),
    WeekDayLEThanMonthDay(WeekDay, u8),
    Day(u8),
}

impl DayOfMonth {
    /// The day of month, where `-1` designates the last day.
    pub const fn day(self) -> i32 {
        match self {
            Self::Last(_) => -1,
            Self::WeekDayGEThanMonthDay(_, d)
            | Self::WeekDayLEThanMonthDay(_, d)
            | Self::Day(d) => d as i32,
        }
    }

    pub const fn week_day(self) -> Option<WeekDay> {
        match self {
            Self::Last(w)
            | Self::WeekDayGEThanMonthDay(w, _)
            | Self::WeekDayLEThanMonthDay(w, _) => Some(w),
            Self::Day(_) => None,
        }
    }

    /// Whether the week day is searched forward (`true`) or backward from the day.
    pub const fn advance(self) -> bool {
        matches!(self, Self::WeekDayGEThanMonthDay(..))
    }
}

impl TryFromStr<LineParseContext> for DayOfMonth {
    type Error = ZoneInfoParseError;
    fn try_from_str(s: &str, ctx: &mut LineParseContext) -> Result<Self, Self::Error> {
        ctx.enter("DayOfMonth");
        let result = if let Some(week_day) = s.strip_prefix("last") {
            Ok(DayOfMonth::Last(week_day.context_parse(ctx)?))
        } else if let Some(day) = parse_digits(s) {
            parse_day(s, day, ctx).map(DayOfMonth::Day)
        } else if let Some((week_day, day)) = split_week_day(s, ">=", ctx)? {
            Ok(DayOfMonth::WeekDayGEThanMonthDay(week_day, day))
        } else if let Some((week_day, day)) = split_week_day(s, "<=", ctx)? {
            Ok(DayOfMonth::WeekDayLEThanMonthDay(week_day, day))
        } else {
            Err(ZoneInfoParseError::InvalidDateSpec(
                ctx.line_number,
                s.to_owned(),
            ))
        };
        ctx.exit();
        result
    }
}

// Decimal digits only, without a sign.
fn parse_digits(s: &str) -> Option<u8> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_day(s: &str, day: u8, ctx: &LineParseContext) -> Result<u8, ZoneInfoParseError> {
    if (1..=31).contains(&day) {
        Ok(day)
    } else {
        Err(ZoneInfoParseError::InvalidDateSpec(
            ctx.line_number,
            s.to_owned(),
        ))
    }
}

fn split_week_day(
    s: &str,
    pat: &str,
    ctx: &mut LineParseContext,
) -> Result<Option<(WeekDay, u8)>, ZoneInfoParseError> {
    match s.split_once(pat) {
        Some((week_day, day)) if !week_day.is_empty() => {
            let w = week_day.context_parse::<WeekDay>(ctx)?;
            let d = parse_digits(day).ok_or_else(|| {
                ZoneInfoParseError::InvalidDateSpec(ctx.line_number, s.to_owned())
            })?;
            Ok(Some((w, parse_day(s, d, ctx)?)))
        }
        _ => Ok(None),
    }
}

/// A point in a year: month, day of month, time of day, and the clock the
/// time of day is measured against.
///
/// The default denotes the start of the year, i.e. January 1st at wall clock
/// midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateSpec {
    pub month: Month,
    pub day: DayOfMonth,
    pub time: Time,
    pub kind: QualifiedTimeKind,
}

impl Default for DateSpec {
    fn default() -> Self {
        Self {
            month: Month::Jan,
            day: DayOfMonth::Day(1),
            time: Time::ZERO,
            kind: QualifiedTimeKind::Local,
        }
    }
}

impl DateSpec {
    /// Parses the `MONTH [DAY [TIME]]` tokens of a clause.
    ///
    /// Only the provided tokens are consumed, an empty slice resolves to the
    /// default start of the year. Tokens beyond the third are ignored.
    pub fn parse_tokens(
        tokens: &[&str],
        ctx: &mut LineParseContext,
    ) -> Result<Self, ZoneInfoParseError> {
        ctx.enter("DateSpec");
        let mut spec = Self::default();
        if let Some(month) = tokens.first() {
            spec.month = month.context_parse::<Month>(ctx)?;
            if let Some(day) = tokens.get(1) {
                spec.day = day.context_parse::<DayOfMonth>(ctx)?;
                if let Some(time) = tokens.get(2) {
                    let suffix = time.chars().last().unwrap_or('w');
                    spec.kind = QualifiedTimeKind::from_suffix(suffix);
                    spec.time = time.context_parse::<Time>(ctx)?;
                }
            }
        }
        ctx.exit();
        Ok(spec)
    }

    pub const fn day_of_month(&self) -> i32 {
        self.day.day()
    }

    pub const fn week_day(&self) -> Option<WeekDay> {
        self.day.week_day()
    }

    pub const fn advance_week_day(&self) -> bool {
        self.day.advance()
    }

    pub const fn millis_of_day(&self) -> i64 {
        self.time.as_millis()
    }

    fn is_leap_day(&self) -> bool {
        self.month == Month::Feb && self.day.day() == 29
    }

    /// Returns the local epoch days of this date in `year`.
    pub(crate) fn epoch_days_for_year(&self, year: i64) -> i64 {
        let month = self.month as u8;
        let day = match self.day {
            DayOfMonth::Last(_) => utils::days_in_month(year, month),
            other => i64::from(other.day()),
        };
        let mut epoch_days = utils::epoch_days_for_date(year, month, day);
        if let Some(week_day) = self.week_day() {
            let mut days_to_add =
                i64::from(week_day as u8) - i64::from(utils::iso_week_day(epoch_days));
            if self.advance_week_day() {
                if days_to_add < 0 {
                    days_to_add += 7;
                }
            } else if days_to_add > 0 {
                days_to_add -= 7;
            }
            epoch_days += days_to_add;
        }
        epoch_days
    }

    /// Returns the local instant of this date and time in `year`.
    pub(crate) fn local_millis_for_year(&self, year: i64) -> i64 {
        utils::epoch_millis_for_epoch_days(self.epoch_days_for_year(year))
            .saturating_add(self.millis_of_day())
    }

    /// Returns the universal instant of this date in `year`, given the
    /// standard offset and savings in effect.
    pub(crate) fn to_instant(&self, year: i64, standard_offset: i64, savings: i64) -> i64 {
        self.local_millis_for_year(year)
            .saturating_sub(self.kind.offset(standard_offset, savings))
    }

    /// Returns the first instant of this date strictly after `instant`.
    pub(crate) fn next(&self, instant: i64, standard_offset: i64, savings: i64) -> i64 {
        let offset = self.kind.offset(standard_offset, savings);
        let local = instant.saturating_add(offset);
        let year = utils::year_for_epoch_millis(local);
        let mut next = self.local_millis_for_year(self.leap_year_on_or_after(year));
        if next <= local {
            next = self.local_millis_for_year(self.leap_year_on_or_after(year + 1));
        }
        next.saturating_sub(offset)
    }

    /// Returns the last instant of this date strictly before `instant`.
    pub(crate) fn previous(&self, instant: i64, standard_offset: i64, savings: i64) -> i64 {
        let offset = self.kind.offset(standard_offset, savings);
        let local = instant.saturating_add(offset);
        let year = utils::year_for_epoch_millis(local);
        let mut previous = self.local_millis_for_year(self.leap_year_on_or_before(year));
        if previous >= local {
            previous = self.local_millis_for_year(self.leap_year_on_or_before(year - 1));
        }
        previous.saturating_sub(offset)
    }

    // February 29th only occurs in leap years, every other date occurs yearly.
    fn leap_year_on_or_after(&self, mut year: i64) -> i64 {
        if self.is_leap_day() {
            while !utils::is_leap(year) {
                year += 1;
            }
        }
        year
    }

    fn leap_year_on_or_before(&self, mut year: i64) -> i64 {
        if self.is_leap_day() {
            while !utils::is_leap(year) {
                year -= 1;
            }
        }
        year
    }
}
