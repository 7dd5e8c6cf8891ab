//! Compiled time zones.
//!
//! A compiled zone answers the offset, standard offset, and name key at an
//! instant, and navigates between transitions. Instants are milliseconds
//! since the Unix epoch.
//!
//! `CompiledTimeZone` is the zone produced by [`ZoneBuilder`][crate::builder::ZoneBuilder].
//! It comes in three shapes: a fixed offset, a pair of yearly recurring
//! rules, or a precalculated table of transitions optionally followed by a
//! recurring tail.

use core::fmt;

use alloc::{borrow::ToOwned, string::String, vec::Vec};

use crate::{
    codec::{ByteReader, ByteWriter, CodecError},
    types::{DateSpec, DayOfMonth, Month, QualifiedTimeKind, Time, WeekDay},
};

/// The queries the compiler makes of a compiled zone.
pub trait CompiledZone {
    fn id(&self) -> &str;

    /// The total offset from UTC at `instant`.
    fn offset_at(&self, instant: i64) -> i64;

    /// The offset from UTC at `instant`, excluding savings.
    fn standard_offset_at(&self, instant: i64) -> i64;

    fn name_key_at(&self, instant: i64) -> &str;

    /// The next transition strictly after `instant`, or `instant` itself when
    /// there are no more transitions.
    fn next_transition(&self, instant: i64) -> i64;

    /// The millisecond before the last transition at or before `instant`, or
    /// `instant` itself when there are no earlier transitions.
    fn previous_transition(&self, instant: i64) -> i64;
}

/// An error reading or writing a persisted compiled zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneCodecError {
    Codec(CodecError),
    UnknownTag(u8),
    InvalidDateSpec,
    TooManyTransitions(usize),
    /// Bytes remained after the zone was read.
    TrailingBytes(usize),
}

impl From<CodecError> for ZoneCodecError {
    fn from(value: CodecError) -> Self {
        Self::Codec(value)
    }
}

impl fmt::Display for ZoneCodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Codec(e) => e.fmt(f),
            Self::UnknownTag(tag) => write!(f, "unknown compiled zone tag {tag:#04x}"),
            Self::InvalidDateSpec => f.write_str("invalid persisted date specification"),
            Self::TooManyTransitions(n) => write!(f, "{n} transitions cannot be persisted"),
            Self::TrailingBytes(n) => write!(f, "{n} unexpected bytes after compiled zone"),
        }
    }
}

impl core::error::Error for ZoneCodecError {}

/// A savings rule that recurs every year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recurrence {
    pub date: DateSpec,
    pub name_key: String,
    pub save: i64,
}

impl Recurrence {
    fn next(&self, instant: i64, standard_offset: i64, savings: i64) -> i64 {
        self.date.next(instant, standard_offset, savings)
    }

    fn previous(&self, instant: i64, standard_offset: i64, savings: i64) -> i64 {
        self.date.previous(instant, standard_offset, savings)
    }

    fn rename_append(&self, suffix: &str) -> Self {
        let mut name_key = self.name_key.clone();
        name_key.push_str(suffix);
        Self {
            name_key,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedZone {
    pub name_key: String,
    pub wall_offset: i64,
    pub standard_offset: i64,
}

/// Standard time with daylight savings between two yearly recurrences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DstZone {
    pub standard_offset: i64,
    pub start: Recurrence,
    pub end: Recurrence,
}

impl DstZone {
    pub fn new(standard_offset: i64, start: Recurrence, end: Recurrence) -> Self {
        // Both halves of the year need distinct keys.
        let (start, end) = if start.name_key == end.name_key {
            if start.save > 0 {
                (start.rename_append("-Summer"), end)
            } else {
                let end = end.rename_append("-Summer");
                (start, end)
            }
        } else {
            (start, end)
        };
        Self {
            standard_offset,
            start,
            end,
        }
    }

    fn matching_recurrence(&self, instant: i64) -> &Recurrence {
        let start = self
            .start
            .next(instant, self.standard_offset, self.end.save)
            .max(instant);
        let end = self
            .end
            .next(instant, self.standard_offset, self.start.save)
            .max(instant);
        if start > end {
            &self.start
        } else {
            &self.end
        }
    }

    fn offset_at(&self, instant: i64) -> i64 {
        self.standard_offset + self.matching_recurrence(instant).save
    }

    fn name_key_at(&self, instant: i64) -> &str {
        &self.matching_recurrence(instant).name_key
    }

    fn next_transition(&self, instant: i64) -> i64 {
        let start = self
            .start
            .next(instant, self.standard_offset, self.end.save)
            .max(instant);
        let end = self
            .end
            .next(instant, self.standard_offset, self.start.save)
            .max(instant);
        start.min(end)
    }

    fn previous_transition(&self, instant: i64) -> i64 {
        let instant = instant.saturating_add(1);
        let start = self
            .start
            .previous(instant, self.standard_offset, self.end.save)
            .min(instant);
        let end = self
            .end
            .previous(instant, self.standard_offset, self.start.save)
            .min(instant);
        start.max(end).saturating_sub(1)
    }
}

/// One entry of a precalculated transition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneTransition {
    pub at: i64,
    pub name_key: String,
    pub wall_offset: i64,
    pub standard_offset: i64,
}

/// A table of transitions, ascending by instant, optionally followed by a
/// recurring tail that applies after the last transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecalculatedZone {
    transitions: Vec<ZoneTransition>,
    tail: Option<DstZone>,
}

impl PrecalculatedZone {
    pub fn new(transitions: Vec<ZoneTransition>, tail: Option<DstZone>) -> Self {
        Self { transitions, tail }
    }

    pub fn transitions(&self) -> &[ZoneTransition] {
        &self.transitions
    }

    pub fn tail(&self) -> Option<&DstZone> {
        self.tail.as_ref()
    }

    fn search(&self, instant: i64) -> Result<usize, usize> {
        self.transitions.binary_search_by_key(&instant, |t| t.at)
    }

    // The entry in effect at instant. `None` before the first transition,
    // and `Err` past the table when a tail takes over.
    fn entry_at(&self, instant: i64) -> Result<Option<&ZoneTransition>, &DstZone> {
        match self.search(instant) {
            Ok(i) => Ok(self.transitions.get(i)),
            Err(0) => Ok(None),
            Err(i) if i < self.transitions.len() => Ok(self.transitions.get(i - 1)),
            Err(i) => match &self.tail {
                Some(tail) => Err(tail),
                None => Ok(self.transitions.get(i - 1)),
            },
        }
    }

    fn offset_at(&self, instant: i64) -> i64 {
        match self.entry_at(instant) {
            Ok(entry) => entry.map_or(0, |t| t.wall_offset),
            Err(tail) => tail.offset_at(instant),
        }
    }

    fn standard_offset_at(&self, instant: i64) -> i64 {
        match self.entry_at(instant) {
            Ok(entry) => entry.map_or(0, |t| t.standard_offset),
            Err(tail) => tail.standard_offset,
        }
    }

    fn name_key_at(&self, instant: i64) -> &str {
        match self.entry_at(instant) {
            Ok(entry) => entry.map_or("UTC", |t| t.name_key.as_str()),
            Err(tail) => tail.name_key_at(instant),
        }
    }

    fn next_transition(&self, instant: i64) -> i64 {
        let index = match self.search(instant) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        if let Some(next) = self.transitions.get(index) {
            return next.at;
        }
        let Some(tail) = &self.tail else {
            return instant;
        };
        let end = self.transitions.last().map_or(instant, |t| t.at);
        tail.next_transition(instant.max(end))
    }

    fn previous_transition(&self, instant: i64) -> i64 {
        let index = match self.search(instant) {
            Ok(_) => return instant.saturating_sub(1),
            Err(i) => i,
        };
        if index < self.transitions.len() {
            return match index.checked_sub(1).and_then(|i| self.transitions.get(i)) {
                Some(previous) if previous.at > i64::MIN => previous.at - 1,
                _ => instant,
            };
        }
        let fallback = match self.transitions.last() {
            Some(last) if last.at > i64::MIN => last.at - 1,
            _ => instant,
        };
        if let Some(tail) = &self.tail {
            let previous = tail.previous_transition(instant);
            // The tail never reaches back into the table.
            if previous < instant {
                return previous.max(fallback);
            }
        }
        fallback
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneKind {
    Fixed(FixedZone),
    Dst(DstZone),
    Precalculated(PrecalculatedZone),
}

/// The compiled form of one zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTimeZone {
    id: String,
    kind: ZoneKind,
}

const FIXED_TAG: u8 = b'F';
const DST_TAG: u8 = b'D';
const PRECALCULATED_TAG: u8 = b'P';

impl CompiledTimeZone {
    pub fn new(id: &str, kind: ZoneKind) -> Self {
        Self {
            id: id.to_owned(),
            kind,
        }
    }

    pub fn fixed(id: &str, name_key: &str, wall_offset: i64, standard_offset: i64) -> Self {
        Self::new(
            id,
            ZoneKind::Fixed(FixedZone {
                name_key: name_key.to_owned(),
                wall_offset,
                standard_offset,
            }),
        )
    }

    pub fn kind(&self) -> &ZoneKind {
        &self.kind
    }

    /// Writes the zone, without its id.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ZoneCodecError> {
        let mut writer = ByteWriter::default();
        match &self.kind {
            ZoneKind::Fixed(fixed) => {
                writer.write_u8(FIXED_TAG);
                writer.write_str(&fixed.name_key)?;
                writer.write_i64(fixed.wall_offset);
                writer.write_i64(fixed.standard_offset);
            }
            ZoneKind::Dst(dst) => {
                writer.write_u8(DST_TAG);
                write_dst(&mut writer, dst)?;
            }
            ZoneKind::Precalculated(table) => {
                writer.write_u8(PRECALCULATED_TAG);
                let count = u32::try_from(table.transitions.len())
                    .map_err(|_| ZoneCodecError::TooManyTransitions(table.transitions.len()))?;
                writer.write_u32(count);
                for transition in &table.transitions {
                    writer.write_i64(transition.at);
                    writer.write_str(&transition.name_key)?;
                    writer.write_i64(transition.wall_offset);
                    writer.write_i64(transition.standard_offset);
                }
                match &table.tail {
                    Some(tail) => {
                        writer.write_u8(1);
                        write_dst(&mut writer, tail)?;
                    }
                    None => writer.write_u8(0),
                }
            }
        }
        Ok(writer.into_bytes())
    }

    /// Reads a zone written by [`Self::to_bytes`], assigning it `id`.
    pub fn from_bytes(bytes: &[u8], id: &str) -> Result<Self, ZoneCodecError> {
        let mut reader = ByteReader::new(bytes);
        let kind = match reader.read_u8()? {
            FIXED_TAG => ZoneKind::Fixed(FixedZone {
                name_key: reader.read_string()?,
                wall_offset: reader.read_i64()?,
                standard_offset: reader.read_i64()?,
            }),
            DST_TAG => ZoneKind::Dst(read_dst(&mut reader)?),
            PRECALCULATED_TAG => {
                let count = reader.read_u32()?;
                let mut transitions = Vec::new();
                for _ in 0..count {
                    transitions.push(ZoneTransition {
                        at: reader.read_i64()?,
                        name_key: reader.read_string()?,
                        wall_offset: reader.read_i64()?,
                        standard_offset: reader.read_i64()?,
                    });
                }
                let tail = match reader.read_u8()? {
                    0 => None,
                    _ => Some(read_dst(&mut reader)?),
                };
                ZoneKind::Precalculated(PrecalculatedZone { transitions, tail })
            }
            tag => return Err(ZoneCodecError::UnknownTag(tag)),
        };
        if reader.remaining() != 0 {
            return Err(ZoneCodecError::TrailingBytes(reader.remaining()));
        }
        Ok(Self::new(id, kind))
    }
}

impl CompiledZone for CompiledTimeZone {
    fn id(&self) -> &str {
        &self.id
    }

    fn offset_at(&self, instant: i64) -> i64 {
        match &self.kind {
            ZoneKind::Fixed(fixed) => fixed.wall_offset,
            ZoneKind::Dst(dst) => dst.offset_at(instant),
            ZoneKind::Precalculated(table) => table.offset_at(instant),
        }
    }

    fn standard_offset_at(&self, instant: i64) -> i64 {
        match &self.kind {
            ZoneKind::Fixed(fixed) => fixed.standard_offset,
            ZoneKind::Dst(dst) => dst.standard_offset,
            ZoneKind::Precalculated(table) => table.standard_offset_at(instant),
        }
    }

    fn name_key_at(&self, instant: i64) -> &str {
        match &self.kind {
            ZoneKind::Fixed(fixed) => &fixed.name_key,
            ZoneKind::Dst(dst) => dst.name_key_at(instant),
            ZoneKind::Precalculated(table) => table.name_key_at(instant),
        }
    }

    fn next_transition(&self, instant: i64) -> i64 {
        match &self.kind {
            ZoneKind::Fixed(_) => instant,
            ZoneKind::Dst(dst) => dst.next_transition(instant),
            ZoneKind::Precalculated(table) => table.next_transition(instant),
        }
    }

    fn previous_transition(&self, instant: i64) -> i64 {
        match &self.kind {
            ZoneKind::Fixed(_) => instant,
            ZoneKind::Dst(dst) => dst.previous_transition(instant),
            ZoneKind::Precalculated(table) => table.previous_transition(instant),
        }
    }
}

fn write_dst(writer: &mut ByteWriter, dst: &DstZone) -> Result<(), CodecError> {
    writer.write_i64(dst.standard_offset);
    write_recurrence(writer, &dst.start)?;
    write_recurrence(writer, &dst.end)
}

fn read_dst(reader: &mut ByteReader<'_>) -> Result<DstZone, ZoneCodecError> {
    Ok(DstZone {
        standard_offset: reader.read_i64()?,
        start: read_recurrence(reader)?,
        end: read_recurrence(reader)?,
    })
}

fn write_recurrence(writer: &mut ByteWriter, recurrence: &Recurrence) -> Result<(), CodecError> {
    writer.write_str(&recurrence.name_key)?;
    writer.write_i64(recurrence.save);
    write_date_spec(writer, &recurrence.date);
    Ok(())
}

fn read_recurrence(reader: &mut ByteReader<'_>) -> Result<Recurrence, ZoneCodecError> {
    Ok(Recurrence {
        name_key: reader.read_string()?,
        save: reader.read_i64()?,
        date: read_date_spec(reader)?,
    })
}

// kind char, month, signed day, week day (0 for an exact day), advance flag, millis.
pub(crate) fn write_date_spec(writer: &mut ByteWriter, date: &DateSpec) {
    writer.write_u8(date.kind.as_char() as u8);
    writer.write_u8(date.month as u8);
    writer.write_u8(date.day_of_month() as i8 as u8);
    writer.write_u8(date.week_day().map_or(0, |w| w as u8));
    writer.write_u8(u8::from(date.advance_week_day()));
    writer.write_i64(date.millis_of_day());
}

pub(crate) fn read_date_spec(reader: &mut ByteReader<'_>) -> Result<DateSpec, ZoneCodecError> {
    let kind = QualifiedTimeKind::from_suffix(char::from(reader.read_u8()?));
    let month = Month::from_u8(reader.read_u8()?).ok_or(ZoneCodecError::InvalidDateSpec)?;
    let day = reader.read_u8()? as i8;
    let week_day = reader.read_u8()?;
    let advance = reader.read_u8()? != 0;
    let time = Time::from_millis(reader.read_i64()?);
    let day = match (day, week_day) {
        (1..=31, 0) => DayOfMonth::Day(day as u8),
        (_, 0) => return Err(ZoneCodecError::InvalidDateSpec),
        (day, week_day) => {
            let week_day = WeekDay::from_u8(week_day).ok_or(ZoneCodecError::InvalidDateSpec)?;
            match day {
                -1 => DayOfMonth::Last(week_day),
                1..=31 if advance => DayOfMonth::WeekDayGEThanMonthDay(week_day, day as u8),
                1..=31 => DayOfMonth::WeekDayLEThanMonthDay(week_day, day as u8),
                _ => return Err(ZoneCodecError::InvalidDateSpec),
            }
        }
    };
    Ok(DateSpec {
        month,
        day,
        time,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::LineParseContext;

    fn date(tokens: &[&str]) -> DateSpec {
        DateSpec::parse_tokens(tokens, &mut LineParseContext::default()).unwrap()
    }

    // Central European rules since 1996.
    fn eu_tail() -> DstZone {
        DstZone::new(
            3_600_000,
            Recurrence {
                date: date(&["Mar", "lastSun", "1:00u"]),
                name_key: "CEST".to_owned(),
                save: 3_600_000,
            },
            Recurrence {
                date: date(&["Oct", "lastSun", "1:00u"]),
                name_key: "CET".to_owned(),
                save: 0,
            },
        )
    }

    // 2021-03-28T01:00Z and 2021-10-31T01:00Z
    const SPRING_2021: i64 = 1_616_893_200_000;
    const AUTUMN_2021: i64 = 1_635_642_000_000;
    // 2021-07-01T00:00Z
    const JULY_2021: i64 = 1_625_097_600_000;

    #[test]
    fn dst_zone_queries() {
        let zone = CompiledTimeZone::new("Test/EU", ZoneKind::Dst(eu_tail()));
        assert_eq!(zone.next_transition(SPRING_2021 - 86_400_000), SPRING_2021);
        assert_eq!(zone.next_transition(SPRING_2021), AUTUMN_2021);
        assert_eq!(zone.previous_transition(AUTUMN_2021), AUTUMN_2021 - 1);
        assert_eq!(zone.previous_transition(AUTUMN_2021 - 1), SPRING_2021 - 1);
        assert_eq!(zone.previous_transition(AUTUMN_2021 + 1), AUTUMN_2021 - 1);
        assert_eq!(zone.offset_at(JULY_2021), 7_200_000);
        assert_eq!(zone.name_key_at(JULY_2021), "CEST");
        assert_eq!(zone.offset_at(AUTUMN_2021), 3_600_000);
        assert_eq!(zone.name_key_at(AUTUMN_2021), "CET");
        assert_eq!(zone.standard_offset_at(JULY_2021), 3_600_000);
    }

    #[test]
    fn identical_keys_are_split() {
        let mut tail = eu_tail();
        tail.start.name_key = "CET".to_owned();
        let tail = DstZone::new(tail.standard_offset, tail.start, tail.end);
        assert_eq!(tail.start.name_key, "CET-Summer");
        assert_eq!(tail.end.name_key, "CET");
    }

    fn table() -> PrecalculatedZone {
        PrecalculatedZone::new(
            alloc::vec![
                ZoneTransition {
                    at: i64::MIN,
                    name_key: "LMT".to_owned(),
                    wall_offset: 1_050_000,
                    standard_offset: 1_050_000,
                },
                ZoneTransition {
                    at: 0,
                    name_key: "CET".to_owned(),
                    wall_offset: 3_600_000,
                    standard_offset: 3_600_000,
                },
            ],
            Some(eu_tail()),
        )
    }

    #[test]
    fn precalculated_queries() {
        let zone = CompiledTimeZone::new("Test/Table", ZoneKind::Precalculated(table()));
        assert_eq!(zone.offset_at(-1), 1_050_000);
        assert_eq!(zone.name_key_at(-1), "LMT");
        assert_eq!(zone.offset_at(0), 3_600_000);
        assert_eq!(zone.next_transition(-1), 0);
        assert_eq!(zone.previous_transition(0), -1);
        assert_eq!(zone.previous_transition(-5), -5);
        assert_eq!(zone.previous_transition(5), -1);
        assert_eq!(zone.next_transition(SPRING_2021 - 1), SPRING_2021);
        assert_eq!(zone.offset_at(JULY_2021), 7_200_000);
        assert_eq!(zone.name_key_at(JULY_2021), "CEST");
        assert_eq!(zone.previous_transition(JULY_2021), SPRING_2021 - 1);
    }

    #[test]
    fn table_without_tail() {
        let mut table = table();
        table.tail = None;
        let zone = CompiledTimeZone::new("Test/Table", ZoneKind::Precalculated(table));
        assert_eq!(zone.next_transition(0), 0);
        assert_eq!(zone.next_transition(JULY_2021), JULY_2021);
        assert_eq!(zone.previous_transition(JULY_2021), -1);
        assert_eq!(zone.offset_at(JULY_2021), 3_600_000);
    }

    #[test]
    fn fixed_zone_has_no_transitions() {
        let zone = CompiledTimeZone::fixed("Etc/UTC", "UTC", 0, 0);
        assert_eq!(zone.next_transition(42), 42);
        assert_eq!(zone.previous_transition(42), 42);
        assert_eq!(zone.name_key_at(42), "UTC");
    }

    #[test]
    fn persistence() {
        let zone = CompiledTimeZone::new("Test/Table", ZoneKind::Precalculated(table()));
        let bytes = zone.to_bytes().unwrap();
        assert_eq!(bytes[0], b'P');
        assert_eq!(CompiledTimeZone::from_bytes(&bytes, "Test/Table").unwrap(), zone);
        let renamed = CompiledTimeZone::from_bytes(&bytes, "Test/Other").unwrap();
        assert_eq!(renamed.id(), "Test/Other");
        assert_ne!(renamed, zone);

        let fixed = CompiledTimeZone::fixed("Etc/GMT+5", "-05", -18_000_000, -18_000_000);
        let bytes = fixed.to_bytes().unwrap();
        assert_eq!(CompiledTimeZone::from_bytes(&bytes, "Etc/GMT+5").unwrap(), fixed);

        assert_eq!(
            CompiledTimeZone::from_bytes(b"X", "Bad"),
            Err(ZoneCodecError::UnknownTag(b'X'))
        );
        let mut padded = bytes.clone();
        padded.push(0);
        assert_eq!(
            CompiledTimeZone::from_bytes(&padded, "Etc/GMT+5"),
            Err(ZoneCodecError::TrailingBytes(1))
        );
    }
}
