use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::{EngineError, Rejection};

/// A timezone-naive calendar day. The only time type.
pub type CalendarDate = NaiveDate;

/// Identifier handed back by the persistence collaborator.
pub type BookingId = Ulid;

/// Shift a day forward, `None` past the end of chrono's calendar.
pub fn add_days(date: CalendarDate, days: u32) -> Option<CalendarDate> {
    date.checked_add_days(Days::new(u64::from(days)))
}

/// Shift a day backward, `None` before the start of chrono's calendar.
pub fn sub_days(date: CalendarDate, days: u32) -> Option<CalendarDate> {
    date.checked_sub_days(Days::new(u64::from(days)))
}

#[derive(Deserialize)]
struct RawRange {
    start: CalendarDate,
    end: CalendarDate,
}

/// Inclusive day range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct DateRange {
    pub start: CalendarDate,
    pub end: CalendarDate,
}

impl DateRange {
    pub fn new(start: CalendarDate, end: CalendarDate) -> Result<Self, EngineError> {
        if start > end {
            return Err(EngineError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(day: CalendarDate) -> Self {
        Self { start: day, end: day }
    }

    /// Inclusive length: a range starting and ending on the same day is 1 day long.
    pub fn len_days(&self) -> u32 {
        (self.end - self.start).num_days() as u32 + 1
    }

    pub fn contains(&self, day: CalendarDate) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = CalendarDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

impl TryFrom<RawRange> for DateRange {
    type Error = EngineError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        DateRange::new(raw.start, raw.end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Logistics turnaround around every existing reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferPolicy {
    pub lead_days: u32,
    pub trail_days: u32,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self {
            lead_days: 3,
            trail_days: 3,
        }
    }
}

/// An already-confirmed booking for one item/size, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct ReservedInterval {
    pub start: CalendarDate,
    pub end: CalendarDate,
}

impl ReservedInterval {
    pub fn new(start: CalendarDate, end: CalendarDate) -> Result<Self, EngineError> {
        if start > end {
            return Err(EngineError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn as_range(&self) -> DateRange {
        DateRange {
            start: self.start,
            end: self.end,
        }
    }

    /// The reservation widened by the buffer on both sides, clamped to chrono's calendar.
    pub fn expanded(&self, buffer: &BufferPolicy) -> DateRange {
        DateRange {
            start: sub_days(self.start, buffer.lead_days).unwrap_or(NaiveDate::MIN),
            end: add_days(self.end, buffer.trail_days).unwrap_or(NaiveDate::MAX),
        }
    }
}

impl TryFrom<RawRange> for ReservedInterval {
    type Error = EngineError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        ReservedInterval::new(raw.start, raw.end)
    }
}

/// Minimum-stay option picked before exact dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StayPreset {
    /// 3 nights.
    Short,
    /// 5 nights.
    Long,
}

impl StayPreset {
    pub const ALL: [StayPreset; 2] = [StayPreset::Short, StayPreset::Long];

    pub fn min_total_days(self) -> u32 {
        match self {
            StayPreset::Short => 4,
            StayPreset::Long => 6,
        }
    }

    pub fn nights(self) -> u32 {
        self.min_total_days() - 1
    }

    pub fn label(self) -> &'static str {
        match self {
            StayPreset::Short => "short",
            StayPreset::Long => "long",
        }
    }
}

impl fmt::Display for StayPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for StayPreset {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(StayPreset::Short),
            "long" => Ok(StayPreset::Long),
            _ => Err(EngineError::UnknownPreset(s.to_string())),
        }
    }
}

/// One physical unit: a garment in one size.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub item_id: Ulid,
    pub size: String,
}

impl ItemKey {
    pub fn new(item_id: Ulid, size: impl Into<String>) -> Self {
        Self {
            item_id,
            size: size.into(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.item_id, self.size)
    }
}

/// What a session tells its UI host. Flat, one variant per callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionEvent {
    BlockedSetReady {
        session_id: Ulid,
        item: ItemKey,
        /// Contiguous blocked runs, sorted.
        runs: Vec<DateRange>,
    },
    ValidationResult {
        session_id: Ulid,
        result: Result<DateRange, Rejection>,
    },
}
