use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDate};

use crate::model::CalendarDate;

use super::EngineError;

/// Public-holiday lookup. Kept behind a trait so the regional source can be swapped
/// or mocked.
pub trait HolidaySource: Send + Sync + fmt::Debug {
    fn is_holiday(&self, date: CalendarDate) -> bool;
}

/// No public holidays at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHolidays;

impl HolidaySource for NoHolidays {
    fn is_holiday(&self, _date: CalendarDate) -> bool {
        false
    }
}

/// Holidays from an explicit list: one-off dates plus fixed month/day entries that
/// repeat every year.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidayCalendar {
    dates: BTreeSet<CalendarDate>,
    recurring: BTreeSet<(u32, u32)>,
}

impl HolidayCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dates(dates: impl IntoIterator<Item = CalendarDate>) -> Self {
        Self {
            dates: dates.into_iter().collect(),
            recurring: BTreeSet::new(),
        }
    }

    pub fn add_date(&mut self, date: CalendarDate) {
        self.dates.insert(date);
    }

    /// Register a holiday falling on the same month/day every year.
    /// Feb 29 is accepted and only matches in leap years.
    pub fn add_recurring(&mut self, month: u32, day: u32) -> Result<(), EngineError> {
        // 2000 is a leap year, so every real month/day pair resolves.
        if NaiveDate::from_ymd_opt(2000, month, day).is_none() {
            return Err(EngineError::InvalidCalendarDay { month, day });
        }
        self.recurring.insert((month, day));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.dates.len() + self.recurring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() && self.recurring.is_empty()
    }
}

impl HolidaySource for HolidayCalendar {
    fn is_holiday(&self, date: CalendarDate) -> bool {
        self.dates.contains(&date) || self.recurring.contains(&(date.month(), date.day()))
    }
}
