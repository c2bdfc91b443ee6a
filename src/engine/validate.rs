use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Datelike, Weekday};
use tracing::debug;

use crate::limits::*;
use crate::model::*;

use super::blocked::BlockedDateSet;
use super::holiday::{HolidaySource, NoHolidays};
use super::{EngineError, Rejection};

// ── Calendar policy ───────────────────────────────────────────────

/// Static booking policy for one storefront.
#[derive(Debug, Clone)]
pub struct CalendarRules {
    /// Days between today and the earliest allowed start.
    pub min_lead_days: u32,
    /// Longest allowed stay, inclusive of both ends.
    pub max_total_days: u32,
    pub offered_presets: Vec<StayPreset>,
    pub disallowed_weekdays: Vec<Weekday>,
    /// Holidays on which a rental may start anyway (operationally staffed days).
    pub holiday_overrides: BTreeSet<CalendarDate>,
    /// Days the warehouse cannot dispatch or receive: no stay may start or end on them.
    pub blackout_days: BTreeSet<CalendarDate>,
    pub holidays: Arc<dyn HolidaySource>,
}

impl Default for CalendarRules {
    fn default() -> Self {
        Self {
            min_lead_days: 4,
            max_total_days: 10,
            offered_presets: StayPreset::ALL.to_vec(),
            disallowed_weekdays: vec![Weekday::Sun],
            holiday_overrides: BTreeSet::new(),
            blackout_days: BTreeSet::new(),
            holidays: Arc::new(NoHolidays),
        }
    }
}

impl CalendarRules {
    pub fn with_holidays(mut self, holidays: Arc<dyn HolidaySource>) -> Self {
        self.holidays = holidays;
        self
    }

    /// Reject policies the engine cannot honour.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.min_lead_days > MAX_LEAD_DAYS {
            return Err(EngineError::LimitExceeded("lead time too long"));
        }
        if self.max_total_days > MAX_STAY_CAP_DAYS {
            return Err(EngineError::LimitExceeded("maximum stay too long"));
        }
        if self.offered_presets.is_empty() {
            return Err(EngineError::LimitExceeded("no stay presets offered"));
        }
        if let Some(p) = self
            .offered_presets
            .iter()
            .find(|p| p.min_total_days() > self.max_total_days)
        {
            return Err(EngineError::PresetNotOffered(p.label()));
        }
        Ok(())
    }

    pub fn offers(&self, preset: StayPreset) -> bool {
        self.offered_presets.contains(&preset)
    }

    /// Earliest day a rental may start, given today.
    pub fn earliest_start(&self, today: CalendarDate) -> Option<CalendarDate> {
        add_days(today, self.min_lead_days)
    }

    /// Weekday ban, or a public holiday that is not on the override allow-list.
    pub fn is_disallowed_start_day(&self, date: CalendarDate) -> bool {
        if self.disallowed_weekdays.contains(&date.weekday()) {
            return true;
        }
        self.holidays.is_holiday(date) && !self.holiday_overrides.contains(&date)
    }
}

// ── Validation ────────────────────────────────────────────────────

/// Outcome of the full-range rules that did not end in a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeCheck {
    Accepted(DateRange),
    /// A day after the start is blocked; the end must be shifted.
    NeedsRepair { first_blocked: CalendarDate },
}

/// Start-date rules in fixed order, so the first failure names the one constraint
/// the customer has to fix.
pub fn validate_start(
    date: CalendarDate,
    rules: &CalendarRules,
    blocked: &BlockedDateSet,
    today: CalendarDate,
) -> Result<(), Rejection> {
    match rules.earliest_start(today) {
        Some(earliest) if date >= earliest => {}
        _ => {
            debug!(%date, %today, lead = rules.min_lead_days, "start inside lead time");
            return Err(Rejection::LeadTimeViolation);
        }
    }
    if rules.is_disallowed_start_day(date) {
        debug!(%date, weekday = %date.weekday(), "start on disallowed day");
        return Err(Rejection::DisallowedStartDay);
    }
    if blocked.contains(date) {
        debug!(%date, "start on blocked day");
        return Err(Rejection::DateAlreadyReserved);
    }
    Ok(())
}

/// Length rules, then the blocked-day scan over `(start, end]`. The start itself is
/// the job of [`validate_start`].
pub fn validate_range(
    range: DateRange,
    preset: StayPreset,
    rules: &CalendarRules,
    blocked: &BlockedDateSet,
) -> Result<RangeCheck, Rejection> {
    let len = range.len_days();
    if len < preset.min_total_days() {
        debug!(%range, len, min = preset.min_total_days(), "range below preset minimum");
        return Err(Rejection::BelowMinimumStay);
    }
    if len > rules.max_total_days {
        debug!(%range, len, max = rules.max_total_days, "range above cap");
        return Err(Rejection::AboveMaximumStay);
    }

    let after_start = range
        .start
        .succ_opt()
        .and_then(|s| DateRange::new(s, range.end).ok());
    if let Some(tail) = after_start
        && let Some(first_blocked) = blocked.first_blocked_in(&tail)
    {
        return Ok(RangeCheck::NeedsRepair { first_blocked });
    }
    Ok(RangeCheck::Accepted(range))
}

/// Every day in `window` that passes the start-date rules. Lets the calendar widget
/// disable days before the customer clicks them.
pub fn selectable_starts(
    window: DateRange,
    rules: &CalendarRules,
    blocked: &BlockedDateSet,
    today: CalendarDate,
) -> Result<Vec<CalendarDate>, EngineError> {
    if window.len_days() > MAX_SELECTABLE_WINDOW_DAYS {
        return Err(EngineError::LimitExceeded("selectable window too wide"));
    }
    Ok(window
        .days()
        .filter(|d| validate_start(*d, rules, blocked, today).is_ok())
        .collect())
}
