use tracing::debug;

use crate::model::*;

use super::blocked::BlockedDateSet;
use super::validate::{CalendarRules, RangeCheck, validate_range};
use super::Rejection;

// ── Range repair ──────────────────────────────────────────────────

/// Default end for a preset: the shortest stay the preset allows.
pub fn auto_end(start: CalendarDate, preset: StayPreset) -> Option<CalendarDate> {
    add_days(start, preset.min_total_days() - 1)
}

/// Shift a blocked end date forward to the first unblocked day.
///
/// Fails with `NoValidRangeWithinCap` when that day would make the stay longer
/// than `rules.max_total_days`.
pub fn repair(
    start: CalendarDate,
    proposed_end: CalendarDate,
    preset: StayPreset,
    rules: &CalendarRules,
    blocked: &BlockedDateSet,
) -> Result<DateRange, Rejection> {
    let proposed = DateRange::new(start, proposed_end).map_err(|_| Rejection::BelowMinimumStay)?;
    if proposed.len_days() < preset.min_total_days() {
        return Err(Rejection::BelowMinimumStay);
    }

    let range = blocked
        .next_free_on_or_after(proposed_end)
        .and_then(|end| DateRange::new(start, end).ok())
        .filter(|r| r.len_days() <= rules.max_total_days)
        .ok_or_else(|| {
            debug!(%start, %proposed_end, cap = rules.max_total_days, "no free end within cap");
            Rejection::NoValidRangeWithinCap
        })?;

    let shifted = range.len_days() - proposed.len_days();

    if shifted > 0 {
        metrics::histogram!(crate::observability::REPAIR_SHIFT_DAYS).record(f64::from(shifted));
        debug!(%start, %proposed_end, end = %range.end, shifted, "end shifted past blocked days");
    }
    Ok(range)
}

/// Full range resolution: length rules, repair of blocked days, then a guard that
/// the result does not swallow a day on which the item is actually out.
///
/// Repair only moves the end, so a stay may still span logistics buffer days; it
/// may never span reserved days.
pub fn resolve(
    start: CalendarDate,
    end: CalendarDate,
    preset: StayPreset,
    rules: &CalendarRules,
    blocked: &BlockedDateSet,
) -> Result<DateRange, Rejection> {
    let range = DateRange::new(start, end).map_err(|_| Rejection::BelowMinimumStay)?;
    let canonical = match validate_range(range, preset, rules, blocked)? {
        RangeCheck::Accepted(range) => range,
        RangeCheck::NeedsRepair { first_blocked } => {
            debug!(%range, %first_blocked, "range touches blocked day, repairing");
            repair(start, end, preset, rules, blocked)?
        }
    };

    if let Some(day) = blocked.reserved_within(&canonical) {
        debug!(range = %canonical, %day, "range spans an existing reservation");
        return Err(Rejection::DateAlreadyReserved);
    }
    Ok(canonical)
}
