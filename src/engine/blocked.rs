use std::time::Instant;

use tracing::debug;

use crate::model::*;

// ── Blocked date model ────────────────────────────────────────────

/// Days on which a new reservation for one item/size may not start or end.
///
/// Built from a snapshot of existing reservations: every reserved day plus the
/// lead/trail logistics buffer around each reservation. Stored as a sorted,
/// deduplicated vector so every membership query is a binary search.
///
/// The un-buffered reserved days are kept alongside, so callers can tell a
/// shipping/cleaning buffer day from a day the item is actually out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockedDateSet {
    days: Vec<CalendarDate>,
    reserved: Vec<CalendarDate>,
}

impl BlockedDateSet {
    /// Expand every reservation by the buffer and union the results.
    ///
    /// No interval merging: downstream queries are point membership only, and
    /// the vector dedup already collapses overlapping buffers.
    pub fn build(intervals: &[ReservedInterval], buffer: BufferPolicy) -> Self {
        let started = Instant::now();
        let mut days = Vec::new();
        let mut reserved = Vec::new();

        for interval in intervals {
            reserved.extend(interval.as_range().days());
            days.extend(interval.expanded(&buffer).days());
        }

        days.sort_unstable();
        days.dedup();
        reserved.sort_unstable();
        reserved.dedup();

        metrics::histogram!(crate::observability::BLOCKED_SET_BUILD_SECONDS)
            .record(started.elapsed().as_secs_f64());
        debug!(
            intervals = intervals.len(),
            blocked = days.len(),
            reserved = reserved.len(),
            "built blocked date set"
        );

        Self { days, reserved }
    }

    /// A set from an explicit day list. Every day counts as a buffer day.
    pub fn from_days(days: impl IntoIterator<Item = CalendarDate>) -> Self {
        let mut days: Vec<CalendarDate> = days.into_iter().collect();
        days.sort_unstable();
        days.dedup();
        Self {
            days,
            reserved: Vec::new(),
        }
    }

    /// Add days blocked for reasons other than a reservation (warehouse closures).
    pub fn with_days(mut self, extra: impl IntoIterator<Item = CalendarDate>) -> Self {
        self.days.extend(extra);
        self.days.sort_unstable();
        self.days.dedup();
        self
    }

    pub fn contains(&self, day: CalendarDate) -> bool {
        self.days.binary_search(&day).is_ok()
    }

    /// True if the item is actually out on `day` (not merely buffered).
    pub fn is_reserved(&self, day: CalendarDate) -> bool {
        self.reserved.binary_search(&day).is_ok()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = CalendarDate> + '_ {
        self.days.iter().copied()
    }

    /// Earliest blocked day inside `range`, if any.
    pub fn first_blocked_in(&self, range: &DateRange) -> Option<CalendarDate> {
        first_within(&self.days, range)
    }

    /// Earliest reserved (un-buffered) day inside `range`, if any.
    pub fn reserved_within(&self, range: &DateRange) -> Option<CalendarDate> {
        first_within(&self.reserved, range)
    }

    /// First unblocked day at or after `day`. `None` only at the calendar's edge.
    pub fn next_free_on_or_after(&self, day: CalendarDate) -> Option<CalendarDate> {
        let mut candidate = day;
        let pos = self.days.partition_point(|d| *d < day);
        for blocked in &self.days[pos..] {
            if *blocked != candidate {
                break;
            }
            candidate = candidate.succ_opt()?;
        }
        Some(candidate)
    }

    /// Contiguous blocked runs, sorted. Compact form for the calendar widget.
    pub fn runs(&self) -> Vec<DateRange> {
        let mut runs: Vec<DateRange> = Vec::new();
        for &day in &self.days {
            if let Some(last) = runs.last_mut()
                && last.end.succ_opt() == Some(day)
            {
                last.end = day;
                continue;
            }
            runs.push(DateRange::single(day));
        }
        runs
    }
}

fn first_within(sorted: &[CalendarDate], range: &DateRange) -> Option<CalendarDate> {
    let pos = sorted.partition_point(|d| *d < range.start);
    sorted.get(pos).copied().filter(|d| *d <= range.end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> CalendarDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn reserved(start: CalendarDate, end: CalendarDate) -> ReservedInterval {
        ReservedInterval::new(start, end).unwrap()
    }

    fn span(start: CalendarDate, end: CalendarDate) -> DateRange {
        DateRange::new(start, end).unwrap()
    }

    // ── build ────────────────────────────────────────────

    #[test]
    fn buffer_symmetry_single_reservation() {
        let set = BlockedDateSet::build(
            &[reserved(d(2025, 1, 10), d(2025, 1, 12))],
            BufferPolicy::default(),
        );
        let expected: Vec<_> = span(d(2025, 1, 7), d(2025, 1, 15)).days().collect();
        assert_eq!(set.iter().collect::<Vec<_>>(), expected);
        assert!(!set.contains(d(2025, 1, 6)));
        assert!(!set.contains(d(2025, 1, 16)));
    }

    #[test]
    fn build_is_idempotent() {
        let intervals = [
            reserved(d(2025, 3, 10), d(2025, 3, 11)),
            reserved(d(2025, 3, 20), d(2025, 3, 24)),
            reserved(d(2025, 3, 1), d(2025, 3, 1)),
        ];
        let a = BlockedDateSet::build(&intervals, BufferPolicy::default());
        let b = BlockedDateSet::build(&intervals, BufferPolicy::default());
        assert_eq!(a, b);
    }

    #[test]
    fn input_order_does_not_matter() {
        let x = reserved(d(2025, 3, 10), d(2025, 3, 11));
        let y = reserved(d(2025, 4, 2), d(2025, 4, 5));
        let a = BlockedDateSet::build(&[x, y], BufferPolicy::default());
        let b = BlockedDateSet::build(&[y, x], BufferPolicy::default());
        assert_eq!(a, b);
    }

    #[test]
    fn overlapping_buffers_are_deduplicated() {
        // Trail buffer of the first meets the lead buffer of the second.
        let set = BlockedDateSet::build(
            &[
                reserved(d(2025, 5, 1), d(2025, 5, 2)),
                reserved(d(2025, 5, 6), d(2025, 5, 7)),
            ],
            BufferPolicy::default(),
        );
        let expected: Vec<_> = span(d(2025, 4, 28), d(2025, 5, 10)).days().collect();
        assert_eq!(set.iter().collect::<Vec<_>>(), expected);
        assert_eq!(set.len(), expected.len());
    }

    #[test]
    fn zero_buffer_blocks_only_reserved_days() {
        let set = BlockedDateSet::build(
            &[reserved(d(2025, 1, 10), d(2025, 1, 12))],
            BufferPolicy { lead_days: 0, trail_days: 0 },
        );
        assert_eq!(set.len(), 3);
        assert!(set.contains(d(2025, 1, 10)));
        assert!(!set.contains(d(2025, 1, 9)));
    }

    #[test]
    fn asymmetric_buffers() {
        let set = BlockedDateSet::build(
            &[reserved(d(2025, 1, 10), d(2025, 1, 10))],
            BufferPolicy { lead_days: 1, trail_days: 2 },
        );
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![d(2025, 1, 9), d(2025, 1, 10), d(2025, 1, 11), d(2025, 1, 12)]
        );
    }

    #[test]
    fn reserved_days_tracked_separately_from_buffer() {
        let set = BlockedDateSet::build(
            &[reserved(d(2025, 3, 10), d(2025, 3, 11))],
            BufferPolicy::default(),
        );
        assert!(set.contains(d(2025, 3, 8)));
        assert!(!set.is_reserved(d(2025, 3, 8)));
        assert!(set.is_reserved(d(2025, 3, 10)));
        assert!(set.is_reserved(d(2025, 3, 11)));
    }

    #[test]
    fn empty_input_blocks_nothing() {
        let set = BlockedDateSet::build(&[], BufferPolicy::default());
        assert!(set.is_empty());
        assert!(set.runs().is_empty());
    }

    // ── queries ──────────────────────────────────────────

    #[test]
    fn first_blocked_in_range() {
        let set = BlockedDateSet::from_days([d(2025, 2, 4), d(2025, 2, 9)]);
        assert_eq!(
            set.first_blocked_in(&span(d(2025, 2, 2), d(2025, 2, 10))),
            Some(d(2025, 2, 4))
        );
        assert_eq!(
            set.first_blocked_in(&span(d(2025, 2, 5), d(2025, 2, 10))),
            Some(d(2025, 2, 9))
        );
        assert_eq!(set.first_blocked_in(&span(d(2025, 2, 5), d(2025, 2, 8))), None);
    }

    #[test]
    fn from_days_has_no_reserved_days() {
        let set = BlockedDateSet::from_days([d(2025, 2, 4), d(2025, 2, 4)]);
        assert_eq!(set.len(), 1);
        assert!(!set.is_reserved(d(2025, 2, 4)));
        assert_eq!(set.reserved_within(&span(d(2025, 2, 1), d(2025, 2, 28))), None);
    }

    #[test]
    fn extra_days_are_blocked_but_not_reserved() {
        let set = BlockedDateSet::build(
            &[reserved(d(2025, 3, 10), d(2025, 3, 11))],
            BufferPolicy::default(),
        )
        .with_days([d(2025, 3, 20), d(2025, 3, 8)]);
        assert!(set.contains(d(2025, 3, 20)));
        assert!(!set.is_reserved(d(2025, 3, 20)));
        assert_eq!(set.len(), 9);
    }

    #[test]
    fn next_free_skips_a_whole_run() {
        let set = BlockedDateSet::build(
            &[reserved(d(2025, 3, 10), d(2025, 3, 11))],
            BufferPolicy::default(),
        );
        assert_eq!(set.next_free_on_or_after(d(2025, 3, 10)), Some(d(2025, 3, 15)));
        assert_eq!(set.next_free_on_or_after(d(2025, 3, 5)), Some(d(2025, 3, 5)));
        assert_eq!(set.next_free_on_or_after(d(2025, 3, 14)), Some(d(2025, 3, 15)));
    }

    #[test]
    fn runs_merge_adjacent_days() {
        let set = BlockedDateSet::from_days([
            d(2025, 2, 28),
            d(2025, 3, 1),
            d(2025, 3, 2),
            d(2025, 3, 5),
        ]);
        assert_eq!(
            set.runs(),
            vec![span(d(2025, 2, 28), d(2025, 3, 2)), DateRange::single(d(2025, 3, 5))]
        );
    }
}
