use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::engine::*;
use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::store::{BookingStore, ScheduleSource, StoreError};

/// Callbacks a UI host receives from a session.
pub trait SessionObserver: Send + Sync {
    /// The calendar can now grey out these days.
    fn on_blocked_set_ready(&self, session_id: Ulid, item: &ItemKey, blocked: &BlockedDateSet);

    /// Outcome of every date pick, for inline messaging.
    fn on_validation_result(&self, session_id: Ulid, result: Result<DateRange, Rejection>);

    /// The session was dropped, whether or not it was confirmed.
    fn on_session_closed(&self, _session_id: Ulid) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// No item/size loaded yet.
    Idle,
    /// Blocked set built, no preset chosen.
    RangeUnset,
    /// A preset is chosen; dates may or may not be picked yet.
    PresetChosen,
    /// Final range re-validated and handed off. Terminal.
    RangeConfirmed,
}

/// One customer's date-picking interaction on one item/size.
///
/// Created when the picker opens and dropped when it closes; nothing here is
/// shared or persisted except the confirmed range. Dropping is the only cleanup:
/// the observer hears `on_session_closed`. A rejected pick never mutates the
/// current selection.
pub struct BookingSession {
    id: Ulid,
    rules: CalendarRules,
    buffer: BufferPolicy,
    today: CalendarDate,
    state: SessionState,
    item: Option<ItemKey>,
    blocked: BlockedDateSet,
    preset: Option<StayPreset>,
    start: Option<CalendarDate>,
    end: Option<CalendarDate>,
    booking: Option<BookingId>,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl BookingSession {
    pub fn new(
        rules: CalendarRules,
        buffer: BufferPolicy,
        today: CalendarDate,
    ) -> Result<Self, EngineError> {
        rules.check()?;
        if buffer.lead_days > MAX_BUFFER_DAYS || buffer.trail_days > MAX_BUFFER_DAYS {
            return Err(EngineError::LimitExceeded("buffer too wide"));
        }
        Ok(Self {
            id: Ulid::new(),
            rules,
            buffer,
            today,
            state: SessionState::Idle,
            item: None,
            blocked: BlockedDateSet::default(),
            preset: None,
            start: None,
            end: None,
            booking: None,
            observer: None,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    // ── Accessors ────────────────────────────────────────────

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn item(&self) -> Option<&ItemKey> {
        self.item.as_ref()
    }

    pub fn today(&self) -> CalendarDate {
        self.today
    }

    pub fn rules(&self) -> &CalendarRules {
        &self.rules
    }

    pub fn blocked(&self) -> &BlockedDateSet {
        &self.blocked
    }

    pub fn preset(&self) -> Option<StayPreset> {
        self.preset
    }

    pub fn start(&self) -> Option<CalendarDate> {
        self.start
    }

    pub fn end(&self) -> Option<CalendarDate> {
        self.end
    }

    /// Current selection, if both ends are picked.
    pub fn range(&self) -> Option<DateRange> {
        DateRange::new(self.start?, self.end?).ok()
    }

    /// The persist-ready range. Only set once confirmed.
    pub fn canonical_range(&self) -> Option<DateRange> {
        match self.state {
            SessionState::RangeConfirmed => self.range(),
            _ => None,
        }
    }

    pub fn booking_id(&self) -> Option<BookingId> {
        self.booking
    }

    /// Start days the customer may pick in `window`, against the current snapshot.
    pub fn selectable_starts(&self, window: DateRange) -> Result<Vec<CalendarDate>, EngineError> {
        selectable_starts(window, &self.rules, &self.blocked, self.today)
    }

    // ── Transitions ──────────────────────────────────────────

    /// Fetch the reservation snapshot for `item` and build its blocked set.
    ///
    /// Also used to switch item/size; the selection is cleared either way. On fetch
    /// failure the session falls back to `Idle`.
    pub async fn load(
        &mut self,
        item: ItemKey,
        source: &dyn ScheduleSource,
    ) -> Result<&BlockedDateSet, SessionError> {
        self.ensure_not_confirmed()?;

        let intervals = match source.fetch_unavailable_ranges(&item).await {
            Ok(intervals) => intervals,
            Err(e) => {
                warn!(session = %self.id, %item, "reservation fetch failed: {e}");
                metrics::counter!(observability::FETCH_FAILURES_TOTAL).increment(1);
                self.reset_to_idle();
                return Err(SessionError::FetchFailed(e.to_string()));
            }
        };
        if intervals.len() > MAX_INTERVALS_PER_ITEM {
            warn!(session = %self.id, %item, count = intervals.len(), "snapshot too large");
            self.reset_to_idle();
            return Err(EngineError::LimitExceeded("too many reservations in snapshot").into());
        }

        self.blocked = self.build_blocked(&intervals);
        self.clear_selection();
        self.state = SessionState::RangeUnset;
        info!(
            session = %self.id,
            %item,
            reservations = intervals.len(),
            blocked = self.blocked.len(),
            "availability loaded"
        );
        if let Some(observer) = &self.observer {
            observer.on_blocked_set_ready(self.id, &item, &self.blocked);
        }
        self.item = Some(item);
        Ok(&self.blocked)
    }

    /// Pick a stay preset. Any existing dates are discarded: presets and manual
    /// ranges are never mixed.
    pub fn choose_preset(&mut self, preset: StayPreset) -> Result<(), SessionError> {
        self.ensure_not_confirmed()?;
        if self.state == SessionState::Idle {
            return Err(EngineError::InvalidState("no item loaded").into());
        }
        if !self.rules.offers(preset) {
            return Err(EngineError::PresetNotOffered(preset.label()).into());
        }
        self.clear_selection();
        self.preset = Some(preset);
        self.state = SessionState::PresetChosen;
        debug!(session = %self.id, %preset, "preset chosen");
        Ok(())
    }

    /// Drop preset and dates, back to `RangeUnset`.
    pub fn reset_range(&mut self) -> Result<(), SessionError> {
        self.ensure_not_confirmed()?;
        if self.state == SessionState::Idle {
            return Err(EngineError::InvalidState("no item loaded").into());
        }
        self.clear_selection();
        self.state = SessionState::RangeUnset;
        Ok(())
    }

    /// Pick a start date; the end is derived from the preset and repaired if needed.
    pub fn pick_start(&mut self, start: CalendarDate) -> Result<DateRange, SessionError> {
        let preset = self.chosen_preset()?;
        let result = validate_start(start, &self.rules, &self.blocked, self.today).and_then(|()| {
            let end = auto_end(start, preset).ok_or(Rejection::NoValidRangeWithinCap)?;
            resolve(start, end, preset, &self.rules, &self.blocked)
        });
        let range = self.report(result)?;
        self.select(range);
        Ok(range)
    }

    /// Move the end date of the current selection.
    pub fn pick_end(&mut self, end: CalendarDate) -> Result<DateRange, SessionError> {
        let preset = self.chosen_preset()?;
        let start = self
            .start
            .ok_or(EngineError::InvalidState("no start date picked"))?;
        let result = resolve(start, end, preset, &self.rules, &self.blocked);
        let range = self.report(result)?;
        self.select(range);
        Ok(range)
    }

    /// Replace both ends at once (e.g. a drag across the calendar).
    pub fn pick_range(
        &mut self,
        start: CalendarDate,
        end: CalendarDate,
    ) -> Result<DateRange, SessionError> {
        let preset = self.chosen_preset()?;
        let result = validate_start(start, &self.rules, &self.blocked, self.today)
            .and_then(|()| resolve(start, end, preset, &self.rules, &self.blocked));
        let range = self.report(result)?;
        self.select(range);
        Ok(range)
    }

    /// Re-validate the selection against a fresh snapshot and lock it in.
    ///
    /// The snapshot may have gone stale while the picker was open. The selection
    /// must still pass every rule *unchanged*: a range that would now need repair is
    /// rejected, never silently moved. A failed re-fetch leaves the selection intact.
    pub async fn confirm(
        &mut self,
        source: &dyn ScheduleSource,
        today: CalendarDate,
    ) -> Result<DateRange, SessionError> {
        let preset = self.chosen_preset()?;
        let (Some(range), Some(item)) = (self.range(), self.item.clone()) else {
            return Err(EngineError::InvalidState("no range picked").into());
        };

        let intervals = source.fetch_unavailable_ranges(&item).await.map_err(|e| {
            warn!(session = %self.id, %item, "re-fetch before confirm failed: {e}");
            metrics::counter!(observability::FETCH_FAILURES_TOTAL).increment(1);
            SessionError::FetchFailed(e.to_string())
        })?;
        self.today = today;
        self.blocked = self.build_blocked(&intervals);
        if let Some(observer) = &self.observer {
            observer.on_blocked_set_ready(self.id, &item, &self.blocked);
        }

        let result = validate_start(range.start, &self.rules, &self.blocked, today).and_then(|()| {
            if self.blocked.contains(range.end) || self.blocked.reserved_within(&range).is_some() {
                debug!(session = %self.id, %range, "selection overlaps the fresh snapshot");
                return Err(Rejection::DateAlreadyReserved);
            }
            // End is free, so this cannot move the range; it re-applies the length rules.
            resolve(range.start, range.end, preset, &self.rules, &self.blocked)
        });
        let confirmed = self.report(result)?;
        self.state = SessionState::RangeConfirmed;
        info!(session = %self.id, %item, range = %confirmed, "range confirmed");
        Ok(confirmed)
    }

    /// Hand the confirmed range to the store. A store conflict means another
    /// booking won the race; it is reported apart from rule rejections.
    pub async fn submit(&mut self, store: &dyn BookingStore) -> Result<BookingId, SessionError> {
        if self.state != SessionState::RangeConfirmed {
            return Err(EngineError::InvalidState("range not confirmed").into());
        }
        if self.booking.is_some() {
            return Err(EngineError::InvalidState("booking already submitted").into());
        }
        let (Some(range), Some(item)) = (self.range(), self.item.as_ref()) else {
            return Err(EngineError::InvalidState("confirmed session lost its range").into());
        };

        match store.create_booking(item, range).await {
            Ok(id) => {
                metrics::counter!(observability::BOOKINGS_TOTAL).increment(1);
                info!(session = %self.id, %item, %range, booking = %id, "booking submitted");
                self.booking = Some(id);
                Ok(id)
            }
            Err(StoreError::Conflict(existing)) => {
                metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
                warn!(session = %self.id, %item, %range, %existing, "booking conflict at store");
                Err(SessionError::Conflict {
                    booking: Some(existing),
                })
            }
            Err(e) => {
                warn!(session = %self.id, %item, "booking store failed: {e}");
                Err(SessionError::PersistFailed(e.to_string()))
            }
        }
    }

    // ── Internals ────────────────────────────────────────────

    fn build_blocked(&self, intervals: &[ReservedInterval]) -> BlockedDateSet {
        BlockedDateSet::build(intervals, self.buffer)
            .with_days(self.rules.blackout_days.iter().copied())
    }

    fn ensure_not_confirmed(&self) -> Result<(), SessionError> {
        if self.state == SessionState::RangeConfirmed {
            return Err(EngineError::InvalidState("session already confirmed").into());
        }
        Ok(())
    }

    fn chosen_preset(&self) -> Result<StayPreset, SessionError> {
        match (self.state, self.preset) {
            (SessionState::PresetChosen, Some(preset)) => Ok(preset),
            (SessionState::RangeConfirmed, _) => {
                Err(EngineError::InvalidState("session already confirmed").into())
            }
            _ => Err(EngineError::InvalidState("no stay preset chosen").into()),
        }
    }

    fn reset_to_idle(&mut self) {
        self.item = None;
        self.blocked = BlockedDateSet::default();
        self.clear_selection();
        self.state = SessionState::Idle;
    }

    fn clear_selection(&mut self) {
        self.preset = None;
        self.start = None;
        self.end = None;
    }

    fn select(&mut self, range: DateRange) {
        self.start = Some(range.start);
        self.end = Some(range.end);
    }

    /// Count, publish and convert one validation outcome.
    fn report(&self, result: Result<DateRange, Rejection>) -> Result<DateRange, SessionError> {
        let outcome = match &result {
            Ok(_) => "ok",
            Err(r) => r.code(),
        };
        metrics::counter!(observability::VALIDATIONS_TOTAL, "outcome" => outcome).increment(1);
        if let Some(observer) = &self.observer {
            observer.on_validation_result(self.id, result);
        }
        result.map_err(SessionError::Rejected)
    }
}

impl Drop for BookingSession {
    fn drop(&mut self) {
        if let Some(observer) = &self.observer {
            observer.on_session_closed(self.id);
        }
    }
}
