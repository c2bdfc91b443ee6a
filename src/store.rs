use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

// ── Collaborator boundary ─────────────────────────────────────────

/// Where reservation snapshots come from.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Confirmed reservations for one item/size, inclusive on both ends.
    async fn fetch_unavailable_ranges(
        &self,
        item: &ItemKey,
    ) -> Result<Vec<ReservedInterval>, SourceError>;
}

/// Where confirmed ranges are persisted.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn create_booking(
        &self,
        item: &ItemKey,
        range: DateRange,
    ) -> Result<BookingId, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    Unavailable(String),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Unavailable(e) => write!(f, "schedule unavailable: {e}"),
            SourceError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for SourceError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The range touches this existing booking's buffered window.
    Conflict(BookingId),
    NotFound(BookingId),
    LimitExceeded(&'static str),
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Conflict(id) => write!(f, "conflict with booking: {id}"),
            StoreError::NotFound(id) => write!(f, "not found: {id}"),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::Unavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

// ── In-memory schedule ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredBooking {
    pub id: BookingId,
    pub interval: ReservedInterval,
}

/// Reservation schedule held in memory, one sorted list per item/size.
///
/// Serves both collaborator roles. Conflict checks use the same buffer policy as
/// the engine, so a range the engine accepted against a fresh snapshot is always
/// accepted here.
pub struct InMemorySchedule {
    buffer: BufferPolicy,
    /// Bookings per item, sorted by `interval.start`.
    items: DashMap<ItemKey, Vec<StoredBooking>>,
    /// Reverse lookup: booking id → item.
    booking_to_item: DashMap<BookingId, ItemKey>,
}

impl Default for InMemorySchedule {
    fn default() -> Self {
        Self::new(BufferPolicy::default())
    }
}

impl InMemorySchedule {
    pub fn new(buffer: BufferPolicy) -> Self {
        Self {
            buffer,
            items: DashMap::new(),
            booking_to_item: DashMap::new(),
        }
    }

    pub fn buffer(&self) -> BufferPolicy {
        self.buffer
    }

    /// Load an existing reservation without conflict checks (e.g. importing history).
    pub fn insert_reservation(
        &self,
        item: &ItemKey,
        interval: ReservedInterval,
    ) -> Result<BookingId, StoreError> {
        check_item(item)?;
        let id = Ulid::new();
        let mut bookings = self.items.entry(item.clone()).or_default();
        if bookings.len() >= MAX_INTERVALS_PER_ITEM {
            return Err(StoreError::LimitExceeded("too many reservations on item"));
        }
        insert_sorted(&mut bookings, StoredBooking { id, interval });
        self.booking_to_item.insert(id, item.clone());
        Ok(id)
    }

    pub fn cancel_booking(&self, id: BookingId) -> Result<ReservedInterval, StoreError> {
        let (_, item) = self
            .booking_to_item
            .remove(&id)
            .ok_or(StoreError::NotFound(id))?;
        let mut bookings = self.items.get_mut(&item).ok_or(StoreError::NotFound(id))?;
        let pos = bookings
            .iter()
            .position(|b| b.id == id)
            .ok_or(StoreError::NotFound(id))?;
        let removed = bookings.remove(pos);
        info!(booking = %id, %item, "booking cancelled");
        Ok(removed.interval)
    }

    pub fn bookings(&self, item: &ItemKey) -> Vec<StoredBooking> {
        self.items
            .get(item)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn booking_count(&self) -> usize {
        self.booking_to_item.len()
    }
}

fn check_item(item: &ItemKey) -> Result<(), StoreError> {
    if item.size.len() > MAX_SIZE_LABEL_LEN {
        return Err(StoreError::LimitExceeded("size label too long"));
    }
    Ok(())
}

fn insert_sorted(bookings: &mut Vec<StoredBooking>, booking: StoredBooking) {
    let pos = bookings
        .binary_search_by_key(&booking.interval.start, |b| b.interval.start)
        .unwrap_or_else(|e| e);
    bookings.insert(pos, booking);
}

/// First existing booking whose buffered window shares a day with `range`.
fn find_conflict(
    bookings: &[StoredBooking],
    range: &DateRange,
    buffer: &BufferPolicy,
) -> Option<BookingId> {
    // Sorted by start, so everything past this bound starts (buffer included) after range.end.
    let right_bound = bookings.partition_point(|b| b.interval.expanded(buffer).start <= range.end);
    bookings[..right_bound]
        .iter()
        .find(|b| b.interval.expanded(buffer).overlaps(range))
        .map(|b| b.id)
}

#[async_trait]
impl ScheduleSource for InMemorySchedule {
    async fn fetch_unavailable_ranges(
        &self,
        item: &ItemKey,
    ) -> Result<Vec<ReservedInterval>, SourceError> {
        if item.size.len() > MAX_SIZE_LABEL_LEN {
            return Err(SourceError::LimitExceeded("size label too long"));
        }
        let intervals: Vec<ReservedInterval> = self
            .items
            .get(item)
            .map(|e| e.value().iter().map(|b| b.interval).collect())
            .unwrap_or_default();
        debug!(%item, count = intervals.len(), "served reservation snapshot");
        Ok(intervals)
    }
}

#[async_trait]
impl BookingStore for InMemorySchedule {
    async fn create_booking(
        &self,
        item: &ItemKey,
        range: DateRange,
    ) -> Result<BookingId, StoreError> {
        check_item(item)?;
        // The entry guard serializes writers per item: check and insert are atomic.
        let mut bookings = self.items.entry(item.clone()).or_default();
        if bookings.len() >= MAX_INTERVALS_PER_ITEM {
            return Err(StoreError::LimitExceeded("too many reservations on item"));
        }
        if let Some(existing) = find_conflict(&bookings, &range, &self.buffer) {
            return Err(StoreError::Conflict(existing));
        }

        let id = Ulid::new();
        let interval = ReservedInterval {
            start: range.start,
            end: range.end,
        };
        insert_sorted(&mut bookings, StoredBooking { id, interval });
        self.booking_to_item.insert(id, item.clone());
        info!(booking = %id, %item, %range, "booking created");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> CalendarDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn span(start: CalendarDate, end: CalendarDate) -> DateRange {
        DateRange::new(start, end).unwrap()
    }

    fn item() -> ItemKey {
        ItemKey::new(Ulid::new(), "M")
    }

    #[tokio::test]
    async fn fetch_returns_sorted_snapshot() {
        let store = InMemorySchedule::default();
        let key = item();
        let interval = ReservedInterval::new(d(2025, 4, 10), d(2025, 4, 12)).unwrap();
        store.insert_reservation(&key, interval).unwrap();
        store
            .insert_reservation(&key, ReservedInterval::new(d(2025, 3, 1), d(2025, 3, 2)).unwrap())
            .unwrap();

        let snapshot = store.fetch_unavailable_ranges(&key).await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].start, d(2025, 3, 1));
        assert_eq!(snapshot[1].start, d(2025, 4, 10));
    }

    #[tokio::test]
    async fn unknown_item_has_no_reservations() {
        let store = InMemorySchedule::default();
        assert!(store.fetch_unavailable_ranges(&item()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sizes_are_independent_units() {
        let store = InMemorySchedule::default();
        let id = Ulid::new();
        let m = ItemKey::new(id, "M");
        let l = ItemKey::new(id, "L");
        let range = span(d(2025, 3, 5), d(2025, 3, 10));
        store.create_booking(&m, range).await.unwrap();
        store.create_booking(&l, range).await.unwrap();
        assert!(matches!(
            store.create_booking(&m, range).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn conflict_includes_buffer_days() {
        let store = InMemorySchedule::default();
        let key = item();
        let existing = store
            .create_booking(&key, span(d(2025, 3, 10), d(2025, 3, 11)))
            .await
            .unwrap();

        // Ends on the last lead-buffer day.
        assert_eq!(
            store.create_booking(&key, span(d(2025, 3, 3), d(2025, 3, 7))).await,
            Err(StoreError::Conflict(existing))
        );
        // Starts on the last trail-buffer day.
        assert_eq!(
            store.create_booking(&key, span(d(2025, 3, 14), d(2025, 3, 18))).await,
            Err(StoreError::Conflict(existing))
        );
        // Clear of both buffers.
        assert!(store.create_booking(&key, span(d(2025, 3, 2), d(2025, 3, 6))).await.is_ok());
        assert!(store.create_booking(&key, span(d(2025, 3, 15), d(2025, 3, 18))).await.is_ok());
        assert_eq!(store.booking_count(), 3);
    }

    #[tokio::test]
    async fn cancel_frees_the_dates() {
        let store = InMemorySchedule::default();
        let key = item();
        let range = span(d(2025, 3, 5), d(2025, 3, 10));
        let id = store.create_booking(&key, range).await.unwrap();

        let removed = store.cancel_booking(id).unwrap();
        assert_eq!(removed.as_range(), range);
        assert!(store.bookings(&key).is_empty());
        assert_eq!(store.cancel_booking(id), Err(StoreError::NotFound(id)));
        assert!(store.create_booking(&key, range).await.is_ok());
    }

    #[tokio::test]
    async fn oversized_label_rejected() {
        let store = InMemorySchedule::default();
        let key = ItemKey::new(Ulid::new(), "X".repeat(MAX_SIZE_LABEL_LEN + 1));
        assert!(matches!(
            store.fetch_unavailable_ranges(&key).await,
            Err(SourceError::LimitExceeded(_))
        ));
        assert!(matches!(
            store.create_booking(&key, span(d(2025, 3, 5), d(2025, 3, 10))).await,
            Err(StoreError::LimitExceeded(_))
        ));
    }

    #[test]
    fn find_conflict_skips_far_bookings() {
        let buffer = BufferPolicy::default();
        let far = StoredBooking {
            id: Ulid::new(),
            interval: ReservedInterval::new(d(2025, 1, 1), d(2025, 1, 2)).unwrap(),
        };
        let near = StoredBooking {
            id: Ulid::new(),
            interval: ReservedInterval::new(d(2025, 2, 10), d(2025, 2, 12)).unwrap(),
        };
        let later = StoredBooking {
            id: Ulid::new(),
            interval: ReservedInterval::new(d(2025, 6, 1), d(2025, 6, 2)).unwrap(),
        };
        let bookings = vec![far, near, later];
        assert_eq!(
            find_conflict(&bookings, &span(d(2025, 2, 1), d(2025, 2, 7)), &buffer),
            Some(near.id)
        );
        assert_eq!(find_conflict(&bookings, &span(d(2025, 2, 1), d(2025, 2, 6)), &buffer), None);
    }
}
