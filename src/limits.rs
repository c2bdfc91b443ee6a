/// Upper bound on either side of a reservation's logistics buffer.
pub const MAX_BUFFER_DAYS: u32 = 30;

/// Upper bound on a configured maximum stay.
pub const MAX_STAY_CAP_DAYS: u32 = 90;

/// Upper bound on the minimum lead time.
pub const MAX_LEAD_DAYS: u32 = 365;

/// Reservations accepted for a single item/size snapshot.
pub const MAX_INTERVALS_PER_ITEM: usize = 10_000;

/// Widest window `selectable_starts` will scan.
pub const MAX_SELECTABLE_WINDOW_DAYS: u32 = 400;

/// Longest size label accepted on an item key.
pub const MAX_SIZE_LABEL_LEN: usize = 64;

/// Sessions the service keeps a notification channel open for.
pub const MAX_OPEN_SESSIONS: usize = 10_000;
