//! Pure availability rules for single-unit date-range rentals.
//!
//! Nothing in here suspends, locks or performs I/O: a blocked set is built from a
//! reservation snapshot, then candidate dates are validated and repaired against it.

mod blocked;
mod error;
mod holiday;
mod repair;
mod validate;

pub use blocked::BlockedDateSet;
pub use error::{EngineError, Rejection, SessionError};
pub use holiday::{HolidayCalendar, HolidaySource, NoHolidays};
pub use repair::{auto_end, repair, resolve};
pub use validate::{CalendarRules, RangeCheck, selectable_starts, validate_range, validate_start};
