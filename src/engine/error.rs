use serde::Serialize;

use crate::model::{BookingId, CalendarDate};

/// Why a candidate date or range was turned down. These are outcomes, not failures:
/// every one maps to a single message telling the customer which constraint to fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Rejection {
    LeadTimeViolation,
    DisallowedStartDay,
    DateAlreadyReserved,
    BelowMinimumStay,
    AboveMaximumStay,
    NoValidRangeWithinCap,
}

impl Rejection {
    /// Stable machine-readable code, also used as the metrics label.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::LeadTimeViolation => "lead_time_violation",
            Rejection::DisallowedStartDay => "disallowed_start_day",
            Rejection::DateAlreadyReserved => "date_already_reserved",
            Rejection::BelowMinimumStay => "below_minimum_stay",
            Rejection::AboveMaximumStay => "above_maximum_stay",
            Rejection::NoValidRangeWithinCap => "no_valid_range_within_cap",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Rejection::LeadTimeViolation => {
                "this start date is too soon; please allow time for shipping"
            }
            Rejection::DisallowedStartDay => {
                "rentals cannot start on this day of the week or on a public holiday"
            }
            Rejection::DateAlreadyReserved => {
                "this item is already reserved or in transit on the selected dates"
            }
            Rejection::BelowMinimumStay => {
                "the selected range is shorter than the chosen rental plan"
            }
            Rejection::AboveMaximumStay => {
                "the selected range is longer than the maximum rental period"
            }
            Rejection::NoValidRangeWithinCap => {
                "no return date fits within the maximum rental period; \
                 pick a later start date or a shorter plan"
            }
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Programmer error: malformed input or a call the current state does not allow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvalidRange {
        start: CalendarDate,
        end: CalendarDate,
    },
    InvalidState(&'static str),
    /// A month/day pair that names no day in any year.
    InvalidCalendarDay {
        month: u32,
        day: u32,
    },
    LimitExceeded(&'static str),
    UnknownPreset(String),
    PresetNotOffered(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidRange { start, end } => {
                write!(f, "invalid range: start {start} is after end {end}")
            }
            EngineError::InvalidState(msg) => write!(f, "invalid session state: {msg}"),
            EngineError::InvalidCalendarDay { month, day } => {
                write!(f, "invalid calendar day: {month:02}-{day:02}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::UnknownPreset(name) => write!(f, "unknown stay preset: {name:?}"),
            EngineError::PresetNotOffered(label) => {
                write!(f, "stay preset not offered: {label}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

/// Everything a booking session can report back to its host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A business rule turned the selection down; the selection is unchanged.
    Rejected(Rejection),
    /// The reservation snapshot could not be fetched.
    FetchFailed(String),
    /// The store found an overlapping booking the local snapshot did not know about.
    Conflict { booking: Option<BookingId> },
    /// The store failed for a reason unrelated to availability.
    PersistFailed(String),
    Engine(EngineError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Rejected(r) => write!(f, "{r}"),
            SessionError::FetchFailed(e) => write!(f, "could not load availability: {e}"),
            SessionError::Conflict { booking: Some(id) } => {
                write!(f, "dates were taken by another booking ({id}); please choose again")
            }
            SessionError::Conflict { booking: None } => {
                write!(f, "dates were taken by another booking; please choose again")
            }
            SessionError::PersistFailed(e) => write!(f, "could not save booking: {e}"),
            SessionError::Engine(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Engine(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Rejection> for SessionError {
    fn from(r: Rejection) -> Self {
        SessionError::Rejected(r)
    }
}

impl From<EngineError> for SessionError {
    fn from(e: EngineError) -> Self {
        SessionError::Engine(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Rejection; 6] = [
        Rejection::LeadTimeViolation,
        Rejection::DisallowedStartDay,
        Rejection::DateAlreadyReserved,
        Rejection::BelowMinimumStay,
        Rejection::AboveMaximumStay,
        Rejection::NoValidRangeWithinCap,
    ];

    #[test]
    fn every_rejection_has_its_own_message() {
        let mut messages: Vec<_> = ALL.iter().map(|r| r.message()).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), ALL.len());

        let mut codes: Vec<_> = ALL.iter().map(|r| r.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), ALL.len());
    }

    #[test]
    fn session_error_wraps_rejection_message() {
        let e: SessionError = Rejection::LeadTimeViolation.into();
        assert_eq!(e.to_string(), Rejection::LeadTimeViolation.message());
    }
}
