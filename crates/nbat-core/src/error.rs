use thiserror::Error;
use uuid::Uuid;

use crate::calendar::JalaliDate;
use crate::slot::SlotTime;

/// Failures surfaced by the scheduling engine.
///
/// Validation errors are raised before any collection is touched, so a
/// caller that sees one knows nothing was written.
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("invalid date {0:?}; expected YYYY/MM/DD, e.g. 1404/06/10")]
    InvalidDateFormat(String),

    #[error("invalid time {0:?}; expected 24-hour HH:MM")]
    InvalidTimeFormat(String),

    #[error("slot not found: {0}")]
    SlotNotFound(Uuid),

    #[error("no slot defined at {date} {time}")]
    NoSlotAt { date: JalaliDate, time: SlotTime },

    #[error("slot {0} is already booked")]
    SlotAlreadyBooked(Uuid),

    #[error("slot {0} is booked; cancel its booking first")]
    SlotCurrentlyBooked(Uuid),

    #[error("booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("required patient field is empty: {0}")]
    MissingPatientField(&'static str),

    #[error("phone number must be exactly 11 digits, got {0:?}")]
    InvalidPhone(String),

    #[error("invalid patient age: {0}")]
    InvalidAge(u32),

    #[error("stored collection {collection} is corrupt: {source}")]
    StorageCorrupt {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write collection {collection}: {source}")]
    Storage {
        collection: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

pub type ScheduleResult<T> = std::result::Result<T, ScheduleError>;
