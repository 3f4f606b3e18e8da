use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Storage-assigned booking identifier, monotonically increasing.
pub type BookingId = i64;

/// A contiguous calendar-date range `[start, end]`. Time-of-day never enters
/// the picture; all comparisons are on civil dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start < end, "DateRange start must be before end");
        Self { start, end }
    }

    /// Number of days between start and end.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// True interval overlap.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True if `other` lies entirely inside `self`. This is the storage query
    /// predicate — containment, not overlap — so a booking that straddles or
    /// surrounds the window is deliberately not matched.
    pub fn encloses(&self, other: &DateRange) -> bool {
        other.start >= self.start && other.end <= self.end
    }
}

/// A persisted reservation of the single managed resource. Owned by the
/// store; everything outside it only ever holds transient copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub range: DateRange,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingAdded {
        booking: Booking,
    },
    BookingUpdated {
        booking: Booking,
    },
    BookingDeleted {
        id: BookingId,
    },
    /// Id-allocator high-water mark, written on compaction so a compacted log
    /// never recycles the id of a deleted booking.
    SequenceAdvanced {
        next_id: BookingId,
    },
}

// ── Wire contracts ───────────────────────────────────────────────

/// A client-proposed date range. Fields are optional so the required-field
/// rules can report absence instead of the decoder rejecting the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl BookingRequest {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start_date: Some(start),
            end_date: Some(end),
        }
    }
}

/// The response shape for a stored booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub id: BookingId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub creation_date: DateTime<Utc>,
    pub modify_date: DateTime<Utc>,
}

impl From<&Booking> for BookingResponse {
    fn from(booking: &Booking) -> Self {
        Self {
            id: booking.id,
            start_date: booking.range.start,
            end_date: booking.range.end,
            creation_date: booking.created_at,
            modify_date: booking.modified_at,
        }
    }
}
