use crate::booking::validator::ValidationOutcome;
use crate::store::StoreError;

/// Business outcome of a booking operation that did not succeed.
///
/// `Validation` and `DatesNotAvailable` are produced by this layer and are
/// recoverable by the caller; `NotFound` is an expected absence; `Storage`
/// is an infrastructure fault passed through untouched.
#[derive(Debug)]
pub enum BookingError {
    Validation(ValidationOutcome),
    DatesNotAvailable,
    NotFound,
    Storage(StoreError),
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::Validation(outcome) => {
                write!(f, "validation failed: {}", outcome.messages().join("; "))
            }
            BookingError::DatesNotAvailable => write!(f, "Booking dates are not available"),
            BookingError::NotFound => write!(f, "booking not found"),
            BookingError::Storage(e) => write!(f, "storage failure: {e}"),
        }
    }
}

impl std::error::Error for BookingError {}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => BookingError::NotFound,
            other => BookingError::Storage(other),
        }
    }
}
