use std::sync::Arc;

use tracing::debug;

use crate::booking::availability::AvailabilityChecker;
use crate::booking::error::BookingError;
use crate::booking::validator::RequestValidator;
use crate::model::{BookingId, BookingRequest, BookingResponse, DateRange};
use crate::store::BookingStore;

/// Orchestrates every booking operation: validate, arbitrate availability,
/// persist, translate to the response shape. Terminal on the first failure;
/// storage faults pass through untouched.
pub struct BookingService {
    validator: RequestValidator,
    availability: AvailabilityChecker,
    store: Arc<dyn BookingStore>,
}

impl BookingService {
    pub fn new(
        validator: RequestValidator,
        availability: AvailabilityChecker,
        store: Arc<dyn BookingStore>,
    ) -> Self {
        Self {
            validator,
            availability,
            store,
        }
    }

    pub async fn create_booking(
        &self,
        request: &BookingRequest,
    ) -> Result<BookingResponse, BookingError> {
        let range = self.validated_range(request)?;
        if !self.availability.is_available(&range).await? {
            return Err(BookingError::DatesNotAvailable);
        }
        let booking = self.store.add(range).await?;
        debug!("created booking {}", booking.id);
        Ok(BookingResponse::from(&booking))
    }

    pub async fn modify_booking(
        &self,
        id: BookingId,
        request: &BookingRequest,
    ) -> Result<BookingResponse, BookingError> {
        let range = self.validated_range(request)?;
        // The check runs against every booking — the one being modified
        // included — matching the storage contract this service grew up with.
        if !self.availability.is_available(&range).await? {
            return Err(BookingError::DatesNotAvailable);
        }
        let booking = self.store.update(id, range).await?;
        debug!("modified booking {id}");
        Ok(BookingResponse::from(&booking))
    }

    /// A missing id is an expected outcome here, not an error.
    pub async fn get(&self, id: BookingId) -> Result<Option<BookingResponse>, BookingError> {
        let booking = self.store.get(id).await?;
        Ok(booking.as_ref().map(BookingResponse::from))
    }

    /// True iff the store reports exactly one row deleted.
    pub async fn delete_booking(&self, id: BookingId) -> Result<bool, BookingError> {
        let rows = self.store.delete(id).await?;
        debug!("delete booking {id}: {rows} row(s)");
        Ok(rows == 1)
    }

    pub async fn check_availability(&self, range: &DateRange) -> Result<bool, BookingError> {
        Ok(self.availability.is_available(range).await?)
    }

    fn validated_range(&self, request: &BookingRequest) -> Result<DateRange, BookingError> {
        let outcome = self.validator.validate(request);
        match (request.start_date, request.end_date) {
            (Some(start), Some(end)) if outcome.is_valid() => Ok(DateRange::new(start, end)),
            _ => Err(BookingError::Validation(outcome)),
        }
    }
}
