use std::sync::Arc;

use crate::model::DateRange;
use crate::store::{BookingStore, StoreError};

/// Arbitrates whether a proposed date range is free, by asking the store for
/// conflicting bookings. A range is available iff the conflict query comes
/// back empty.
///
/// The conflict query is the store's containment predicate (`encloses`), not
/// true interval overlap — see `DateRange::encloses` for the gap this leaves.
pub struct AvailabilityChecker {
    store: Arc<dyn BookingStore>,
}

impl AvailabilityChecker {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    pub async fn is_available(&self, range: &DateRange) -> Result<bool, StoreError> {
        let conflicts = self.store.query_by_date_range(range).await?;
        Ok(conflicts.is_empty())
    }
}
