use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mongodb::bson::oid::ObjectId;

use crate::errors::Result;
use crate::models::booking::Booking;
use crate::models::counters::Totals;
use crate::models::hotel::Hotel;
use crate::services::lifecycle::{Removal, Transition};

/// Time boundaries of the three compliance sweep rules for one pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepCutoffs {
    /// ID_PENDING bookings created before this are overdue.
    pub created_before: DateTime<Utc>,
    /// ID_SUBMITTED bookings whose ID was uploaded before this are overdue.
    pub uploaded_before: DateTime<Utc>,
    /// ID images of stays that ended before this are purged.
    pub checked_out_before: DateTime<Utc>,
}

/// Storage seam for bookings and the hotel/user aggregate counters.
///
/// Booking writes are conditional on the `updated_at` value the caller read;
/// when another writer got there first they fail with `AppError::Conflict`.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn find_booking(&self, id: &ObjectId) -> Result<Option<Booking>>;

    /// Newest first; restricted to one hotel when `hotel_id` is given.
    async fn list_bookings(&self, hotel_id: Option<&ObjectId>) -> Result<Vec<Booking>>;

    async fn find_hotel(&self, id: &ObjectId) -> Result<Option<Hotel>>;

    /// Bookings matching at least one sweep rule. May over-select; the sweep
    /// planner re-checks every predicate.
    async fn sweep_candidates(&self, cutoffs: &SweepCutoffs) -> Result<Vec<Booking>>;

    /// Persists the transition and its counter adjustment, returning the
    /// stored booking with its new version.
    async fn commit(&self, transition: Transition) -> Result<Booking>;

    /// Deletes the booking and applies the counter reversal. `Ok(false)` when
    /// the booking no longer exists.
    async fn remove(&self, removal: Removal) -> Result<bool>;

    async fn hotel_totals(&self) -> Result<Vec<(ObjectId, Totals)>>;

    async fn user_totals(&self) -> Result<Vec<(ObjectId, Totals)>>;

    /// Overwrites the hotel's counters only while they still hold `seen`.
    /// Returns whether the write happened.
    async fn set_hotel_totals(&self, hotel_id: &ObjectId, seen: Totals, totals: Totals)
        -> Result<bool>;

    async fn set_user_totals(&self, user_id: &ObjectId, seen: Totals, totals: Totals)
        -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

/// Version stamp for a write: millisecond precision like a BSON date, and
/// always later than the version it replaces.
pub fn next_version(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}
