//! Recomputes the hotel and guest aggregate counters from the bookings and
//! overwrites the ones that drifted.

use std::collections::HashMap;

use mongodb::bson::oid::ObjectId;
use serde::Serialize;

use crate::database::repository::BookingRepository;
use crate::errors::Result;
use crate::models::booking::Booking;
use crate::models::counters::Totals;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExpectedTotals {
    pub hotels: HashMap<ObjectId, Totals>,
    pub users: HashMap<ObjectId, Totals>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub hotels_checked: usize,
    pub hotels_corrected: usize,
    pub hotels_skipped: usize,
    pub users_checked: usize,
    pub users_corrected: usize,
    pub users_skipped: usize,
}

pub fn compute_totals(bookings: &[Booking]) -> ExpectedTotals {
    let mut expected = ExpectedTotals::default();

    for booking in bookings.iter().filter(|b| b.status.is_counted()) {
        expected
            .hotels
            .entry(booking.hotel_id)
            .or_default()
            .add(booking.total_cost);
        expected
            .users
            .entry(booking.user_id)
            .or_default()
            .add(booking.total_cost);
    }

    expected
}

/// Which counter collection a correction targets.
#[derive(Debug, Clone, Copy)]
enum Owner {
    Hotel,
    User,
}

/// Returns `(corrected, skipped)`.
async fn correct(
    store: &dyn BookingRepository,
    owner: Owner,
    stored: Vec<(ObjectId, Totals)>,
    expected: &HashMap<ObjectId, Totals>,
) -> Result<(usize, usize)> {
    let (mut corrected, mut skipped) = (0, 0);

    for (id, seen) in stored {
        let want = expected.get(&id).copied().unwrap_or_default();
        if seen.matches(&want) {
            continue;
        }

        let written = match owner {
            Owner::Hotel => store.set_hotel_totals(&id, seen, want).await?,
            Owner::User => store.set_user_totals(&id, seen, want).await?,
        };
        if written {
            tracing::warn!(
                owner = ?owner,
                id = %id,
                stored_bookings = seen.bookings,
                expected_bookings = want.bookings,
                stored_amount = seen.amount,
                expected_amount = want.amount,
                "counters drifted, corrected"
            );
            corrected += 1;
        } else {
            tracing::info!(
                owner = ?owner,
                id = %id,
                "counters moved during reconciliation, left for next pass"
            );
            skipped += 1;
        }
    }

    Ok((corrected, skipped))
}

pub async fn reconcile_counters(store: &dyn BookingRepository) -> Result<ReconciliationReport> {
    // Counters are read before the bookings. A booking write landing in
    // between moves the counters, and the conditional overwrite skips them.
    let hotels = store.hotel_totals().await?;
    let users = store.user_totals().await?;
    let bookings = store.list_bookings(None).await?;
    let expected = compute_totals(&bookings);

    let mut report = ReconciliationReport {
        hotels_checked: hotels.len(),
        users_checked: users.len(),
        ..ReconciliationReport::default()
    };
    (report.hotels_corrected, report.hotels_skipped) =
        correct(store, Owner::Hotel, hotels, &expected.hotels).await?;
    (report.users_corrected, report.users_skipped) =
        correct(store, Owner::User, users, &expected.users).await?;

    tracing::info!(
        hotels_corrected = report.hotels_corrected,
        users_corrected = report.users_corrected,
        skipped = report.hotels_skipped + report.users_skipped,
        "counter reconciliation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::database::memory::MemoryRepository;
    use crate::database::repository::SweepCutoffs;
    use crate::models::booking::BookingStatus;
    use crate::models::hotel::Hotel;
    use crate::services::lifecycle::tests::booking;
    use crate::services::lifecycle::{self, Removal, Transition};

    #[test]
    fn only_counted_bookings_contribute() {
        let live = booking(BookingStatus::Confirmed);
        let mut refunded = booking(BookingStatus::Refunded);
        refunded.hotel_id = live.hotel_id;
        let mut cancelled = booking(BookingStatus::Cancelled);
        cancelled.hotel_id = live.hotel_id;

        let expected = compute_totals(&[live.clone(), refunded, cancelled.clone()]);
        let hotel = expected.hotels[&live.hotel_id];
        assert_eq!(hotel.bookings, 2);
        assert!((hotel.amount - 641.0).abs() < 1e-9);
        assert!(!expected.users.contains_key(&cancelled.user_id));
    }

    #[test]
    fn totals_compare_at_cent_precision() {
        let mut a = Totals::default();
        a.add(0.1);
        a.add(0.2);
        let b = Totals {
            bookings: 2,
            amount: 0.3,
        };
        assert!(a.matches(&b));

        let c = Totals {
            amount: 0.31,
            ..b
        };
        assert!(!c.matches(&b));
    }

    #[tokio::test]
    async fn drifted_counters_are_restored() {
        let repo = MemoryRepository::new();
        let live = booking(BookingStatus::Confirmed);
        repo.seed(&live, ObjectId::new()).await;

        let gone = booking(BookingStatus::Cancelled);
        repo.seed(&gone, ObjectId::new()).await;

        let report = reconcile_counters(&repo).await.unwrap();
        assert_eq!(report.hotels_checked, 2);
        assert_eq!(report.hotels_corrected, 1);
        assert_eq!(report.users_corrected, 1);
        assert_eq!(report.hotels_skipped + report.users_skipped, 0);

        let hotel = repo.hotel(&gone.hotel_id).await.unwrap();
        assert_eq!(hotel.total_bookings, 0);
        assert_eq!(hotel.total_revenue, 0.0);
        assert_eq!(repo.hotel(&live.hotel_id).await.unwrap().total_bookings, 1);

        let again = reconcile_counters(&repo).await.unwrap();
        assert_eq!(again.hotels_corrected + again.users_corrected, 0);
    }

    /// Cancels one booking through the lifecycle while the booking list is
    /// being read, either just before or just after the snapshot is taken.
    struct CancelDuringListing {
        inner: MemoryRepository,
        victim: ObjectId,
        before_snapshot: bool,
    }

    impl CancelDuringListing {
        async fn cancel(&self) {
            let current = self.inner.find_booking(&self.victim).await.unwrap().unwrap();
            let transition = lifecycle::set_status(current, BookingStatus::Cancelled, None, None);
            self.inner.commit(transition).await.unwrap();
        }
    }

    #[async_trait]
    impl BookingRepository for CancelDuringListing {
        async fn find_booking(&self, id: &ObjectId) -> Result<Option<Booking>> {
            self.inner.find_booking(id).await
        }

        async fn list_bookings(&self, hotel_id: Option<&ObjectId>) -> Result<Vec<Booking>> {
            if self.before_snapshot {
                self.cancel().await;
                self.inner.list_bookings(hotel_id).await
            } else {
                let snapshot = self.inner.list_bookings(hotel_id).await?;
                self.cancel().await;
                Ok(snapshot)
            }
        }

        async fn find_hotel(&self, id: &ObjectId) -> Result<Option<Hotel>> {
            self.inner.find_hotel(id).await
        }

        async fn sweep_candidates(&self, cutoffs: &SweepCutoffs) -> Result<Vec<Booking>> {
            self.inner.sweep_candidates(cutoffs).await
        }

        async fn commit(&self, transition: Transition) -> Result<Booking> {
            self.inner.commit(transition).await
        }

        async fn remove(&self, removal: Removal) -> Result<bool> {
            self.inner.remove(removal).await
        }

        async fn hotel_totals(&self) -> Result<Vec<(ObjectId, Totals)>> {
            self.inner.hotel_totals().await
        }

        async fn user_totals(&self) -> Result<Vec<(ObjectId, Totals)>> {
            self.inner.user_totals().await
        }

        async fn set_hotel_totals(
            &self,
            hotel_id: &ObjectId,
            seen: Totals,
            totals: Totals,
        ) -> Result<bool> {
            self.inner.set_hotel_totals(hotel_id, seen, totals).await
        }

        async fn set_user_totals(
            &self,
            user_id: &ObjectId,
            seen: Totals,
            totals: Totals,
        ) -> Result<bool> {
            self.inner.set_user_totals(user_id, seen, totals).await
        }

        async fn ping(&self) -> Result<()> {
            self.inner.ping().await
        }
    }

    #[tokio::test]
    async fn cancellation_racing_the_pass_is_not_undone() {
        for before_snapshot in [true, false] {
            let live = booking(BookingStatus::Confirmed);
            let inner = MemoryRepository::new();
            inner.seed(&live, ObjectId::new()).await;
            let repo = CancelDuringListing {
                inner,
                victim: live.id,
                before_snapshot,
            };

            let report = reconcile_counters(&repo).await.unwrap();
            assert_eq!(report.hotels_corrected + report.users_corrected, 0);

            let stored = repo.inner.booking(&live.id).await.unwrap();
            assert_eq!(stored.status, BookingStatus::Cancelled);
            let hotel = repo.inner.hotel(&live.hotel_id).await.unwrap();
            assert_eq!(hotel.total_bookings, 0, "before_snapshot = {}", before_snapshot);
            assert_eq!(hotel.total_revenue, 0.0);
            let guest = repo.inner.user(&live.user_id).await.unwrap();
            assert_eq!(guest.total_bookings, 0);
            assert_eq!(guest.total_spent, 0.0);
        }
    }
}
