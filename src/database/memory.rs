//! In-process repository used by the unit and router tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use tokio::sync::Mutex;

use crate::{
    database::repository::{next_version, BookingRepository, SweepCutoffs},
    errors::{AppError, Result},
    models::{
        booking::{Booking, BookingStatus},
        counters::{CounterDelta, Totals},
        hotel::Hotel,
        user::{Role, User},
    },
    services::lifecycle::{Removal, Transition},
};

#[derive(Default)]
struct Store {
    bookings: HashMap<ObjectId, Booking>,
    hotels: HashMap<ObjectId, Hotel>,
    users: HashMap<ObjectId, User>,
    failing: HashSet<ObjectId>,
    racing: HashSet<ObjectId>,
    writes: usize,
}

impl Store {
    /// Simulates another writer updating the booking just before this write.
    fn lose_race(&mut self, id: &ObjectId) {
        if self.racing.remove(id) {
            if let Some(current) = self.bookings.get_mut(id) {
                current.updated_at = next_version(current.updated_at, Utc::now());
            }
        }
    }

    fn apply(&mut self, delta: &CounterDelta) {
        if let Some(hotel) = self.hotels.get_mut(&delta.hotel_id) {
            hotel.total_bookings += delta.bookings;
            hotel.total_revenue += delta.amount;
        }
        if let Some(user) = self.users.get_mut(&delta.user_id) {
            user.total_bookings += delta.bookings;
            user.total_spent += delta.amount;
        }
    }
}

#[derive(Default)]
pub struct MemoryRepository {
    store: Mutex<Store>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_booking(&self, booking: Booking) {
        self.store.lock().await.bookings.insert(booking.id, booking);
    }

    pub async fn insert_hotel(&self, hotel: Hotel) {
        self.store.lock().await.hotels.insert(hotel.id, hotel);
    }

    pub async fn insert_user(&self, user: User) {
        self.store.lock().await.users.insert(user.id, user);
    }

    pub async fn booking(&self, id: &ObjectId) -> Option<Booking> {
        self.store.lock().await.bookings.get(id).cloned()
    }

    pub async fn hotel(&self, id: &ObjectId) -> Option<Hotel> {
        self.store.lock().await.hotels.get(id).cloned()
    }

    pub async fn user(&self, id: &ObjectId) -> Option<User> {
        self.store.lock().await.users.get(id).cloned()
    }

    /// Makes every subsequent write to this booking fail with a database error.
    pub async fn fail_writes_for(&self, id: ObjectId) {
        self.store.lock().await.failing.insert(id);
    }

    /// Makes the next write to this booking find it already changed.
    pub async fn race_next_write(&self, id: ObjectId) {
        self.store.lock().await.racing.insert(id);
    }

    pub async fn heal(&self, id: &ObjectId) {
        self.store.lock().await.failing.remove(id);
    }

    /// Booking writes that reached the store (successful or not).
    pub async fn write_count(&self) -> usize {
        self.store.lock().await.writes
    }

    /// Seeds a hotel and a guest whose counters already include `booking`.
    pub async fn seed(&self, booking: &Booking, owner_id: ObjectId) {
        self.insert_hotel(Hotel {
            id: booking.hotel_id,
            user_id: owner_id,
            name: "Lakeview Inn".to_string(),
            city: "Udaipur".to_string(),
            country: "India".to_string(),
            total_bookings: 1,
            total_revenue: booking.total_cost,
        })
        .await;
        self.insert_user(User {
            id: booking.user_id,
            email: booking.email.clone(),
            first_name: booking.first_name.clone(),
            last_name: booking.last_name.clone(),
            role: Role::User,
            total_bookings: 1,
            total_spent: booking.total_cost,
        })
        .await;
        self.insert_booking(booking.clone()).await;
    }
}

fn simulated_failure() -> AppError {
    let dropped = std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        "simulated write failure",
    );
    AppError::MongoDB(dropped.into())
}

#[async_trait]
impl BookingRepository for MemoryRepository {
    async fn find_booking(&self, id: &ObjectId) -> Result<Option<Booking>> {
        Ok(self.store.lock().await.bookings.get(id).cloned())
    }

    async fn list_bookings(&self, hotel_id: Option<&ObjectId>) -> Result<Vec<Booking>> {
        let store = self.store.lock().await;
        let mut bookings: Vec<Booking> = store
            .bookings
            .values()
            .filter(|b| hotel_id.map_or(true, |id| &b.hotel_id == id))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn find_hotel(&self, id: &ObjectId) -> Result<Option<Hotel>> {
        Ok(self.store.lock().await.hotels.get(id).cloned())
    }

    async fn sweep_candidates(&self, cutoffs: &SweepCutoffs) -> Result<Vec<Booking>> {
        let store = self.store.lock().await;
        Ok(store
            .bookings
            .values()
            .filter(|b| {
                let pending = b.status == BookingStatus::IdPending
                    && b.created_at < cutoffs.created_before;
                let submitted = b.status == BookingStatus::IdSubmitted
                    && b.id_proof
                        .as_ref()
                        .and_then(|p| p.uploaded_at)
                        .is_some_and(|at| at < cutoffs.uploaded_before);
                let expired_images = b.check_out < cutoffs.checked_out_before
                    && b.id_proof.as_ref().is_some_and(|p| p.has_images());
                pending || submitted || expired_images
            })
            .cloned()
            .collect())
    }

    async fn commit(&self, transition: Transition) -> Result<Booking> {
        let mut store = self.store.lock().await;
        store.writes += 1;

        let Transition {
            mut booking,
            expected_version,
            counters,
        } = transition;

        if store.failing.contains(&booking.id) {
            return Err(simulated_failure());
        }
        store.lose_race(&booking.id);
        match store.bookings.get(&booking.id) {
            Some(current) if current.updated_at == expected_version => {}
            _ => return Err(AppError::Conflict),
        }

        booking.updated_at = next_version(expected_version, Utc::now());
        store.bookings.insert(booking.id, booking.clone());
        if let Some(delta) = counters.as_ref() {
            store.apply(delta);
        }

        Ok(booking)
    }

    async fn remove(&self, removal: Removal) -> Result<bool> {
        let mut store = self.store.lock().await;
        store.writes += 1;

        if store.failing.contains(&removal.booking_id) {
            return Err(simulated_failure());
        }
        store.lose_race(&removal.booking_id);
        match store.bookings.get(&removal.booking_id) {
            None => return Ok(false),
            Some(current) if current.updated_at != removal.expected_version => {
                return Err(AppError::Conflict)
            }
            Some(_) => {}
        }

        store.bookings.remove(&removal.booking_id);
        if let Some(delta) = removal.counters.as_ref() {
            store.apply(delta);
        }
        Ok(true)
    }

    async fn hotel_totals(&self) -> Result<Vec<(ObjectId, Totals)>> {
        let store = self.store.lock().await;
        Ok(store
            .hotels
            .values()
            .map(|h| {
                (
                    h.id,
                    Totals {
                        bookings: h.total_bookings,
                        amount: h.total_revenue,
                    },
                )
            })
            .collect())
    }

    async fn user_totals(&self) -> Result<Vec<(ObjectId, Totals)>> {
        let store = self.store.lock().await;
        Ok(store
            .users
            .values()
            .map(|u| {
                (
                    u.id,
                    Totals {
                        bookings: u.total_bookings,
                        amount: u.total_spent,
                    },
                )
            })
            .collect())
    }

    async fn set_hotel_totals(
        &self,
        hotel_id: &ObjectId,
        seen: Totals,
        totals: Totals,
    ) -> Result<bool> {
        let mut store = self.store.lock().await;
        match store.hotels.get_mut(hotel_id) {
            Some(hotel)
                if hotel.total_bookings == seen.bookings && hotel.total_revenue == seen.amount =>
            {
                hotel.total_bookings = totals.bookings;
                hotel.total_revenue = totals.amount;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_user_totals(
        &self,
        user_id: &ObjectId,
        seen: Totals,
        totals: Totals,
    ) -> Result<bool> {
        let mut store = self.store.lock().await;
        match store.users.get_mut(user_id) {
            Some(user)
                if user.total_bookings == seen.bookings && user.total_spent == seen.amount =>
            {
                user.total_bookings = totals.bookings;
                user.total_spent = totals.amount;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
