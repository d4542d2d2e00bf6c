use async_trait::async_trait;
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{self, doc, oid::ObjectId, Bson, Document},
    Client, ClientSession, Collection, Database,
};
use serde::Deserialize;

use crate::{
    database::repository::{next_version, BookingRepository, SweepCutoffs},
    errors::{AppError, Result},
    models::{
        booking::{Booking, BookingStatus},
        counters::{CounterDelta, Totals},
        hotel::Hotel,
    },
    services::lifecycle::{Removal, Transition},
};

const BOOKINGS: &str = "bookings";
const HOTELS: &str = "hotels";
const USERS: &str = "users";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HotelCounters {
    #[serde(rename = "_id")]
    id: ObjectId,
    #[serde(default)]
    total_bookings: i64,
    #[serde(default)]
    total_revenue: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserCounters {
    #[serde(rename = "_id")]
    id: ObjectId,
    #[serde(default)]
    total_bookings: i64,
    #[serde(default)]
    total_spent: f64,
}

/// MongoDB-backed repository. With `transactions` enabled the booking write
/// and its counter updates commit together (requires a replica set).
#[derive(Clone)]
pub struct MongoRepository {
    client: Client,
    db: Database,
    transactions: bool,
}

impl MongoRepository {
    pub fn new(client: Client, db: Database, transactions: bool) -> Self {
        MongoRepository {
            client,
            db,
            transactions,
        }
    }

    fn bookings(&self) -> Collection<Booking> {
        self.db.collection(BOOKINGS)
    }

    fn raw(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }

    fn version_filter(id: ObjectId, version: chrono::DateTime<Utc>) -> Document {
        doc! { "_id": id, "updatedAt": bson::DateTime::from_chrono(version) }
    }

    async fn apply_counters(
        &self,
        delta: &CounterDelta,
        session: Option<&mut ClientSession>,
    ) -> Result<()> {
        let hotel_update = doc! {
            "$inc": { "totalBookings": delta.bookings, "totalRevenue": delta.amount }
        };
        let user_update = doc! {
            "$inc": { "totalBookings": delta.bookings, "totalSpent": delta.amount }
        };

        match session {
            Some(session) => {
                self.raw(HOTELS)
                    .update_one(doc! { "_id": delta.hotel_id }, hotel_update)
                    .session(&mut *session)
                    .await?;
                self.raw(USERS)
                    .update_one(doc! { "_id": delta.user_id }, user_update)
                    .session(&mut *session)
                    .await?;
            }
            None => {
                self.raw(HOTELS)
                    .update_one(doc! { "_id": delta.hotel_id }, hotel_update)
                    .await?;
                self.raw(USERS)
                    .update_one(doc! { "_id": delta.user_id }, user_update)
                    .await?;
            }
        }

        tracing::debug!(
            hotel_id = %delta.hotel_id,
            user_id = %delta.user_id,
            bookings = delta.bookings,
            amount = delta.amount,
            "applied counter adjustment"
        );
        Ok(())
    }

    async fn absent_or_conflict(&self, id: &ObjectId) -> Result<bool> {
        match self.find_booking(id).await? {
            Some(_) => Err(AppError::Conflict),
            None => Ok(false),
        }
    }
}

/// Matches a counter document whose fields still hold `seen`. Older documents
/// may lack the fields entirely, which reads as zero.
fn counters_filter(id: ObjectId, fields: (&str, &str), seen: Totals) -> Document {
    fn still(value: Bson, is_zero: bool) -> Bson {
        if is_zero {
            Bson::Document(doc! { "$in": [value, Bson::Null] })
        } else {
            value
        }
    }

    let (count_field, amount_field) = fields;
    let mut filter = doc! { "_id": id };
    filter.insert(count_field, still(Bson::Int64(seen.bookings), seen.bookings == 0));
    filter.insert(amount_field, still(Bson::Double(seen.amount), seen.amount == 0.0));
    filter
}

#[async_trait]
impl BookingRepository for MongoRepository {
    async fn find_booking(&self, id: &ObjectId) -> Result<Option<Booking>> {
        Ok(self.bookings().find_one(doc! { "_id": *id }).await?)
    }

    async fn list_bookings(&self, hotel_id: Option<&ObjectId>) -> Result<Vec<Booking>> {
        let filter = match hotel_id {
            Some(id) => doc! { "hotelId": *id },
            None => doc! {},
        };

        let cursor = self
            .bookings()
            .find(filter)
            .sort(doc! { "createdAt": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_hotel(&self, id: &ObjectId) -> Result<Option<Hotel>> {
        let collection: Collection<Hotel> = self.db.collection(HOTELS);
        Ok(collection.find_one(doc! { "_id": *id }).await?)
    }

    async fn sweep_candidates(&self, cutoffs: &SweepCutoffs) -> Result<Vec<Booking>> {
        let filter = doc! {
            "$or": [
                {
                    "status": BookingStatus::IdPending.as_str(),
                    "createdAt": { "$lt": bson::DateTime::from_chrono(cutoffs.created_before) },
                },
                {
                    "status": BookingStatus::IdSubmitted.as_str(),
                    "idProof.uploadedAt": {
                        "$lt": bson::DateTime::from_chrono(cutoffs.uploaded_before)
                    },
                },
                {
                    "checkOut": { "$lt": bson::DateTime::from_chrono(cutoffs.checked_out_before) },
                    "idProof.frontImage": { "$exists": true, "$ne": "" },
                },
            ]
        };

        let cursor = self.bookings().find(filter).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn commit(&self, transition: Transition) -> Result<Booking> {
        let Transition {
            mut booking,
            expected_version,
            counters,
        } = transition;
        booking.updated_at = next_version(expected_version, Utc::now());
        let filter = Self::version_filter(booking.id, expected_version);

        if self.transactions {
            let mut session = self.client.start_session().await?;
            session.start_transaction().await?;

            let result = self
                .bookings()
                .replace_one(filter, &booking)
                .session(&mut session)
                .await?;
            if result.matched_count == 0 {
                session.abort_transaction().await?;
                return Err(AppError::Conflict);
            }
            if let Some(delta) = counters.as_ref() {
                self.apply_counters(delta, Some(&mut session)).await?;
            }

            session.commit_transaction().await?;
        } else {
            let result = self.bookings().replace_one(filter, &booking).await?;
            if result.matched_count == 0 {
                return Err(AppError::Conflict);
            }
            if let Some(delta) = counters.as_ref() {
                self.apply_counters(delta, None).await?;
            }
        }

        Ok(booking)
    }

    async fn remove(&self, removal: Removal) -> Result<bool> {
        let filter = Self::version_filter(removal.booking_id, removal.expected_version);

        if self.transactions {
            let mut session = self.client.start_session().await?;
            session.start_transaction().await?;

            let deleted = self
                .bookings()
                .find_one_and_delete(filter)
                .session(&mut session)
                .await?;
            if deleted.is_none() {
                session.abort_transaction().await?;
                return self.absent_or_conflict(&removal.booking_id).await;
            }
            if let Some(delta) = removal.counters.as_ref() {
                self.apply_counters(delta, Some(&mut session)).await?;
            }

            session.commit_transaction().await?;
        } else {
            let deleted = self.bookings().find_one_and_delete(filter).await?;
            if deleted.is_none() {
                return self.absent_or_conflict(&removal.booking_id).await;
            }
            if let Some(delta) = removal.counters.as_ref() {
                self.apply_counters(delta, None).await?;
            }
        }

        Ok(true)
    }

    async fn hotel_totals(&self) -> Result<Vec<(ObjectId, Totals)>> {
        let collection: Collection<HotelCounters> = self.db.collection(HOTELS);
        let cursor = collection
            .find(doc! {})
            .projection(doc! { "totalBookings": 1, "totalRevenue": 1 })
            .await?;
        let hotels: Vec<HotelCounters> = cursor.try_collect().await?;

        Ok(hotels
            .into_iter()
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
        let collection: Collection<UserCounters> = self.db.collection(USERS);
        let cursor = collection
            .find(doc! {})
            .projection(doc! { "totalBookings": 1, "totalSpent": 1 })
            .await?;
        let users: Vec<UserCounters> = cursor.try_collect().await?;

        Ok(users
            .into_iter()
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
        let result = self
            .raw(HOTELS)
            .update_one(
                counters_filter(*hotel_id, ("totalBookings", "totalRevenue"), seen),
                doc! {
                    "$set": { "totalBookings": totals.bookings, "totalRevenue": totals.amount }
                },
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn set_user_totals(
        &self,
        user_id: &ObjectId,
        seen: Totals,
        totals: Totals,
    ) -> Result<bool> {
        let result = self
            .raw(USERS)
            .update_one(
                counters_filter(*user_id, ("totalBookings", "totalSpent"), seen),
                doc! { "$set": { "totalBookings": totals.bookings, "totalSpent": totals.amount } },
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn ping(&self) -> Result<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}
