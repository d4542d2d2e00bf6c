use mongodb::bson::oid::ObjectId;
use serde::Serialize;

/// Change to apply to the hotel and guest aggregate counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterDelta {
    pub hotel_id: ObjectId,
    pub user_id: ObjectId,
    pub bookings: i64,
    pub amount: f64,
}

/// Snapshot of one aggregate counter pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub bookings: i64,
    pub amount: f64,
}

impl Totals {
    pub fn add(&mut self, amount: f64) {
        self.bookings += 1;
        self.amount += amount;
    }

    /// Counter amounts drift by float noise; compare at cent precision.
    pub fn matches(&self, other: &Totals) -> bool {
        self.bookings == other.bookings && (self.amount - other.amount).abs() < 0.005
    }
}
