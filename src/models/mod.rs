pub mod booking;
pub mod counters;
pub(crate) mod datetime;
pub mod hotel;
pub mod user;
