pub(crate) mod admin;
pub(crate) mod bookings;
pub(crate) mod health;
