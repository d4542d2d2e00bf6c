//! Booking status transitions.
//!
//! Every operation takes the booking as loaded from the database and returns
//! the booking to persist together with the aggregate counter adjustment it
//! requires. Nothing in here performs I/O; the repository applies a
//! [`Transition`] as one conditional write keyed on the version that was read.

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;

use crate::errors::{AppError, Result};
use crate::models::booking::{
    Booking, BookingStatus, IdProof, IdProofStatus, IdType, PaymentStatus,
};
use crate::models::counters::CounterDelta;

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub booking: Booking,
    /// `updated_at` of the booking the transition was computed from.
    pub expected_version: DateTime<Utc>,
    pub counters: Option<CounterDelta>,
}

impl Transition {
    fn new(booking: Booking, expected_version: DateTime<Utc>) -> Self {
        Transition {
            booking,
            expected_version,
            counters: None,
        }
    }

    fn releasing_counters(mut self) -> Self {
        self.counters = Some(release(&self.booking));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    pub booking_id: ObjectId,
    pub expected_version: DateTime<Utc>,
    pub counters: Option<CounterDelta>,
}

/// Takes one booking and its revenue out of the hotel and guest totals.
pub fn release(booking: &Booking) -> CounterDelta {
    CounterDelta {
        hotel_id: booking.hotel_id,
        user_id: booking.user_id,
        bookings: -1,
        amount: -booking.total_cost,
    }
}

/// An owner may review the guest's ID until the booking has left the totals.
fn ensure_verifiable(booking: &Booking, target: BookingStatus) -> Result<()> {
    if booking.status.has_released_counters() {
        Err(AppError::InvalidTransition {
            from: booking.status,
            to: target,
        })
    } else {
        Ok(())
    }
}

fn ensure_status(booking: &Booking, expected: BookingStatus, target: BookingStatus) -> Result<()> {
    if booking.status == expected {
        Ok(())
    } else {
        Err(AppError::InvalidTransition {
            from: booking.status,
            to: target,
        })
    }
}

fn refund_in_full(booking: &mut Booking) {
    booking.payment_status = PaymentStatus::Refunded;
    booking.refund_amount = Some(booking.total_cost);
}

fn mark_id_rejected(booking: &mut Booking) {
    if let Some(proof) = booking.id_proof.as_mut() {
        proof.status = IdProofStatus::Rejected;
    }
}

/// Generic status edit used by admins and hotel owners.
///
/// Counters are released only when the booking moves into CANCELLED or
/// REJECTED from a status that has not already released them, so repeating
/// the same edit never decrements twice.
pub fn set_status(
    mut booking: Booking,
    status: BookingStatus,
    cancellation_reason: Option<String>,
    refund_amount: Option<f64>,
) -> Transition {
    let previous = booking.status;
    let version = booking.updated_at;

    booking.status = status;
    match status {
        BookingStatus::Cancelled => {
            if let Some(reason) = cancellation_reason.filter(|r| !r.trim().is_empty()) {
                booking.cancellation_reason = Some(reason);
            }
        }
        BookingStatus::Refunded => {
            booking.payment_status = PaymentStatus::Refunded;
            booking.refund_amount = Some(refund_amount.unwrap_or(0.0));
        }
        BookingStatus::Rejected => refund_in_full(&mut booking),
        _ => {}
    }

    let transition = Transition::new(booking, version);
    let releases = matches!(status, BookingStatus::Cancelled | BookingStatus::Rejected)
        && !previous.has_released_counters();

    if releases {
        transition.releasing_counters()
    } else {
        transition
    }
}

/// Hotel owner accepts the guest's ID.
pub fn approve_id(mut booking: Booking, now: DateTime<Utc>) -> Result<Transition> {
    ensure_verifiable(&booking, BookingStatus::Confirmed)?;
    let version = booking.updated_at;

    booking.status = BookingStatus::Confirmed;
    if let Some(proof) = booking.id_proof.as_mut() {
        proof.status = IdProofStatus::Verified;
        proof.verified_at = Some(now);
    }

    Ok(Transition::new(booking, version))
}

/// Hotel owner refuses the guest's ID; the stay is refunded in full.
pub fn reject_id(mut booking: Booking, reason: Option<String>) -> Result<Transition> {
    ensure_verifiable(&booking, BookingStatus::Rejected)?;
    let version = booking.updated_at;

    booking.status = BookingStatus::Rejected;
    booking.rejection_reason = reason;
    mark_id_rejected(&mut booking);
    refund_in_full(&mut booking);

    Ok(Transition::new(booking, version).releasing_counters())
}

/// Guest uploads (or replaces) their identity document.
pub fn submit_id_proof(
    mut booking: Booking,
    id_type: IdType,
    front_image: String,
    back_image: Option<String>,
    now: DateTime<Utc>,
) -> Result<Transition> {
    match booking.status {
        BookingStatus::PaymentDone | BookingStatus::IdPending | BookingStatus::IdSubmitted => {}
        from => {
            return Err(AppError::InvalidTransition {
                from,
                to: BookingStatus::IdSubmitted,
            })
        }
    }
    let version = booking.updated_at;

    booking.status = BookingStatus::IdSubmitted;
    booking.id_proof = Some(IdProof {
        id_type,
        front_image,
        back_image: back_image.unwrap_or_default(),
        status: IdProofStatus::Submitted,
        uploaded_at: Some(now),
        verified_at: None,
    });

    Ok(Transition::new(booking, version))
}

pub fn update_payment(
    mut booking: Booking,
    payment_status: PaymentStatus,
    payment_method: Option<String>,
) -> Transition {
    let version = booking.updated_at;

    booking.payment_status = payment_status;
    if let Some(method) = payment_method {
        booking.payment_method = Some(method);
    }

    Transition::new(booking, version)
}

/// Admin delete. Bookings already taken out of the totals are not released
/// a second time.
pub fn remove(booking: &Booking) -> Removal {
    Removal {
        booking_id: booking.id,
        expected_version: booking.updated_at,
        counters: booking.status.is_counted().then(|| release(booking)),
    }
}

/// Guest never uploaded an ID in time.
pub fn expire_guest_upload(mut booking: Booking, reason: String) -> Result<Transition> {
    ensure_status(&booking, BookingStatus::IdPending, BookingStatus::Cancelled)?;
    let version = booking.updated_at;

    booking.status = BookingStatus::Cancelled;
    booking.cancellation_reason = Some(reason);
    refund_in_full(&mut booking);

    Ok(Transition::new(booking, version).releasing_counters())
}

/// Hotel owner never reviewed the uploaded ID in time.
pub fn expire_owner_verification(mut booking: Booking, reason: String) -> Result<Transition> {
    ensure_status(&booking, BookingStatus::IdSubmitted, BookingStatus::Rejected)?;
    let version = booking.updated_at;

    booking.status = BookingStatus::Rejected;
    booking.rejection_reason = Some(reason);
    mark_id_rejected(&mut booking);
    refund_in_full(&mut booking);

    Ok(Transition::new(booking, version).releasing_counters())
}

/// Drops the references to the guest's ID images. The images themselves live
/// in the upstream image store and are not touched.
pub fn purge_id_images(mut booking: Booking) -> Option<Transition> {
    let version = booking.updated_at;
    let proof = booking.id_proof.as_mut().filter(|p| p.has_images())?;

    proof.front_image.clear();
    proof.back_image.clear();

    Some(Transition::new(booking, version))
}
