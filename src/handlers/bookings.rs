use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use validator::Validate;

use crate::{
    errors::{AppError, Result},
    models::booking::{
        Booking, BookingResponse, BookingStatus, PaymentStatus, SubmitIdProofRequest,
        SuccessResponse, UpdatePaymentRequest, UpdateStatusRequest, VerifyAction,
        VerifyIdRequest,
    },
    models::user::Claims,
    services::lifecycle,
    state::AppState,
};

fn parse_id(id: &str) -> Result<ObjectId> {
    Ok(ObjectId::parse_str(id)?)
}

async fn load_booking(state: &AppState, id: &ObjectId) -> Result<Booking> {
    state
        .store
        .find_booking(id)
        .await?
        .ok_or(AppError::BookingNotFound)
}

/// Admins, or the owner of the booked hotel.
async fn authorize_manager(state: &AppState, claims: &Claims, booking: &Booking) -> Result<()> {
    if claims.is_admin() {
        return Ok(());
    }

    let hotel = state
        .store
        .find_hotel(&booking.hotel_id)
        .await?
        .ok_or(AppError::HotelNotFound)?;

    if hotel.is_owned_by(&claims.sub) {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

fn into_responses(bookings: Vec<Booking>) -> Vec<BookingResponse> {
    bookings.into_iter().map(BookingResponse::from).collect()
}

// GET /api/bookings
pub async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<BookingResponse>>> {
    if !claims.is_admin() {
        return Err(AppError::Unauthorized);
    }

    let bookings = state.store.list_bookings(None).await?;
    tracing::info!("✅ Fetched {} bookings", bookings.len());
    Ok(Json(into_responses(bookings)))
}

// GET /api/bookings/hotel/:hotel_id
pub async fn get_hotel_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(hotel_id): Path<String>,
) -> Result<Json<Vec<BookingResponse>>> {
    let hotel_id = parse_id(&hotel_id)?;
    let hotel = state
        .store
        .find_hotel(&hotel_id)
        .await?
        .ok_or(AppError::HotelNotFound)?;

    if !hotel.is_owned_by(&claims.sub) && !claims.is_admin() {
        return Err(AppError::Unauthorized);
    }

    let bookings = state.store.list_bookings(Some(&hotel_id)).await?;
    Ok(Json(into_responses(bookings)))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>> {
    let id = parse_id(&id)?;
    let booking = load_booking(&state, &id).await?;

    if booking.user_id.to_hex() != claims.sub {
        authorize_manager(&state, &claims, &booking).await?;
    }

    Ok(Json(booking.into()))
}

// PATCH /api/bookings/:id/status
pub async fn update_booking_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<BookingResponse>> {
    payload.validate()?;
    let status: BookingStatus = payload.status.parse()?;
    let id = parse_id(&id)?;

    let booking = load_booking(&state, &id).await?;
    authorize_manager(&state, &claims, &booking).await?;

    let previous = booking.status;
    let transition = lifecycle::set_status(
        booking,
        status,
        payload.cancellation_reason,
        payload.refund_amount,
    );
    let released = transition.counters.is_some();
    let updated = state.store.commit(transition).await?;

    tracing::info!(
        booking_id = %id,
        from = %previous,
        to = %updated.status,
        counters_released = released,
        "📝 Booking status updated"
    );
    Ok(Json(updated.into()))
}

// PATCH /api/bookings/:id/verify-id
pub async fn verify_guest_id(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<VerifyIdRequest>,
) -> Result<Json<BookingResponse>> {
    payload.validate()?;
    let action: VerifyAction = payload.action.parse()?;
    let id = parse_id(&id)?;

    let booking = load_booking(&state, &id).await?;
    let hotel = state
        .store
        .find_hotel(&booking.hotel_id)
        .await?
        .ok_or(AppError::HotelNotFound)?;

    if !hotel.is_owned_by(&claims.sub) {
        tracing::warn!(
            booking_id = %id,
            caller = %claims.sub,
            "ID verification refused: not the hotel owner"
        );
        return Err(AppError::Unauthorized);
    }

    let transition = match action {
        VerifyAction::Approve => lifecycle::approve_id(booking, Utc::now())?,
        VerifyAction::Reject => lifecycle::reject_id(booking, payload.rejection_reason)?,
    };
    let updated = state.store.commit(transition).await?;

    tracing::info!(
        booking_id = %id,
        action = ?action,
        status = %updated.status,
        "🪪 Guest ID reviewed"
    );
    Ok(Json(updated.into()))
}

// PATCH /api/bookings/:id/id-proof
pub async fn submit_id_proof(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<SubmitIdProofRequest>,
) -> Result<Json<BookingResponse>> {
    payload.validate()?;
    let id = parse_id(&id)?;

    let booking = load_booking(&state, &id).await?;
    if booking.user_id.to_hex() != claims.sub {
        return Err(AppError::Unauthorized);
    }

    let transition = lifecycle::submit_id_proof(
        booking,
        payload.id_type,
        payload.front_image,
        payload.back_image,
        Utc::now(),
    )?;
    let updated = state.store.commit(transition).await?;

    tracing::info!(booking_id = %id, "📤 Guest ID proof submitted");
    Ok(Json(updated.into()))
}

// PATCH /api/bookings/:id/payment
pub async fn update_payment_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<UpdatePaymentRequest>,
) -> Result<Json<BookingResponse>> {
    payload.validate()?;
    let payment_status: PaymentStatus = payload.payment_status.parse()?;
    let id = parse_id(&id)?;

    let booking = load_booking(&state, &id).await?;
    authorize_manager(&state, &claims, &booking).await?;

    let transition = lifecycle::update_payment(booking, payment_status, payload.payment_method);
    let updated = state.store.commit(transition).await?;

    tracing::info!(
        booking_id = %id,
        payment_status = ?updated.payment_status,
        "💳 Payment status updated"
    );
    Ok(Json(updated.into()))
}

// DELETE /api/bookings/:id
pub async fn delete_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>> {
    if !claims.is_admin() {
        return Err(AppError::Unauthorized);
    }
    let id = parse_id(&id)?;

    let booking = load_booking(&state, &id).await?;
    let removal = lifecycle::remove(&booking);

    if !state.store.remove(removal).await? {
        return Err(AppError::BookingNotFound);
    }

    tracing::info!(booking_id = %id, "🗑️ Booking deleted");
    Ok(Json(SuccessResponse {
        success: true,
        message: "Booking deleted successfully".to_string(),
        data: None,
    }))
}
