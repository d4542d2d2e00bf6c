use axum::{
    middleware,
    routing::{get, patch},
    Router,
};

use crate::{handlers::bookings::*, middleware::auth::auth_middleware, state::AppState};

pub fn booking_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(list_bookings))
        .route("/hotel/:hotel_id", get(get_hotel_bookings))
        .route("/:id", get(get_booking).delete(delete_booking))
        .route("/:id/status", patch(update_booking_status))
        .route("/:id/verify-id", patch(verify_guest_id))
        .route("/:id/id-proof", patch(submit_id_proof))
        .route("/:id/payment", patch(update_payment_status))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
