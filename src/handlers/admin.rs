use axum::{extract::State, response::Json, Extension};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    errors::{AppError, Result},
    models::user::Claims,
    services::{
        reconciliation::{reconcile_counters, ReconciliationReport},
        sweep::SweepReport,
    },
    state::AppState,
};

fn require_admin(claims: &Claims) -> Result<()> {
    if claims.is_admin() {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

// POST /api/admin/reconcile
pub async fn reconcile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ReconciliationReport>> {
    require_admin(&claims)?;

    tracing::info!(admin = %claims.sub, "🔧 Manual counter reconciliation requested");
    let report = reconcile_counters(state.store.as_ref()).await?;
    Ok(Json(report))
}

// POST /api/admin/sweep
pub async fn run_sweep(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SweepReport>> {
    require_admin(&claims)?;

    tracing::info!(admin = %claims.sub, "🧹 Manual compliance sweep requested");
    let report = state.sweep.run(Utc::now()).await?;
    Ok(Json(report))
}

// GET /api/admin/sweep
pub async fn sweep_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>> {
    require_admin(&claims)?;

    let policy = state.sweep.policy();
    let dead_letters: Vec<String> = state
        .sweep
        .dead_letters()
        .await
        .iter()
        .map(|id| id.to_hex())
        .collect();

    Ok(Json(json!({
        "guestUploadTimeoutHours": policy.guest_upload_timeout.num_hours(),
        "ownerVerificationTimeoutHours": policy.owner_verification_timeout.num_hours(),
        "idRetentionDays": policy.id_retention.num_days(),
        "maxAttempts": policy.max_attempts,
        "deadLetters": dead_letters,
    })))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use chrono::Duration;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use mongodb::bson::oid::ObjectId;
    use tower::ServiceExt;

    use super::*;
    use crate::database::memory::MemoryRepository;
    use crate::database::repository::BookingRepository;
    use crate::models::booking::BookingStatus;
    use crate::models::counters::Totals;
    use crate::models::user::Role;
    use crate::routes::app_router;
    use crate::services::lifecycle::tests::booking;
    use crate::services::sweep::SweepPolicy;

    const SECRET: &str = "admin-test-secret";

    fn bearer(role: Role) -> String {
        let claims = Claims {
            sub: ObjectId::new().to_hex(),
            role,
            exp: (Utc::now().timestamp() + 3600) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        format!("Bearer {}", token)
    }

    async fn post(app: axum::Router, uri: &str, role: Role) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("authorization", bearer(role))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn reconcile_is_admin_only_and_fixes_drift() {
        let repo = Arc::new(MemoryRepository::new());
        let live = booking(BookingStatus::Confirmed);
        repo.seed(&live, ObjectId::new()).await;
        let seeded = Totals {
            bookings: 1,
            amount: live.total_cost,
        };
        let drifted = Totals {
            bookings: 7,
            amount: 10.0,
        };
        assert!(repo
            .set_hotel_totals(&live.hotel_id, seeded, drifted)
            .await
            .unwrap());
        let app = app_router(AppState::new(repo.clone(), SECRET, SweepPolicy::default()));

        let (status, _) = post(app.clone(), "/api/admin/reconcile", Role::HotelOwner).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, json) = post(app, "/api/admin/reconcile", Role::Admin).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["hotelsCorrected"], 1);
        assert_eq!(json["usersCorrected"], 0);

        let hotel = repo.hotel(&live.hotel_id).await.unwrap();
        assert_eq!(hotel.total_bookings, 1);
        assert_eq!(hotel.total_revenue, live.total_cost);
    }

    #[tokio::test]
    async fn manual_sweep_reports_its_work() {
        let repo = Arc::new(MemoryRepository::new());
        let mut overdue = booking(BookingStatus::IdPending);
        overdue.created_at = Utc::now() - Duration::hours(8);
        repo.seed(&overdue, ObjectId::new()).await;
        let app = app_router(AppState::new(repo.clone(), SECRET, SweepPolicy::default()));

        let (status, json) = post(app, "/api/admin/sweep", Role::Admin).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["cancelled"], 1);
        assert_eq!(
            repo.booking(&overdue.id).await.unwrap().status,
            BookingStatus::Cancelled
        );
    }
}
