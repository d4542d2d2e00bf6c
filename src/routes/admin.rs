use axum::{middleware, routing::post, Router};

use crate::{handlers::admin::*, middleware::auth::auth_middleware, state::AppState};

pub fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/reconcile", post(reconcile))
        .route("/sweep", post(run_sweep).get(sweep_status))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
