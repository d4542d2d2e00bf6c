use std::sync::Arc;

use crate::database::repository::BookingRepository;
use crate::services::sweep::{ComplianceSweep, SweepPolicy};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BookingRepository>,
    pub sweep: Arc<ComplianceSweep>,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(store: Arc<dyn BookingRepository>, jwt_secret: &str, policy: SweepPolicy) -> Self {
        let sweep = Arc::new(ComplianceSweep::new(store.clone(), policy));
        AppState {
            store,
            sweep,
            jwt_secret: Arc::from(jwt_secret),
        }
    }
}
