use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::database::repository::BookingRepository;
use crate::services::reconciliation::reconcile_counters;
use crate::services::sweep::ComplianceSweep;

/// Runs the compliance sweep every `period`, and counter reconciliation on
/// every `reconcile_every`-th tick (never when zero).
pub fn spawn_compliance_sweep(
    sweep: Arc<ComplianceSweep>,
    store: Arc<dyn BookingRepository>,
    period: Duration,
    reconcile_every: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks: u64 = 0;

        tracing::info!("🕒 Compliance sweep scheduled every {}s", period.as_secs());

        loop {
            ticker.tick().await;
            ticks = ticks.wrapping_add(1);

            if let Err(e) = sweep.run(Utc::now()).await {
                tracing::error!(error = %e, "❌ Compliance sweep pass failed");
            }

            if reconcile_every > 0 && ticks % reconcile_every == 0 {
                if let Err(e) = reconcile_counters(store.as_ref()).await {
                    tracing::error!(error = %e, "❌ Counter reconciliation failed");
                }
            }
        }
    })
}
