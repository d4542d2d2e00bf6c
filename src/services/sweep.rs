//! Compliance sweep: timeout-driven cancellations and rejections, and ID
//! evidence retention.
//!
//! Planning is a pure function of `now` and the bookings so any scheduler can
//! drive it and tests can pin the clock. [`ComplianceSweep::run`] applies the
//! plan one booking at a time; a failure on one booking never stops the pass.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mongodb::bson::oid::ObjectId;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::database::repository::{BookingRepository, SweepCutoffs};
use crate::errors::{AppError, Result};
use crate::models::booking::{Booking, BookingStatus};
use crate::services::lifecycle;

/// Longest a failing booking is deferred between attempts.
const MAX_BACKOFF_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepPolicy {
    pub guest_upload_timeout: Duration,
    pub owner_verification_timeout: Duration,
    pub id_retention: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        SweepPolicy {
            guest_upload_timeout: Duration::hours(6),
            owner_verification_timeout: Duration::hours(24),
            id_retention: Duration::days(7),
            max_attempts: 5,
            backoff_base: Duration::seconds(60),
        }
    }
}

impl SweepPolicy {
    pub fn cutoffs(&self, now: DateTime<Utc>) -> SweepCutoffs {
        SweepCutoffs {
            created_before: now - self.guest_upload_timeout,
            uploaded_before: now - self.owner_verification_timeout,
            checked_out_before: now - self.id_retention,
        }
    }

    fn guest_upload_reason(&self) -> String {
        format!(
            "Auto-cancelled: ID proof not uploaded within {} hours.",
            self.guest_upload_timeout.num_hours()
        )
    }

    fn owner_verification_reason(&self) -> String {
        format!(
            "Auto-rejected: Hotel owner failed to verify ID within {} hours.",
            self.owner_verification_timeout.num_hours()
        )
    }

    fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(20);
        let secs = self
            .backoff_base
            .num_seconds()
            .saturating_mul(1_i64 << exponent)
            .min(MAX_BACKOFF_SECS);
        Duration::seconds(secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepRule {
    GuestUploadTimeout,
    OwnerVerificationTimeout,
    IdRetention,
}

/// One booking due for sweeping and the rules to apply to it, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepAction {
    pub booking: Booking,
    pub rules: Vec<SweepRule>,
}

/// Rules that apply to one booking, status rule first.
pub fn plan_booking(booking: &Booking, cutoffs: &SweepCutoffs) -> Vec<SweepRule> {
    let mut rules = Vec::new();

    match booking.status {
        BookingStatus::IdPending if booking.created_at < cutoffs.created_before => {
            rules.push(SweepRule::GuestUploadTimeout);
        }
        BookingStatus::IdSubmitted => {
            let overdue = booking
                .id_proof
                .as_ref()
                .and_then(|p| p.uploaded_at)
                .is_some_and(|at| at < cutoffs.uploaded_before);
            if overdue {
                rules.push(SweepRule::OwnerVerificationTimeout);
            }
        }
        _ => {}
    }

    let has_images = booking.id_proof.as_ref().is_some_and(|p| p.has_images());
    if has_images && booking.check_out < cutoffs.checked_out_before {
        rules.push(SweepRule::IdRetention);
    }

    rules
}

/// Plans one pass: the bookings that match at least one rule at `now`.
pub fn plan_sweep(
    now: DateTime<Utc>,
    bookings: Vec<Booking>,
    policy: &SweepPolicy,
) -> Vec<SweepAction> {
    let cutoffs = policy.cutoffs(now);
    bookings
        .into_iter()
        .filter_map(|booking| {
            let rules = plan_booking(&booking, &cutoffs);
            (!rules.is_empty()).then_some(SweepAction { booking, rules })
        })
        .collect()
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub cancelled: usize,
    pub rejected: usize,
    pub purged: usize,
    pub conflicts: usize,
    pub failed: usize,
    pub deferred: usize,
    pub dead_lettered: usize,
}

impl SweepReport {
    pub fn mutations(&self) -> usize {
        self.cancelled + self.rejected + self.purged
    }

    fn record(&mut self, rule: SweepRule) {
        match rule {
            SweepRule::GuestUploadTimeout => self.cancelled += 1,
            SweepRule::OwnerVerificationTimeout => self.rejected += 1,
            SweepRule::IdRetention => self.purged += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryEntry {
    attempts: u32,
    retry_after: DateTime<Utc>,
    dead: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Eligibility {
    Ready,
    Deferred,
    DeadLettered,
}

/// Consecutive persistence failures per booking, kept across sweep passes.
#[derive(Debug, Default)]
pub struct RetryLedger {
    entries: HashMap<ObjectId, RetryEntry>,
}

impl RetryLedger {
    fn eligibility(&self, id: &ObjectId, now: DateTime<Utc>) -> Eligibility {
        match self.entries.get(id) {
            None => Eligibility::Ready,
            Some(entry) if entry.dead => Eligibility::DeadLettered,
            Some(entry) if now < entry.retry_after => Eligibility::Deferred,
            Some(_) => Eligibility::Ready,
        }
    }

    /// Returns true when this failure dead-letters the booking.
    fn record_failure(&mut self, id: ObjectId, now: DateTime<Utc>, policy: &SweepPolicy) -> bool {
        let entry = self.entries.entry(id).or_insert(RetryEntry {
            attempts: 0,
            retry_after: now,
            dead: false,
        });
        entry.attempts += 1;
        entry.retry_after = now + policy.backoff(entry.attempts);
        entry.dead = entry.attempts >= policy.max_attempts;
        entry.dead
    }

    fn record_success(&mut self, id: &ObjectId) {
        self.entries.remove(id);
    }

    /// Forgets bookings that no longer match any rule.
    fn retain(&mut self, still_matching: &HashSet<ObjectId>) {
        self.entries.retain(|id, _| still_matching.contains(id));
    }

    pub fn dead_letters(&self) -> Vec<ObjectId> {
        self.entries
            .iter()
            .filter(|(_, e)| e.dead)
            .map(|(id, _)| *id)
            .collect()
    }
}

pub struct ComplianceSweep {
    store: Arc<dyn BookingRepository>,
    policy: SweepPolicy,
    retries: Mutex<RetryLedger>,
    /// Copy of the ledger's dead letters as of the last finished pass.
    dead_letters: RwLock<Vec<ObjectId>>,
}

impl ComplianceSweep {
    pub fn new(store: Arc<dyn BookingRepository>, policy: SweepPolicy) -> Self {
        ComplianceSweep {
            store,
            policy,
            retries: Mutex::new(RetryLedger::default()),
            dead_letters: RwLock::new(Vec::new()),
        }
    }

    pub fn policy(&self) -> &SweepPolicy {
        &self.policy
    }

    pub async fn dead_letters(&self) -> Vec<ObjectId> {
        self.dead_letters.read().await.clone()
    }

    /// Runs one pass. Only failing to load the candidates fails the pass;
    /// per-booking errors are counted in the report.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let candidates = self.store.sweep_candidates(&self.policy.cutoffs(now)).await?;
        let plan = plan_sweep(now, candidates, &self.policy);

        // Held for the whole pass so overlapping runs queue up.
        let mut ledger = self.retries.lock().await;
        let mut report = SweepReport::default();
        let matching: HashSet<ObjectId> = plan.iter().map(|a| a.booking.id).collect();

        for SweepAction { booking, rules } in plan {
            let booking_id = booking.id;

            match ledger.eligibility(&booking_id, now) {
                Eligibility::Ready => {}
                Eligibility::Deferred => {
                    report.deferred += 1;
                    continue;
                }
                Eligibility::DeadLettered => continue,
            }

            match self.process(booking, &rules, &mut report).await {
                Ok(()) => ledger.record_success(&booking_id),
                Err(AppError::Conflict) => {
                    report.conflicts += 1;
                    info!(
                        booking_id = %booking_id,
                        "booking changed during sweep, retrying next tick"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(booking_id = %booking_id, error = %e, "sweep failed to update booking");
                    if ledger.record_failure(booking_id, now, &self.policy) {
                        report.dead_lettered += 1;
                        error!(
                            booking_id = %booking_id,
                            attempts = self.policy.max_attempts,
                            "booking dead-lettered by compliance sweep"
                        );
                    }
                }
            }
        }

        ledger.retain(&matching);
        *self.dead_letters.write().await = ledger.dead_letters();

        if report.mutations() > 0 || report.failed > 0 {
            info!(
                cancelled = report.cancelled,
                rejected = report.rejected,
                purged = report.purged,
                failed = report.failed,
                conflicts = report.conflicts,
                "compliance sweep finished"
            );
        } else {
            debug!("compliance sweep found nothing to do");
        }

        Ok(report)
    }

    async fn process(
        &self,
        mut booking: Booking,
        rules: &[SweepRule],
        report: &mut SweepReport,
    ) -> Result<()> {
        for &rule in rules {
            let transition = match rule {
                SweepRule::GuestUploadTimeout => Some(lifecycle::expire_guest_upload(
                    booking.clone(),
                    self.policy.guest_upload_reason(),
                )?),
                SweepRule::OwnerVerificationTimeout => Some(lifecycle::expire_owner_verification(
                    booking.clone(),
                    self.policy.owner_verification_reason(),
                )?),
                SweepRule::IdRetention => lifecycle::purge_id_images(booking.clone()),
            };
            let Some(transition) = transition else {
                continue;
            };

            booking = self.store.commit(transition).await?;
            report.record(rule);
            info!(
                booking_id = %booking.id,
                rule = ?rule,
                status = %booking.status,
                "sweep applied"
            );
        }
        Ok(())
    }
}
