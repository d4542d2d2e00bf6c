pub mod lifecycle;
pub mod reconciliation;
pub mod scheduler;
pub mod sweep;
