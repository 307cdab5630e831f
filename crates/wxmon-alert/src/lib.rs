//! Alert evaluation pipeline for weather telemetry.
//!
//! Readings are matched against per-city threshold rules by the
//! [`engine::AlertEngine`]; the [`ingest::IngestionCoordinator`] turns one
//! decoded reading into a durable reading record plus the alerts it
//! triggers. All shared state (rules, alert history, readings) sits behind
//! the repository traits below, so the engine itself is stateless and safe
//! to drive from concurrent transport workers.

pub mod engine;
pub mod ingest;

#[cfg(test)]
mod tests;

use anyhow::Result;
use chrono::{DateTime, Utc};
use wxmon_common::types::{Alert, AlertRule, WeatherReading};

/// Minutes during which a rule will not re-fire after producing an alert.
pub const SUPPRESSION_WINDOW_MINS: i64 = 30;

/// Read access to the configured alert rules.
pub trait RuleRepository: Send + Sync {
    /// Returns the rules for `city` with `is_active == true`, in an order
    /// that is deterministic for a fixed rule set. An empty list is valid.
    fn active_rules_for_city(&self, city: &str) -> Result<Vec<AlertRule>>;
}

/// Outcome of a conditional alert insert.
#[derive(Debug)]
pub enum AlertWrite {
    /// The alert was persisted.
    Created(Alert),
    /// A concurrent or earlier alert for the same rule already sits inside
    /// the suppression window; nothing was written.
    Suppressed,
}

/// Persistence of fired alerts and the suppression-window lookups over them.
///
/// Implementations must be safe to share across threads: the ingestion
/// entry point is driven concurrently by transport workers, and the
/// read-then-write pair guarding the suppression window is only correct if
/// [`AlertRepository::save_if_no_recent`] is atomic per rule.
pub trait AlertRepository: Send + Sync {
    /// Returns the most recent alert for `rule_id` with
    /// `created_at >= since`, if any.
    fn most_recent_alert(&self, rule_id: &str, since: DateTime<Utc>) -> Result<Option<Alert>>;

    /// Persists `alert` only if no alert for the same `rule_id` has
    /// `created_at >= since`. The check and the insert are evaluated
    /// atomically, so two concurrent evaluations of the same rule can
    /// never both write inside one suppression window.
    fn save_if_no_recent(&self, alert: Alert, since: DateTime<Utc>) -> Result<AlertWrite>;
}

/// Persistence of ingested readings.
pub trait ReadingStore: Send + Sync {
    fn save_reading(&self, reading: &WeatherReading) -> Result<()>;
}

/// A repository failure scoped to a single rule. Evaluation of the
/// remaining rules continues; the caller decides how to report these.
#[derive(Debug)]
pub struct RuleFailure {
    pub rule_id: String,
    pub rule_name: String,
    pub error: anyhow::Error,
}
