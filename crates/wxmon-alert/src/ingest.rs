use crate::engine::{AlertEngine, Evaluation};
use crate::{ReadingStore, RuleFailure};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use wxmon_common::types::{Alert, ReadingPayload, WeatherReading};

/// Why a message was dropped without producing a reading.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The payload decoded but fails validation; nothing is stored and the
    /// engine is not invoked.
    #[error("invalid reading payload: {0}")]
    Invalid(String),
    /// The reading could not be persisted. Alert evaluation does not run:
    /// there is nothing to evaluate against once storage failed to confirm
    /// the write.
    #[error("failed to store reading")]
    Store(#[source] anyhow::Error),
    /// The reading was stored but the rule list could not be fetched.
    #[error("failed to fetch alert rules")]
    Rules(#[source] anyhow::Error),
}

/// Outcome of one successful ingestion.
#[derive(Debug)]
pub struct Ingestion {
    pub reading: WeatherReading,
    pub alerts: Vec<Alert>,
    pub failures: Vec<RuleFailure>,
}

/// Turns one decoded reading into a durable reading record plus the alerts
/// it triggers: validate, persist, evaluate, report.
///
/// Each call is a bounded synchronous unit of work and may be issued from
/// any number of transport workers concurrently; the only cross-call
/// critical section is the per-rule conditional insert inside the alert
/// repository.
pub struct IngestionCoordinator {
    readings: Arc<dyn ReadingStore>,
    engine: AlertEngine,
}

impl IngestionCoordinator {
    pub fn new(readings: Arc<dyn ReadingStore>, engine: AlertEngine) -> Self {
        Self { readings, engine }
    }

    pub fn ingest(
        &self,
        payload: ReadingPayload,
        now: DateTime<Utc>,
    ) -> Result<Ingestion, IngestError> {
        validate(&payload)?;

        let reading = WeatherReading::from_payload(payload, wxmon_common::id::next_id(), now);
        self.readings
            .save_reading(&reading)
            .map_err(IngestError::Store)?;

        let Evaluation { alerts, failures } = self
            .engine
            .evaluate(&reading, now)
            .map_err(IngestError::Rules)?;

        tracing::debug!(
            reading_id = %reading.id,
            city = %reading.city,
            alerts = alerts.len(),
            "Reading ingested"
        );

        Ok(Ingestion {
            reading,
            alerts,
            failures,
        })
    }
}

// Missing keys are already rejected when the transport decodes the payload;
// what remains is shape validation serde cannot express.
fn validate(payload: &ReadingPayload) -> Result<(), IngestError> {
    if payload.city.trim().is_empty() {
        return Err(IngestError::Invalid("city must not be empty".into()));
    }
    if !payload.temperature.is_finite() {
        return Err(IngestError::Invalid(
            "temperature must be a finite number".into(),
        ));
    }
    if !payload.wind_speed.is_finite() {
        return Err(IngestError::Invalid(
            "wind_speed must be a finite number".into(),
        ));
    }
    Ok(())
}
