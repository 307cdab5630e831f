use crate::config::MqttConfig;
use anyhow::{Context, Result};
use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::sync::Arc;
use std::time::Duration;
use wxmon_alert::ingest::{IngestError, IngestionCoordinator};
use wxmon_common::types::ReadingPayload;

/// Runs the MQTT ingest worker: subscribe to the reading topic, decode each
/// publish and hand it to the coordinator.
///
/// Connection errors are retried with a fixed delay up to
/// `connect_attempts` consecutive failures; after that the worker returns
/// an error, which the caller treats as fatal. Messages are never silently
/// dropped without a log line.
pub async fn run_subscriber(
    config: MqttConfig,
    coordinator: Arc<IngestionCoordinator>,
) -> Result<()> {
    let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(60));
    if let (Some(user), Some(pass)) = (&config.username, &config.password) {
        options.set_credentials(user.clone(), pass.clone());
    }

    let (client, mut eventloop) = AsyncClient::new(options, 64);

    let mut failures = 0u32;
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                failures = 0;
                tracing::info!(
                    host = %config.host,
                    port = config.port,
                    topic = %config.topic,
                    "Connected to MQTT broker"
                );
                // subscriptions do not survive a reconnect
                client
                    .subscribe(config.topic.clone(), QoS::AtMostOnce)
                    .await
                    .context("subscribe failed")?;
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                handle_publish(&coordinator, &publish.topic, &publish.payload);
            }
            Ok(_) => {}
            Err(e) => {
                failures += 1;
                if failures >= config.connect_attempts {
                    return Err(anyhow::Error::new(e)).with_context(|| {
                        format!("MQTT connection lost after {failures} attempts")
                    });
                }
                tracing::warn!(
                    error = %e,
                    attempt = failures,
                    max_attempts = config.connect_attempts,
                    "MQTT connection error, retrying"
                );
                tokio::time::sleep(Duration::from_secs(config.retry_delay_secs)).await;
            }
        }
    }
}

fn handle_publish(coordinator: &IngestionCoordinator, topic: &str, payload: &[u8]) {
    let payload: ReadingPayload = match serde_json::from_slice(payload) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(topic, error = %e, "Dropping undecodable reading payload");
            return;
        }
    };

    match coordinator.ingest(payload, Utc::now()) {
        Ok(ingestion) => {
            for alert in &ingestion.alerts {
                tracing::info!(
                    alert_id = %alert.id,
                    rule_id = %alert.rule_id,
                    severity = %alert.severity,
                    message = %alert.message,
                    "Alert generated"
                );
            }
            for failure in &ingestion.failures {
                tracing::error!(
                    rule_id = %failure.rule_id,
                    rule_name = %failure.rule_name,
                    error = %failure.error,
                    "Alert evaluation failed for rule"
                );
            }
        }
        Err(e @ IngestError::Invalid(_)) => {
            tracing::warn!(topic, error = %e, "Dropping invalid reading");
        }
        Err(e) => {
            tracing::error!(topic, error = %e, "Failed to ingest reading");
        }
    }
}
