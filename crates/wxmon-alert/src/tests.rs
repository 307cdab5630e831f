use crate::engine::{severity_for, AlertEngine};
use crate::ingest::{IngestError, IngestionCoordinator};
use crate::{AlertRepository, AlertWrite, ReadingStore, RuleRepository};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Barrier, Mutex};
use wxmon_common::types::{
    Alert, AlertRule, ConditionType, ReadingPayload, Severity, WeatherReading,
};

// ---- In-memory repository doubles ----

#[derive(Default)]
struct MemRules {
    rules: Mutex<Vec<AlertRule>>,
}

impl MemRules {
    fn with(rules: Vec<AlertRule>) -> Arc<Self> {
        Arc::new(Self {
            rules: Mutex::new(rules),
        })
    }
}

impl RuleRepository for MemRules {
    fn active_rules_for_city(&self, city: &str) -> Result<Vec<AlertRule>> {
        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.city == city && r.is_active)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct MemAlerts {
    alerts: Mutex<Vec<Alert>>,
}

impl MemAlerts {
    fn all(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl AlertRepository for MemAlerts {
    fn most_recent_alert(&self, rule_id: &str, since: DateTime<Utc>) -> Result<Option<Alert>> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.rule_id == rule_id && a.created_at >= since)
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    fn save_if_no_recent(&self, alert: Alert, since: DateTime<Utc>) -> Result<AlertWrite> {
        let mut alerts = self.alerts.lock().unwrap();
        if alerts
            .iter()
            .any(|a| a.rule_id == alert.rule_id && a.created_at >= since)
        {
            return Ok(AlertWrite::Suppressed);
        }
        alerts.push(alert.clone());
        Ok(AlertWrite::Created(alert))
    }
}

#[derive(Default)]
struct MemReadings {
    readings: Mutex<Vec<WeatherReading>>,
}

impl MemReadings {
    fn count(&self) -> usize {
        self.readings.lock().unwrap().len()
    }
}

impl ReadingStore for MemReadings {
    fn save_reading(&self, reading: &WeatherReading) -> Result<()> {
        self.readings.lock().unwrap().push(reading.clone());
        Ok(())
    }
}

/// Fails every alert save for one rule id; everything else passes through.
struct FailingAlerts {
    inner: Arc<MemAlerts>,
    fail_for_rule: String,
}

impl AlertRepository for FailingAlerts {
    fn most_recent_alert(&self, rule_id: &str, since: DateTime<Utc>) -> Result<Option<Alert>> {
        self.inner.most_recent_alert(rule_id, since)
    }

    fn save_if_no_recent(&self, alert: Alert, since: DateTime<Utc>) -> Result<AlertWrite> {
        if alert.rule_id == self.fail_for_rule {
            anyhow::bail!("disk full");
        }
        self.inner.save_if_no_recent(alert, since)
    }
}

struct FailingRules;

impl RuleRepository for FailingRules {
    fn active_rules_for_city(&self, _city: &str) -> Result<Vec<AlertRule>> {
        anyhow::bail!("connection refused")
    }
}

struct FailingReadings;

impl ReadingStore for FailingReadings {
    fn save_reading(&self, _reading: &WeatherReading) -> Result<()> {
        anyhow::bail!("disk full")
    }
}

// ---- Helpers ----

fn make_rule(id: &str, city: &str, condition_type: &str, operator: &str, threshold: f64) -> AlertRule {
    AlertRule {
        id: id.to_string(),
        name: format!("rule {id}"),
        city: city.to_string(),
        condition_type: condition_type.to_string(),
        operator: operator.to_string(),
        threshold,
        is_active: true,
        created_at: Utc::now(),
    }
}

fn make_reading(city: &str, temp_k: f64, humidity: i64, pressure: i64, wind: f64) -> WeatherReading {
    let now = Utc::now();
    WeatherReading {
        id: wxmon_common::id::next_id(),
        city: city.to_string(),
        temperature: temp_k,
        humidity,
        pressure,
        wind_speed: wind,
        weather: "clear sky".to_string(),
        timestamp: now.timestamp(),
        received_at: now,
    }
}

fn make_payload(city: &str, temp_k: f64, humidity: i64, pressure: i64, wind: f64) -> ReadingPayload {
    ReadingPayload {
        city: city.to_string(),
        temperature: temp_k,
        humidity,
        pressure,
        wind_speed: wind,
        weather: "clear sky".to_string(),
        timestamp: Utc::now().timestamp(),
    }
}

fn engine_with(rules: Vec<AlertRule>) -> (AlertEngine, Arc<MemAlerts>) {
    let alerts = Arc::new(MemAlerts::default());
    let engine = AlertEngine::new(MemRules::with(rules), alerts.clone());
    (engine, alerts)
}

// ---- Engine: conversion, severity, messages ----

#[test]
fn temperature_rule_fires_with_converted_value() {
    let rule = make_rule("r1", "Warszawa", "temperature", ">", 30.0);
    let (engine, _alerts) = engine_with(vec![rule]);

    // 305.15 K == 32.0 °C
    let reading = make_reading("Warszawa", 305.15, 50, 1013, 3.0);
    let eval = engine.evaluate(&reading, Utc::now()).unwrap();

    assert_eq!(eval.alerts.len(), 1);
    assert!(eval.failures.is_empty());
    let alert = &eval.alerts[0];
    assert_eq!(alert.value, 32.0);
    assert_eq!(alert.severity, Severity::Warning);
    assert_eq!(alert.city, "Warszawa");
    assert!(!alert.is_read);
    assert!(
        alert.message.contains("32.0°C"),
        "converted value with unit missing from message: {}",
        alert.message
    );
    assert!(alert.message.contains("Warszawa"));
    assert!(alert.message.contains("rule r1"));
}

#[test]
fn temperature_above_35_is_critical() {
    let rule = make_rule("r1", "Warszawa", "temperature", ">", 30.0);
    let (engine, _alerts) = engine_with(vec![rule]);

    // 308.35 K == 35.2 °C, inside the critical band
    let reading = make_reading("Warszawa", 308.35, 50, 1013, 3.0);
    let eval = engine.evaluate(&reading, Utc::now()).unwrap();

    assert_eq!(eval.alerts.len(), 1);
    assert_eq!(eval.alerts[0].severity, Severity::Critical);
    assert!((eval.alerts[0].value - 35.2).abs() < 1e-9);
}

#[test]
fn temperature_exactly_35_is_warning_not_critical() {
    let rule = make_rule("r1", "Warszawa", "temperature", ">", 30.0);
    let (engine, _alerts) = engine_with(vec![rule]);

    // 308.15 K == 35.0 °C; the critical band test is strictly greater-than
    let reading = make_reading("Warszawa", 308.15, 50, 1013, 3.0);
    let eval = engine.evaluate(&reading, Utc::now()).unwrap();

    assert_eq!(eval.alerts.len(), 1);
    assert_eq!(eval.alerts[0].severity, Severity::Warning);
}

#[test]
fn low_humidity_is_critical() {
    let rule = make_rule("r1", "Warszawa", "humidity", "<", 20.0);
    let (engine, _alerts) = engine_with(vec![rule]);

    let reading = make_reading("Warszawa", 290.0, 15, 1013, 3.0);
    let eval = engine.evaluate(&reading, Utc::now()).unwrap();

    assert_eq!(eval.alerts.len(), 1);
    assert_eq!(eval.alerts[0].severity, Severity::Critical);
    assert_eq!(eval.alerts[0].value, 15.0);
}

#[test]
fn pressure_alerts_are_always_info() {
    let rule = make_rule("r1", "Warszawa", "pressure", ">", 1000.0);
    let (engine, _alerts) = engine_with(vec![rule]);

    let reading = make_reading("Warszawa", 290.0, 50, 1020, 3.0);
    let eval = engine.evaluate(&reading, Utc::now()).unwrap();

    assert_eq!(eval.alerts.len(), 1);
    assert_eq!(eval.alerts[0].severity, Severity::Info);
}

#[test]
fn severity_bands_at_boundaries() {
    assert_eq!(severity_for(ConditionType::Temperature, 35.0), Severity::Warning);
    assert_eq!(severity_for(ConditionType::Temperature, 35.1), Severity::Critical);
    assert_eq!(severity_for(ConditionType::Temperature, 30.0), Severity::Info);
    assert_eq!(severity_for(ConditionType::Temperature, -10.0), Severity::Info);
    assert_eq!(severity_for(ConditionType::Temperature, -10.5), Severity::Warning);
    assert_eq!(severity_for(ConditionType::Temperature, -20.5), Severity::Critical);

    assert_eq!(severity_for(ConditionType::Humidity, 20.0), Severity::Warning);
    assert_eq!(severity_for(ConditionType::Humidity, 19.9), Severity::Critical);
    assert_eq!(severity_for(ConditionType::Humidity, 30.0), Severity::Info);
    assert_eq!(severity_for(ConditionType::Humidity, 85.0), Severity::Warning);
    assert_eq!(severity_for(ConditionType::Humidity, 95.0), Severity::Critical);

    assert_eq!(severity_for(ConditionType::WindSpeed, 15.0), Severity::Info);
    assert_eq!(severity_for(ConditionType::WindSpeed, 16.0), Severity::Warning);
    assert_eq!(severity_for(ConditionType::WindSpeed, 20.5), Severity::Critical);

    assert_eq!(severity_for(ConditionType::Pressure, 900.0), Severity::Info);
}

// ---- Engine: operators ----

#[test]
fn operator_boundaries_at_threshold() {
    // value exactly at the threshold triggers only >=, <= and ==
    for (op, should_fire) in [(">", false), ("<", false), (">=", true), ("<=", true), ("==", true)] {
        let rule = make_rule("r1", "Warszawa", "wind_speed", op, 12.5);
        let (engine, _alerts) = engine_with(vec![rule]);
        let reading = make_reading("Warszawa", 290.0, 50, 1013, 12.5);
        let eval = engine.evaluate(&reading, Utc::now()).unwrap();
        assert_eq!(
            eval.alerts.len(),
            usize::from(should_fire),
            "operator {op} with value == threshold"
        );
    }
}

#[test]
fn strict_operators_fire_just_past_threshold() {
    let rule = make_rule("r1", "Warszawa", "wind_speed", ">", 12.5);
    let (engine, _alerts) = engine_with(vec![rule]);
    let reading = make_reading("Warszawa", 290.0, 50, 1013, 12.5001);
    assert_eq!(engine.evaluate(&reading, Utc::now()).unwrap().alerts.len(), 1);

    let rule = make_rule("r2", "Warszawa", "wind_speed", "<", 12.5);
    let (engine, _alerts) = engine_with(vec![rule]);
    let reading = make_reading("Warszawa", 290.0, 50, 1013, 12.4999);
    assert_eq!(engine.evaluate(&reading, Utc::now()).unwrap().alerts.len(), 1);
}

#[test]
fn equality_is_exact() {
    let rule = make_rule("r1", "Warszawa", "wind_speed", "==", 12.5);
    let (engine, _alerts) = engine_with(vec![rule.clone()]);

    let reading = make_reading("Warszawa", 290.0, 50, 1013, 12.5);
    assert_eq!(engine.evaluate(&reading, Utc::now()).unwrap().alerts.len(), 1);

    let (engine, _alerts) = engine_with(vec![rule]);
    let reading = make_reading("Warszawa", 290.0, 50, 1013, 12.50001);
    assert_eq!(engine.evaluate(&reading, Utc::now()).unwrap().alerts.len(), 0);
}

// ---- Engine: rule selection and skipping ----

#[test]
fn inactive_rule_never_fires() {
    let mut rule = make_rule("r1", "Warszawa", "temperature", ">", 30.0);
    rule.is_active = false;
    let (engine, alerts) = engine_with(vec![rule]);

    let reading = make_reading("Warszawa", 320.0, 50, 1013, 3.0);
    let eval = engine.evaluate(&reading, Utc::now()).unwrap();

    assert!(eval.alerts.is_empty());
    assert!(alerts.all().is_empty());
}

#[test]
fn rules_for_other_cities_are_ignored() {
    let rule = make_rule("r1", "Yakutsk", "temperature", ">", 30.0);
    let (engine, _alerts) = engine_with(vec![rule]);

    let reading = make_reading("Warszawa", 320.0, 50, 1013, 3.0);
    assert!(engine.evaluate(&reading, Utc::now()).unwrap().alerts.is_empty());
}

#[test]
fn unknown_condition_type_is_skipped_silently() {
    let bad = make_rule("r1", "Warszawa", "dew_point", ">", 10.0);
    let good = make_rule("r2", "Warszawa", "temperature", ">", 30.0);
    let (engine, _alerts) = engine_with(vec![bad, good]);

    let reading = make_reading("Warszawa", 305.15, 50, 1013, 3.0);
    let eval = engine.evaluate(&reading, Utc::now()).unwrap();

    // the malformed rule contributes no alert and no failure
    assert_eq!(eval.alerts.len(), 1);
    assert_eq!(eval.alerts[0].rule_id, "r2");
    assert!(eval.failures.is_empty());
}

#[test]
fn unknown_operator_is_skipped_silently() {
    let bad = make_rule("r1", "Warszawa", "temperature", "~=", 30.0);
    let (engine, _alerts) = engine_with(vec![bad]);

    let reading = make_reading("Warszawa", 305.15, 50, 1013, 3.0);
    let eval = engine.evaluate(&reading, Utc::now()).unwrap();
    assert!(eval.alerts.is_empty());
    assert!(eval.failures.is_empty());
}

#[test]
fn triggered_rules_keep_repository_order() {
    let first = make_rule("r1", "Warszawa", "temperature", ">", 30.0);
    let second = make_rule("r2", "Warszawa", "humidity", "<", 60.0);
    let (engine, _alerts) = engine_with(vec![first, second]);

    let reading = make_reading("Warszawa", 305.15, 50, 1013, 3.0);
    let eval = engine.evaluate(&reading, Utc::now()).unwrap();

    let ids: Vec<&str> = eval.alerts.iter().map(|a| a.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["r1", "r2"]);
}

// ---- Engine: suppression window ----

#[test]
fn alert_suppressed_within_window_and_refires_after() {
    let rule = make_rule("r1", "Warszawa", "temperature", ">", 30.0);
    let (engine, alerts) = engine_with(vec![rule]);

    let t0 = Utc::now();
    let reading = make_reading("Warszawa", 305.15, 50, 1013, 3.0);
    assert_eq!(engine.evaluate(&reading, t0).unwrap().alerts.len(), 1);

    // 5 minutes later: still inside the 30-minute window
    let reading = make_reading("Warszawa", 306.15, 50, 1013, 3.0);
    let eval = engine.evaluate(&reading, t0 + Duration::minutes(5)).unwrap();
    assert!(eval.alerts.is_empty());
    assert!(eval.failures.is_empty());

    // 31 minutes after the first alert: fires again
    let reading = make_reading("Warszawa", 306.15, 50, 1013, 3.0);
    let eval = engine.evaluate(&reading, t0 + Duration::minutes(31)).unwrap();
    assert_eq!(eval.alerts.len(), 1);

    assert_eq!(alerts.all().len(), 2);
}

#[test]
fn suppression_applies_even_when_condition_holds() {
    let rule = make_rule("r1", "Warszawa", "temperature", ">", 30.0);
    let (engine, _alerts) = engine_with(vec![rule]);

    let t0 = Utc::now();
    let reading = make_reading("Warszawa", 305.15, 50, 1013, 3.0);
    assert_eq!(engine.evaluate(&reading, t0).unwrap().alerts.len(), 1);

    // hotter reading, condition clearly still true, still suppressed
    let reading = make_reading("Warszawa", 312.15, 50, 1013, 3.0);
    let eval = engine.evaluate(&reading, t0 + Duration::minutes(29)).unwrap();
    assert!(eval.alerts.is_empty());
}

// ---- Engine: failure isolation ----

#[test]
fn save_failure_for_one_rule_does_not_abort_others() {
    let first = make_rule("r1", "Warszawa", "temperature", ">", 30.0);
    let second = make_rule("r2", "Warszawa", "humidity", "<", 60.0);
    let inner = Arc::new(MemAlerts::default());
    let alerts = Arc::new(FailingAlerts {
        inner: inner.clone(),
        fail_for_rule: "r1".to_string(),
    });
    let engine = AlertEngine::new(MemRules::with(vec![first, second]), alerts);

    let reading = make_reading("Warszawa", 305.15, 50, 1013, 3.0);
    let eval = engine.evaluate(&reading, Utc::now()).unwrap();

    assert_eq!(eval.alerts.len(), 1);
    assert_eq!(eval.alerts[0].rule_id, "r2");
    assert_eq!(eval.failures.len(), 1);
    assert_eq!(eval.failures[0].rule_id, "r1");
    assert_eq!(inner.all().len(), 1);
}

#[test]
fn rule_fetch_failure_surfaces_as_error() {
    let engine = AlertEngine::new(Arc::new(FailingRules), Arc::new(MemAlerts::default()));
    let reading = make_reading("Warszawa", 305.15, 50, 1013, 3.0);
    assert!(engine.evaluate(&reading, Utc::now()).is_err());
}

// ---- Coordinator ----

fn coordinator_with(
    rules: Vec<AlertRule>,
) -> (IngestionCoordinator, Arc<MemReadings>, Arc<MemAlerts>) {
    let readings = Arc::new(MemReadings::default());
    let alerts = Arc::new(MemAlerts::default());
    let engine = AlertEngine::new(MemRules::with(rules), alerts.clone());
    (
        IngestionCoordinator::new(readings.clone(), engine),
        readings,
        alerts,
    )
}

#[test]
fn ingest_stores_reading_and_returns_alerts() {
    let rule = make_rule("r1", "Warszawa", "temperature", ">", 30.0);
    let (coordinator, readings, _alerts) = coordinator_with(vec![rule]);

    let ingestion = coordinator
        .ingest(make_payload("Warszawa", 305.15, 50, 1013, 3.0), Utc::now())
        .unwrap();

    assert_eq!(readings.count(), 1);
    assert!(!ingestion.reading.id.is_empty());
    assert_eq!(ingestion.alerts.len(), 1);
    assert_eq!(ingestion.alerts[0].value, 32.0);
    assert!(ingestion.failures.is_empty());
}

#[test]
fn ingest_rejects_empty_city() {
    let (coordinator, readings, alerts) = coordinator_with(vec![]);

    let err = coordinator
        .ingest(make_payload("  ", 305.15, 50, 1013, 3.0), Utc::now())
        .unwrap_err();

    assert!(matches!(err, IngestError::Invalid(_)));
    assert_eq!(readings.count(), 0);
    assert!(alerts.all().is_empty());
}

#[test]
fn ingest_rejects_non_finite_values() {
    let (coordinator, readings, _alerts) = coordinator_with(vec![]);

    let err = coordinator
        .ingest(make_payload("Warszawa", f64::NAN, 50, 1013, 3.0), Utc::now())
        .unwrap_err();
    assert!(matches!(err, IngestError::Invalid(_)));

    let err = coordinator
        .ingest(
            make_payload("Warszawa", 290.0, 50, 1013, f64::INFINITY),
            Utc::now(),
        )
        .unwrap_err();
    assert!(matches!(err, IngestError::Invalid(_)));
    assert_eq!(readings.count(), 0);
}

#[test]
fn payload_with_missing_key_fails_to_decode() {
    // the transport decodes payloads with serde; a missing required key is
    // rejected there and never reaches the coordinator
    let raw = serde_json::json!({
        "city": "Warszawa",
        "temperature": 290.0,
        "humidity": 50,
        "wind_speed": 3.0,
        "weather": "clear sky",
        "timestamp": 1700000000
    });
    assert!(serde_json::from_value::<ReadingPayload>(raw).is_err());
}

#[test]
fn reading_store_failure_skips_evaluation() {
    let alerts = Arc::new(MemAlerts::default());
    let rule = make_rule("r1", "Warszawa", "temperature", ">", 30.0);
    let engine = AlertEngine::new(MemRules::with(vec![rule]), alerts.clone());
    let coordinator = IngestionCoordinator::new(Arc::new(FailingReadings), engine);

    let err = coordinator
        .ingest(make_payload("Warszawa", 305.15, 50, 1013, 3.0), Utc::now())
        .unwrap_err();

    assert!(matches!(err, IngestError::Store(_)));
    assert!(alerts.all().is_empty());
}

// ---- Concurrency ----

#[test]
fn concurrent_ingestion_produces_exactly_one_alert_per_rule() {
    const WORKERS: usize = 8;

    let rule = make_rule("r1", "Warszawa", "temperature", ">", 30.0);
    let readings = Arc::new(MemReadings::default());
    let alerts = Arc::new(MemAlerts::default());
    let engine = AlertEngine::new(MemRules::with(vec![rule]), alerts.clone());
    let coordinator = Arc::new(IngestionCoordinator::new(readings.clone(), engine));

    let now = Utc::now();
    let barrier = Arc::new(Barrier::new(WORKERS));
    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let coordinator = coordinator.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                coordinator
                    .ingest(make_payload("Warszawa", 305.15, 50, 1013, 3.0), now)
                    .unwrap()
            })
        })
        .collect();

    let created: usize = handles
        .into_iter()
        .map(|h| h.join().unwrap().alerts.len())
        .sum();

    // every reading is stored, but only one ingestion wins the window
    assert_eq!(created, 1);
    assert_eq!(alerts.all().len(), 1);
    assert_eq!(readings.count(), WORKERS);
}
