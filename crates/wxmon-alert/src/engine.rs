use crate::{AlertRepository, AlertWrite, RuleFailure, RuleRepository, SUPPRESSION_WINDOW_MINS};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use wxmon_common::types::{Alert, AlertRule, CompareOp, ConditionType, Severity, WeatherReading};

/// Result of evaluating one reading against the active rules of its city.
///
/// `alerts` holds the newly persisted alerts in rule order; `failures`
/// holds per-rule repository errors that did not abort the batch.
#[derive(Debug, Default)]
pub struct Evaluation {
    pub alerts: Vec<Alert>,
    pub failures: Vec<RuleFailure>,
}

/// Stateless rule evaluation against one reading at a time. Rule lookup
/// and alert history are delegated to the repositories.
pub struct AlertEngine {
    rules: Arc<dyn RuleRepository>,
    alerts: Arc<dyn AlertRepository>,
}

impl AlertEngine {
    pub fn new(rules: Arc<dyn RuleRepository>, alerts: Arc<dyn AlertRepository>) -> Self {
        Self { rules, alerts }
    }

    /// Evaluates `reading` against the active rules for its city.
    ///
    /// Returns `Err` only when the rule list itself cannot be fetched; a
    /// failure while evaluating or persisting a single rule's alert is
    /// recorded in [`Evaluation::failures`] and does not stop the rest.
    pub fn evaluate(&self, reading: &WeatherReading, now: DateTime<Utc>) -> Result<Evaluation> {
        let rules = self.rules.active_rules_for_city(&reading.city)?;

        let mut out = Evaluation::default();
        for rule in rules {
            match self.evaluate_rule(&rule, reading, now) {
                Ok(Some(alert)) => out.alerts.push(alert),
                Ok(None) => {}
                Err(error) => {
                    tracing::error!(
                        rule_id = %rule.id,
                        rule_name = %rule.name,
                        error = %error,
                        "Rule evaluation failed"
                    );
                    out.failures.push(RuleFailure {
                        rule_id: rule.id,
                        rule_name: rule.name,
                        error,
                    });
                }
            }
        }
        Ok(out)
    }

    fn evaluate_rule(
        &self,
        rule: &AlertRule,
        reading: &WeatherReading,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        // A rule with an unrecognized condition type or operator must not
        // fail the whole batch; it simply contributes no alert.
        let Ok(condition) = rule.condition_type.parse::<ConditionType>() else {
            tracing::debug!(
                rule_id = %rule.id,
                condition_type = %rule.condition_type,
                "Skipping rule with unrecognized condition type"
            );
            return Ok(None);
        };
        let Ok(op) = rule.operator.parse::<CompareOp>() else {
            tracing::debug!(
                rule_id = %rule.id,
                operator = %rule.operator,
                "Skipping rule with unrecognized operator"
            );
            return Ok(None);
        };

        // Converted exactly once; this value feeds the comparison, the
        // severity bands, the message, and Alert.value alike.
        let value = condition.convert(condition.reading_value(reading));

        let since = now - Duration::minutes(SUPPRESSION_WINDOW_MINS);
        if self.alerts.most_recent_alert(&rule.id, since)?.is_some() {
            tracing::debug!(rule_id = %rule.id, "Alert suppressed (recent alert within window)");
            return Ok(None);
        }

        if !op.check(value, rule.threshold) {
            return Ok(None);
        }

        let alert = Alert {
            id: wxmon_common::id::next_id(),
            rule_id: rule.id.clone(),
            city: reading.city.clone(),
            message: compose_message(rule, condition, &reading.city, value),
            severity: severity_for(condition, value),
            value,
            is_read: false,
            created_at: now,
        };

        // The pre-check above is advisory; this insert is the guard that
        // holds under concurrent evaluation of the same rule.
        match self.alerts.save_if_no_recent(alert, since)? {
            AlertWrite::Created(alert) => {
                tracing::debug!(
                    rule_id = %rule.id,
                    city = %alert.city,
                    severity = %alert.severity,
                    value = alert.value,
                    "Alert generated"
                );
                Ok(Some(alert))
            }
            AlertWrite::Suppressed => {
                tracing::debug!(rule_id = %rule.id, "Alert suppressed (lost insert race)");
                Ok(None)
            }
        }
    }
}

/// Fixed severity bands per condition type, computed on the converted
/// value. Independent of the rule's own operator and threshold: a rule with
/// a low threshold still classifies as critical when the value sits in the
/// critical band.
pub fn severity_for(condition: ConditionType, value: f64) -> Severity {
    match condition {
        ConditionType::Temperature => {
            if value > 35.0 || value < -20.0 {
                Severity::Critical
            } else if value > 30.0 || value < -10.0 {
                Severity::Warning
            } else {
                Severity::Info
            }
        }
        ConditionType::Humidity => {
            if value < 20.0 || value > 90.0 {
                Severity::Critical
            } else if value < 30.0 || value > 80.0 {
                Severity::Warning
            } else {
                Severity::Info
            }
        }
        ConditionType::WindSpeed => {
            if value > 20.0 {
                Severity::Critical
            } else if value > 15.0 {
                Severity::Warning
            } else {
                Severity::Info
            }
        }
        ConditionType::Pressure => Severity::Info,
    }
}

fn compose_message(rule: &AlertRule, condition: ConditionType, city: &str, value: f64) -> String {
    let unit = condition.unit();
    format!(
        "{}: {} in {} is {value:.1}{unit}, crossing the threshold {}{unit}",
        rule.name,
        condition.label(),
        city,
        rule.threshold,
    )
}
