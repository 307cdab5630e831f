use anyhow::Result;
use chrono::Utc;
use wxmon_common::types::AlertRule;
use wxmon_storage::SqliteStore;

struct RuleTemplate {
    name: &'static str,
    condition_type: &'static str,
    operator: &'static str,
    threshold: f64,
}

const DEFAULT_RULES: [RuleTemplate; 5] = [
    RuleTemplate {
        name: "Extreme temperature - heat",
        condition_type: "temperature",
        operator: ">",
        threshold: 30.0,
    },
    RuleTemplate {
        name: "Extreme temperature - cold",
        condition_type: "temperature",
        operator: "<",
        threshold: -10.0,
    },
    RuleTemplate {
        name: "Very low humidity",
        condition_type: "humidity",
        operator: "<",
        threshold: 30.0,
    },
    RuleTemplate {
        name: "Very high humidity",
        condition_type: "humidity",
        operator: ">",
        threshold: 80.0,
    },
    RuleTemplate {
        name: "Strong wind",
        condition_type: "wind_speed",
        operator: ">",
        threshold: 15.0,
    },
];

/// Seeds the default rule set for every monitored city, but only when the
/// rules table is empty: operator-managed rules are never touched.
/// Returns the number of rules created.
pub fn init_default_rules(store: &SqliteStore, cities: &[String]) -> Result<usize> {
    if store.count_rules()? > 0 {
        tracing::debug!("Alert rules already present, skipping seed");
        return Ok(0);
    }

    let mut created = 0;
    for city in cities {
        for template in &DEFAULT_RULES {
            let rule = AlertRule {
                id: wxmon_common::id::next_id(),
                name: template.name.to_string(),
                city: city.clone(),
                condition_type: template.condition_type.to_string(),
                operator: template.operator.to_string(),
                threshold: template.threshold,
                is_active: true,
                created_at: Utc::now(),
            };
            store.insert_rule(&rule)?;
            created += 1;
        }
    }

    tracing::info!(created, "Seeded default alert rules");
    Ok(created)
}
