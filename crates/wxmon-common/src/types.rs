use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use wxmon_common::types::Severity;
///
/// let sev: Severity = "warning".parse().unwrap();
/// assert_eq!(sev, Severity::Warning);
/// assert_eq!(sev.to_string(), "warning");
/// assert!(Severity::Critical > Severity::Info);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// The metric a rule watches. Rules store the condition type as a plain
/// string; parsing happens at evaluation time so that one malformed rule
/// cannot break evaluation of the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionType {
    Temperature,
    Humidity,
    Pressure,
    WindSpeed,
}

impl std::str::FromStr for ConditionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temperature" => Ok(Self::Temperature),
            "humidity" => Ok(Self::Humidity),
            "pressure" => Ok(Self::Pressure),
            "wind_speed" => Ok(Self::WindSpeed),
            _ => Err(format!("unknown condition type: {s}")),
        }
    }
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Temperature => write!(f, "temperature"),
            Self::Humidity => write!(f, "humidity"),
            Self::Pressure => write!(f, "pressure"),
            Self::WindSpeed => write!(f, "wind_speed"),
        }
    }
}

impl ConditionType {
    /// Display unit for converted values of this metric.
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Humidity => "%",
            Self::Pressure => "hPa",
            Self::WindSpeed => "m/s",
        }
    }

    /// Human-readable label used in alert messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Temperature => "Temperature",
            Self::Humidity => "Humidity",
            Self::Pressure => "Pressure",
            Self::WindSpeed => "Wind speed",
        }
    }

    /// Extract the raw metric value from a reading.
    pub fn reading_value(&self, reading: &WeatherReading) -> f64 {
        match self {
            Self::Temperature => reading.temperature,
            Self::Humidity => reading.humidity as f64,
            Self::Pressure => reading.pressure as f64,
            Self::WindSpeed => reading.wind_speed,
        }
    }

    /// Convert a raw reading value into the display unit thresholds are
    /// written in. Readings carry temperature in Kelvin; rules state their
    /// thresholds in Celsius. All other metrics are stored in their display
    /// unit already.
    pub fn convert(&self, raw: f64) -> f64 {
        match self {
            Self::Temperature => raw - 273.15,
            _ => raw,
        }
    }
}

/// Comparison operator of a threshold rule, parsed from its symbol.
///
/// `Eq` is exact IEEE-754 equality with no tolerance: `12.5 == 12.5` holds,
/// `12.50001 == 12.5` does not.
///
/// # Examples
///
/// ```
/// use wxmon_common::types::CompareOp;
///
/// let op: CompareOp = ">=".parse().unwrap();
/// assert!(op.check(30.0, 30.0));
/// assert!(!CompareOp::Gt.check(30.0, 30.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
}

impl std::str::FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" => Ok(Self::Gt),
            "<" => Ok(Self::Lt),
            ">=" => Ok(Self::Ge),
            "<=" => Ok(Self::Le),
            "==" => Ok(Self::Eq),
            _ => Err(format!("unknown compare operator: {s}")),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gt => write!(f, ">"),
            Self::Lt => write!(f, "<"),
            Self::Ge => write!(f, ">="),
            Self::Le => write!(f, "<="),
            Self::Eq => write!(f, "=="),
        }
    }
}

impl CompareOp {
    pub fn check(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Lt => value < threshold,
            Self::Ge => value >= threshold,
            Self::Le => value <= threshold,
            Self::Eq => value == threshold,
        }
    }
}

/// One weather telemetry snapshot for a city, immutable once constructed.
///
/// `temperature` is Kelvin as reported by the upstream API; `timestamp` is
/// the source-reported epoch second, `received_at` the ingestion time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherReading {
    pub id: String,
    pub city: String,
    pub temperature: f64,
    pub humidity: i64,
    pub pressure: i64,
    pub wind_speed: f64,
    pub weather: String,
    pub timestamp: i64,
    pub received_at: DateTime<Utc>,
}

/// The decoded message published by the collector. Every key is required;
/// a payload missing any of them fails to deserialize and is dropped by
/// the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingPayload {
    pub city: String,
    pub temperature: f64,
    pub humidity: i64,
    pub pressure: i64,
    pub wind_speed: f64,
    pub weather: String,
    pub timestamp: i64,
}

impl WeatherReading {
    pub fn from_payload(payload: ReadingPayload, id: String, received_at: DateTime<Utc>) -> Self {
        Self {
            id,
            city: payload.city,
            temperature: payload.temperature,
            humidity: payload.humidity,
            pressure: payload.pressure,
            wind_speed: payload.wind_speed,
            weather: payload.weather,
            timestamp: payload.timestamp,
            received_at,
        }
    }
}

/// A user-defined threshold condition over one metric, scoped to a city.
///
/// `condition_type` and `operator` are stored as strings and parsed into
/// [`ConditionType`] / [`CompareOp`] at evaluation time. `threshold` is in
/// the display unit: Celsius for temperature, the native unit otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub city: String,
    pub condition_type: String,
    pub operator: String,
    pub threshold: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A fired alert. Created only by the evaluation engine; the only later
/// mutation is flipping `is_read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub city: String,
    pub message: String,
    pub severity: Severity,
    pub value: f64,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
