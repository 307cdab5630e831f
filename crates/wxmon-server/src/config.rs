use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Cities the default rule seed targets.
    #[serde(default = "default_cities")]
    pub cities: Vec<String>,
    #[serde(default)]
    pub mqtt: MqttConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            db_path: default_db_path(),
            cities: default_cities(),
            mqtt: MqttConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Consecutive connection failures tolerated before the ingest worker
    /// gives up and shuts the process down.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            topic: default_topic(),
            client_id: default_client_id(),
            connect_attempts: default_connect_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "data/wxmon.db".to_string()
}

fn default_cities() -> Vec<String> {
    vec!["Warszawa".to_string(), "Yakutsk".to_string()]
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_topic() -> String {
    "weather/#".to_string()
}

fn default_client_id() -> String {
    "wxmon-server".to_string()
}

fn default_connect_attempts() -> u32 {
    10
}

fn default_retry_delay_secs() -> u64 {
    5
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
