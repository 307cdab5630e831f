use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// OpenWeather API key.
    pub api_key: String,
    #[serde(default = "default_cities")]
    pub cities: Vec<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub mqtt: BrokerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
        }
    }
}

fn default_cities() -> Vec<String> {
    vec!["Warszawa".to_string(), "Yakutsk".to_string()]
}

fn default_poll_interval_secs() -> u64 {
    600
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

impl CollectorConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
