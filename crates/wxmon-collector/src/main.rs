mod config;

use anyhow::{Context, Result};
use config::CollectorConfig;
use rand::Rng;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde::Deserialize;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use wxmon_common::types::ReadingPayload;

// Shape of the OpenWeather current-weather response, reduced to the fields
// a reading carries.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    main: MainData,
    wind: WindData,
    weather: Vec<WeatherDescription>,
    dt: i64,
}

#[derive(Debug, Deserialize)]
struct MainData {
    temp: f64,
    humidity: i64,
    pressure: i64,
}

#[derive(Debug, Deserialize)]
struct WindData {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct WeatherDescription {
    description: String,
}

async fn fetch_city(client: &reqwest::Client, api_key: &str, city: &str) -> Result<ReadingPayload> {
    let url = format!("https://api.openweathermap.org/data/2.5/weather?q={city}&appid={api_key}");
    let response = client
        .get(&url)
        .send()
        .await
        .context("weather request failed")?
        .error_for_status()
        .context("weather request rejected")?;
    let data: ApiResponse = response.json().await.context("weather response decode failed")?;

    Ok(ReadingPayload {
        city: city.to_string(),
        temperature: data.main.temp,
        humidity: data.main.humidity,
        pressure: data.main.pressure,
        wind_speed: data.wind.speed,
        weather: data
            .weather
            .first()
            .map(|w| w.description.clone())
            .unwrap_or_default(),
        timestamp: data.dt,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/collector.toml".to_string());
    let config = CollectorConfig::load(&config_path)
        .with_context(|| format!("failed to load collector config '{config_path}'"))?;

    tracing::info!(
        cities = config.cities.len(),
        interval_secs = config.poll_interval_secs,
        broker = %format!("{}:{}", config.mqtt.host, config.mqtt.port),
        "wxmon-collector starting"
    );

    // unique client id so several collectors can share a broker
    let client_id = format!("wxmon-collector-{:08x}", rand::thread_rng().gen::<u32>());
    let mut options = MqttOptions::new(client_id, config.mqtt.host.clone(), config.mqtt.port);
    options.set_keep_alive(Duration::from_secs(60));
    if let (Some(user), Some(pass)) = (&config.mqtt.username, &config.mqtt.password) {
        options.set_credentials(user.clone(), pass.clone());
    }
    let (mqtt, mut eventloop) = AsyncClient::new(options, 16);

    // the event loop must be polled for publishes to go out; reconnects are
    // retried forever here, the server side owns the fatal-retry policy
    tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                tracing::warn!(error = %e, "MQTT connection error");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    });

    let http = reqwest::Client::new();
    let mut tick = tokio::time::interval(Duration::from_secs(config.poll_interval_secs));

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = signal::ctrl_c() => {
                tracing::info!("Shutting down");
                return Ok(());
            }
        }

        for city in &config.cities {
            let payload = match fetch_city(&http, &config.api_key, city).await {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(city = %city, error = %e, "Weather fetch failed");
                    continue;
                }
            };

            let topic = format!("weather/{}", city.to_lowercase());
            let body = match serde_json::to_vec(&payload) {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!(city = %city, error = %e, "Payload encode failed");
                    continue;
                }
            };
            match mqtt.publish(topic.clone(), QoS::AtMostOnce, false, body).await {
                Ok(()) => tracing::debug!(city = %city, topic = %topic, "Reading published"),
                Err(e) => tracing::warn!(city = %city, error = %e, "Publish failed"),
            }
        }
    }
}
