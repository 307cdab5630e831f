//! Thin pass-through HTTP layer over the store. All evaluation logic lives
//! in the ingest path; these handlers only read and mutate stored rows.

use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use wxmon_common::types::{AlertRule, CompareOp, ConditionType};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/weather/current", get(current_weather))
        .route("/api/weather/history", get(weather_history))
        .route("/api/rules", get(list_rules).post(create_rule))
        .route("/api/rules/:id", delete(delete_rule))
        .route("/api/rules/:id/active", put(set_rule_active))
        .route("/api/alerts", get(list_alerts))
        .route("/api/alerts/:id/read", post(mark_alert_read))
        .with_state(state)
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    tracing::error!(error = %e, "Storage query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "storage error"})),
    )
        .into_response()
}

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": message}))).into_response()
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "service": "wxmon-server"}))
}

// ---- Weather ----

#[derive(Deserialize)]
struct CurrentWeatherParams {
    city: Option<String>,
}

async fn current_weather(
    State(state): State<AppState>,
    Query(params): Query<CurrentWeatherParams>,
) -> Response {
    match params.city {
        Some(city) => match state.store.latest_reading(&city) {
            Ok(Some(reading)) => Json(reading).into_response(),
            Ok(None) => not_found(&format!("no data found for city {city}")),
            Err(e) => internal_error(e),
        },
        None => match state.store.latest_readings_per_city() {
            Ok(readings) => Json(readings).into_response(),
            Err(e) => internal_error(e),
        },
    }
}

#[derive(Deserialize)]
struct HistoryParams {
    city: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

async fn weather_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Response {
    match state.store.list_readings(&params.city, params.limit) {
        Ok(readings) => Json(readings).into_response(),
        Err(e) => internal_error(e),
    }
}

// ---- Rules ----

async fn list_rules(State(state): State<AppState>) -> Response {
    match state.store.list_rules() {
        Ok(rules) => Json(rules).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
struct CreateRuleRequest {
    name: String,
    city: String,
    condition_type: String,
    operator: String,
    threshold: f64,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

async fn create_rule(
    State(state): State<AppState>,
    Json(req): Json<CreateRuleRequest>,
) -> Response {
    if let Err(e) = req.condition_type.parse::<ConditionType>() {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": e}))).into_response();
    }
    if let Err(e) = req.operator.parse::<CompareOp>() {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": e}))).into_response();
    }

    let rule = AlertRule {
        id: wxmon_common::id::next_id(),
        name: req.name,
        city: req.city,
        condition_type: req.condition_type,
        operator: req.operator,
        threshold: req.threshold,
        is_active: req.is_active,
        created_at: Utc::now(),
    };
    match state.store.insert_rule(&rule) {
        Ok(()) => (StatusCode::CREATED, Json(rule)).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn delete_rule(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.delete_rule(&id) {
        Ok(true) => Json(json!({"id": id})).into_response(),
        Ok(false) => not_found("rule not found"),
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
struct SetActiveRequest {
    is_active: bool,
}

async fn set_rule_active(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetActiveRequest>,
) -> Response {
    match state.store.set_rule_active(&id, req.is_active) {
        Ok(true) => Json(json!({"id": id, "is_active": req.is_active})).into_response(),
        Ok(false) => not_found("rule not found"),
        Err(e) => internal_error(e),
    }
}

// ---- Alerts ----

#[derive(Deserialize)]
struct ListAlertsParams {
    city: Option<String>,
    #[serde(default)]
    unread_only: bool,
    #[serde(default = "default_limit")]
    limit: usize,
}

async fn list_alerts(
    State(state): State<AppState>,
    Query(params): Query<ListAlertsParams>,
) -> Response {
    match state
        .store
        .list_alerts(params.city.as_deref(), params.unread_only, params.limit)
    {
        Ok(alerts) => Json(alerts).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn mark_alert_read(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.mark_alert_read(&id) {
        Ok(true) => Json(json!({"id": id, "is_read": true})).into_response(),
        Ok(false) => not_found("alert not found"),
        Err(e) => internal_error(e),
    }
}
