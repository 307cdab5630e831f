//! SQLite persistence for readings, rules and alerts.
//!
//! A single [`SqliteStore`] (WAL mode, one connection behind a mutex)
//! backs all three repository traits of the alert pipeline plus the query
//! surface the HTTP layer needs. The suppression-window guard
//! ([`wxmon_alert::AlertRepository::save_if_no_recent`]) runs its check and
//! insert inside one transaction, so it stays correct when several
//! ingestion workers, or several processes sharing the database file, race
//! on the same rule.

pub mod error;


use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;

use error::{Result, StorageError};
use wxmon_alert::{AlertRepository, AlertWrite, ReadingStore, RuleRepository};
use wxmon_common::types::{Alert, AlertRule, Severity, WeatherReading};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS weather_readings (
    id          TEXT PRIMARY KEY,
    city        TEXT NOT NULL,
    temperature REAL NOT NULL,
    humidity    INTEGER NOT NULL,
    pressure    INTEGER NOT NULL,
    wind_speed  REAL NOT NULL,
    weather     TEXT NOT NULL,
    timestamp   INTEGER NOT NULL,
    received_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_readings_city_received
    ON weather_readings (city, received_at);

CREATE TABLE IF NOT EXISTS alert_rules (
    id             TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    city           TEXT NOT NULL,
    condition_type TEXT NOT NULL,
    operator       TEXT NOT NULL,
    threshold      REAL NOT NULL,
    is_active      INTEGER NOT NULL,
    created_at     INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_rules_city_active
    ON alert_rules (city, is_active);

CREATE TABLE IF NOT EXISTS alerts (
    id         TEXT PRIMARY KEY,
    rule_id    TEXT NOT NULL,
    city       TEXT NOT NULL,
    message    TEXT NOT NULL,
    severity   TEXT NOT NULL,
    value      REAL NOT NULL,
    is_read    INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alerts_rule_created
    ON alerts (rule_id, created_at);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (and creates if necessary) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests and the end-to-end fixtures.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---- Rules ----

    pub fn insert_rule(&self, rule: &AlertRule) -> Result<()> {
        self.conn().execute(
            "INSERT INTO alert_rules (id, name, city, condition_type, operator, threshold, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                rule.id,
                rule.name,
                rule.city,
                rule.condition_type,
                rule.operator,
                rule.threshold,
                rule.is_active,
                rule.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    pub fn get_rule(&self, id: &str) -> Result<Option<AlertRule>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, city, condition_type, operator, threshold, is_active, created_at
             FROM alert_rules WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], rule_from_row)?;
        Ok(rows.next().transpose()?)
    }

    pub fn list_rules(&self) -> Result<Vec<AlertRule>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, city, condition_type, operator, threshold, is_active, created_at
             FROM alert_rules ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], rule_from_row)?;
        rows.collect::<rusqlite::Result<_>>().map_err(StorageError::from)
    }

    /// Returns false when no rule with `id` exists.
    pub fn set_rule_active(&self, id: &str, active: bool) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE alert_rules SET is_active = ?2 WHERE id = ?1",
            params![id, active],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_rule(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn()
            .execute("DELETE FROM alert_rules WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn count_rules(&self) -> Result<u64> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM alert_rules", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ---- Readings ----

    pub fn latest_reading(&self, city: &str) -> Result<Option<WeatherReading>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, city, temperature, humidity, pressure, wind_speed, weather, timestamp, received_at
             FROM weather_readings WHERE city = ?1
             ORDER BY received_at DESC, id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![city], reading_from_row)?;
        Ok(rows.next().transpose()?)
    }

    /// The most recent reading of every city seen so far.
    pub fn latest_readings_per_city(&self) -> Result<Vec<WeatherReading>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, city, temperature, humidity, pressure, wind_speed, weather, timestamp, received_at
             FROM weather_readings
             WHERE received_at = (
                 SELECT MAX(received_at) FROM weather_readings w2
                 WHERE w2.city = weather_readings.city
             )
             GROUP BY city ORDER BY city",
        )?;
        let rows = stmt.query_map([], reading_from_row)?;
        rows.collect::<rusqlite::Result<_>>().map_err(StorageError::from)
    }

    pub fn list_readings(&self, city: &str, limit: usize) -> Result<Vec<WeatherReading>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, city, temperature, humidity, pressure, wind_speed, weather, timestamp, received_at
             FROM weather_readings WHERE city = ?1
             ORDER BY received_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![city, limit as i64], reading_from_row)?;
        rows.collect::<rusqlite::Result<_>>().map_err(StorageError::from)
    }

    // ---- Alerts ----

    pub fn list_alerts(
        &self,
        city: Option<&str>,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Alert>> {
        let mut sql = String::from(
            "SELECT id, rule_id, city, message, severity, value, is_read, created_at
             FROM alerts WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(city) = city {
            params.push(Box::new(city.to_string()));
            sql.push_str(&format!(" AND city = ?{}", params.len()));
        }
        if unread_only {
            sql.push_str(" AND is_read = 0");
        }
        params.push(Box::new(limit as i64));
        sql.push_str(&format!(" ORDER BY created_at DESC, id DESC LIMIT ?{}", params.len()));

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), alert_from_row)?;
        rows.collect::<rusqlite::Result<_>>().map_err(StorageError::from)
    }

    pub fn get_alert(&self, id: &str) -> Result<Option<Alert>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, rule_id, city, message, severity, value, is_read, created_at
             FROM alerts WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], alert_from_row)?;
        Ok(rows.next().transpose()?)
    }

    /// Returns false when no alert with `id` exists.
    pub fn mark_alert_read(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn()
            .execute("UPDATE alerts SET is_read = 1 WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}

// ---- Repository trait implementations ----

impl RuleRepository for SqliteStore {
    fn active_rules_for_city(&self, city: &str) -> anyhow::Result<Vec<AlertRule>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, city, condition_type, operator, threshold, is_active, created_at
             FROM alert_rules WHERE city = ?1 AND is_active = 1
             ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![city], rule_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

impl AlertRepository for SqliteStore {
    fn most_recent_alert(
        &self,
        rule_id: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Option<Alert>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, rule_id, city, message, severity, value, is_read, created_at
             FROM alerts WHERE rule_id = ?1 AND created_at >= ?2
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![rule_id, since.timestamp_millis()], alert_from_row)?;
        Ok(rows.next().transpose()?)
    }

    fn save_if_no_recent(&self, alert: Alert, since: DateTime<Utc>) -> anyhow::Result<AlertWrite> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let recent = {
            let mut stmt = tx.prepare_cached(
                "SELECT 1 FROM alerts WHERE rule_id = ?1 AND created_at >= ?2 LIMIT 1",
            )?;
            stmt.exists(params![alert.rule_id, since.timestamp_millis()])?
        };
        if recent {
            tx.commit()?;
            return Ok(AlertWrite::Suppressed);
        }
        tx.execute(
            "INSERT INTO alerts (id, rule_id, city, message, severity, value, is_read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                alert.id,
                alert.rule_id,
                alert.city,
                alert.message,
                alert.severity.to_string(),
                alert.value,
                alert.is_read,
                alert.created_at.timestamp_millis(),
            ],
        )?;
        tx.commit()?;
        Ok(AlertWrite::Created(alert))
    }
}

impl ReadingStore for SqliteStore {
    fn save_reading(&self, reading: &WeatherReading) -> anyhow::Result<()> {
        self.conn().execute(
            "INSERT INTO weather_readings (id, city, temperature, humidity, pressure, wind_speed, weather, timestamp, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                reading.id,
                reading.city,
                reading.temperature,
                reading.humidity,
                reading.pressure,
                reading.wind_speed,
                reading.weather,
                reading.timestamp,
                reading.received_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }
}

// ---- Row mapping ----

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<AlertRule> {
    let created_ms: i64 = row.get(7)?;
    Ok(AlertRule {
        id: row.get(0)?,
        name: row.get(1)?,
        city: row.get(2)?,
        condition_type: row.get(3)?,
        operator: row.get(4)?,
        threshold: row.get(5)?,
        is_active: row.get(6)?,
        created_at: DateTime::from_timestamp_millis(created_ms).unwrap_or_default(),
    })
}

fn reading_from_row(row: &Row<'_>) -> rusqlite::Result<WeatherReading> {
    let received_ms: i64 = row.get(8)?;
    Ok(WeatherReading {
        id: row.get(0)?,
        city: row.get(1)?,
        temperature: row.get(2)?,
        humidity: row.get(3)?,
        pressure: row.get(4)?,
        wind_speed: row.get(5)?,
        weather: row.get(6)?,
        timestamp: row.get(7)?,
        received_at: DateTime::from_timestamp_millis(received_ms).unwrap_or_default(),
    })
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<Alert> {
    let severity_str: String = row.get(4)?;
    let created_ms: i64 = row.get(7)?;
    Ok(Alert {
        id: row.get(0)?,
        rule_id: row.get(1)?,
        city: row.get(2)?,
        message: row.get(3)?,
        severity: severity_str.parse::<Severity>().unwrap_or(Severity::Info),
        value: row.get(5)?,
        is_read: row.get(6)?,
        created_at: DateTime::from_timestamp_millis(created_ms).unwrap_or_default(),
    })
}
