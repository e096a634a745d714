//! sqlite persistence: reading log, alert log, and the durable state
//! snapshot (thresholds, counters, tallies, mode).
//!
//! The schema is created at startup; queries are bound at runtime so no
//! database needs to exist at build time. Inserts from the hot path are
//! best-effort — a persistence hiccup never stalls the sensor stream.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;

use crate::alerts::AlertRecord;
use crate::protocol::SensorFrame;
use crate::state::PersistedState;

#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

/// Key under which the JSON state snapshot is stored.
const SNAPSHOT_KEY: &str = "system_state";

impl Db {
    /// db_url examples:
    /// - "sqlite:rig.db?mode=rwc"
    /// - "sqlite::memory:" (tests)
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid sqlite connection string: {db_url}"))?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to sqlite db: {db_url}"))?;

        Ok(Self { pool })
    }

    /// Create tables if this is a fresh database.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS readings (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              ts_ms INTEGER NOT NULL,
              gas REAL NOT NULL,
              ultrasonic REAL NOT NULL,
              soil REAL NOT NULL,
              temperature REAL NOT NULL,
              humidity REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("create readings table failed")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              ts TEXT NOT NULL,
              channel TEXT,
              severity TEXT NOT NULL,
              message TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("create alerts table failed")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("create settings table failed")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_readings_ts ON readings(ts_ms)")
            .execute(&self.pool)
            .await
            .context("create readings index failed")?;

        Ok(())
    }

    // ----------------------------
    // Readings
    // ----------------------------

    pub async fn insert_reading(&self, ts_ms: i64, frame: &SensorFrame) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO readings (ts_ms, gas, ultrasonic, soil, temperature, humidity)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(ts_ms)
        .bind(frame.gas)
        .bind(frame.ultrasonic)
        .bind(frame.soil)
        .bind(frame.temperature)
        .bind(frame.humidity)
        .execute(&self.pool)
        .await
        .context("insert_reading failed")?;
        Ok(())
    }

    /// Most recent readings, newest last.
    pub async fn recent_readings(&self, limit: i64) -> Result<Vec<(i64, SensorFrame)>> {
        let rows = sqlx::query(
            r#"
            SELECT ts_ms, gas, ultrasonic, soil, temperature, humidity
            FROM readings
            ORDER BY ts_ms DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("recent_readings failed")?;

        let mut out: Vec<(i64, SensorFrame)> = rows
            .into_iter()
            .map(|r| {
                (
                    r.get::<i64, _>("ts_ms"),
                    SensorFrame {
                        gas: r.get("gas"),
                        ultrasonic: r.get("ultrasonic"),
                        soil: r.get("soil"),
                        temperature: r.get("temperature"),
                        humidity: r.get("humidity"),
                    },
                )
            })
            .collect();
        out.reverse();
        Ok(out)
    }

    // ----------------------------
    // Alerts
    // ----------------------------

    pub async fn insert_alert(&self, alert: &AlertRecord) -> Result<()> {
        let ts = alert
            .ts
            .format(&time::format_description::well_known::Rfc3339)
            .context("format alert timestamp failed")?;
        sqlx::query("INSERT INTO alerts (ts, channel, severity, message) VALUES (?, ?, ?, ?)")
            .bind(ts)
            .bind(alert.channel.map(|c| c.as_str()))
            .bind(format!("{:?}", alert.severity).to_lowercase())
            .bind(&alert.message)
            .execute(&self.pool)
            .await
            .context("insert_alert failed")?;
        Ok(())
    }

    pub async fn alert_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM alerts")
            .fetch_one(&self.pool)
            .await
            .context("alert_count failed")?;
        Ok(row.get("n"))
    }

    // ----------------------------
    // State snapshot
    // ----------------------------

    pub async fn save_snapshot(&self, snapshot: &PersistedState) -> Result<()> {
        let json = serde_json::to_string(snapshot).context("serialize snapshot failed")?;
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value=excluded.value
            "#,
        )
        .bind(SNAPSHOT_KEY)
        .bind(json)
        .execute(&self.pool)
        .await
        .context("save_snapshot failed")?;
        Ok(())
    }

    pub async fn load_snapshot(&self) -> Result<Option<PersistedState>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(SNAPSHOT_KEY)
            .fetch_optional(&self.pool)
            .await
            .context("load_snapshot failed")?;

        match row {
            Some(r) => {
                let json: String = r.get("value");
                let snapshot =
                    serde_json::from_str(&json).context("deserialize snapshot failed")?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// The explicit clear-data action: wipe logs and the snapshot.
    pub async fn clear_data(&self) -> Result<()> {
        sqlx::query("DELETE FROM readings")
            .execute(&self.pool)
            .await
            .context("clear readings failed")?;
        sqlx::query("DELETE FROM alerts")
            .execute(&self.pool)
            .await
            .context("clear alerts failed")?;
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(SNAPSHOT_KEY)
            .execute(&self.pool)
            .await
            .context("clear snapshot failed")?;
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
