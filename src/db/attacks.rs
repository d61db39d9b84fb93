//! Attack record store
//!
//! Insert-now/update-geo-later stream of detected attacks. Inserts on the
//! denial path are awaited before the response goes out so the dashboard
//! sees the record immediately; the geo fields are filled in later by the
//! enrichment task, or stay null forever.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Database;
use crate::error::AppError;
use crate::geo::GeoInfo;

/// Server-side ceiling on recency queries regardless of what the caller asks for.
pub const MAX_QUERY_LIMIT: i64 = 1000;

/// A persisted attack event. Geo fields are null until enrichment
/// completes; readers treat that as "pending or unavailable".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackRecord {
    pub id: i64,
    pub ip: String,
    #[serde(rename = "type")]
    pub attack_type: String,
    pub severity: u8,
    pub timestamp: DateTime<Utc>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

/// Fields the caller supplies at detection time; id and timestamp are
/// store-assigned, geo starts null.
#[derive(Debug, Clone)]
pub struct NewAttack {
    pub ip: String,
    pub attack_type: String,
    pub severity: u8,
}

impl NewAttack {
    pub fn new(ip: impl Into<String>, attack_type: impl Into<String>, severity: u8) -> Self {
        Self {
            ip: ip.into(),
            attack_type: attack_type.into(),
            severity,
        }
    }
}

/// One hour of the trailing-24h severity rollup.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HourlyBucket {
    pub time: String,
    pub high: i64,
    pub med: i64,
    pub low: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreatTotals {
    pub threats: i64,
    pub blocked: i64,
}

type AttackRow = (
    i64,
    String,
    String,
    i64,
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn row_to_record(row: AttackRow) -> AttackRecord {
    let (id, ip, attack_type, severity, ts, city, country, latitude, longitude) = row;
    AttackRecord {
        id,
        ip,
        attack_type,
        severity: severity.clamp(1, 10) as u8,
        timestamp: DateTime::from_timestamp_millis(ts).unwrap_or_else(Utc::now),
        city,
        country,
        latitude,
        longitude,
    }
}

impl Database {
    /// Insert a new attack record and return its id. Completes before the
    /// triggering request is answered.
    pub async fn insert_attack(&self, attack: &NewAttack) -> Result<i64, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO attacks (ip, attack_type, severity, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&attack.ip)
        .bind(&attack.attack_type)
        .bind(attack.severity as i64)
        .bind(Utc::now().timestamp_millis())
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Fill in the geo fields of a previously inserted record. Best-effort:
    /// the enrichment task discards the error.
    pub async fn update_attack_geo(&self, id: i64, geo: &GeoInfo) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE attacks SET city = ?, country = ?, latitude = ?, longitude = ?
            WHERE id = ?
            "#,
        )
        .bind(&geo.city)
        .bind(&geo.country)
        .bind(&geo.latitude)
        .bind(&geo.longitude)
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Fetch the attack record by id (used by tests and enrichment checks).
    pub async fn get_attack(&self, id: i64) -> Result<Option<AttackRecord>, AppError> {
        let row: Option<AttackRow> = sqlx::query_as(
            r#"
            SELECT id, ip, attack_type, severity, timestamp, city, country, latitude, longitude
            FROM attacks WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(row_to_record))
    }

    /// Records from the trailing `hours`, newest first. `limit` is clamped
    /// to [`MAX_QUERY_LIMIT`] server-side.
    pub async fn recent_attacks(
        &self,
        hours: i64,
        limit: i64,
    ) -> Result<Vec<AttackRecord>, AppError> {
        let limit = limit.clamp(1, MAX_QUERY_LIMIT);
        let since = Utc::now().timestamp_millis() - hours * 3600 * 1000;
        let rows: Vec<AttackRow> = sqlx::query_as(
            r#"
            SELECT id, ip, attack_type, severity, timestamp, city, country, latitude, longitude
            FROM attacks
            WHERE timestamp > ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }

    /// Per-hour counts for the trailing 24 hours, bucketed into severity
    /// tiers (low <4, med 4-6, high >=7). All 24 hours are present even
    /// when empty, oldest first.
    pub async fn hourly_stats(&self) -> Result<Vec<HourlyBucket>, AppError> {
        const HOUR_MS: i64 = 3600 * 1000;
        let hour_start = (Utc::now().timestamp_millis() / HOUR_MS) * HOUR_MS;
        let window_start = hour_start - 23 * HOUR_MS;

        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT timestamp, severity FROM attacks WHERE timestamp >= ?",
        )
        .bind(window_start)
        .fetch_all(self.pool())
        .await?;

        let mut buckets: Vec<HourlyBucket> = (0..24)
            .map(|i| {
                let bucket_ms = window_start + i * HOUR_MS;
                let label = DateTime::from_timestamp_millis(bucket_ms)
                    .map(|t| t.format("%H:00").to_string())
                    .unwrap_or_else(|| "00:00".to_string());
                HourlyBucket {
                    time: label,
                    high: 0,
                    med: 0,
                    low: 0,
                }
            })
            .collect();

        for (ts, severity) in rows {
            let idx = (ts - window_start) / HOUR_MS;
            if !(0..24).contains(&idx) {
                continue;
            }
            let bucket = &mut buckets[idx as usize];
            match severity {
                s if s >= 7 => bucket.high += 1,
                s if s >= 4 => bucket.med += 1,
                _ => bucket.low += 1,
            }
        }

        Ok(buckets)
    }

    /// Headline counters for the dashboard. Every recorded event was a
    /// blocked one, so both counts are the total today.
    pub async fn threat_totals(&self) -> Result<ThreatTotals, AppError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM attacks")
            .fetch_one(self.pool())
            .await?;
        Ok(ThreatTotals {
            threats: row.0,
            blocked: row.0,
        })
    }
}
