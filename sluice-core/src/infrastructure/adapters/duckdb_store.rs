// sluice-core/src/infrastructure/adapters/duckdb_store.rs

use chrono::{DateTime, NaiveDate, Utc};
use duckdb::{Connection, params, params_from_iter};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use crate::domain::pipeline::Execution;
use crate::domain::quality::{Alert, AlertLevel, DataProfile, MetricType, QualityMetric};
use crate::infrastructure::adapters::duckdb::connect;
use crate::infrastructure::error::{DatabaseError, InfrastructureError};
use crate::ports::store::{
    AlertFilter, AlertRecord, ExecutionSummary, HealthPoint, MetricTypeSummary, QualityStore,
    SchedulerMetric,
};

// Timestamps are stored as fixed-width UTC text so lexical order is time order.
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS quality_metrics (
    pipeline_name VARCHAR NOT NULL,
    table_name VARCHAR,
    metric_name VARCHAR NOT NULL,
    metric_type VARCHAR NOT NULL,
    metric_value DOUBLE NOT NULL,
    threshold_value DOUBLE NOT NULL,
    status VARCHAR NOT NULL,
    message VARCHAR,
    recorded_at VARCHAR NOT NULL
);
CREATE TABLE IF NOT EXISTS quality_alerts (
    id VARCHAR PRIMARY KEY,
    level VARCHAR NOT NULL,
    title VARCHAR NOT NULL,
    message VARCHAR NOT NULL,
    pipeline_name VARCHAR NOT NULL,
    metric_name VARCHAR NOT NULL,
    threshold_value DOUBLE NOT NULL,
    actual_value DOUBLE NOT NULL,
    recorded_at VARCHAR NOT NULL,
    acknowledged BOOLEAN NOT NULL DEFAULT false,
    acknowledged_at VARCHAR,
    acknowledged_by VARCHAR
);
CREATE TABLE IF NOT EXISTS data_profiles (
    pipeline_name VARCHAR NOT NULL,
    table_name VARCHAR,
    column_name VARCHAR NOT NULL,
    data_type VARCHAR NOT NULL,
    null_count BIGINT NOT NULL,
    null_percentage DOUBLE NOT NULL,
    unique_count BIGINT NOT NULL,
    unique_percentage DOUBLE NOT NULL,
    min_value VARCHAR,
    max_value VARCHAR,
    mean_value DOUBLE,
    median_value DOUBLE,
    std_dev DOUBLE,
    sample_values VARCHAR,
    recorded_at VARCHAR NOT NULL
);
CREATE TABLE IF NOT EXISTS pipeline_health (
    pipeline_name VARCHAR NOT NULL,
    execution_id VARCHAR,
    health_score DOUBLE NOT NULL,
    recorded_at VARCHAR NOT NULL
);
CREATE TABLE IF NOT EXISTS pipeline_executions (
    execution_id VARCHAR PRIMARY KEY,
    pipeline_name VARCHAR NOT NULL,
    status VARCHAR NOT NULL,
    start_time VARCHAR NOT NULL,
    end_time VARCHAR,
    duration_seconds DOUBLE NOT NULL,
    total_components BIGINT NOT NULL,
    successful_components BIGINT NOT NULL,
    failed_components BIGINT NOT NULL,
    records_processed BIGINT NOT NULL,
    error_message VARCHAR,
    component_metrics VARCHAR NOT NULL
);
CREATE TABLE IF NOT EXISTS pipeline_metrics (
    pipeline_name VARCHAR NOT NULL,
    metric_name VARCHAR NOT NULL,
    metric_value DOUBLE NOT NULL,
    recorded_at VARCHAR NOT NULL
);
CREATE TABLE IF NOT EXISTS scheduler_events (
    event_type VARCHAR NOT NULL,
    pipeline_name VARCHAR,
    message VARCHAR,
    recorded_at VARCHAR NOT NULL
);
"#;

/// DuckDB-backed [`QualityStore`]. One connection, serialized by a mutex.
pub struct DuckDbStore {
    conn: Mutex<Connection>,
}

impl DuckDbStore {
    pub fn open(db_path: &str) -> Result<Self, InfrastructureError> {
        let conn = connect(Some(Path::new(db_path)))?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = db_path, "Quality store ready");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, InfrastructureError> {
        Self::open(":memory:")
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, InfrastructureError> {
        self.conn.lock().map_err(|_| InfrastructureError::LockPoisoned)
    }
}

fn ts(at: &DateTime<Utc>) -> String {
    at.format(TS_FORMAT).to_string()
}

fn parse_ts(raw: &str, column: &str) -> Result<DateTime<Utc>, InfrastructureError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| decode_err(column, e.to_string()))
}

fn decode_err(column: &str, reason: impl Into<String>) -> InfrastructureError {
    InfrastructureError::Database(DatabaseError::Decode {
        column: column.to_string(),
        reason: reason.into(),
    })
}

fn parse_metric_type(raw: &str) -> Result<MetricType, InfrastructureError> {
    MetricType::parse(raw).ok_or_else(|| decode_err("metric_type", format!("unknown '{}'", raw)))
}

fn parse_level(raw: &str) -> Result<AlertLevel, InfrastructureError> {
    AlertLevel::parse(raw).ok_or_else(|| decode_err("level", format!("unknown '{}'", raw)))
}

/// `WHERE recorded_at >= ? [AND pipeline_name = ?]`, with its bound values.
fn window(column: &str, since: &DateTime<Utc>, pipeline: Option<&str>) -> (String, Vec<String>) {
    let mut clause = format!("WHERE {} >= ?", column);
    let mut values = vec![ts(since)];
    if let Some(p) = pipeline {
        clause.push_str(" AND pipeline_name = ?");
        values.push(p.to_string());
    }
    (clause, values)
}

impl QualityStore for DuckDbStore {
    fn insert_metrics(
        &self,
        pipeline: &str,
        table: Option<&str>,
        metrics: &[QualityMetric],
    ) -> Result<(), InfrastructureError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "INSERT INTO quality_metrics (pipeline_name, table_name, metric_name, metric_type, \
             metric_value, threshold_value, status, message, recorded_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for m in metrics {
            stmt.execute(params![
                pipeline,
                table,
                m.name,
                m.metric_type.as_str(),
                m.value,
                m.threshold,
                m.status.as_str(),
                m.message,
                ts(&m.timestamp),
            ])?;
        }
        Ok(())
    }

    fn metric_type_averages(
        &self,
        pipeline: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<(MetricType, f64)>, InfrastructureError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT metric_type, AVG(metric_value) FROM quality_metrics \
             WHERE pipeline_name = ? AND recorded_at >= ? \
             GROUP BY metric_type ORDER BY metric_type",
        )?;
        let rows = stmt
            .query_map(params![pipeline, ts(&since)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(t, avg)| Ok((parse_metric_type(&t)?, avg)))
            .collect()
    }

    fn metric_summary(
        &self,
        pipeline: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<MetricTypeSummary>, InfrastructureError> {
        let (clause, values) = window("recorded_at", &since, pipeline);
        let sql = format!(
            "SELECT metric_type, COUNT(*)::BIGINT, \
             SUM(CASE WHEN status = 'pass' THEN 1 ELSE 0 END)::BIGINT, \
             AVG(metric_value), MIN(metric_value), MAX(metric_value) \
             FROM quality_metrics {} GROUP BY metric_type ORDER BY metric_type",
            clause
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(t, total, passed, avg, min, max)| {
                Ok(MetricTypeSummary {
                    metric_type: parse_metric_type(&t)?,
                    total_checks: total as u64,
                    passed_checks: passed as u64,
                    avg_value: avg,
                    min_value: min,
                    max_value: max,
                })
            })
            .collect()
    }

    fn upsert_alert(&self, alert: &Alert) -> Result<(), InfrastructureError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO quality_alerts (id, level, title, message, pipeline_name, \
             metric_name, threshold_value, actual_value, recorded_at, acknowledged) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                alert.id,
                alert.level.as_str(),
                alert.title,
                alert.message,
                alert.pipeline_name,
                alert.metric_name,
                alert.threshold,
                alert.actual_value,
                ts(&alert.timestamp),
                alert.acknowledged,
            ],
        )?;
        Ok(())
    }

    fn alerts(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>, InfrastructureError> {
        let mut sql = format!(
            "SELECT id, level, title, message, pipeline_name, metric_name, threshold_value, \
             actual_value, recorded_at, acknowledged, acknowledged_at, acknowledged_by \
             FROM quality_alerts WHERE acknowledged = {}",
            filter.acknowledged
        );
        let mut values: Vec<String> = Vec::new();
        if let Some(level) = filter.level {
            sql.push_str(" AND level = ?");
            values.push(level.as_str().to_string());
        }
        if let Some(p) = &filter.pipeline {
            sql.push_str(" AND pipeline_name = ?");
            values.push(p.clone());
        }
        sql.push_str(&format!(
            " ORDER BY recorded_at DESC, id LIMIT {}",
            filter.limit.max(1)
        ));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok(RawAlert {
                    id: row.get(0)?,
                    level: row.get(1)?,
                    title: row.get(2)?,
                    message: row.get(3)?,
                    pipeline_name: row.get(4)?,
                    metric_name: row.get(5)?,
                    threshold: row.get(6)?,
                    actual_value: row.get(7)?,
                    recorded_at: row.get(8)?,
                    acknowledged: row.get(9)?,
                    acknowledged_at: row.get(10)?,
                    acknowledged_by: row.get(11)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawAlert::into_record).collect()
    }

    fn acknowledge_alert(
        &self,
        id: &str,
        by: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, InfrastructureError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE quality_alerts SET acknowledged = true, acknowledged_at = ?, acknowledged_by = ? \
             WHERE id = ?",
            params![ts(&at), by, id],
        )?;
        Ok(changed > 0)
    }

    fn alert_counts_by_level(
        &self,
        pipeline: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<(AlertLevel, u64)>, InfrastructureError> {
        let (clause, values) = window("recorded_at", &since, pipeline);
        let sql = format!(
            "SELECT level, COUNT(*)::BIGINT FROM quality_alerts {} AND acknowledged = false \
             GROUP BY level ORDER BY level",
            clause
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(l, n)| Ok((parse_level(&l)?, n as u64)))
            .collect()
    }

    fn insert_profile(
        &self,
        pipeline: &str,
        table: Option<&str>,
        profile: &DataProfile,
        at: DateTime<Utc>,
    ) -> Result<(), InfrastructureError> {
        let recorded_at = ts(&at);
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "INSERT INTO data_profiles (pipeline_name, table_name, column_name, data_type, \
             null_count, null_percentage, unique_count, unique_percentage, min_value, max_value, \
             mean_value, median_value, std_dev, sample_values, recorded_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for c in &profile.columns {
            let samples = serde_json::to_string(&c.sample_values)?;
            stmt.execute(params![
                pipeline,
                table,
                c.column_name,
                c.data_type.as_str(),
                c.null_count as i64,
                c.null_pct,
                c.unique_count as i64,
                c.unique_pct,
                c.min,
                c.max,
                c.mean,
                c.median,
                c.stdev,
                samples,
                recorded_at,
            ])?;
        }
        Ok(())
    }

    fn insert_health(
        &self,
        pipeline: &str,
        execution_id: Option<&str>,
        score: f64,
        at: DateTime<Utc>,
    ) -> Result<(), InfrastructureError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO pipeline_health (pipeline_name, execution_id, health_score, recorded_at) \
             VALUES (?, ?, ?, ?)",
            params![pipeline, execution_id, score, ts(&at)],
        )?;
        Ok(())
    }

    fn health_trend(
        &self,
        pipeline: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<HealthPoint>, InfrastructureError> {
        let (clause, values) = window("recorded_at", &since, pipeline);
        let sql = format!(
            "SELECT substr(recorded_at, 1, 10) AS day, AVG(health_score) \
             FROM pipeline_health {} GROUP BY day ORDER BY day",
            clause
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(day, avg)| {
                let date = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                    .map_err(|e| decode_err("recorded_at", e.to_string()))?;
                Ok(HealthPoint {
                    date,
                    avg_health: avg,
                })
            })
            .collect()
    }

    fn insert_execution(&self, execution: &Execution) -> Result<(), InfrastructureError> {
        let components = serde_json::to_string(&execution.component_metrics)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO pipeline_executions (execution_id, pipeline_name, status, \
             start_time, end_time, duration_seconds, total_components, successful_components, \
             failed_components, records_processed, error_message, component_metrics) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                execution.execution_id,
                execution.pipeline_name,
                execution.status.as_str(),
                ts(&execution.start_time),
                execution.end_time.as_ref().map(ts),
                execution.duration_seconds,
                execution.total_components as i64,
                execution.successful_components as i64,
                execution.failed_components as i64,
                execution.records_processed() as i64,
                execution.error,
                components,
            ],
        )?;
        Ok(())
    }

    fn execution_count(&self, pipeline: &str) -> Result<u64, InfrastructureError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*)::BIGINT FROM pipeline_executions WHERE pipeline_name = ?",
            params![pipeline],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    fn execution_summaries(
        &self,
        pipeline: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<ExecutionSummary>, InfrastructureError> {
        let (clause, values) = window("start_time", &since, pipeline);
        let sql = format!(
            "SELECT pipeline_name, COUNT(*)::BIGINT, \
             SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END)::BIGINT, \
             AVG(duration_seconds), SUM(records_processed)::BIGINT \
             FROM pipeline_executions {} GROUP BY pipeline_name ORDER BY pipeline_name",
            clause
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok(ExecutionSummary {
                    pipeline_name: row.get(0)?,
                    total_executions: row.get::<_, i64>(1)? as u64,
                    successful_executions: row.get::<_, i64>(2)? as u64,
                    avg_duration: row.get(3)?,
                    total_records_processed: row.get::<_, i64>(4)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_scheduler_metrics(
        &self,
        pipeline: &str,
        metrics: &[(&str, f64)],
        at: DateTime<Utc>,
    ) -> Result<(), InfrastructureError> {
        let recorded_at = ts(&at);
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "INSERT INTO pipeline_metrics (pipeline_name, metric_name, metric_value, recorded_at) \
             VALUES (?, ?, ?, ?)",
        )?;
        for (name, value) in metrics {
            stmt.execute(params![pipeline, name, value, recorded_at])?;
        }
        Ok(())
    }

    fn latest_scheduler_metrics(
        &self,
        pipeline: Option<&str>,
    ) -> Result<Vec<SchedulerMetric>, InfrastructureError> {
        let mut sql = String::from(
            "SELECT pipeline_name, metric_name, metric_value, recorded_at FROM pipeline_metrics m1 \
             WHERE recorded_at = (SELECT MAX(recorded_at) FROM pipeline_metrics m2 \
             WHERE m2.pipeline_name = m1.pipeline_name AND m2.metric_name = m1.metric_name)",
        );
        let mut values: Vec<String> = Vec::new();
        if let Some(p) = pipeline {
            sql.push_str(" AND pipeline_name = ?");
            values.push(p.to_string());
        }
        sql.push_str(" ORDER BY pipeline_name, metric_name");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(pipeline_name, metric_name, metric_value, at)| {
                Ok(SchedulerMetric {
                    pipeline_name,
                    metric_name,
                    metric_value,
                    timestamp: parse_ts(&at, "recorded_at")?,
                })
            })
            .collect()
    }

    fn log_event(
        &self,
        event_type: &str,
        pipeline: Option<&str>,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<(), InfrastructureError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO scheduler_events (event_type, pipeline_name, message, recorded_at) \
             VALUES (?, ?, ?, ?)",
            params![event_type, pipeline, message, ts(&at)],
        )?;
        Ok(())
    }
}

struct RawAlert {
    id: String,
    level: String,
    title: String,
    message: String,
    pipeline_name: String,
    metric_name: String,
    threshold: f64,
    actual_value: f64,
    recorded_at: String,
    acknowledged: bool,
    acknowledged_at: Option<String>,
    acknowledged_by: Option<String>,
}

impl RawAlert {
    fn into_record(self) -> Result<AlertRecord, InfrastructureError> {
        Ok(AlertRecord {
            alert: Alert {
                id: self.id,
                level: parse_level(&self.level)?,
                title: self.title,
                message: self.message,
                pipeline_name: self.pipeline_name,
                metric_name: self.metric_name,
                threshold: self.threshold,
                actual_value: self.actual_value,
                timestamp: parse_ts(&self.recorded_at, "recorded_at")?,
                acknowledged: self.acknowledged,
            },
            acknowledged_at: self
                .acknowledged_at
                .as_deref()
                .map(|s| parse_ts(s, "acknowledged_at"))
                .transpose()?,
            acknowledged_by: self.acknowledged_by,
        })
    }
}
