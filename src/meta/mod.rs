//! Registry storage using SQLite
//!
//! This module owns the connection pool and the two registry tables:
//! - `metricregistry` (one row per metric model, mutated on every new version)
//! - `metricversions` (append-only version history)
//!
//! Writes go through a [`RegistrySession`], a scoped transaction that is
//! rolled back unless it is explicitly committed.

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::Result;
use crate::request::{MetricMetadata, VersionPayload};
use crate::version::Version;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::types::Json;
use sqlx::{FromRow, Transaction};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// A metric model row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MetricRecord {
    pub metricid: String,
    pub name: String,
    pub description: Option<String>,
    pub target_table: Option<String>,
    pub versionid: String,
    pub version: String,
    pub update_time: String,
}

impl MetricRecord {
    pub fn new(
        metricid: String,
        versionid: String,
        version: String,
        metadata: &MetricMetadata,
    ) -> Self {
        Self {
            metricid,
            name: metadata.name.clone(),
            description: metadata.description.clone(),
            target_table: metadata.target_table.clone(),
            versionid,
            version,
            update_time: Utc::now().to_rfc3339(),
        }
    }
}

/// A version history row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct VersionRecord {
    pub versionid: String,
    pub version: String,
    pub metricid: String,
    pub model_path: String,
    pub count: i64,
    pub metrics: Json<Vec<String>>,
    pub dimensions: Json<Vec<String>>,
    pub measures: Json<Vec<String>>,
    pub identifiers: Json<Vec<String>>,
    pub depends_on: Json<Vec<String>>,
    pub tables_used: Json<Vec<String>>,
    pub update_time: String,
}

impl VersionRecord {
    pub fn new(
        versionid: String,
        version: String,
        metricid: String,
        model_path: String,
        payload: &VersionPayload,
    ) -> Self {
        let payload = payload.clone();
        Self {
            versionid,
            version,
            metricid,
            model_path,
            count: payload.count,
            metrics: Json(payload.metrics),
            dimensions: Json(payload.dimensions),
            measures: Json(payload.measures),
            identifiers: Json(payload.identifiers),
            depends_on: Json(payload.depends_on),
            tables_used: Json(payload.tables_used),
            update_time: Utc::now().to_rfc3339(),
        }
    }

    /// Parsed version, if the stored string is well formed
    pub fn parsed_version(&self) -> Option<Version> {
        self.version.parse().ok()
    }
}

/// Registry database handle.
///
/// Created once per process and shared by reference; call [`RegistryDb::close`]
/// at shutdown to release the pool.
#[derive(Clone)]
pub struct RegistryDb {
    pool: SqlitePool,
}

impl RegistryDb {
    /// Connect to the registry database described by `config`
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(
            &config.paths.db_file,
            config.database.max_connections,
            Duration::from_secs(config.database.busy_timeout_secs),
        )
        .await
    }

    /// Open a database at `db_path` with default pool settings and make sure
    /// the schema exists
    pub async fn new(db_path: &Path) -> Result<Self> {
        let db = Self::open(db_path, 5, Duration::from_secs(5)).await?;

        if !db.is_initialized().await? {
            db.init_schema().await?;
        }

        Ok(db)
    }

    async fn open(db_path: &Path, max_connections: u32, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(busy_timeout)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Create both registry tables if they are missing
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing registry schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check that both registry tables exist
    pub async fn is_initialized(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN (?, ?)",
        )
        .bind(REGISTRY_TABLE)
        .bind(VERSIONS_TABLE)
        .fetch_one(&self.pool)
        .await?;
        Ok(count == 2)
    }

    /// Open a scoped transactional session.
    ///
    /// The session takes the write lock up front (`BEGIN IMMEDIATE`), so a
    /// second writer waits on the busy timeout instead of reading a snapshot
    /// that a concurrent commit would invalidate.
    pub async fn begin(&self) -> std::result::Result<RegistrySession, sqlx::Error> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        Ok(RegistrySession { tx })
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        debug!("Closing registry database pool");
        self.pool.close().await;
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ===== Read Operations =====

    /// Get a metric model by its id
    pub async fn get_metric(&self, metricid: &str) -> Result<Option<MetricRecord>> {
        let metric =
            sqlx::query_as::<_, MetricRecord>("SELECT * FROM metricregistry WHERE metricid = ?")
                .bind(metricid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(metric)
    }

    /// List all metric models
    pub async fn list_metrics(&self) -> Result<Vec<MetricRecord>> {
        let metrics =
            sqlx::query_as::<_, MetricRecord>("SELECT * FROM metricregistry ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(metrics)
    }

    /// Get a single version row
    pub async fn get_version(&self, versionid: &str) -> Result<Option<VersionRecord>> {
        let version =
            sqlx::query_as::<_, VersionRecord>("SELECT * FROM metricversions WHERE versionid = ?")
                .bind(versionid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(version)
    }

    /// List the version history of a metric, ordered numerically by version.
    ///
    /// Unparseable version strings sort last.
    pub async fn list_versions(&self, metricid: &str) -> Result<Vec<VersionRecord>> {
        let mut versions = sqlx::query_as::<_, VersionRecord>(
            "SELECT * FROM metricversions WHERE metricid = ? ORDER BY update_time",
        )
        .bind(metricid)
        .fetch_all(&self.pool)
        .await?;

        versions.sort_by_key(|v| match v.parsed_version() {
            Some(parsed) => (0, parsed),
            None => (1, Version::default()),
        });
        Ok(versions)
    }

    /// Get global statistics
    pub async fn get_global_stats(&self) -> Result<GlobalStats> {
        let metric_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM metricregistry")
            .fetch_one(&self.pool)
            .await?;

        let version_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM metricversions")
            .fetch_one(&self.pool)
            .await?;

        Ok(GlobalStats {
            metric_count: metric_count as usize,
            version_count: version_count as usize,
        })
    }
}

/// A transaction over the registry tables.
///
/// Dropping a session without calling [`RegistrySession::commit`] rolls it
/// back and returns the connection to the pool.
pub struct RegistrySession {
    tx: Transaction<'static, Sqlite>,
}

impl RegistrySession {
    /// Whether a registry row exists for `metricid`
    pub async fn metric_exists(&mut self, metricid: &str) -> std::result::Result<bool, sqlx::Error> {
        let found: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM metricregistry WHERE metricid = ?)")
                .bind(metricid)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(found != 0)
    }

    /// Current version string of a metric
    pub async fn current_version(
        &mut self,
        metricid: &str,
    ) -> std::result::Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT version FROM metricregistry WHERE metricid = ?")
            .bind(metricid)
            .fetch_optional(&mut *self.tx)
            .await
    }

    /// Insert a registry row.
    ///
    /// Returns `false` when a row with the same `metricid` already exists,
    /// in which case nothing is written.
    pub async fn insert_metric(
        &mut self,
        metric: &MetricRecord,
    ) -> std::result::Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO metricregistry (metricid, name, description, target_table, versionid, version, update_time)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(metricid) DO NOTHING
            "#,
        )
        .bind(&metric.metricid)
        .bind(&metric.name)
        .bind(&metric.description)
        .bind(&metric.target_table)
        .bind(&metric.versionid)
        .bind(&metric.version)
        .bind(&metric.update_time)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Append a version row
    pub async fn insert_version(
        &mut self,
        version: &VersionRecord,
    ) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO metricversions (versionid, version, metricid, model_path, count, metrics, dimensions, measures, identifiers, depends_on, tables_used, update_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&version.versionid)
        .bind(&version.version)
        .bind(&version.metricid)
        .bind(&version.model_path)
        .bind(version.count)
        .bind(&version.metrics)
        .bind(&version.dimensions)
        .bind(&version.measures)
        .bind(&version.identifiers)
        .bind(&version.depends_on)
        .bind(&version.tables_used)
        .bind(&version.update_time)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Point a registry row at a new current version.
    ///
    /// Returns the number of rows updated.
    pub async fn update_current_version(
        &mut self,
        metricid: &str,
        versionid: &str,
        version: &str,
    ) -> std::result::Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE metricregistry SET versionid = ?, version = ?, update_time = ? WHERE metricid = ?
            "#,
        )
        .bind(versionid)
        .bind(version)
        .bind(Utc::now().to_rfc3339())
        .bind(metricid)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn commit(self) -> std::result::Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    pub async fn rollback(self) -> std::result::Result<(), sqlx::Error> {
        self.tx.rollback().await
    }
}

/// Global statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStats {
    pub metric_count: usize,
    pub version_count: usize,
}
