//! Metric model registration workflow
//!
//! A registration either creates a metric model at version `1.0` or appends
//! the next version to an existing one. Both rows are written in a single
//! [`RegistrySession`]; a failure at any step rolls the whole attempt back.

use crate::error::RegistryError;
use crate::meta::{
    MetricRecord, RegistryDb, RegistrySession, VersionRecord, REGISTRY_TABLE, VERSIONS_TABLE,
};
use crate::request::RegistrationRequest;
use crate::version::{next_version, INITIAL_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifiers minted for one registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricIds {
    pub metricid: String,
    pub versionid: String,
}

impl MetricIds {
    pub fn for_name(name: &str) -> Self {
        Self {
            metricid: metric_id(name),
            versionid: Uuid::new_v4().to_string(),
        }
    }
}

/// Stable id of a metric model: hex SHA-256 of the lower-cased name
pub fn metric_id(name: &str) -> String {
    hex::encode(Sha256::digest(name.to_lowercase().as_bytes()))
}

/// Storage location of one version's artifact
pub fn model_path(base_path: &str, name: &str, version: &str, filename: &str) -> String {
    format!(
        "{}/{}/version={}/{}",
        base_path.trim_end_matches('/'),
        name,
        version,
        filename
    )
}

/// Paths and ids produced by a successful registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationData {
    pub model_path: String,
    pub metricid: String,
    pub versionid: String,
}

/// Outcome of a successful registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResult {
    pub status: bool,
    pub data: RegistrationData,
    pub message: String,
}

/// Registration workflow over a shared database handle
pub struct Registry<'a> {
    db: &'a RegistryDb,
    model_base_path: String,
}

impl<'a> Registry<'a> {
    pub fn new(db: &'a RegistryDb, model_base_path: impl Into<String>) -> Self {
        Self {
            db,
            model_base_path: model_base_path.into(),
        }
    }

    /// Validate a raw request mapping and register it
    pub async fn register_value(&self, value: Value) -> Result<RegistrationResult, RegistryError> {
        let request = RegistrationRequest::from_value(value)?;
        self.register(&request).await
    }

    /// Register a metric model, creating it or appending a new version.
    ///
    /// The session is committed only when every step succeeds; otherwise it
    /// is rolled back before the error is returned.
    pub async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResult, RegistryError> {
        request.validate()?;

        let mut session = self
            .db
            .begin()
            .await
            .map_err(|e| RegistryError::Registration(e.to_string()))?;

        match self.register_in(&mut session, request).await {
            Ok(result) => {
                session
                    .commit()
                    .await
                    .map_err(|e| RegistryError::Registration(e.to_string()))?;
                Ok(result)
            }
            Err(err) => {
                if let Err(rollback_err) = session.rollback().await {
                    warn!(
                        "Rollback after failed registration of '{}' failed: {}",
                        request.name(),
                        rollback_err
                    );
                }
                Err(err)
            }
        }
    }

    async fn register_in(
        &self,
        session: &mut RegistrySession,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResult, RegistryError> {
        let name = request.name();
        let ids = MetricIds::for_name(name);

        let exists = session
            .metric_exists(&ids.metricid)
            .await
            .map_err(|e| RegistryError::ExistenceCheck(e.to_string()))?;

        if exists {
            self.add_version(session, request, ids).await
        } else {
            self.create_metric(session, request, ids).await
        }
    }

    async fn add_version(
        &self,
        session: &mut RegistrySession,
        request: &RegistrationRequest,
        ids: MetricIds,
    ) -> Result<RegistrationResult, RegistryError> {
        let name = request.name();
        info!("Metric model {} exists, creating a new version", name);

        let previous = session
            .current_version(&ids.metricid)
            .await
            .map_err(|e| RegistryError::VersionRead(e.to_string()))?
            .ok_or_else(|| {
                RegistryError::VersionRead(format!("no registry row for metric '{}'", name))
            })?;
        let version = next_version(Some(&previous))?;
        debug!("Allocated version {} after {} for {}", version, previous, name);

        let path = model_path(&self.model_base_path, name, &version, &request.filename);
        let record = VersionRecord::new(
            ids.versionid.clone(),
            version.clone(),
            ids.metricid.clone(),
            path.clone(),
            &request.payload,
        );
        session
            .insert_version(&record)
            .await
            .map_err(|e| RegistryError::insert(VERSIONS_TABLE, name, e))?;

        let updated = session
            .update_current_version(&ids.metricid, &ids.versionid, &version)
            .await
            .map_err(|e| RegistryError::VersionUpdate(e.to_string()))?;
        if updated != 1 {
            return Err(RegistryError::VersionUpdate(format!(
                "expected to update 1 row for metric '{}', updated {}",
                name, updated
            )));
        }

        Ok(RegistrationResult {
            status: true,
            data: RegistrationData {
                model_path: path,
                metricid: ids.metricid,
                versionid: ids.versionid,
            },
            message: format!("Metric model {} updated to version {}", name, version),
        })
    }

    async fn create_metric(
        &self,
        session: &mut RegistrySession,
        request: &RegistrationRequest,
        ids: MetricIds,
    ) -> Result<RegistrationResult, RegistryError> {
        let name = request.name();
        info!("Metric registry for model {} is being registered", name);

        let version = INITIAL_VERSION.to_string();
        let path = model_path(&self.model_base_path, name, &version, &request.filename);

        let metric = MetricRecord::new(
            ids.metricid.clone(),
            ids.versionid.clone(),
            version.clone(),
            &request.metadata,
        );
        let inserted = session
            .insert_metric(&metric)
            .await
            .map_err(|e| RegistryError::insert(REGISTRY_TABLE, name, e))?;
        if !inserted {
            // Another writer created this metric after our existence check.
            return Err(RegistryError::Conflict(name.to_string()));
        }

        let record = VersionRecord::new(
            ids.versionid.clone(),
            version,
            ids.metricid.clone(),
            path.clone(),
            &request.payload,
        );
        session
            .insert_version(&record)
            .await
            .map_err(|e| RegistryError::insert(VERSIONS_TABLE, name, e))?;

        Ok(RegistrationResult {
            status: true,
            data: RegistrationData {
                model_path: path,
                metricid: ids.metricid,
                versionid: ids.versionid,
            },
            message: format!("Created new registry for metric model {}", name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::VersionPayload;
    use serde_json::json;
    use tempfile::TempDir;

    const BASE: &str = "/models";

    async fn setup() -> (RegistryDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = RegistryDb::new(&tmp.path().join("registry.db")).await.unwrap();
        (db, tmp)
    }

    async fn install_failure_trigger(db: &RegistryDb, sql: &str) {
        sqlx::query(sql).execute(db.pool()).await.unwrap();
    }

    fn revenue() -> RegistrationRequest {
        RegistrationRequest::new("revenue", "model.pkl")
    }

    #[test]
    fn test_metric_id_is_case_insensitive() {
        assert_eq!(metric_id("Revenue"), metric_id("revenue"));
        assert_eq!(metric_id("REVENUE"), metric_id("revenue"));
        assert_ne!(metric_id("revenue"), metric_id("revenues"));
    }

    #[test]
    fn test_metric_id_is_sha256_hex() {
        // sha256("abc")
        assert_eq!(
            metric_id("ABC"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_fresh_version_ids() {
        let a = MetricIds::for_name("revenue");
        let b = MetricIds::for_name("revenue");
        assert_eq!(a.metricid, b.metricid);
        assert_ne!(a.versionid, b.versionid);
    }

    #[test]
    fn test_model_path() {
        assert_eq!(
            model_path("/models/", "revenue", "1.0", "model.pkl"),
            "/models/revenue/version=1.0/model.pkl"
        );
        assert_eq!(
            model_path("s3://bucket", "revenue", "2.3", "m.bin"),
            "s3://bucket/revenue/version=2.3/m.bin"
        );
    }

    #[tokio::test]
    async fn test_first_registration_creates_registry() {
        let (db, _tmp) = setup().await;
        let registry = Registry::new(&db, BASE);

        let result = registry
            .register_value(json!({"name": "revenue", "filename": "model.pkl"}))
            .await
            .unwrap();

        assert!(result.status);
        assert!(result.data.model_path.contains("revenue/version=1.0/model.pkl"));
        assert!(result.message.contains("Created new registry"));
        assert_eq!(result.data.metricid, metric_id("revenue"));

        let metric = db.get_metric(&result.data.metricid).await.unwrap().unwrap();
        assert_eq!(metric.version, "1.0");
        assert_eq!(metric.versionid, result.data.versionid);

        let versions = db.list_versions(&result.data.metricid).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, "1.0");
        assert_eq!(versions[0].model_path, result.data.model_path);
    }

    #[tokio::test]
    async fn test_second_registration_adds_version() {
        let (db, _tmp) = setup().await;
        let registry = Registry::new(&db, BASE);

        let first = registry.register(&revenue()).await.unwrap();
        let second = registry.register(&revenue()).await.unwrap();

        assert!(second.data.model_path.contains("version=1.1"));
        assert!(second.message.contains("updated to version 1.1"));
        assert_eq!(first.data.metricid, second.data.metricid);

        let metric = db.get_metric(&second.data.metricid).await.unwrap().unwrap();
        assert_eq!(metric.version, "1.1");
        assert_eq!(metric.versionid, second.data.versionid);

        let versions = db.list_versions(&second.data.metricid).await.unwrap();
        assert_eq!(versions.len(), 2);
        let original = db.get_version(&first.data.versionid).await.unwrap().unwrap();
        assert_eq!(original.version, "1.0");
        assert_eq!(original.model_path, first.data.model_path);
    }

    #[tokio::test]
    async fn test_name_case_maps_to_same_metric() {
        let (db, _tmp) = setup().await;
        let registry = Registry::new(&db, BASE);

        registry.register(&revenue()).await.unwrap();
        let result = registry
            .register(&RegistrationRequest::new("Revenue", "model.pkl"))
            .await
            .unwrap();

        assert!(result.data.model_path.ends_with("Revenue/version=1.1/model.pkl"));
        assert_eq!(db.get_global_stats().await.unwrap().metric_count, 1);
    }

    #[tokio::test]
    async fn test_version_rolls_over_to_next_major() {
        let (db, _tmp) = setup().await;
        let registry = Registry::new(&db, BASE);

        registry.register(&revenue()).await.unwrap();
        registry.register(&revenue()).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..9 {
            let result = registry.register(&revenue()).await.unwrap();
            let metric = db.get_metric(&result.data.metricid).await.unwrap().unwrap();
            seen.push(metric.version);
        }

        assert_eq!(
            seen,
            vec!["1.2", "1.3", "1.4", "1.5", "1.6", "1.7", "1.8", "1.9", "2.0"]
        );
        let versions = db.list_versions(&metric_id("revenue")).await.unwrap();
        assert_eq!(versions.len(), 11);
        assert_eq!(versions.last().unwrap().version, "2.0");
    }

    #[tokio::test]
    async fn test_payload_and_metadata_are_stored() {
        let (db, _tmp) = setup().await;
        let registry = Registry::new(&db, BASE);

        let request = revenue()
            .with_description("Monthly revenue")
            .with_target_table("finance.revenue")
            .with_payload(VersionPayload {
                count: 4,
                measures: vec!["amount".to_string()],
                tables_used: vec!["orders".to_string(), "refunds".to_string()],
                ..Default::default()
            });
        let result = registry.register(&request).await.unwrap();

        let metric = db.get_metric(&result.data.metricid).await.unwrap().unwrap();
        assert_eq!(metric.description.as_deref(), Some("Monthly revenue"));
        assert_eq!(metric.target_table.as_deref(), Some("finance.revenue"));

        let version = db.get_version(&result.data.versionid).await.unwrap().unwrap();
        assert_eq!(version.count, 4);
        assert_eq!(version.measures.0, vec!["amount"]);
        assert_eq!(version.tables_used.0, vec!["orders", "refunds"]);
        assert!(version.metrics.0.is_empty());
    }

    #[tokio::test]
    async fn test_failed_update_leaves_no_version_row() {
        let (db, _tmp) = setup().await;
        let registry = Registry::new(&db, BASE);
        let first = registry.register(&revenue()).await.unwrap();

        install_failure_trigger(
            &db,
            "CREATE TRIGGER fail_update BEFORE UPDATE ON metricregistry \
             BEGIN SELECT RAISE(ABORT, 'forced update failure'); END",
        )
        .await;

        let err = registry.register(&revenue()).await.unwrap_err();
        assert!(matches!(err, RegistryError::VersionUpdate(_)), "{err:?}");

        let versions = db.list_versions(&first.data.metricid).await.unwrap();
        assert_eq!(versions.len(), 1);
        let metric = db.get_metric(&first.data.metricid).await.unwrap().unwrap();
        assert_eq!(metric.version, "1.0");
        assert_eq!(metric.versionid, first.data.versionid);
    }

    #[tokio::test]
    async fn test_failed_version_insert_leaves_no_registry_row() {
        let (db, _tmp) = setup().await;
        let registry = Registry::new(&db, BASE);

        install_failure_trigger(
            &db,
            "CREATE TRIGGER fail_insert BEFORE INSERT ON metricversions \
             BEGIN SELECT RAISE(ABORT, 'forced insert failure'); END",
        )
        .await;

        let err = registry.register(&revenue()).await.unwrap_err();
        match err {
            RegistryError::Insert { table, .. } => assert_eq!(table, VERSIONS_TABLE),
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(db.get_metric(&metric_id("revenue")).await.unwrap().is_none());
        let stats = db.get_global_stats().await.unwrap();
        assert_eq!(stats.metric_count, 0);
        assert_eq!(stats.version_count, 0);
    }

    #[tokio::test]
    async fn test_malformed_stored_version_fails() {
        let (db, _tmp) = setup().await;
        let registry = Registry::new(&db, BASE);
        let first = registry.register(&revenue()).await.unwrap();

        sqlx::query("UPDATE metricregistry SET version = '1.10' WHERE metricid = ?")
            .bind(&first.data.metricid)
            .execute(db.pool())
            .await
            .unwrap();

        let err = registry.register(&revenue()).await.unwrap_err();
        assert!(matches!(err, RegistryError::Version(_)), "{err:?}");
        assert_eq!(db.get_global_stats().await.unwrap().version_count, 1);
    }

    #[tokio::test]
    async fn test_interleaved_first_registrations_serialize() {
        let (db, _tmp) = setup().await;
        let registry = Registry::new(&db, BASE);
        let request = revenue();

        // The first session holds the write lock across its existence check,
        // so the racing call waits and then sees the committed row.
        let mut first = db.begin().await.unwrap();
        let ids = MetricIds::for_name(request.name());
        assert!(!first.metric_exists(&ids.metricid).await.unwrap());

        let (created, updated) = tokio::join!(
            async {
                let result = registry
                    .create_metric(&mut first, &request, ids)
                    .await
                    .unwrap();
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                first.commit().await.unwrap();
                result
            },
            registry.register(&request),
        );

        let updated = updated.unwrap();
        assert_eq!(created.message, "Created new registry for metric model revenue");
        assert_eq!(updated.message, "Metric model revenue updated to version 1.1");
        assert_eq!(updated.data.model_path, "/models/revenue/version=1.1/model.pkl");

        let stats = db.get_global_stats().await.unwrap();
        assert_eq!(stats.metric_count, 1);
        assert_eq!(stats.version_count, 2);
    }

    #[tokio::test]
    async fn test_create_on_existing_metric_is_conflict() {
        let (db, _tmp) = setup().await;
        let registry = Registry::new(&db, BASE);
        let request = revenue();
        registry.register(&request).await.unwrap();

        let mut session = db.begin().await.unwrap();
        let err = registry
            .create_metric(&mut session, &request, MetricIds::for_name(request.name()))
            .await
            .unwrap_err();
        session.rollback().await.unwrap();

        assert!(matches!(err, RegistryError::Conflict(ref name) if name == "revenue"));
        assert_eq!(db.get_global_stats().await.unwrap().version_count, 1);
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_before_writing() {
        let (db, _tmp) = setup().await;
        let registry = Registry::new(&db, BASE);

        let err = registry
            .register_value(json!({"filename": "model.pkl"}))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
        assert_eq!(db.get_global_stats().await.unwrap().metric_count, 0);
    }

    #[tokio::test]
    async fn test_result_serializes_to_call_signature() {
        let (db, _tmp) = setup().await;
        let registry = Registry::new(&db, BASE);

        let result = registry.register(&revenue()).await.unwrap();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], json!(true));
        assert_eq!(value["data"]["metricid"], json!(metric_id("revenue")));
        assert!(value["data"]["model_path"].is_string());
        assert!(value["data"]["versionid"].is_string());
        assert!(value["message"].is_string());
    }
}
