//! Register command implementation

use crate::config::Config;
use crate::error::Result;
use crate::meta::RegistryDb;
use crate::registry::{Registry, RegistrationResult};
use crate::request::RegistrationRequest;
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Register a metric model from a validated request
pub async fn cmd_register(
    config: &Config,
    db: &RegistryDb,
    request: &RegistrationRequest,
) -> Result<RegistrationResult> {
    info!("Registering metric model {}", request.name());
    let registry = Registry::new(db, config.model_base_path.clone());
    Ok(registry.register(request).await?)
}

/// Register a metric model from a raw JSON request (`-` reads stdin)
pub async fn cmd_register_json(
    config: &Config,
    db: &RegistryDb,
    path: &Path,
) -> Result<RegistrationResult> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };

    let value: Value = serde_json::from_str(&content)?;
    let registry = Registry::new(db, config.model_base_path.clone());
    Ok(registry.register_value(value).await?)
}

/// Print a registration result to console
pub fn print_registration(result: &RegistrationResult) {
    println!("✓ {}", result.message);
    println!("  Metric ID: {}", result.data.metricid);
    println!("  Version ID: {}", result.data.versionid);
    println!("  Model path: {}", result.data.model_path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_register_from_json_file() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("registry.db");
        config.model_base_path = "/models".to_string();
        let db = RegistryDb::new(&config.paths.db_file).await.unwrap();

        let request_path = tmp.path().join("request.json");
        std::fs::write(
            &request_path,
            r#"{"name": "churn", "filename": "churn.onnx", "metrics": ["rate"]}"#,
        )
        .unwrap();

        let first = cmd_register_json(&config, &db, &request_path).await.unwrap();
        assert_eq!(first.data.model_path, "/models/churn/version=1.0/churn.onnx");

        let second = cmd_register(&config, &db, &RegistrationRequest::new("churn", "churn.onnx"))
            .await
            .unwrap();
        assert_eq!(second.data.model_path, "/models/churn/version=1.1/churn.onnx");
    }

    #[tokio::test]
    async fn test_register_json_rejects_bad_input() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("registry.db");
        let db = RegistryDb::new(&config.paths.db_file).await.unwrap();

        let request_path = tmp.path().join("request.json");
        std::fs::write(&request_path, r#"{"filename": "m.pkl"}"#).unwrap();

        let err = cmd_register_json(&config, &db, &request_path)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Registry(_)));
    }
}
