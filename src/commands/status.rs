//! Status command implementation

use crate::config::{database_url, Config};
use crate::error::Result;
use crate::meta::{GlobalStats, RegistryDb};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub database_url: String,
    pub model_base_path: String,
    pub schema_initialized: bool,
    pub db_stats: GlobalStats,
}

/// Get system status
pub async fn cmd_status(config: &Config, db: &RegistryDb) -> Result<StatusInfo> {
    info!("Getting status");

    let schema_initialized = db.is_initialized().await?;
    let db_stats = db.get_global_stats().await?;

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        database_url: database_url(config),
        model_base_path: config.model_base_path.clone(),
        schema_initialized,
        db_stats,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 metricregistry Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.database_url);
    println!("Model base path: {}", status.model_base_path);

    let schema = if status.schema_initialized {
        "✓ Initialized"
    } else {
        "✗ Missing (run 'metricregistry init')"
    };
    println!("Schema: {}", schema);

    println!("\nDatabase Stats:");
    println!("  Metric models: {}", status.db_stats.metric_count);
    println!("  Versions: {}", status.db_stats.version_count);
}
