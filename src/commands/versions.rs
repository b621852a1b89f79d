//! Listing commands for metric models and their version history

use crate::error::{Error, Result};
use crate::meta::{MetricRecord, RegistryDb, VersionRecord};
use crate::registry::metric_id;
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A metric model with its full history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricHistory {
    pub metric: MetricRecord,
    pub versions: Vec<VersionRecord>,
}

/// List all registered metric models
pub async fn cmd_list_metrics(db: &RegistryDb) -> Result<Vec<MetricRecord>> {
    info!("Listing metric models");
    db.list_metrics().await
}

/// Show the version history of a metric model, looked up by name
pub async fn cmd_versions(db: &RegistryDb, name: &str) -> Result<MetricHistory> {
    let metricid = metric_id(name);
    let metric = db
        .get_metric(&metricid)
        .await?
        .ok_or_else(|| Error::MetricNotFound(name.to_string()))?;
    let versions = db.list_versions(&metricid).await?;
    Ok(MetricHistory { metric, versions })
}

/// Print metric models to console
pub fn print_metrics(metrics: &[MetricRecord]) {
    println!("\n📚 Registered Metric Models\n");

    if metrics.is_empty() {
        println!("No metric models registered. Use 'metricregistry register' to add one.");
        return;
    }

    for metric in metrics {
        println!("• {} (v{})", metric.name, metric.version);
        println!("  ID: {}", metric.metricid);
        if let Some(description) = &metric.description {
            println!("  Description: {}", description);
        }
        if let Some(table) = &metric.target_table {
            println!("  Target table: {}", table);
        }
        println!("  Updated: {}", metric.update_time);
        println!();
    }
}

/// Print a version history to console
pub fn print_history(history: &MetricHistory) {
    println!(
        "\n🗂  {} (current: v{})\n",
        history.metric.name, history.metric.version
    );

    for version in &history.versions {
        let marker = if version.versionid == history.metric.versionid {
            "*"
        } else {
            " "
        };
        println!("{} v{}  {}", marker, version.version, version.model_path);
        println!("    Version ID: {}", version.versionid);
        println!("    Created: {}", version.update_time);
        if !version.metrics.0.is_empty() {
            println!("    Metrics: {}", version.metrics.0.join(", "));
        }
    }
}

/// Print metric names for shell completions
pub fn print_metric_completions(metrics: &[MetricRecord], shell: Shell) {
    for metric in metrics {
        let description = format!("v{}, updated {}", metric.version, metric.update_time)
            .replace('\n', " ");

        match shell {
            Shell::Zsh => {
                let sanitized = description.replace(':', "\\:");
                println!("{}:{}", metric.name, sanitized);
            }
            Shell::Fish => {
                println!("{}\t{}", metric.name, description.replace('\t', " "));
            }
            _ => {
                println!("{}", metric.name);
            }
        }
    }
}
