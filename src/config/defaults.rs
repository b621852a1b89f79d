//! Default values for configuration

/// Default base location for model artifacts
pub fn default_model_base_path() -> String {
    std::env::var("METRICREGISTRY_MODEL_PATH").unwrap_or_else(|_| {
        dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".metricregistry")
            .join("models")
            .display()
            .to_string()
    })
}

/// Default maximum pooled SQLite connections
pub fn default_max_connections() -> u32 {
    5
}

/// Default time to wait on a locked database, in seconds
pub fn default_busy_timeout_secs() -> u64 {
    5
}

/// Render the default configuration as commented TOML
pub fn render_default_config_toml() -> String {
    format!(
        r#"# metricregistry configuration

# Base location under which model artifacts are stored:
#   <model_base_path>/<name>/version=<version>/<filename>
model_base_path = "{}"

[database]
# Maximum pooled SQLite connections
max_connections = {}

# Seconds to wait for a locked database before failing
busy_timeout_secs = {}
"#,
        default_model_base_path().replace('\\', "\\\\"),
        default_max_connections(),
        default_busy_timeout_secs(),
    )
}
