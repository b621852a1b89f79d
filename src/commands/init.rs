//! Init command implementation

use crate::config::{render_default_config_toml, Config};
use crate::error::{Error, Result};
use crate::meta::RegistryDb;
use std::path::PathBuf;
use tracing::info;

/// Write a default config file and bootstrap the registry schema
pub async fn cmd_init(config_path: PathBuf, force: bool) -> Result<Config> {
    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config_path, render_default_config_toml())?;
    info!("Created config at {:?}", config_path);

    let config = Config::load(&config_path)?;

    let db = RegistryDb::connect(&config).await?;
    db.init_schema().await?;
    db.close().await;
    info!("Created database at {:?}", config.paths.db_file);

    Ok(config)
}
