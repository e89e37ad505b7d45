//! Initialize the configuration directory: create ~/.parla, a default config file, and the scratch directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{self, Config};

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with every default spelled out if missing.
/// - Creates the scratch directory for generated audio.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let default_config = serde_json::to_string_pretty(&Config::default())
            .context("serializing default config")?;
        std::fs::write(config_path, default_config)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    let (config, _) = config::load_config(Some(config_path.to_path_buf()))?;
    let scratch = config::resolve_scratch_dir(&config);
    if !scratch.exists() {
        std::fs::create_dir_all(&scratch)
            .with_context(|| format!("creating scratch directory {}", scratch.display()))?;
        log::info!("created scratch directory at {}", scratch.display());
    }

    Ok(config_dir.to_path_buf())
}
