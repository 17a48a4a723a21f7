//! Configuration loading and data directory resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Data directory resolution priority order:
/// 1. Environment variable (highest priority)
/// 2. `data_dir` key in the service TOML config file
/// 3. OS-dependent compiled default (fallback)
pub fn resolve_data_dir(env_var_name: &str, service_name: &str) -> PathBuf {
    // Priority 1: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 2: TOML config file
    if let Some(config_path) = default_config_path(service_name) {
        if let Ok(content) = std::fs::read_to_string(&config_path) {
            if let Ok(value) = toml::from_str::<toml::Value>(&content) {
                if let Some(dir) = value.get("data_dir").and_then(|v| v.as_str()) {
                    return PathBuf::from(dir);
                }
            }
        }
    }

    // Priority 3: OS-dependent compiled default
    default_data_dir(service_name)
}

/// Default configuration file path for the platform
/// (`~/.config/<service>/config.toml` on Linux/macOS, `%APPDATA%` on Windows)
pub fn default_config_path(service_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(service_name).join("config.toml"))
}

/// OS-dependent default data directory
fn default_data_dir(service_name: &str) -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join(service_name))
            .unwrap_or_else(|| PathBuf::from(format!("/var/lib/{}", service_name)))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join(service_name))
            .unwrap_or_else(|| PathBuf::from(format!("/Library/Application Support/{}", service_name)))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join(service_name))
            .unwrap_or_else(|| PathBuf::from(format!("C:\\ProgramData\\{}", service_name)))
    } else {
        PathBuf::from(format!("./{}_data", service_name))
    }
}

/// Ensure a directory exists, creating it (and parents) if missing
pub fn ensure_directory(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(Error::Config(format!(
                "Path exists but is not a directory: {}",
                path.display()
            )));
        }
        return Ok(());
    }
    std::fs::create_dir_all(path)?;
    tracing::info!("Created directory: {}", path.display());
    Ok(())
}

/// Load and deserialize a TOML configuration file
pub fn load_toml_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}
