use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings file name inside the config directory.
pub const SETTINGS_FILE: &str = "collgraph.json";
/// Default log file name inside the data directory.
pub const LOG_FILE: &str = "collgraph.log";

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Create PathConfig from CLI arguments and environment variables
    ///
    /// Priority: CLI args → ENV var (COLLGRAPH_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var("COLLGRAPH_CONFIG_DIR").ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Get path to a configuration file
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. COLLGRAPH_CONFIG_DIR environment variable
/// 3. Local folder IF any config files exist (collgraph.json, collgraph.log)
/// 4. Platform-specific config directory from dirs-next (default)
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

/// Get path to a data file (logs and the like), same priority as [`config_file`]
/// with the platform data directory as default.
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    get_data_dir(config).join(name)
}

/// Ensure that configuration and data directories exist
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = get_config_dir(config);
    let data_dir = get_data_dir(config);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }

    // Only create data_dir if it's different from config_dir
    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }

    Ok(())
}

fn has_local_config_files(dir: &Path) -> bool {
    [SETTINGS_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

fn local_dir() -> Option<PathBuf> {
    std::env::current_dir().ok().filter(|dir| has_local_config_files(dir))
}

fn get_config_dir(config: &PathConfig) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    if let Some(dir) = local_dir() {
        return dir;
    }
    if let Some(dir) = dirs_next::config_dir() {
        return dir.join("collgraph");
    }
    PathBuf::from(".")
}

fn get_data_dir(config: &PathConfig) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    if let Some(dir) = local_dir() {
        return dir;
    }
    if let Some(dir) = dirs_next::data_dir() {
        return dir.join("collgraph");
    }
    PathBuf::from(".")
}

/// Persistent tool settings (`collgraph.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Drop invalid member entries and fix cycles right after loading.
    pub repair_on_load: bool,
    /// Refuse to write a file whose hierarchy fails validation.
    pub validate_on_save: bool,
    /// Build every object cache in parallel after loading.
    pub warm_caches: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self { repair_on_load: false, validate_on_save: true, warm_caches: false }
    }
}

impl Settings {
    /// Load from the config directory; a missing file gives defaults.
    pub fn load(config: &PathConfig) -> Result<Self> {
        let path = config_file(SETTINGS_FILE, config);
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(&path).with_context(|| format!("Read {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Parse {}", path.display()))
    }

    pub fn save(&self, config: &PathConfig) -> Result<PathBuf> {
        ensure_dirs(config)?;
        let path = config_file(SETTINGS_FILE, config);
        let json = serde_json::to_string_pretty(self).context("Serialize settings")?;
        std::fs::write(&path, json).with_context(|| format!("Write {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config() -> PathConfig {
        let dir = std::env::temp_dir().join(format!("collgraph-cfg-{}", uuid::Uuid::new_v4()));
        PathConfig { config_dir: Some(dir) }
    }

    #[test]
    fn test_config_file_with_custom_dir() {
        let config = PathConfig { config_dir: Some(PathBuf::from("/custom")) };
        assert_eq!(config_file("test.json", &config), PathBuf::from("/custom/test.json"));
        assert_eq!(data_file("test.log", &config), PathBuf::from("/custom/test.log"));
    }

    #[test]
    fn test_cli_dir_wins() {
        let config = PathConfig::from_env_and_cli(Some(PathBuf::from("/from/cli")));
        assert_eq!(config.config_dir, Some(PathBuf::from("/from/cli")));
    }

    #[test]
    fn test_settings_default_when_missing() {
        let config = temp_config();
        assert_eq!(Settings::load(&config).unwrap(), Settings::default());
    }

    #[test]
    fn test_settings_save_load() {
        let config = temp_config();
        let settings = Settings { repair_on_load: true, validate_on_save: false, warm_caches: true };
        let path = settings.save(&config).unwrap();
        assert!(path.ends_with(SETTINGS_FILE));
        assert_eq!(Settings::load(&config).unwrap(), settings);

        std::fs::write(&path, r#"{ "warm_caches": true }"#).unwrap();
        let partial = Settings::load(&config).unwrap();
        assert!(partial.warm_caches);
        assert!(partial.validate_on_save, "missing keys default");

        if let Some(dir) = &config.config_dir {
            std::fs::remove_dir_all(dir).ok();
        }
    }
}
