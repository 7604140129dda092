//! Engine configuration, loaded once at startup.
//!
//! ## Loading Order
//!
//! 1. `FUEL_ENGINE_CONFIG` environment variable (path to a TOML file)
//! 2. `fuel_engine.toml` in the current working directory
//! 3. Built-in defaults (catalog empty, settings per [`crate::config::defaults`])
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! config::init(FuelEngineConfig::load()?);
//! let tanks = config::get().catalog().tanks();
//! ```

pub mod catalog;
pub mod defaults;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use catalog::{Catalog, TankParameterConfig};

const CONFIG_ENV_VAR: &str = "FUEL_ENGINE_CONFIG";
const DEFAULT_CONFIG_FILENAME: &str = "fuel_engine.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FuelEngineConfig {
    #[serde(rename = "tanks")]
    pub tank_parameters: Vec<TankParameterConfig>,
    pub storage: StorageConfig,
}

impl FuelEngineConfig {
    /// Loads configuration following the env-var → local-file → defaults
    /// search order.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load_from_file(Path::new(&path));
        }
        let local = Path::new(DEFAULT_CONFIG_FILENAME);
        if local.exists() {
            return Self::load_from_file(local);
        }
        tracing::info!("no config file found, using built-in defaults");
        Ok(Self::default())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(
            self.tank_parameters
                .iter()
                .cloned()
                .map(Into::into)
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the sled database. Relative to the process cwd unless
    /// absolute.
    pub sled_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sled_path: PathBuf::from("./fuel_engine.db"),
        }
    }
}

/// Global engine configuration, initialized once at startup.
static FUEL_ENGINE_CONFIG: OnceLock<FuelEngineConfig> = OnceLock::new();

/// Initialize the global configuration. Must be called exactly once before
/// any calls to `get()`. Logs a warning (rather than panicking) if called
/// more than once, since a double-init is recoverable in tests.
pub fn init(config: FuelEngineConfig) {
    if FUEL_ENGINE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global configuration.
///
/// Panics if `init()` has not been called. This is by design — a missing
/// config is a fatal startup error, not a recoverable condition.
pub fn get() -> &'static FuelEngineConfig {
    FUEL_ENGINE_CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

pub fn is_initialized() -> bool {
    FUEL_ENGINE_CONFIG.get().is_some()
}
