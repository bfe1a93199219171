//! Configuration support for imgenie.
//!
//! Two kinds of configuration live here:
//! - [`PersistedConfig`]: the durable projection of the generation form
//!   (prompt, parameters, model preference, LoRA selections), stored as one
//!   JSON blob under a single key.
//! - [`ClientSettings`]: how to reach the server and how often to poll it.
//!
//! Loading never fails loudly. A missing, corrupt or too-new blob is logged
//! and treated as "no saved config" so the caller falls back to defaults.

use std::cell::RefCell;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_API_BASE, DEFAULT_GUIDANCE_SCALE, DEFAULT_REQUEST_TIMEOUT, DEFAULT_STEPS,
    DEFAULT_STRENGTH, FALLBACK_RESOLUTIONS, PROGRESS_POLL_INTERVAL, RANDOM_SEED,
    STATUS_POLL_INTERVAL,
};
use crate::types::LoraSelection;

/// Current persisted config format version.
/// Increment this when making breaking changes to the format.
pub const CONFIG_VERSION: u32 = 1;

/// Storage key (localStorage) / file stem (native) for the persisted blob.
pub const CONFIG_KEY: &str = "imgenie-config";

// ============================================================================
// Persisted generation parameters
// ============================================================================

/// Generation parameters that survive a page reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedConfig {
    /// Version of the blob format
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub prompt: String,

    #[serde(default = "default_steps")]
    pub steps: u32,

    #[serde(default = "default_guidance")]
    pub guidance: f32,

    #[serde(default = "default_strength")]
    pub strength: f32,

    #[serde(default = "default_resolution")]
    pub resolution: String,

    #[serde(default = "default_seed")]
    pub seed: i64,

    /// Preferred model for the current task (empty = none)
    #[serde(default)]
    pub model_id: String,

    #[serde(default)]
    pub lora_selections: Vec<LoraSelection>,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_steps() -> u32 {
    DEFAULT_STEPS
}

fn default_guidance() -> f32 {
    DEFAULT_GUIDANCE_SCALE
}

fn default_strength() -> f32 {
    DEFAULT_STRENGTH
}

fn default_resolution() -> String {
    FALLBACK_RESOLUTIONS[0].to_string()
}

fn default_seed() -> i64 {
    RANDOM_SEED
}

impl Default for PersistedConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            prompt: String::new(),
            steps: default_steps(),
            guidance: default_guidance(),
            strength: default_strength(),
            resolution: default_resolution(),
            seed: default_seed(),
            model_id: String::new(),
            lora_selections: Vec::new(),
        }
    }
}

impl PersistedConfig {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON, rejecting blobs written by a newer format.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        Ok(config)
    }
}

/// Errors that can occur when reading or writing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Blob version is newer than supported
    #[error(
        "Configuration version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    /// I/O error when reading/writing the config file
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Storage error (localStorage in WASM)
    #[error("Storage error: {0}")]
    StorageError(String),
}

// ============================================================================
// Stores
// ============================================================================

/// Durable key/value home for the [`PersistedConfig`] blob.
///
/// `load` swallows every failure and returns `None`; `save` reports failures
/// so callers can log them, but a failed save never blocks anything else.
pub trait ConfigStore {
    fn load(&self) -> Option<PersistedConfig>;
    fn save(&self, config: &PersistedConfig) -> Result<(), ConfigError>;
}

/// Parse a stored blob, logging and discarding anything unusable.
fn parse_stored(json: &str, origin: &str) -> Option<PersistedConfig> {
    match PersistedConfig::from_json(json) {
        Ok(config) => {
            log::info!("Loaded configuration from {}", origin);
            Some(config)
        }
        Err(e) => {
            log::warn!("Ignoring saved configuration from {}: {}", origin, e);
            None
        }
    }
}

/// In-memory store. Used by tests and as a fallback when no durable
/// location is available.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blob: RefCell<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a raw blob, as if it had been written earlier.
    pub fn with_blob(json: impl Into<String>) -> Self {
        Self {
            blob: RefCell::new(Some(json.into())),
        }
    }

    /// The raw blob currently stored.
    pub fn blob(&self) -> Option<String> {
        self.blob.borrow().clone()
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Option<PersistedConfig> {
        let blob = self.blob.borrow();
        parse_stored(blob.as_deref()?, "memory")
    }

    fn save(&self, config: &PersistedConfig) -> Result<(), ConfigError> {
        *self.blob.borrow_mut() = Some(config.to_json()?);
        Ok(())
    }
}

/// JSON file store for native builds.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct FileStore {
    path: std::path::PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileStore {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default config path, if one can be determined.
    pub fn at_default_path() -> Option<Self> {
        Self::default_path().map(Self::new)
    }

    /// Default location: `<config dir>/imgenie/imgenie-config.json`.
    pub fn default_path() -> Option<std::path::PathBuf> {
        let filename = format!("{}.json", CONFIG_KEY);
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("imgenie").join(filename))
        } else {
            dirs::home_dir().map(|home| home.join(".config").join("imgenie").join(filename))
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl ConfigStore for FileStore {
    fn load(&self) -> Option<PersistedConfig> {
        if !self.path.exists() {
            log::debug!("No config file found at {:?}", self.path);
            return None;
        }

        match std::fs::read_to_string(&self.path) {
            Ok(json) => parse_stored(&json, &self.path.display().to_string()),
            Err(e) => {
                log::warn!("Failed to read config file {:?}: {}", self.path, e);
                None
            }
        }
    }

    fn save(&self, config: &PersistedConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = config.to_json()?;
        std::fs::write(&self.path, json)?;
        log::debug!("Saved configuration to {:?}", self.path);
        Ok(())
    }
}

/// Browser localStorage store (WASM only).
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorageStore;

#[cfg(target_arch = "wasm32")]
impl LocalStorageStore {
    fn storage() -> Result<web_sys::Storage, ConfigError> {
        let window = web_sys::window()
            .ok_or_else(|| ConfigError::StorageError("No window object available".to_string()))?;

        window
            .local_storage()
            .map_err(|e| ConfigError::StorageError(format!("localStorage access error: {:?}", e)))?
            .ok_or_else(|| ConfigError::StorageError("localStorage not available".to_string()))
    }
}

#[cfg(target_arch = "wasm32")]
impl ConfigStore for LocalStorageStore {
    fn load(&self) -> Option<PersistedConfig> {
        let storage = match Self::storage() {
            Ok(storage) => storage,
            Err(e) => {
                log::warn!("{}", e);
                return None;
            }
        };

        match storage.get_item(CONFIG_KEY) {
            Ok(Some(json)) => parse_stored(&json, "localStorage"),
            Ok(None) => {
                log::debug!("No config found in localStorage");
                None
            }
            Err(e) => {
                log::warn!("Failed to read from localStorage: {:?}", e);
                None
            }
        }
    }

    fn save(&self, config: &PersistedConfig) -> Result<(), ConfigError> {
        let json = config.to_json()?;

        Self::storage()?.set_item(CONFIG_KEY, &json).map_err(|e| {
            ConfigError::StorageError(format!("Failed to save to localStorage: {:?}", e))
        })?;

        log::debug!("Saved configuration to localStorage");
        Ok(())
    }
}

// ============================================================================
// Client settings
// ============================================================================

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }

    /// Map a `-v` count to a level, starting from the default.
    pub fn from_verbosity(verbose: u8) -> Self {
        match verbose {
            0 => LogLevel::Info,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// How to reach the server and how often to poll it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    /// Base URL every endpoint path is appended to
    pub api_base: String,
    /// Per-request timeout (ignored in the browser)
    pub request_timeout: Duration,
    pub status_poll_interval: Duration,
    pub progress_poll_interval: Duration,
    pub log_level: LogLevel,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            status_poll_interval: STATUS_POLL_INTERVAL,
            progress_poll_interval: PROGRESS_POLL_INTERVAL,
            log_level: LogLevel::default(),
        }
    }
}

impl ClientSettings {
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }
}
