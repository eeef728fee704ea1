//! Configuration file support for ezflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (EZFLASH_*)
//! 3. Local config file (./ezflash.toml)
//! 4. Global config file (~/.config/ezflash/config.toml)
//!
//! ```toml
//! [connection]
//! port = "/dev/ttyUSB1"
//! timeout_ms = 3000
//! retries = 1
//!
//! [target]
//! millivolts = 3000
//! wire_mode = "sbw"
//!
//! [image]
//! chunk_size = 32
//! ```

use {
    crate::CliError,
    directories::ProjectDirs,
    ezflash::WireMode,
    log::{debug, warn},
    serde::{Deserialize, Serialize},
    std::{
        fs,
        path::{Path, PathBuf},
    },
};

/// Local configuration file name.
const LOCAL_CONFIG: &str = "ezflash.toml";

/// Adapter connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Serial port of the adapter (e.g., "/dev/ttyUSB1" or "COM3").
    pub port: Option<String>,
    /// Response timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Retries after a corrupted or missing response.
    pub retries: Option<u32>,
}

/// Target settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Supply voltage in millivolts.
    pub millivolts: Option<u16>,
    /// Debug interface wiring ("sbw" or "jtag").
    pub wire_mode: Option<String>,
}

/// Image loading settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Segment size for TI-TXT images.
    pub chunk_size: Option<usize>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Target settings.
    #[serde(default)]
    pub target: TargetConfig,
    /// Image settings.
    #[serde(default)]
    pub image: ImageConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ezflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one; values set in `other` win.
    fn merge(&mut self, other: Self) {
        let Self {
            connection,
            target,
            image,
        } = other;

        if connection.port.is_some() {
            self.connection.port = connection.port;
        }
        if connection.timeout_ms.is_some() {
            self.connection.timeout_ms = connection.timeout_ms;
        }
        if connection.retries.is_some() {
            self.connection.retries = connection.retries;
        }
        if target.millivolts.is_some() {
            self.target.millivolts = target.millivolts;
        }
        if target.wire_mode.is_some() {
            self.target.wire_mode = target.wire_mode;
        }
        if image.chunk_size.is_some() {
            self.image.chunk_size = image.chunk_size;
        }
    }

    /// Configured wire mode, if any.
    pub fn wire_mode(&self) -> Result<Option<WireMode>, CliError> {
        self.target
            .wire_mode
            .as_deref()
            .map(|name| {
                WireMode::from_name(name).ok_or_else(|| {
                    CliError::Config(format!(
                        "Unknown wire_mode '{name}' in config (expected sbw or jtag)"
                    ))
                })
            })
            .transpose()
    }
}
