//! Configuration system for the eedmac emulator

use crate::error::{DmacError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub memory: MemoryConfig,
    pub timing: TimingConfig,
    pub debug: DebugConfig,
}

/// Sizes of the memory images the controller is wired to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Main memory size in bytes
    pub main_memory_size: u32,
    /// Scratchpad size in bytes
    pub scratchpad_size: u32,
}

/// Bus timing knobs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    /// Quadwords a channel may move in one invocation before the arbiter
    /// gets another look
    pub burst_quadwords: u32,
    /// Cycles charged for reading one tag
    pub tag_fetch_cycles: u32,
    /// Cycles handed to the CPU each time cycle stealing releases the bus
    pub cpu_slice_cycles: u32,
}

/// Debug settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: LogLevel,
    /// Emit a trace event for every quadword moved
    pub trace_transfers: bool,
}

/// Logging level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive string understood by `EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            main_memory_size: 32 * 1024 * 1024,
            scratchpad_size: 16 * 1024,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            burst_quadwords: 8,
            tag_fetch_cycles: 1,
            cpu_slice_cycles: 1,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            trace_transfers: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location, or create it if it doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Self::default();
            config.save_to(&path)?;
            tracing::info!("Wrote default config to {}", path.display());
            Ok(config)
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        tracing::debug!("Loading config from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("eedmac")
            .join("config.toml")
    }

    fn validate(&self) -> Result<()> {
        if self.timing.burst_quadwords == 0 {
            return Err(DmacError::Config("timing.burst_quadwords must be at least 1".into()));
        }
        for size in [self.memory.main_memory_size, self.memory.scratchpad_size] {
            if size == 0 || size % 16 != 0 {
                return Err(DmacError::Config(format!(
                    "memory image size {} is not a non-zero multiple of 16 bytes",
                    size
                )));
            }
        }
        Ok(())
    }
}
