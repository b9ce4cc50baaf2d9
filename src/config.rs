//! Configuration file loading.
//!
//! Loads user configuration from `~/.config/obsbot-ctl/config.toml`, or the
//! path in `OBSBOT_CONFIG`.  A missing file yields defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::backend::DeviceBackend;
use crate::capability::Capability;
use crate::error::{ObsbotError, Result};
use crate::sim::{SimBackend, SimDevice};
use crate::usb::UsbBackend;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "OBSBOT_CONFIG";

/// Configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Devices presented by the simulated backend
    #[serde(default)]
    pub simulated: Vec<SimulatedDevice>,
}

/// Which backend drives the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Usb,
    Simulated,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usb => write!(f, "usb"),
            Self::Simulated => write!(f, "simulated"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    #[serde(default)]
    pub kind: BackendKind,

    /// USB control transfer timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Detach the uvcvideo driver while a control transfer runs
    #[serde(default = "default_true")]
    pub detach_kernel_driver: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    /// tracing filter directive, e.g. "obsbot_ctl=debug"
    #[serde(default)]
    pub filter: Option<String>,
}

/// One `[[simulated]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatedDevice {
    pub serial: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default = "default_true")]
    pub initialized: bool,

    /// Controls this simulated unit lacks
    #[serde(default)]
    pub unsupported: Vec<Capability>,
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "OBSBOT Meet SE".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            timeout_ms: default_timeout_ms(),
            detach_kernel_driver: true,
        }
    }
}

impl SimulatedDevice {
    pub fn to_sim_device(&self) -> SimDevice {
        let mut device = SimDevice::new(&self.serial, &self.model).version(&self.version);
        if !self.initialized {
            device = device.uninitialized();
        }
        for &capability in &self.unsupported {
            device = device.without(capability);
        }
        device
    }
}

impl Config {
    /// `$OBSBOT_CONFIG`, else the per-user config directory
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("obsbot-ctl").join("config.toml")
        } else {
            PathBuf::from("obsbot-ctl.toml")
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ObsbotError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config = Self::parse(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ObsbotError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Load configuration, logging warnings but returning defaults on error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.backend.timeout_ms)
    }

    /// Instantiate the configured backend.
    pub fn build_backend(&self) -> Result<Box<dyn DeviceBackend>> {
        match self.backend.kind {
            BackendKind::Usb => {
                let backend = UsbBackend::new()?
                    .with_timeout(self.timeout())
                    .with_detach_kernel_driver(self.backend.detach_kernel_driver);
                Ok(Box::new(backend))
            }
            BackendKind::Simulated => {
                let devices = self.simulated.iter().map(SimulatedDevice::to_sim_device);
                Ok(Box::new(SimBackend::with_devices(devices)))
            }
        }
    }
}
