//! Roombook configuration
//!
//! Loaded from TOML. Lookup order: the file named by `ROOMBOOK_CONFIG`, then
//! `roombook.toml` in the platform config directory, then built-in defaults.
//! Every field has a default, so a partial file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::accounts::DEFAULT_SESSION_HOURS;
use crate::catalog::{default_rooms, RoomCatalog};
use crate::error::{Error, Result};
use crate::models::{BookingPolicy, Room, DEFAULT_MAX_DURATION_MINUTES};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "ROOMBOOK_CONFIG";

/// Config file name inside the platform config directory
pub const CONFIG_FILE: &str = "roombook.toml";

pub const DEFAULT_PORT: u16 = 5055;

/// Upper bound for `booking.max_duration_minutes`: one week
pub const MAX_DURATION_MINUTES_LIMIT: i64 = 7 * 24 * 60;

/// Upper bound for `booking.session_hours`: one year
pub const MAX_SESSION_HOURS: i64 = 366 * 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub booking: BookingConfig,
    pub rooms: Vec<Room>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            booking: BookingConfig::default(),
            rooms: default_rooms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// 0 picks an ephemeral port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Relative paths resolve against the platform data directory
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: PathBuf::from("roombook.db"),
            busy_timeout_ms: 5000,
        }
    }
}

impl StorageConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Database path, with relative paths placed in the data directory
    pub fn resolved_path(&self) -> Result<PathBuf> {
        if self.path.is_absolute() {
            return Ok(self.path.clone());
        }
        Ok(data_dir()?.join(&self.path))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingConfig {
    /// 0 disables the ceiling
    pub max_duration_minutes: i64,
    pub per_user_conflicts: bool,
    pub session_hours: i64,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            max_duration_minutes: DEFAULT_MAX_DURATION_MINUTES,
            per_user_conflicts: false,
            session_hours: DEFAULT_SESSION_HOURS,
        }
    }
}

impl AppConfig {
    /// Resolve and load the configuration
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            info!(path = %path, "Loading config from {}", CONFIG_ENV);
            return Self::load_from(Path::new(&path));
        }

        if let Some(dirs) = project_dirs() {
            let path = dirs.config_dir().join(CONFIG_FILE);
            if path.exists() {
                info!(path = %path.display(), "Loading config");
                return Self::load_from(&path);
            }
        }

        debug!("No config file found, using defaults");
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; a missing file is an error
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.busy_timeout_ms == 0 {
            return Err(Error::Config("storage.busy_timeout_ms must be > 0".into()));
        }
        if !(0..=MAX_DURATION_MINUTES_LIMIT).contains(&self.booking.max_duration_minutes) {
            return Err(Error::Config(format!(
                "booking.max_duration_minutes must be between 0 and {}",
                MAX_DURATION_MINUTES_LIMIT
            )));
        }
        if !(1..=MAX_SESSION_HOURS).contains(&self.booking.session_hours) {
            return Err(Error::Config(format!(
                "booking.session_hours must be between 1 and {}",
                MAX_SESSION_HOURS
            )));
        }
        self.catalog().map(|_| ())
    }

    pub fn policy(&self) -> BookingPolicy {
        BookingPolicy::default()
            .with_max_duration_minutes(self.booking.max_duration_minutes)
            .with_per_user_conflicts(self.booking.per_user_conflicts)
    }

    pub fn catalog(&self) -> Result<RoomCatalog> {
        if self.rooms.is_empty() {
            return Err(Error::Config("at least one room is required".into()));
        }
        RoomCatalog::new(self.rooms.clone())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "roombook", "roombook")
}

fn data_dir() -> Result<PathBuf> {
    let dirs = project_dirs().ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine data directory",
        ))
    })?;

    Ok(dirs.data_dir().to_path_buf())
}
