use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Directory for the file log backend. Unset means stderr when journald is unavailable.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub uploads: UploadConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// "production" hides error details from 500 responses.
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

impl ServerConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            environment: default_environment(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Base directory that stored `photo_path` values are relative to.
    #[serde(default = "default_upload_root")]
    pub root: PathBuf,

    /// Sub-directory of `root` that receives photos.
    #[serde(default = "default_photo_subdir")]
    pub photo_subdir: String,

    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

/// Kept apart from the database directory; on Linux `data_dir` and
/// `data_local_dir` are the same place.
fn default_upload_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("choretrack")
        .join("public")
}

fn default_photo_subdir() -> String {
    "uploads/photos".to_string()
}

fn default_max_bytes() -> usize {
    10 * 1024 * 1024 // 10MB
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            root: default_upload_root(),
            photo_subdir: default_photo_subdir(),
            max_bytes: default_max_bytes(),
        }
    }
}

/// Bearer tokens accepted by the server, mapped to the username they act as.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("choretrack")
        .join("chores.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_dir: None,
            server: ServerConfig::default(),
            uploads: UploadConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("choretrack")
    }

    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CHORETRACK_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }
}
