//! Configuration module for the TeamDB service.
//!
//! Configuration is read from a required YAML file. A handful of values can be
//! overridden from environment variables.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default location of the server configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "teamdb_config.yaml";

/// Template shipped next to the configuration file.
pub const EXAMPLE_CONFIG_NAME: &str = "example-teamdb_config.yaml";

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind the server to
    pub host: String,
    /// Port to bind the server to
    pub port: u16,
    /// Root directory holding the document, its backups and the token store
    pub data_root: PathBuf,
    /// Number of document backups to retain
    pub max_backups: usize,
    /// Origins allowed by CORS (`*` allows any)
    pub allow_origins: Vec<String>,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Errors raised while loading the configuration. All of them are fatal at startup.
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file does not exist
    Missing {
        path: PathBuf,
        example: Option<PathBuf>,
    },
    /// The configuration file could not be read or parsed
    Invalid { path: PathBuf, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing {
                path,
                example: Some(example),
            } => write!(
                f,
                "Missing required config file {}. A template exists at {}; edit it, save it as {} and restart the service",
                path.display(),
                example.display(),
                path.display()
            ),
            ConfigError::Missing {
                path,
                example: None,
            } => write!(f, "Missing required config file {}", path.display()),
            ConfigError::Invalid { path, reason } => {
                write!(f, "Failed to load config from {}: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// `allow_origins` may be written as a YAML list or a comma-separated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OriginList {
    List(Vec<String>),
    Csv(String),
}

impl OriginList {
    fn into_vec(self) -> Vec<String> {
        match self {
            OriginList::List(origins) => origins,
            OriginList::Csv(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// On-disk shape of the configuration file.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    data_root: Option<PathBuf>,
    max_backups: Option<usize>,
    allow_origins: Option<OriginList>,
    log_level: Option<String>,
    log_format: Option<LogFormat>,
}

impl Config {
    /// Load configuration from the file named by `TEAMDB_CONFIG` (or the default path).
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let path = env::var("TEAMDB_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = Self::from_file(&path)?;

        if let Ok(level) = env::var("TEAMDB_LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    /// Load configuration from an explicit file path.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let example = path
                .parent()
                .map(|dir| dir.join(EXAMPLE_CONFIG_NAME))
                .filter(|p| p.exists());
            return Err(ConfigError::Missing {
                path: path.to_path_buf(),
                example,
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&raw).map_err(|reason| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse configuration from YAML text. An empty document yields the defaults.
    pub fn from_yaml(raw: &str) -> Result<Self, String> {
        let file: FileConfig = if raw.trim().is_empty() {
            FileConfig::default()
        } else {
            serde_yaml::from_str::<Option<FileConfig>>(raw)
                .map_err(|e| e.to_string())?
                .unwrap_or_default()
        };

        Ok(Self {
            host: file.host.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: file.port.unwrap_or(8765),
            data_root: file.data_root.unwrap_or_else(|| PathBuf::from("./data")),
            max_backups: file.max_backups.unwrap_or(10),
            allow_origins: file
                .allow_origins
                .map(OriginList::into_vec)
                .unwrap_or_else(default_origins),
            log_level: file.log_level.unwrap_or_else(|| "info".to_string()),
            log_format: file.log_format.unwrap_or_default(),
        })
    }

    /// Address string handed to the listener; hostnames are resolved at bind time.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Path of the primary document.
    pub fn db_path(&self) -> PathBuf {
        self.data_root.join("config").join("database.yaml")
    }

    /// Directory holding rotated document backups.
    pub fn backup_dir(&self) -> PathBuf {
        self.data_root.join("config").join("backups")
    }
}

fn default_origins() -> Vec<String> {
    vec![
        "http://127.0.0.1".to_string(),
        "http://localhost".to_string(),
    ]
}
