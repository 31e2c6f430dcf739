//! Configuration file handling.
//!
//! Settings come from a TOML file (default `nwac_wx.toml` in the working
//! directory). A missing file falls back to built-in defaults. The database
//! connection can be overridden with `DATABASE_URL`, normally set in `.env`.
//!
//! ```toml
//! project_dir = "/srv/nwac"
//! log_level = "info"
//!
//! [database]
//! host = "localhost"
//! user = "nwac"
//! name = "nwac"
//!
//! [bias_correction]
//! tau = 30.0
//! damping = "normalized"
//! ```

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::analysis::bias_correction::{
    BiasCorrectionParams, JumpDamping, DEFAULT_JUMP_THRESHOLD, DEFAULT_LOW_SUM_THRESHOLD, DEFAULT_TAU,
};
use crate::logging::LogLevel;

pub const DEFAULT_CONFIG_FILE: &str = "nwac_wx.toml";

/// Name of the bias-correction CSV inside the project directory.
pub const DEFAULT_CSV_NAME: &str = "BiasCorrectionData.csv";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, message: String },
    /// A value parsed but is out of range or misspelled.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, message } => {
                write!(f, "Failed to parse config {}: {}", path.display(), message)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Config structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Base directory for input data and default output.
    pub project_dir: PathBuf,
    pub log_level: String,
    pub log_file: Option<String>,
    pub database: DatabaseConfig,
    pub bias_correction: BiasCorrectionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            log_level: "info".to_string(),
            log_file: None,
            database: DatabaseConfig::default(),
            bias_correction: BiasCorrectionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "nwac".to_string(),
            password: String::new(),
            name: "nwac".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BiasCorrectionConfig {
    pub tau: f64,
    pub jump_threshold: f64,
    pub low_sum_threshold: f64,
    /// `normalized` (production default) or `tanh`.
    pub damping: JumpDamping,
    /// CSV file name, relative to `project_dir` unless absolute.
    pub input_csv: String,
}

impl Default for BiasCorrectionConfig {
    fn default() -> Self {
        Self {
            tau: DEFAULT_TAU,
            jump_threshold: DEFAULT_JUMP_THRESHOLD,
            low_sum_threshold: DEFAULT_LOW_SUM_THRESHOLD,
            damping: JumpDamping::default(),
            input_csv: DEFAULT_CSV_NAME.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Parses a config from TOML text. `path` is only used in errors.
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io { path: path.to_path_buf(), source }),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.bias_params()?;
        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<LogLevel, ConfigError> {
        LogLevel::from_name(&self.log_level)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown log_level '{}'", self.log_level)))
    }

    /// Bias-correction parameters; tau is range-checked here.
    pub fn bias_params(&self) -> Result<BiasCorrectionParams, ConfigError> {
        let bc = &self.bias_correction;
        if !(bc.tau.is_finite() && bc.tau > 1.0) {
            return Err(ConfigError::Invalid(format!("tau must be greater than 1, got {}", bc.tau)));
        }
        Ok(BiasCorrectionParams {
            tau: bc.tau,
            jump_threshold: bc.jump_threshold,
            low_sum_threshold: bc.low_sum_threshold,
            damping: bc.damping,
        })
    }

    /// Default bias-correction CSV path.
    pub fn input_csv_path(&self) -> PathBuf {
        self.project_dir.join(&self.bias_correction.input_csv)
    }

    /// Default output directory for reports.
    pub fn output_dir(&self) -> PathBuf {
        self.project_dir.join("outdir")
    }

    /// Postgres connection string. `DATABASE_URL` wins when set.
    pub fn database_url(&self) -> String {
        match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => self.database.connection_string(),
        }
    }
}

impl DatabaseConfig {
    /// Key-value connection string understood by `postgres::Client::connect`.
    pub fn connection_string(&self) -> String {
        let mut conn = format!(
            "host={} port={} user={} dbname={}",
            self.host, self.port, self.user, self.name
        );
        if !self.password.is_empty() {
            conn.push_str(&format!(" password={}", self.password));
        }
        conn
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
