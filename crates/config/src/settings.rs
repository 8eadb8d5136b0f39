// Store and application settings
// Loaded from an explicit file, ~/.config/tagsync/settings.toml, or TAGSYNC_* environment variables

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_DB_PATH: &str = "TAGSYNC_DB_PATH";
pub const ENV_DB_TABLE: &str = "TAGSYNC_DB_TABLE";
pub const ENV_TAG_COLUMN: &str = "TAGSYNC_TAG_COLUMN";
pub const ENV_BATCH_SIZE: &str = "TAGSYNC_BATCH_SIZE";
pub const ENV_FLOAT_THRESHOLD: &str = "TAGSYNC_FLOAT_THRESHOLD";
pub const ENV_CONNECTION_TIMEOUT: &str = "TAGSYNC_CONNECTION_TIMEOUT";

const DEFAULT_TABLE: &str = "AllTagslist";
const DEFAULT_TAG_COLUMN: &str = "Tag Number";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SettingsError {
    Read { path: PathBuf, message: String },
    Parse { path: PathBuf, message: String },
    MissingSection { path: PathBuf, section: &'static str },
    MissingVariable(&'static str),
    InvalidVariable { name: &'static str, value: String },
    Invalid(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, message } => write!(f, "cannot read {}: {message}", path.display()),
            Self::Parse { path, message } => write!(f, "invalid settings in {}: {message}", path.display()),
            Self::MissingSection { path, section } => {
                write!(f, "{} has no [{section}] section", path.display())
            }
            Self::MissingVariable(name) => {
                write!(f, "no settings file found and {name} is not set")
            }
            Self::InvalidVariable { name, value } => write!(f, "{name}: invalid value '{value}'"),
            Self::Invalid(msg) => write!(f, "invalid settings: {msg}"),
        }
    }
}

impl std::error::Error for SettingsError {}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Target database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite database file. Relative paths resolve against the settings file.
    pub path: PathBuf,

    #[serde(default = "default_table")]
    pub table_name: String,

    /// Record key column
    #[serde(default = "default_tag_column")]
    pub tag_column: String,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_tag_column() -> String {
    DEFAULT_TAG_COLUMN.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Keys per chunked fetch
    pub batch_size: usize,
    /// Absolute tolerance for numeric comparison
    pub float_threshold: f64,
    /// Busy timeout, seconds
    pub connection_timeout: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            batch_size: 2000,
            float_threshold: 1e-6,
            connection_timeout: 5,
        }
    }
}

/// Where the settings came from
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SettingsSource {
    File(PathBuf),
    #[default]
    Environment,
}

impl fmt::Display for SettingsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Environment => write!(f, "environment"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub app: AppSettings,
    #[serde(skip)]
    pub source: SettingsSource,
}

#[derive(Deserialize)]
struct SettingsFile {
    database: Option<DatabaseSettings>,
    #[serde(default)]
    app: AppSettings,
}

impl Settings {
    /// Default settings file location
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tagsync")
            .join("settings.toml")
    }

    /// Load from `explicit`, then the default file, then the environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self, SettingsError> {
        Self::load_with(explicit, Some(Self::config_path()), |name| std::env::var(name).ok())
    }

    /// `load` with the default path and environment lookup supplied by the caller.
    pub fn load_with(
        explicit: Option<&Path>,
        default_path: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        let file = match explicit {
            Some(path) if path.exists() => Some(path.to_path_buf()),
            Some(path) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    message: "file not found".to_string(),
                })
            }
            None => default_path.filter(|p| p.exists()),
        };

        let mut settings = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::from_env(&env)?,
        };
        settings.apply_app_overrides(&env)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let parsed: SettingsFile = toml::from_str(&contents).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut database = parsed.database.ok_or_else(|| SettingsError::MissingSection {
            path: path.to_path_buf(),
            section: "database",
        })?;
        if database.path.is_relative() {
            if let Some(dir) = path.parent() {
                database.path = dir.join(&database.path);
            }
        }
        Ok(Self {
            database,
            app: parsed.app,
            source: SettingsSource::File(path.to_path_buf()),
        })
    }

    fn from_env(env: &impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let path = env(ENV_DB_PATH)
            .filter(|v| !v.trim().is_empty())
            .ok_or(SettingsError::MissingVariable(ENV_DB_PATH))?;
        Ok(Self {
            database: DatabaseSettings {
                path: PathBuf::from(path),
                table_name: env(ENV_DB_TABLE).unwrap_or_else(default_table),
                tag_column: env(ENV_TAG_COLUMN).unwrap_or_else(default_tag_column),
            },
            app: AppSettings::default(),
            source: SettingsSource::Environment,
        })
    }

    fn apply_app_overrides(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<(), SettingsError> {
        if let Some(v) = env(ENV_BATCH_SIZE) {
            self.app.batch_size = parse_var(ENV_BATCH_SIZE, &v)?;
        }
        if let Some(v) = env(ENV_FLOAT_THRESHOLD) {
            self.app.float_threshold = parse_var(ENV_FLOAT_THRESHOLD, &v)?;
        }
        if let Some(v) = env(ENV_CONNECTION_TIMEOUT) {
            self.app.connection_timeout = parse_var(ENV_CONNECTION_TIMEOUT, &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.database.table_name.trim().is_empty() {
            return Err(SettingsError::Invalid("table_name must not be empty".into()));
        }
        if self.database.tag_column.trim().is_empty() {
            return Err(SettingsError::Invalid("tag_column must not be empty".into()));
        }
        if self.app.batch_size < 1 {
            return Err(SettingsError::Invalid("batch_size must be at least 1".into()));
        }
        if !self.app.float_threshold.is_finite() || self.app.float_threshold < 0.0 {
            return Err(SettingsError::Invalid(
                "float_threshold must be a non-negative number".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, SettingsError> {
    value.trim().parse().map_err(|_| SettingsError::InvalidVariable {
        name,
        value: value.to_string(),
    })
}
