//! Configuration file handling for breadboard.
//!
//! Looks for `.config/breadboard.styx` in the current directory or any parent
//! directory. A missing file is fine: everything can come from flags and the
//! environment.

pub use breadboard_config::Config;

use std::path::{Path, PathBuf};
use std::time::Duration;

use breadboard::{DEFAULT_TIMEOUT, Dialect};

const CONFIG_FILE: &str = ".config/breadboard.styx";

/// Where BREAD records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

/// Configuration after flags, environment and file have been layered.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub dialect: Dialect,
    pub timeout: Duration,
    pub store: StoreKind,
    /// File the settings were read from, if any
    pub source: Option<PathBuf>,
}

/// Load configuration from `.config/breadboard.styx`, searching up the directory tree.
pub fn load() -> Result<(Config, Option<PathBuf>), ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::Io(e.to_string()))?;
    load_from(&cwd)
}

/// Load configuration starting from a specific directory.
pub fn load_from(start: &Path) -> Result<(Config, Option<PathBuf>), ConfigError> {
    let Some(config_path) = find_config_file(start) else {
        return Ok((Config::default(), None));
    };
    let content =
        std::fs::read_to_string(&config_path).map_err(|e| ConfigError::Io(e.to_string()))?;

    let config: Config =
        facet_styx::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

    Ok((config, Some(config_path)))
}

fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Layer `--database-url`, then `DATABASE_URL`, then the file.
pub fn resolve(
    config: Config,
    source: Option<PathBuf>,
    flag_url: Option<String>,
    env_url: Option<String>,
) -> Result<Settings, ConfigError> {
    let dialect = match config.database.dialect.as_deref() {
        Some(name) => name
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown dialect '{name}'")))?,
        None => Dialect::Postgres,
    };
    let store = match config.metadata.store.as_deref() {
        None | Some("postgres") => StoreKind::Postgres,
        Some("memory") => StoreKind::Memory,
        Some(other) => {
            return Err(ConfigError::Invalid(format!(
                "unknown metadata store '{other}' (expected postgres or memory)"
            )));
        }
    };
    let timeout = match config.database.timeout_secs {
        Some(0) => return Err(ConfigError::Invalid("timeout_secs must be positive".into())),
        Some(secs) => Duration::from_secs(secs),
        None => DEFAULT_TIMEOUT,
    };

    Ok(Settings {
        database_url: flag_url.or(env_url).or(config.database.url),
        dialect,
        timeout,
        store,
        source,
    })
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading the file
    Io(String),
    /// Parse error in the Styx file
    Parse(String),
    /// The file parsed but a value makes no sense
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read {CONFIG_FILE}: {e}"),
            ConfigError::Parse(e) => write!(f, "Failed to parse {CONFIG_FILE}: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid {CONFIG_FILE}: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
