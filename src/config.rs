//! Store settings: defaults, then `bakery-ops.json` in the data directory,
//! then environment variables. Command-line flags are applied by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

pub const CONFIG_FILE: &str = "bakery-ops.json";
pub const DEFAULT_DATA_DIR: &str = "bakery-data";
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 200_000;
pub const ENV_DATA_DIR: &str = "BAKERY_OPS_DATA_DIR";
pub const ENV_LOCK_TIMEOUT_MS: &str = "BAKERY_OPS_LOCK_TIMEOUT_MS";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{name} must be a whole number of milliseconds, got `{value}`")]
    Env { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    /// `None` blocks until the table lock is free.
    pub lock_timeout: Option<Duration>,
    pub pbkdf2_iterations: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    lock_timeout_ms: Option<u64>,
    pbkdf2_iterations: Option<u32>,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        StoreConfig {
            data_dir: data_dir.into(),
            lock_timeout: None,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn with_pbkdf2_iterations(mut self, iterations: u32) -> Self {
        self.pbkdf2_iterations = iterations.max(1);
        self
    }

    /// Resolves the data directory (`explicit`, else `BAKERY_OPS_DATA_DIR`,
    /// else [`DEFAULT_DATA_DIR`]) and layers the config file and environment
    /// on top of the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(explicit, |name| std::env::var(name).ok())
    }

    fn load_with<E>(explicit: Option<&Path>, env: E) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let data_dir = match explicit {
            Some(path) => path.to_path_buf(),
            None => env(ENV_DATA_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
        };
        let mut config = StoreConfig::new(data_dir);
        config.apply_file()?;
        if let Some(value) = env(ENV_LOCK_TIMEOUT_MS) {
            config.lock_timeout = parse_timeout_ms(ENV_LOCK_TIMEOUT_MS, value.as_str())?;
        }
        Ok(config)
    }

    fn apply_file(&mut self) -> Result<(), ConfigError> {
        let path = self.data_dir.join(CONFIG_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        let file: FileConfig = serde_json::from_str(raw.as_str())
            .map_err(|source| ConfigError::Parse { path, source })?;
        if let Some(ms) = file.lock_timeout_ms {
            self.lock_timeout = timeout_from_ms(ms);
        }
        if let Some(iterations) = file.pbkdf2_iterations {
            self.pbkdf2_iterations = iterations.max(1);
        }
        Ok(())
    }
}

/// `0` means "wait forever".
pub fn timeout_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

pub fn parse_timeout_ms(name: &'static str, value: &str) -> Result<Option<Duration>, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(timeout_from_ms)
        .map_err(|_| ConfigError::Env {
            name,
            value: value.to_string(),
        })
}
