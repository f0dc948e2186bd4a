//! TOML configuration file.
//!
//! Every field is optional; command-line flags override whatever the file
//! sets, and built-in defaults fill the rest.
//!
//! ```toml
//! cache_path = "/var/cache/fetcher/cache.sqlite"
//! stale_after_secs = 86400
//! throttle_min_ms = 1000
//! throttle_max_ms = 3000
//! connect_timeout_secs = 30
//! read_timeout_secs = 300
//! ban_marker = "Access denied"
//!
//! [headers]
//! Accept-Language = "el"
//! ```

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::throttle::{ThrottleBounds, ThrottleBoundsError};

/// Errors loading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unknown keys.
    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("invalid config value for `{field}`: {value}. Expected range: {expected}")]
    OutOfRange {
        /// Offending key.
        field: &'static str,
        /// Its value.
        value: u64,
        /// Accepted range.
        expected: &'static str,
    },

    /// Throttle minimum above maximum.
    #[error(transparent)]
    Throttle(#[from] ThrottleBoundsError),
}

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetcherConfig {
    /// Cache database file.
    pub cache_path: Option<PathBuf>,
    /// Default staleness threshold in seconds.
    pub stale_after_secs: Option<u64>,
    /// Lower throttle bound in milliseconds.
    pub throttle_min_ms: Option<u64>,
    /// Upper throttle bound in milliseconds.
    pub throttle_max_ms: Option<u64>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// User-Agent override.
    pub user_agent: Option<String>,
    /// Headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Body text that marks a ban page.
    pub ban_marker: Option<String>,
}

const MAX_THROTTLE_MS: u64 = 600_000;

impl FetcherConfig {
    /// Parses TOML text and validates it.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed TOML, otherwise see
    /// [`validate`](Self::validate).
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates `path`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`], [`ConfigError::Parse`], or a validation error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Loads the file at [`default_config_path`] if it exists.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load) for an existing file.
    pub fn load_default() -> Result<Option<Self>, ConfigError> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path).map(Some),
            _ => Ok(None),
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// [`ConfigError::OutOfRange`] or [`ConfigError::Throttle`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        validate_throttle_ms("throttle_min_ms", self.throttle_min_ms)?;
        validate_throttle_ms("throttle_max_ms", self.throttle_max_ms)?;
        self.throttle_bounds()?;
        Ok(())
    }

    /// Throttle bounds from the file. A missing maximum equals the minimum.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Throttle`] if the minimum exceeds the maximum.
    pub fn throttle_bounds(&self) -> Result<Option<ThrottleBounds>, ConfigError> {
        let bounds = match (self.throttle_min_ms, self.throttle_max_ms) {
            (None, None) => return Ok(None),
            (Some(min), None) => ThrottleBounds::from_millis(min, min)?,
            (None, Some(max)) => ThrottleBounds::from_millis(0, max)?,
            (Some(min), Some(max)) => ThrottleBounds::from_millis(min, max)?,
        };
        Ok(Some(bounds))
    }

    /// Staleness threshold from the file.
    #[must_use]
    pub fn stale_after(&self) -> Option<Duration> {
        self.stale_after_secs.map(Duration::from_secs)
    }
}

fn validate_timeout_secs(field: &'static str, value: Option<u64>) -> Result<(), ConfigError> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "1..=3600",
        });
    }
    Ok(())
}

fn validate_throttle_ms(field: &'static str, value: Option<u64>) -> Result<(), ConfigError> {
    match value {
        Some(value) if value > MAX_THROTTLE_MS => Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "0..=600000",
        }),
        _ => Ok(()),
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/fetcher/config.toml`
/// 2. `$HOME/.config/fetcher/config.toml`
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    config_path_from(env::var_os("XDG_CONFIG_HOME"), env::var_os("HOME"))
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(xdg) = xdg_config_home.filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(xdg).join("fetcher").join("config.toml"));
    }
    let home = home.filter(|value| !value.is_empty())?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("fetcher")
            .join("config.toml"),
    )
}
