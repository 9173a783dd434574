//! Configuration via `tandem.toml`
//!
//! On first start a default `tandem.toml` with comments is written; to change
//! settings, edit the file and restart. Every field has a default, so an
//! empty file (or a missing section) is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tandem_core::{TandemError, TandemResult};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "tandem.toml";

/// `[consistency]` section: periodic scans
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsistencyConfig {
    /// Seconds between monitor sweeps (default: 300)
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Repair every unresolved issue after each sweep (default: false)
    #[serde(default)]
    pub auto_repair: bool,
}

fn default_check_interval_secs() -> u64 {
    300
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            auto_repair: false,
        }
    }
}

impl ConsistencyConfig {
    /// Sweep interval as a Duration
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// `[history]` section: retrieval limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryConfig {
    /// Entries returned by history queries without an explicit limit (default: 100)
    #[serde(default = "default_history_limit")]
    pub default_limit: usize,
}

fn default_history_limit() -> usize {
    100
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_history_limit(),
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset (default: "info")
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Colored output (default: true)
    #[serde(default = "default_ansi")]
    pub ansi: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

fn default_ansi() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            ansi: default_ansi(),
        }
    }
}

/// Configuration loaded from `tandem.toml`
///
/// # Example
///
/// ```toml
/// [consistency]
/// check_interval_secs = 300
/// auto_repair = false
///
/// [history]
/// default_limit = 100
///
/// [logging]
/// filter = "info,tandem_concurrency=debug"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TandemConfig {
    /// Periodic scan settings
    #[serde(default)]
    pub consistency: ConsistencyConfig,
    /// History retrieval settings
    #[serde(default)]
    pub history: HistoryConfig,
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TandemConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Tandem configuration

[consistency]
# Seconds between background consistency sweeps (default: 300)
check_interval_secs = 300
# Repair every unresolved issue after each sweep (default: false)
auto_repair = false

[history]
# Transactions and repair results returned when no limit is given
default_limit = 100

[logging]
# Log filter used when RUST_LOG is unset, e.g. "info,tandem_concurrency=debug"
filter = "info"
ansi = true
"#
    }

    /// Reject values the services cannot run with
    ///
    /// # Errors
    ///
    /// `Config` for a zero check interval or a zero history limit.
    pub fn validate(&self) -> TandemResult<()> {
        if self.consistency.check_interval_secs == 0 {
            return Err(TandemError::Config(
                "consistency.check_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.history.default_limit == 0 {
            return Err(TandemError::Config(
                "history.default_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse config from a TOML string
    pub fn from_toml_str(content: &str) -> TandemResult<Self> {
        let config: TandemConfig = toml::from_str(content)
            .map_err(|e| TandemError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> TandemResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TandemError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: TandemConfig = toml::from_str(&content).map_err(|e| {
            TandemError::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> TandemResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                TandemError::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> TandemResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TandemError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            TandemError::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
