use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::coverage::CoverageConfig;

/// Application-level constants
pub const APP_NAME: &str = "Billsense";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const ENV_MATCH_THRESHOLD: &str = "BILLSENSE_MATCH_THRESHOLD";
pub const ENV_DATE_WINDOW_DAYS: &str = "BILLSENSE_DATE_WINDOW_DAYS";
pub const ENV_DUMP_DIR: &str = "BILLSENSE_DUMP_DIR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },

    #[error("{name} out of range: {value}")]
    OutOfRange { name: String, value: String },

    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Debug builds run in dev mode.
pub fn is_dev() -> bool {
    cfg!(debug_assertions)
}

/// Tracing filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    if is_dev() {
        "billsense=debug"
    } else {
        "billsense=info"
    }
}

/// Get the application data directory
/// ~/Billsense/ on all platforms, the temp dir when no home is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Default diagnostic dump location
pub fn default_dump_dir() -> PathBuf {
    app_data_dir().join("diagnostic")
}

/// Runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillsenseConfig {
    pub coverage: CoverageConfig,
    /// Diagnostic dumps are written only when set.
    pub dump_dir: Option<PathBuf>,
}

impl BillsenseConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `BILLSENSE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from a variable lookup (the environment, or a map in tests).
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup(ENV_MATCH_THRESHOLD) {
            self.coverage.description_threshold =
                raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    name: ENV_MATCH_THRESHOLD.into(),
                    value: raw.clone(),
                })?;
        }
        if let Some(raw) = lookup(ENV_DATE_WINDOW_DAYS) {
            self.coverage.date_window_days =
                raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    name: ENV_DATE_WINDOW_DAYS.into(),
                    value: raw.clone(),
                })?;
        }
        if let Some(raw) = lookup(ENV_DUMP_DIR).filter(|v| !v.trim().is_empty()) {
            self.dump_dir = Some(PathBuf::from(raw));
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.coverage.description_threshold;
        if !t.is_finite() || !(0.0..=1.0).contains(&t) {
            return Err(ConfigError::OutOfRange {
                name: "description_threshold".into(),
                value: t.to_string(),
            });
        }
        Ok(())
    }
}
