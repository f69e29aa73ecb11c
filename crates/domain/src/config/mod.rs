mod observability;
mod sessions;

pub use observability::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Read a TOML config file.  A missing file yields the defaults so a
    /// fresh checkout runs without any setup.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Fail with [`Error::Config`] when [`validate`](Self::validate)
    /// reports any error-severity issue.  Warnings are logged.
    pub fn ensure_valid(&self) -> Result<()> {
        let mut errors = Vec::new();
        for issue in self.validate() {
            match issue.severity {
                ConfigSeverity::Error => errors.push(issue.to_string()),
                ConfigSeverity::Warning => {
                    tracing::warn!(field = %issue.field, "{}", issue.message);
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(errors.join("; ")))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.sessions;

        if s.max_sessions == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sessions.max_sessions".into(),
                message: "must be at least 1 (every create would fail)".into(),
            });
        }

        if s.timeout_minutes == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sessions.timeout_minutes".into(),
                message: "must be at least 1".into(),
            });
        }

        if s.cleanup_interval_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sessions.cleanup_interval_secs".into(),
                message: "must be at least 1".into(),
            });
        }

        if s.file_name.trim().is_empty() || s.file_name.contains(|c| c == '/' || c == '\\') {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sessions.file_name".into(),
                message: "must be a plain file name".into(),
            });
        }

        if s.cleanup_interval() > s.timeout() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "sessions.cleanup_interval_secs".into(),
                message: "longer than the session timeout; expired sessions will linger".into(),
            });
        }

        if s.max_evictions_per_call == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "sessions.max_evictions_per_call".into(),
                message: "0 disables capacity eviction; a full store rejects every create".into(),
            });
        }

        errors
    }
}
