//! Ledger configuration
//!
//! Values come from built-in defaults, an optional TOML file and `QUAY_*`
//! environment overrides, applied in that order and validated last.

use crate::{QuayError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "QUAY_";

/// Default hard ceiling on log entries a single operation may examine
pub const DEFAULT_MAX_SCAN_CAP: u64 = 1024;

/// Default upper bound on a group's lease duration (one day)
pub const DEFAULT_MAX_LEASE_DURATION_SECS: u64 = 86_400;

/// What happens to a message after `skip` or retry exhaustion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipPolicy {
    /// The message is resolved for the group and never delivered to it again
    #[default]
    Permanent,
    /// The message is parked for one lease duration, then becomes eligible again
    Deferred,
}

impl fmt::Display for SkipPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permanent => f.write_str("permanent"),
            Self::Deferred => f.write_str("deferred"),
        }
    }
}

impl FromStr for SkipPolicy {
    type Err = QuayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permanent" => Ok(Self::Permanent),
            "deferred" => Ok(Self::Deferred),
            other => Err(QuayError::invalid(format!("Unknown skip policy: {other}"))),
        }
    }
}

/// Configuration for a ledger instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Hard ceiling on entries examined by one `get_next`, whatever `max_scan` says
    pub max_scan_cap: u64,
    /// Largest lease duration a group may be created with
    pub max_lease_duration_secs: u64,
    /// Skip semantics
    pub skip_policy: SkipPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_scan_cap: DEFAULT_MAX_SCAN_CAP,
            max_lease_duration_secs: DEFAULT_MAX_LEASE_DURATION_SECS,
            skip_policy: SkipPolicy::Permanent,
        }
    }
}

impl LedgerConfig {
    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            QuayError::not_found(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply overrides from the process environment
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `QUAY_*` overrides from an arbitrary key/value source
    pub fn merge_with_vars<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "MAX_SCAN_CAP" => self.max_scan_cap = parse_u64(&key, &value)?,
                "MAX_LEASE_DURATION_SECS" => {
                    self.max_lease_duration_secs = parse_u64(&key, &value)?;
                }
                "SKIP_POLICY" => self.skip_policy = value.parse()?,
                _ => tracing::debug!(key = %key, "ignoring unknown configuration override"),
            }
        }
        Ok(())
    }

    /// Check invariants between fields
    pub fn validate(&self) -> Result<()> {
        if self.max_scan_cap == 0 {
            return Err(QuayError::invalid("max_scan_cap must be greater than zero"));
        }
        if self.max_lease_duration_secs == 0 {
            return Err(QuayError::invalid(
                "max_lease_duration_secs must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Defaults, then `path` if given, then the environment; validated
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| QuayError::invalid(format!("{key}={value}: {e}")))
}
