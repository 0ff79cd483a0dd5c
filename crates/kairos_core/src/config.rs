//! Engine configuration.
//!
//! # Invariants
//! - `forward_scan_limit` is at least 1.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_FORWARD_SCAN_LIMIT: usize = 512;

/// Tunables for the recurrence and dashboard engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Zone used for floating times and for presenting creation instants.
    pub default_timezone: Tz,
    /// Upper bound on future instances inspected while looking for the
    /// next LATER instance of a series.
    pub forward_scan_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timezone: Tz::UTC,
            forward_scan_limit: DEFAULT_FORWARD_SCAN_LIMIT,
        }
    }
}

impl EngineConfig {
    pub fn with_timezone(default_timezone: Tz) -> Self {
        Self {
            default_timezone,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.forward_scan_limit == 0 {
            return Err(ConfigError::ZeroScanLimit);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("forward_scan_limit must be at least 1")]
    ZeroScanLimit,
}
