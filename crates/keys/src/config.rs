use core::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Lease and reaper timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// Window granted or renewed by each keep-alive, in seconds (default: 5 minutes)
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,

    /// How often the reaper sweeps the store, in seconds (default: 1 minute)
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
}

const fn default_lease_secs() -> u64 {
    300
}

const fn default_reap_interval_secs() -> u64 {
    60
}

/// Longest accepted lease, 100 years.
pub const MAX_LEASE_SECS: u64 = 100 * 365 * 24 * 60 * 60;

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            lease_secs: default_lease_secs(),
            reap_interval_secs: default_reap_interval_secs(),
        }
    }
}

impl LeaseConfig {
    pub fn lease_duration(&self) -> Result<TimeDelta, ConfigError> {
        if self.lease_secs == 0 {
            return Err(ConfigError::ZeroLease);
        }

        if self.lease_secs > MAX_LEASE_SECS {
            return Err(ConfigError::LeaseOutOfRange(self.lease_secs));
        }

        i64::try_from(self.lease_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or(ConfigError::LeaseOutOfRange(self.lease_secs))
    }

    pub const fn reap_interval(&self) -> Result<Duration, ConfigError> {
        if self.reap_interval_secs == 0 {
            return Err(ConfigError::ZeroReapInterval);
        }

        Ok(Duration::from_secs(self.reap_interval_secs))
    }
}
