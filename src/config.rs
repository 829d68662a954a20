//! Connection settings for a PSU session.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::psu::{DEFAULT_UNIT_ID, check_unit_id};
use crate::transport::{ConnectionTarget, DEFAULT_TIMEOUT};

pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";

/// Everything needed to open a session with [`EtmPsu::open`](crate::psu::EtmPsu::open).
///
/// Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsuConfig {
    /// Serial device path, or `host:port` of a TCP bridge.
    pub target: ConnectionTarget,
    pub unit_id: u8,
    /// Response timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for PsuConfig {
    fn default() -> Self {
        Self {
            target: ConnectionTarget::serial(DEFAULT_SERIAL_PORT),
            unit_id: DEFAULT_UNIT_ID,
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl PsuConfig {
    pub fn new(target: ConnectionTarget) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::Configuration("timeout must be greater than 0".into()));
        }
        check_unit_id(self.unit_id)
    }
}
