//! Device-enforced ranges for every commanded value.
//!
//! Values are checked locally so that a request the PSU would clamp or reject never reaches the wire.
//!
//! The current bounds are the 10 A device-class maximum. 5 A variants (HM305P, RS305P) share
//! them, so a 5 A unit will accept a request up to 10 A here and clamp it itself.

use thiserror::Error;

/// A commanded value outside its [`Limit`].
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("{value} is an invalid {name} (valid range {min}{unit} - {max}{unit})")]
pub struct ValidationError {
    pub name: &'static str,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub unit: &'static str,
}

/// Inclusive acceptable range of one setter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    /// Unit symbol used in error messages.
    pub unit: &'static str,
}

pub const TARGET_VOLTAGE: Limit = Limit::new("target voltage", 0.0, 32.0, "V");
pub const CURRENT_LIMIT: Limit = Limit::new("current limit", 0.0, 10.0, "A");
pub const OVER_VOLTAGE_PROTECTION: Limit = Limit::new("over-voltage protection", 0.0, 33.0, "V");
pub const OVER_CURRENT_PROTECTION: Limit = Limit::new("over-current protection", 0.0, 10.5, "A");
pub const OVER_POWER_PROTECTION: Limit = Limit::new("over-power protection", 0.0, 310.0, "W");

impl Limit {
    pub const fn new(name: &'static str, min: f64, max: f64, unit: &'static str) -> Self {
        Self {
            name,
            min,
            max,
            unit,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        // NaN fails both comparisons.
        value >= self.min && value <= self.max
    }

    /// Return `value` unchanged if it is in range.
    pub fn check(&self, value: f64) -> Result<f64, ValidationError> {
        if self.contains(value) {
            Ok(value)
        } else {
            Err(ValidationError {
                name: self.name,
                value,
                min: self.min,
                max: self.max,
                unit: self.unit,
            })
        }
    }
}
