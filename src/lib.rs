//! This crate provides an interface for communicating with and controlling the ETommens eTM-xxxxP series of
//! programmable bench power supplies.
//!
//! PSU models which this should work with:
//! * Hanmatek HM305P
//! * Hanmatek HM310P
//! * Rockseed RS305P
//! * Rockseed RS310P
//! * Rockseed RS605P
//!
//! It uses Modbus RTU under the hood, either over a local serial port or tunnelled over TCP through an
//! Esp-Link style bridge.
//!
//! The serial port is always configured like so:
//! * Baud rate: 9600
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//!
//! ```no_run
//! use etm_psu::{ConnectionTarget, EtmPsu};
//! use std::time::Duration;
//!
//! let psu = EtmPsu::new(1);
//! psu.connect(&"192.168.1.50:8899".parse::<ConnectionTarget>()?, Duration::from_secs(2))?;
//! psu.set_voltage(5.0)?;
//! psu.set_output(true)?;
//! println!("{:?}", psu.get_output_stats()?);
//! # Ok::<(), etm_psu::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod limits;
pub mod psu;
pub mod register;
pub mod rtu;
pub mod scaling;
pub mod transport;

#[cfg(test)]
mod mock_serial;
#[cfg(test)]
mod mock_transport;

pub use config::PsuConfig;
pub use error::{Error, LinkError, Result};
pub use limits::ValidationError;
pub use psu::{EtmPsu, OutputStats, ProtectionValues, SessionState};
pub use register::{ProtectionFlags, PsuRegister, State};
pub use transport::{ConnectionTarget, Connector, RegisterTransport, SystemConnector, TransportKind};
