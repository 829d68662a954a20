//! Our error types for the eTM-xxxxP PSUs.

use thiserror::Error;

use crate::limits::ValidationError;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors returned by the [`EtmPsu`](crate::psu::EtmPsu) facade.
#[derive(Error, Debug)]
pub enum Error {
    /// The commanded value is outside the range the device accepts. Nothing was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Not connected to the PSU")]
    NotConnected,
    /// A register transfer failed. `address` is the register the failed request targeted.
    #[error("Register 0x{address:04X} transfer failed: {source}")]
    Transport {
        address: u16,
        #[source]
        source: LinkError,
    },
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: LinkError,
    },
}

/// Failures raised by the link underneath the controller.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serial communication error: {0:?}")]
    Serial(embedded_io::ErrorKind),
    /// Covers CRC failures as well as exception codes returned by the device.
    #[error("Modbus protocol error: {0}")]
    Modbus(rmodbus::ErrorKind),
    #[error("Communication timeout")]
    Timeout,
    #[error("Connection closed by peer")]
    ConnectionClosed,
    #[error("Response does not fit the frame buffer")]
    BufferError,
    #[error("Invalid response received")]
    InvalidResponse,
}

impl From<rmodbus::ErrorKind> for LinkError {
    fn from(err: rmodbus::ErrorKind) -> Self {
        LinkError::Modbus(err)
    }
}

impl From<serialport::Error> for LinkError {
    fn from(err: serialport::Error) -> Self {
        LinkError::Io(err.into())
    }
}

impl LinkError {
    /// Map an `embedded_io` stream error onto a link error.
    pub(crate) fn from_stream<E: embedded_io::Error>(err: E) -> Self {
        match err.kind() {
            embedded_io::ErrorKind::TimedOut => LinkError::Timeout,
            kind => LinkError::Serial(kind),
        }
    }
}
