//! Links to the PSU and how they are chosen.
//!
//! The controller only needs two primitives, read a block of holding registers and write one
//! register, so that is all [`RegisterTransport`] asks for. [`RtuLink`] provides both over any
//! byte stream; [`SystemConnector`] opens the stream from a [`ConnectionTarget`].

use core::fmt;
use core::str::FromStr;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use crate::error::{Error, LinkError};
use crate::rtu::RtuLink;

/// Serial link parameters. Fixed by the device.
pub const SERIAL_BAUD_RATE: u32 = 9600;
pub const SERIAL_DATA_BITS: DataBits = DataBits::Eight;
pub const SERIAL_STOP_BITS: StopBits = StopBits::One;
pub const SERIAL_PARITY: Parity = Parity::None;

/// Response timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Blocking access to the PSU's holding registers.
///
/// One request is in flight at a time; implementations return only once the response has
/// arrived, the timeout has elapsed or the link has failed.
pub trait RegisterTransport {
    /// Read `count` consecutive holding registers starting at `start`.
    fn read_holding_registers(
        &mut self,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, LinkError>;

    /// Write a single holding register.
    fn write_single_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), LinkError>;
}

/// Owned, type-erased transport as held by a session.
pub type BoxedTransport = Box<dyn RegisterTransport + Send>;

/// Where the PSU is reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ConnectionTarget {
    /// Local serial device, e.g. `/dev/ttyUSB0` or `COM3`.
    Serial(String),
    /// Esp-Link style bridge relaying RTU frames over TCP.
    Tcp { host: String, port: u16 },
}

impl ConnectionTarget {
    pub fn serial(path: impl Into<String>) -> Self {
        Self::Serial(path.into())
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Which kind of link this target needs.
    pub fn kind(&self) -> TransportKind {
        match self {
            ConnectionTarget::Tcp { .. } => TransportKind::TcpTunnel,
            ConnectionTarget::Serial(_) => TransportKind::Serial,
        }
    }
}

impl From<(&str, u16)> for ConnectionTarget {
    fn from((host, port): (&str, u16)) -> Self {
        Self::tcp(host, port)
    }
}

impl FromStr for ConnectionTarget {
    type Err = Error;

    /// `host:port` selects a TCP bridge, anything without a `:` is a serial device path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Configuration("empty connection target".into()));
        }

        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [path] => Ok(Self::serial(*path)),
            [host, port] => {
                if host.is_empty() {
                    return Err(Error::Configuration(format!("missing host in '{s}'")));
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|_| Error::Configuration(format!("invalid TCP port in '{s}'")))?;
                Ok(Self::tcp(*host, port))
            }
            _ => Err(Error::Configuration(format!(
                "unrecognised connection target '{s}', expected a serial port or host:port"
            ))),
        }
    }
}

impl TryFrom<String> for ConnectionTarget {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConnectionTarget> for String {
    fn from(value: ConnectionTarget) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionTarget::Serial(path) => write!(f, "{path}"),
            ConnectionTarget::Tcp { host, port } => write!(f, "{host}:{port}"),
        }
    }
}

/// The two physical carriers of the RTU byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Local serial port at 9600-8N1.
    Serial,
    /// RTU frames tunnelled over a TCP socket.
    TcpTunnel,
}

/// Opens the transport for a target. Swapped out in tests.
pub trait Connector {
    fn open(
        &self,
        target: &ConnectionTarget,
        timeout: Duration,
    ) -> Result<BoxedTransport, LinkError>;
}

/// Opens real serial ports and TCP sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemConnector;

impl SystemConnector {
    fn open_serial(path: &str, timeout: Duration) -> Result<BoxedTransport, LinkError> {
        let port = serialport::new(path, SERIAL_BAUD_RATE)
            .data_bits(SERIAL_DATA_BITS)
            .stop_bits(SERIAL_STOP_BITS)
            .parity(SERIAL_PARITY)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()?;
        debug!(path, baud = SERIAL_BAUD_RATE, "opened serial port");
        let link: RtuLink<_> = RtuLink::new(StdStream(port));
        Ok(Box::new(link))
    }

    fn open_tcp(host: &str, port: u16, timeout: Duration) -> Result<BoxedTransport, LinkError> {
        let mut last_error = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    stream.set_nodelay(true)?;
                    debug!(%addr, "opened TCP bridge");
                    let link: RtuLink<_> = RtuLink::new(StdStream(stream));
                    return Ok(Box::new(link));
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error
            .unwrap_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    format!("{host} did not resolve to any address"),
                )
            })
            .into())
    }
}

impl Connector for SystemConnector {
    fn open(
        &self,
        target: &ConnectionTarget,
        timeout: Duration,
    ) -> Result<BoxedTransport, LinkError> {
        match target {
            ConnectionTarget::Serial(path) => Self::open_serial(path, timeout),
            ConnectionTarget::Tcp { host, port } => Self::open_tcp(host, *port, timeout),
        }
    }
}

/// Adapts a `std::io` stream (serial port, TCP socket) to `embedded_io`.
pub struct StdStream<T>(pub T);

#[derive(Debug)]
pub struct IoError(pub std::io::Error);

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        use embedded_io::ErrorKind as Kind;
        use std::io::ErrorKind as StdKind;

        match self.0.kind() {
            StdKind::NotFound => Kind::NotFound,
            StdKind::PermissionDenied => Kind::PermissionDenied,
            StdKind::ConnectionRefused => Kind::ConnectionRefused,
            StdKind::ConnectionReset => Kind::ConnectionReset,
            StdKind::ConnectionAborted => Kind::ConnectionAborted,
            StdKind::NotConnected => Kind::NotConnected,
            StdKind::AddrInUse => Kind::AddrInUse,
            StdKind::AddrNotAvailable => Kind::AddrNotAvailable,
            StdKind::BrokenPipe => Kind::BrokenPipe,
            StdKind::AlreadyExists => Kind::AlreadyExists,
            StdKind::InvalidInput => Kind::InvalidInput,
            StdKind::InvalidData => Kind::InvalidData,
            // Socket read timeouts surface as WouldBlock on unix.
            StdKind::TimedOut | StdKind::WouldBlock => Kind::TimedOut,
            StdKind::Interrupted => Kind::Interrupted,
            StdKind::Unsupported => Kind::Unsupported,
            StdKind::OutOfMemory => Kind::OutOfMemory,
            _ => Kind::Other,
        }
    }
}

impl<T> embedded_io::ErrorType for StdStream<T> {
    type Error = IoError;
}

impl<T: std::io::Read> embedded_io::Read for StdStream<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(IoError)
    }
}

impl<T: std::io::Write> embedded_io::Write for StdStream<T> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

impl embedded_io::ReadReady for StdStream<Box<dyn SerialPort>> {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        let pending = self.0.bytes_to_read().map_err(|e| IoError(e.into()))?;
        Ok(pending > 0)
    }
}

impl embedded_io::ReadReady for StdStream<TcpStream> {
    /// Peeks without blocking. A closed socket reports not ready; the next read sees the close.
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        self.0.set_nonblocking(true).map_err(IoError)?;
        let mut peeked = [0u8; 1];
        let ready = match self.0.peek(&mut peeked) {
            Ok(n) => Ok(n > 0),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(IoError(e)),
        };
        self.0.set_nonblocking(false).map_err(IoError)?;
        ready
    }
}
