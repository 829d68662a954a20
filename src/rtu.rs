//! Modbus RTU request/response over a byte stream.
//!
//! Framing, CRC and exception decoding are done by `rmodbus`; this module only moves the bytes.
//! The same framing is used on a serial port and on an Esp-Link TCP bridge.

use rmodbus::{ModbusProto, client::ModbusRequest, guess_response_frame_len};
use tracing::{debug, trace};

use crate::error::LinkError;
use crate::transport::RegisterTransport;

/// Unit id, function code and first payload byte: enough to size any RTU response.
const RESPONSE_HEADER_LEN: usize = 3;

/// Byte stream an [`RtuLink`] can drive.
pub trait RtuStream: embedded_io::Read + embedded_io::Write + embedded_io::ReadReady {}

impl<S: embedded_io::Read + embedded_io::Write + embedded_io::ReadReady> RtuStream for S {}

/// Holding register access over any interface implementing [`embedded_io::Read`],
/// [`embedded_io::Write`] & [`embedded_io::ReadReady`].
///
/// `L` is the frame buffer length in bytes.
pub struct RtuLink<S: RtuStream, const L: usize = 128> {
    interface: S,
}

impl<S: RtuStream, const L: usize> RtuLink<S, L> {
    pub fn new(interface: S) -> Self {
        Self { interface }
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.interface
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.interface
    }

    /// Throw away bytes already waiting on the line, e.g. a late reply to a timed-out request.
    ///
    /// RTU replies do not carry the register address, so a leftover frame would otherwise be
    /// taken as the answer to the next request.
    fn discard_pending(&mut self) -> Result<(), LinkError> {
        let mut scratch = [0u8; L];
        let mut discarded = 0;
        while self
            .interface
            .read_ready()
            .map_err(LinkError::from_stream)?
        {
            let read = self
                .interface
                .read(&mut scratch)
                .map_err(LinkError::from_stream)?;
            if read == 0 {
                break;
            }
            discarded += read;
        }
        if discarded > 0 {
            debug!(discarded, "discarded stale bytes before request");
        }
        Ok(())
    }

    /// Send one request frame and collect exactly one response frame into `response`.
    ///
    /// Returns the response length.
    fn exchange(&mut self, request: &[u8], response: &mut [u8; L]) -> Result<usize, LinkError> {
        self.discard_pending()?;

        trace!(frame = ?request, "tx");
        self.interface
            .write_all(request)
            .map_err(LinkError::from_stream)?;
        self.interface.flush().map_err(LinkError::from_stream)?;

        // Read only as many bytes as the frame needs so a following response is never consumed.
        let mut filled = 0;
        let mut expected = RESPONSE_HEADER_LEN;
        let mut sized = false;
        while filled < expected {
            let read = self
                .interface
                .read(&mut response[filled..expected])
                .map_err(LinkError::from_stream)?;
            if read == 0 {
                return Err(LinkError::ConnectionClosed);
            }
            filled += read;

            if !sized && filled >= RESPONSE_HEADER_LEN {
                expected = guess_response_frame_len(&response[..filled], ModbusProto::Rtu)? as usize;
                if expected > L {
                    return Err(LinkError::BufferError);
                }
                sized = true;
            }
        }

        trace!(frame = ?&response[..filled], "rx");
        Ok(filled)
    }
}

impl<S: RtuStream, const L: usize> RegisterTransport for RtuLink<S, L> {
    fn read_holding_registers(
        &mut self,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, LinkError> {
        let mut request: heapless::Vec<u8, L> = heapless::Vec::new();
        let mut req = ModbusRequest::new(unit_id, ModbusProto::Rtu);
        req.generate_get_holdings(start, count, &mut request)?;

        let mut response = [0u8; L];
        let len = self.exchange(&request, &mut response)?;

        let mut values: heapless::Vec<u16, L> = heapless::Vec::new();
        req.parse_u16(&response[..len], &mut values)?;
        if values.len() != count as usize {
            return Err(LinkError::InvalidResponse);
        }
        Ok(values.to_vec())
    }

    fn write_single_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), LinkError> {
        let mut request: heapless::Vec<u8, L> = heapless::Vec::new();
        let mut req = ModbusRequest::new(unit_id, ModbusProto::Rtu);
        req.generate_set_holding(address, value, &mut request)?;

        let mut response = [0u8; L];
        let len = self.exchange(&request, &mut response)?;

        req.parse_ok(&response[..len])?;
        // A successful write echoes the request frame.
        if response[..len] != request[..] {
            return Err(LinkError::InvalidResponse);
        }
        Ok(())
    }
}
