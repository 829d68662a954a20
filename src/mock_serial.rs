//! We use this mocking module in unit tests to emulate the PSU end of a serial line.

use std::collections::VecDeque;

use thiserror::Error;

/// Byte-level stand-in for a serial port or TCP bridge.
///
/// Bytes given to [`MockSerial::set_read_data`] are already waiting on the line. Frames given to
/// [`MockSerial::push_reply`] arrive one per request, when the request is flushed.
/// Everything written is recorded.
#[derive(Default)]
pub struct MockSerial {
    /// Everything the link has sent.
    write_buffer: Vec<u8>,
    /// Bytes that have arrived and can be read, in order.
    read_buffer: Vec<u8>,
    read_position: usize,
    /// Replies still to arrive, one per flushed request.
    replies: VecDeque<Vec<u8>>,
    should_error_on_write: bool,
    /// Error returned by every read while set.
    read_error: Option<MockSerialError>,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockSerialError {
    /// Simulated response timeout.
    #[error("simulated timeout")]
    Timeout,
    /// Simulated framing/line noise error.
    #[error("simulated invalid data")]
    InvalidData,
    /// Generic simulated error for testing.
    #[error("simulated error")]
    SimulatedError,
    /// No data has arrived.
    #[error("no data available")]
    WouldBlock,
}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::InvalidData => embedded_io::ErrorKind::InvalidData,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::Other,
            MockSerialError::WouldBlock => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        self.write_buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        if let Some(reply) = self.replies.pop_front() {
            self.read_buffer.extend_from_slice(&reply);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if let Some(err) = self.read_error {
            return Err(err);
        }

        let remaining = &self.read_buffer[self.read_position..];
        if remaining.is_empty() {
            return Err(MockSerialError::WouldBlock);
        }

        let n = buf.len().min(remaining.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.read_position += n;
        Ok(n)
    }
}

impl embedded_io::ReadReady for MockSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.unread() > 0)
    }
}

impl MockSerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the bytes waiting on the line and rewind.
    pub fn set_read_data(&mut self, data: &[u8]) {
        self.read_buffer = data.to_vec();
        self.read_position = 0;
    }

    /// Queue a frame that arrives once the next request is flushed.
    pub fn push_reply(&mut self, frame: &[u8]) {
        self.replies.push_back(frame.to_vec());
    }

    /// Everything written to the port so far.
    pub fn written_data(&self) -> &[u8] {
        &self.write_buffer
    }

    /// Number of arrived bytes not yet read.
    pub fn unread(&self) -> usize {
        self.read_buffer.len() - self.read_position
    }

    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    pub fn set_read_error(&mut self, error: Option<MockSerialError>) {
        self.read_error = error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, Read, ReadReady, Write};

    #[test]
    fn test_write_is_recorded() {
        let mut mock = MockSerial::new();
        mock.write_all(&[0x01, 0x03]).unwrap();
        mock.write_all(&[0x00, 0x10]).unwrap();
        assert_eq!(mock.written_data(), &[0x01, 0x03, 0x00, 0x10]);
    }

    #[test]
    fn test_read_in_pieces() {
        let mut mock = MockSerial::new();
        mock.set_read_data(&[1, 2, 3, 4, 5]);

        let mut head = [0u8; 3];
        assert_eq!(mock.read(&mut head).unwrap(), 3);
        assert_eq!(head, [1, 2, 3]);
        assert_eq!(mock.unread(), 2);

        let mut tail = [0u8; 8];
        assert_eq!(mock.read(&mut tail).unwrap(), 2);
        assert_eq!(&tail[..2], &[4, 5]);

        assert_eq!(mock.read(&mut tail), Err(MockSerialError::WouldBlock));
    }

    #[test]
    fn test_replies_arrive_on_flush() {
        let mut mock = MockSerial::new();
        mock.push_reply(&[0xAA]);
        mock.push_reply(&[0xBB, 0xCC]);
        assert!(!mock.read_ready().unwrap());

        mock.write_all(&[0x01]).unwrap();
        mock.flush().unwrap();
        assert!(mock.read_ready().unwrap());
        let mut buffer = [0u8; 4];
        assert_eq!(mock.read(&mut buffer).unwrap(), 1);
        assert_eq!(buffer[0], 0xAA);
        assert!(!mock.read_ready().unwrap());

        mock.flush().unwrap();
        assert_eq!(mock.read(&mut buffer).unwrap(), 2);
        assert_eq!(&buffer[..2], &[0xBB, 0xCC]);
    }

    #[test]
    fn test_set_read_data_replaces_previous() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"first");
        mock.set_read_data(b"second");

        let mut buffer = [0u8; 10];
        assert_eq!(mock.read(&mut buffer).unwrap(), 6);
        assert_eq!(&buffer[..6], b"second");
    }

    #[test]
    fn test_error_simulation() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"data");

        mock.set_write_error(true);
        assert!(mock.write(b"x").is_err());
        assert!(mock.flush().is_err());
        assert!(mock.written_data().is_empty());

        mock.set_read_error(Some(MockSerialError::Timeout));
        let mut buffer = [0u8; 4];
        let err = mock.read(&mut buffer).unwrap_err();
        assert_eq!(err.kind(), embedded_io::ErrorKind::TimedOut);

        mock.set_read_error(None);
        assert_eq!(mock.read(&mut buffer).unwrap(), 4);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(MockSerialError::InvalidData.kind(), embedded_io::ErrorKind::InvalidData);
        assert_eq!(MockSerialError::SimulatedError.kind(), embedded_io::ErrorKind::Other);
        assert_eq!(MockSerialError::WouldBlock.kind(), embedded_io::ErrorKind::Other);
        assert_eq!(MockSerialError::Timeout.to_string(), "simulated timeout");
    }
}
