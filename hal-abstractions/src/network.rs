//! Byte-stream transport contract
//!
//! A `ByteStream` is the lowest layer of the network stack: a connected,
//! ordered stream of bytes with no protocol knowledge. Boards implement it on
//! top of whatever TCP/IP stack they carry; the TLS layer is written against
//! this trait only.
//!
//! # Result conventions
//!
//! | Call | `Ok(0)` | `Ok(n)` | `Err(Closed)` |
//! |------|---------|---------|---------------|
//! | `send` | socket cannot accept bytes right now | `n` bytes written | - |
//! | `receive` | no data available right now | `n` bytes read | peer closed the stream |
//!
//! Idle and remote-close are deliberately different outcomes so that a
//! disconnect is never mistaken for silence.

use core::fmt;

/// Byte-stream transport errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Host name could not be resolved
    Resolve,
    /// Every resolved address refused or failed the connection
    Connect,
    /// Operation exceeded the configured timeout
    Timeout,
    /// Operation requires a connected stream
    NotConnected,
    /// Peer closed the stream
    Closed,
    /// Read or write failure on an established stream
    Io,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve => write!(f, "Host resolution failed"),
            Self::Connect => write!(f, "Connection failed"),
            Self::Timeout => write!(f, "Operation timed out"),
            Self::NotConnected => write!(f, "Socket not connected"),
            Self::Closed => write!(f, "Connection closed by peer"),
            Self::Io => write!(f, "Socket I/O error"),
        }
    }
}

// Implement core::error::Error for no_std compatibility
impl core::error::Error for TransportError {}

impl embedded_io::Error for TransportError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Self::Connect => embedded_io::ErrorKind::ConnectionRefused,
            Self::Timeout => embedded_io::ErrorKind::TimedOut,
            Self::NotConnected => embedded_io::ErrorKind::NotConnected,
            Self::Closed => embedded_io::ErrorKind::BrokenPipe,
            Self::Resolve | Self::Io => embedded_io::ErrorKind::Other,
        }
    }
}

/// Connected byte-stream transport
///
/// Implementors must not block for longer than the mode configured through
/// [`ByteStream::set_blocking`] permits.
pub trait ByteStream {
    /// Resolve `host` and open a stream to `host:port`
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Resolve` when the name does not resolve and
    /// `TransportError::Connect` or `TransportError::Timeout` when no address
    /// accepts the connection. A failed connect leaves the stream disconnected.
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError>;

    /// Whether the stream is open and the peer has not closed it
    fn is_connected(&self) -> bool;

    /// Write as many bytes of `buf` as the stream accepts without blocking
    fn send(&mut self, buf: &[u8]) -> Result<usize, TransportError>;

    /// Write `buf` until it is exhausted or the stream stops accepting bytes
    ///
    /// Returns the number of bytes written, which is short of `buf.len()` only
    /// when the stream would block.
    fn send_all(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        let mut written = 0;
        while written < buf.len() {
            match self.send(&buf[written..])? {
                0 => break,
                n => written += n,
            }
        }
        Ok(written)
    }

    /// Read available bytes into `buf`
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Switch between non-blocking and blocking mode
    ///
    /// In blocking mode `timeout_ms` bounds every read and write; `0` waits
    /// indefinitely. The mode persists across reconnects.
    fn set_blocking(&mut self, blocking: bool, timeout_ms: u32) -> Result<(), TransportError>;

    /// Release the stream. Calling it again is a no-op.
    fn close(&mut self);
}
