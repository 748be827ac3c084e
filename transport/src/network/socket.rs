#![deny(unsafe_code)]
//! TCP byte-stream socket
//!
//! This module provides `RawSocket`, a thin wrapper around
//! `std::net::TcpStream` that implements the `ByteStream` contract required by
//! the TLS layer. It carries no protocol knowledge.
//!
//! Would-block and receive-timeout outcomes are reported as `Ok(0)`; an
//! orderly close by the peer is reported as `Err(TransportError::Closed)`.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use hal_abstractions::network::{ByteStream, TransportError};
use log::{debug, info, warn};

use super::config::SocketConfig;

/// Wait behavior applied to the underlying stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    NonBlocking,
    Blocking { timeout_ms: u32 },
}

/// TCP socket implementing the `ByteStream` contract
///
/// # Example
///
/// ```no_run
/// use hal_abstractions::ByteStream;
/// use iot_transport::network::{RawSocket, SocketConfig};
///
/// let mut socket = RawSocket::new(SocketConfig::default());
/// socket.connect("192.168.1.1", 8883).unwrap();
/// socket.set_blocking(false, 0).unwrap();
/// let mut buf = [0u8; 64];
/// let _n = socket.receive(&mut buf);
/// ```
#[derive(Debug)]
pub struct RawSocket {
    config: SocketConfig,
    stream: Option<TcpStream>,
    mode: Mode,
    peer_closed: bool,
}

impl RawSocket {
    /// Create a disconnected socket in blocking mode without timeout
    pub fn new(config: SocketConfig) -> Self {
        Self {
            config,
            stream: None,
            mode: Mode::Blocking { timeout_ms: 0 },
            peer_closed: false,
        }
    }

    fn apply_mode(stream: &TcpStream, mode: Mode) -> io::Result<()> {
        match mode {
            Mode::NonBlocking => stream.set_nonblocking(true),
            Mode::Blocking { timeout_ms } => {
                stream.set_nonblocking(false)?;
                let timeout =
                    (timeout_ms > 0).then(|| Duration::from_millis(u64::from(timeout_ms)));
                stream.set_read_timeout(timeout)?;
                stream.set_write_timeout(timeout)
            }
        }
    }
}

impl Default for RawSocket {
    fn default() -> Self {
        Self::new(SocketConfig::default())
    }
}

/// Nothing to do right now; try again later
fn is_idle(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

fn classify(err: &io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::TimedOut => TransportError::Timeout,
        io::ErrorKind::NotConnected => TransportError::NotConnected,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => TransportError::Closed,
        _ => TransportError::Io,
    }
}

impl ByteStream for RawSocket {
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        self.close();

        if host.is_empty() {
            warn!("Connect rejected: empty host name");
            return Err(TransportError::Resolve);
        }

        let addrs = (host, port).to_socket_addrs().map_err(|e| {
            warn!("DNS query for {} failed: {}", host, e);
            TransportError::Resolve
        })?;

        let timeout = Duration::from_millis(u64::from(self.config.connect_timeout_ms.max(1)));
        let mut outcome = TransportError::Resolve;

        for addr in addrs {
            debug!("Resolved {} to {}", host, addr);
            let stream = match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("TCP connect to {} failed: {}", addr, e);
                    outcome = match e.kind() {
                        io::ErrorKind::TimedOut => TransportError::Timeout,
                        _ => TransportError::Connect,
                    };
                    continue;
                }
            };

            if let Err(e) = Self::apply_mode(&stream, self.mode) {
                warn!("Failed to configure socket for {}: {}", addr, e);
                outcome = classify(&e);
                continue;
            }
            if let Err(e) = stream.set_nodelay(true) {
                debug!("TCP_NODELAY not applied: {}", e);
            }

            info!("TCP connection established to {}", addr);
            self.stream = Some(stream);
            self.peer_closed = false;
            return Ok(());
        }

        warn!("Connection to {}:{} failed: {}", host, port, outcome);
        Err(outcome)
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some() && !self.peer_closed
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        if buf.is_empty() {
            return Ok(0);
        }

        match stream.write(buf) {
            Ok(n) => Ok(n),
            Err(e) if is_idle(&e) => Ok(0),
            Err(e) => {
                warn!("Socket send failed: {}", e);
                Err(classify(&e))
            }
        }
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        if buf.is_empty() {
            return Ok(0);
        }

        match stream.read(buf) {
            Ok(0) => {
                if !self.peer_closed {
                    info!("Connection closed by peer");
                }
                self.peer_closed = true;
                Err(TransportError::Closed)
            }
            Ok(n) => Ok(n),
            Err(e) if is_idle(&e) => Ok(0),
            Err(e) => {
                warn!("Socket receive failed: {}", e);
                Err(classify(&e))
            }
        }
    }

    fn set_blocking(&mut self, blocking: bool, timeout_ms: u32) -> Result<(), TransportError> {
        self.mode = if blocking {
            Mode::Blocking { timeout_ms }
        } else {
            Mode::NonBlocking
        };

        if let Some(stream) = self.stream.as_ref() {
            Self::apply_mode(stream, self.mode).map_err(|e| {
                warn!("Failed to change socket mode: {}", e);
                classify(&e)
            })?;
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            // Peer may already have torn the connection down
            let _ = stream.shutdown(Shutdown::Both);
            debug!("Socket closed");
        }
        self.peer_closed = false;
    }
}
