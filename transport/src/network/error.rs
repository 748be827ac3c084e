#![deny(unsafe_code)]
//! Transport stack error types
//!
//! One tagged error per layer, composed into [`Error`] as faults travel
//! upward:
//! - `TransportError`: socket resolution, connect, read/write, timeout
//! - `HandshakeError`: certificate material, session configuration, handshake
//! - `QueueError`: outbound queue admission
//!
//! `Error::WouldBlock` is not a fault. It means the TLS layer cannot make
//! progress without waiting, and the caller should retry on the next tick.

use core::fmt;

pub use hal_abstractions::network::TransportError;

/// TLS setup and handshake errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError {
    /// Cryptographic random source could not be drawn from
    RandomSource,
    /// Trusted root PEM could not be parsed or added to the store
    RootCertificate,
    /// Trusted root set is empty
    NoTrustedRoots,
    /// Client certificate PEM could not be parsed or is empty
    ClientCertificate,
    /// Client private key PEM could not be parsed
    PrivateKey,
    /// Protocol version, cipher suite or credential configuration rejected
    Configuration,
    /// Host name is not a valid server identity
    ServerName,
    /// Connect attempted before a successful setup
    NotSetUp,
    /// Server certificate failed validation
    CertificateRejected,
    /// Peer sent a fatal alert
    AlertReceived,
    /// Handshake failed for another protocol reason
    Rejected,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RandomSource => write!(f, "Random source unavailable"),
            Self::RootCertificate => write!(f, "Trusted root certificate invalid"),
            Self::NoTrustedRoots => write!(f, "No trusted root certificates"),
            Self::ClientCertificate => write!(f, "Client certificate invalid"),
            Self::PrivateKey => write!(f, "Client private key invalid"),
            Self::Configuration => write!(f, "TLS configuration rejected"),
            Self::ServerName => write!(f, "Invalid server name"),
            Self::NotSetUp => write!(f, "TLS session not set up"),
            Self::CertificateRejected => write!(f, "Server certificate rejected"),
            Self::AlertReceived => write!(f, "TLS alert received"),
            Self::Rejected => write!(f, "TLS handshake failed"),
        }
    }
}

impl core::error::Error for HandshakeError {}

/// Outbound queue admission errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// Every slot in the ring is occupied
    Full,
    /// Message exceeds the per-slot capacity
    MessageTooLarge,
    /// Zero-length messages are never queued
    EmptyMessage,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "Outbound queue full"),
            Self::MessageTooLarge => write!(f, "Message exceeds slot capacity"),
            Self::EmptyMessage => write!(f, "Empty message"),
        }
    }
}

impl core::error::Error for QueueError {}

/// Transport stack error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No progress possible without blocking; retry later
    WouldBlock,
    /// Operation not permitted in the current connection state
    InvalidState,
    /// Socket layer fault
    Transport(TransportError),
    /// TLS setup or handshake fault
    Handshake(HandshakeError),
    /// Outbound queue fault
    Queue(QueueError),
}

impl Error {
    /// Stable non-zero diagnostic code
    ///
    /// The high byte identifies the layer (`0x1` transport, `0x2` handshake,
    /// `0x3` queue), the low byte the variant.
    pub fn code(self) -> i32 {
        match self {
            Self::WouldBlock => 0x01,
            Self::InvalidState => 0x02,
            Self::Transport(err) => 0x100 + transport_index(err),
            Self::Handshake(err) => 0x200 + err as i32 + 1,
            Self::Queue(err) => 0x300 + err as i32 + 1,
        }
    }

    /// Whether the remote side ended the session
    pub fn is_remote_close(self) -> bool {
        matches!(self, Self::Transport(TransportError::Closed))
    }
}

fn transport_index(err: TransportError) -> i32 {
    match err {
        TransportError::Resolve => 1,
        TransportError::Connect => 2,
        TransportError::Timeout => 3,
        TransportError::NotConnected => 4,
        TransportError::Closed => 5,
        TransportError::Io => 6,
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WouldBlock => write!(f, "Operation would block"),
            Self::InvalidState => write!(f, "Invalid connection state"),
            Self::Transport(err) => write!(f, "Transport: {}", err),
            Self::Handshake(err) => write!(f, "Handshake: {}", err),
            Self::Queue(err) => write!(f, "Queue: {}", err),
        }
    }
}

impl core::error::Error for Error {}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

impl From<HandshakeError> for Error {
    fn from(err: HandshakeError) -> Self {
        Self::Handshake(err)
    }
}

impl From<QueueError> for Error {
    fn from(err: QueueError) -> Self {
        Self::Queue(err)
    }
}
