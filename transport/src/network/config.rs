#![deny(unsafe_code)]
//! Transport configuration structures

use rustls::{CipherSuite, ProtocolVersion, SupportedProtocolVersion};

/// Outbound queue depth (messages)
pub const QUEUE_DEPTH: usize = 8;

/// Per-message capacity of an outbound queue slot (bytes)
pub const MESSAGE_CAPACITY: usize = 2048;

/// Receive-phase scratch buffer size (bytes)
///
/// Bytes arriving in one `dowork` tick are forwarded in chunks of at most
/// this size.
pub const RECEIVE_CHUNK: usize = 256;

/// Longest host name accepted by the adapter (RFC 1035 limit)
pub const HOSTNAME_MAX_LEN: usize = 253;

/// Cipher suites offered during the handshake, in preference order
pub const DEFAULT_CIPHER_SUITES: &[CipherSuite] = &[
    CipherSuite::TLS13_AES_128_GCM_SHA256,
    CipherSuite::TLS13_AES_256_GCM_SHA384,
    CipherSuite::TLS13_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
];

/// Minimum TLS protocol version accepted from the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVersion {
    /// TLS 1.2 and TLS 1.3
    Tls12,
    /// TLS 1.3 only
    Tls13,
}

impl TlsVersion {
    /// Protocol versions enabled by this minimum
    pub fn protocol_versions(self) -> Vec<&'static SupportedProtocolVersion> {
        rustls::ALL_VERSIONS
            .iter()
            .copied()
            .filter(|supported| match self {
                Self::Tls12 => true,
                Self::Tls13 => supported.version == ProtocolVersion::TLSv1_3,
            })
            .collect()
    }
}

/// Raw socket configuration
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Per-address connect timeout in milliseconds
    pub connect_timeout_ms: u32,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
        }
    }
}

/// TLS session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Minimum protocol version
    pub min_version: TlsVersion,
    /// Cipher suite allow-list; suites the crypto provider lacks are skipped
    pub cipher_suites: &'static [CipherSuite],
    /// Receive timeout applied while the socket is in blocking mode
    /// (connect and handshake), in milliseconds
    pub receive_timeout_ms: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_version: TlsVersion::Tls12,
            cipher_suites: DEFAULT_CIPHER_SUITES,
            receive_timeout_ms: 10_000,
        }
    }
}

/// Async I/O adapter configuration
///
/// Certificate material is expected to be compiled into the firmware image
/// (`include_bytes!`), hence the `'static` borrows.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Server hostname (for DNS and certificate validation)
    pub hostname: &'static str,
    /// Server port (typically 8883 for MQTTS)
    pub port: u16,
    /// PEM-encoded trusted root certificates
    pub trusted_roots: &'static [u8],
    /// Raw socket settings
    pub socket: SocketConfig,
    /// TLS session settings
    pub session: SessionConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost",
            port: 8883,
            trusted_roots: &[],
            socket: SocketConfig::default(),
            session: SessionConfig::default(),
        }
    }
}
