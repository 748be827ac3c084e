//! Network module: layered secure transport
//!
//! This module provides the transport stack used by the messaging client:
//! - **`adapter`**: `AsyncIoAdapter` state machine and `IoEvents` callbacks
//! - **`config`**: Configuration structs with `Default` implementations
//! - **`error`**: Tagged error types for the transport, handshake and queue layers
//! - **`options`**: Named session options forwarded into the TLS layer
//! - **`queue`**: Fixed-capacity outbound message ring
//! - **`socket`**: `RawSocket` byte stream over `std::net`
//! - **`tls`**: `SecureSocket` TLS session over any `ByteStream`
//!
//! ## Threading
//!
//! None of these types are meant to be shared between threads. Every
//! operation takes `&mut self`, and the adapter relies on being driven from a
//! single control loop that calls `dowork` repeatedly.

pub mod adapter;
pub mod config;
pub mod error;
pub mod options;
pub mod queue;
pub mod socket;
pub mod tls;

// Re-export commonly used types
pub use adapter::{AsyncIoAdapter, ConnectionState, IoEvents, SendResult};
pub use config::{AdapterConfig, SessionConfig, SocketConfig, TlsVersion};
pub use error::{Error, HandshakeError, QueueError, TransportError};
pub use options::{OptionSet, OPTION_CLIENT_CERTIFICATE};
pub use socket::RawSocket;
pub use tls::{SecureSocket, SecureTransport};
