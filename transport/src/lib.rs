//! Secure non-blocking transport stack for IoT firmware
//!
//! This crate lets a messaging client exchange encrypted byte streams with a
//! remote service from inside a single cooperative control loop. Nothing in it
//! spawns threads or timers; all progress happens in
//! [`AsyncIoAdapter::dowork`](network::AsyncIoAdapter::dowork).
//!
//! Layers, leaf first:
//! - [`RawSocket`](network::RawSocket): TCP byte stream over `std::net`
//! - [`SecureSocket`](network::SecureSocket): TLS session (rustls) over any
//!   [`ByteStream`](hal_abstractions::ByteStream)
//! - [`AsyncIoAdapter`](network::AsyncIoAdapter): callback-driven, poll-based
//!   facade with an ordered outbound queue

#![deny(unsafe_code)]

pub mod network;

pub use network::{
    AdapterConfig, AsyncIoAdapter, ConnectionState, Error, IoEvents, RawSocket, SecureSocket,
    SecureTransport, SendResult,
};
