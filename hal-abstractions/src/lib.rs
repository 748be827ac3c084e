//! Hardware abstraction traits for IoT firmware
//!
//! Traits here describe what the upper layers need from a board without
//! naming its network stack or peripherals. Board and host crates implement
//! them.
//!
//! - **`network`**: the byte-stream contract every transport socket provides

#![no_std]
#![deny(unsafe_code)]

pub mod network;

pub use network::{ByteStream, TransportError};
