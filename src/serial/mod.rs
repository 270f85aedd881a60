//! Serial port session and the count streaming loop.
//!
//! This module provides functionality for:
//! - Opening a geiger counter's serial port with explicit settings
//! - Reading fixed-size chunks with timeout and interrupt handling
//! - Streaming extracted readings to stdout
//! - Listing candidate serial ports

pub mod port;
pub mod stream;

pub use port::{Parity, PortConfig, PortError, SerialConnection, StopBits};
pub use stream::{run_stream, StreamConfig};
