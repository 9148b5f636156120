//! mqtt-wire - MQTT 3.1.1 wire protocol codec.
//!
//! This crate translates between in-memory control packet values and the
//! byte sequences defined by the OASIS MQTT 3.1.1 standard. It is pure:
//! [`encode`] and [`decode`] consume and produce byte buffers, hold no
//! state, and perform no I/O. Transport, session tracking and routing
//! belong to the caller.
//!
//! Decoding consumes a prefix of the input and reports how many bytes it
//! used, so callers can slide their receive buffer and call again for
//! stream framing. A [`DecodeError::Truncated`] result means the buffer
//! does not yet hold a complete packet; every other decode error means the
//! stream is corrupt and the connection should be closed.

pub mod error;
pub mod packet;
pub mod varint;

pub use error::{DecodeError, EncodeError};
pub use packet::*;
