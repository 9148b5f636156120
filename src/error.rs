//! Error types for the MQTT wire codec.

use thiserror::Error;

use crate::packet::PacketType;

/// Errors produced while decoding bytes into a packet.
///
/// [`DecodeError::Truncated`] is the only retryable value: the caller may
/// accumulate more bytes and decode again. Any other value means the byte
/// stream is corrupt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("incomplete packet, more bytes required")]
    Truncated,

    #[error("remaining length exceeds 4 bytes")]
    MalformedLength,

    #[error("reserved packet type: {0}")]
    ReservedPacketType(u8),

    #[error("invalid fixed header flags {flags:#06b} for {packet_type:?}")]
    MalformedFixedHeader { packet_type: PacketType, flags: u8 },

    #[error("string field is not valid UTF-8")]
    BadUtf8,

    #[error("{0} bytes left over after packet body")]
    TrailingBytes(usize),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

/// Errors produced while encoding a packet into bytes.
///
/// Nothing is written to the output buffer when encoding fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("string field is {0} bytes, maximum is 65535")]
    StringTooLong(usize),

    #[error("encoded body is {0} bytes, exceeding the maximum remaining length")]
    PayloadTooLarge(usize),

    #[error("invalid packet: {0}")]
    InvalidPacket(String),
}
