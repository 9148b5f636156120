//! MQTT 3.1.1 packet types and codec.
//!
//! [`decode`] and [`encode`] are symmetric: every packet accepted by
//! [`encode`] decodes back to an equal value, and each variant's fields are
//! read and written in the canonical order the OASIS standard defines.

use bytes::Bytes;

use crate::error::{DecodeError, EncodeError};
use crate::varint;

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;

/// MQTT Control Packet Types (4 bits).
///
/// The raw values 0 and 15 are reserved by the standard and rejected on
/// decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::Connack),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::Puback),
            5 => Ok(PacketType::Pubrec),
            6 => Ok(PacketType::Pubrel),
            7 => Ok(PacketType::Pubcomp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::Suback),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::Unsuback),
            12 => Ok(PacketType::Pingreq),
            13 => Ok(PacketType::Pingresp),
            14 => Ok(PacketType::Disconnect),
            _ => Err(DecodeError::ReservedPacketType(value)),
        }
    }
}

/// Quality of Service levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
#[allow(clippy::enum_variant_names)] // MQTT spec names
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(DecodeError::ProtocolViolation(format!(
                "invalid QoS: {}",
                value
            ))),
        }
    }
}

/// CONNACK return codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectReturnCode {
    Accepted = 0,
    UnacceptableProtocolVersion = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadUsernamePassword = 4,
    NotAuthorized = 5,
}

impl TryFrom<u8> for ConnectReturnCode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ConnectReturnCode::Accepted),
            1 => Ok(ConnectReturnCode::UnacceptableProtocolVersion),
            2 => Ok(ConnectReturnCode::IdentifierRejected),
            3 => Ok(ConnectReturnCode::ServerUnavailable),
            4 => Ok(ConnectReturnCode::BadUsernamePassword),
            5 => Ok(ConnectReturnCode::NotAuthorized),
            _ => Err(DecodeError::ProtocolViolation(format!(
                "reserved connect return code: {}",
                value
            ))),
        }
    }
}

/// SUBACK return codes: the granted QoS per filter, or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscribeReturnCode {
    SuccessQos0 = 0x00,
    SuccessQos1 = 0x01,
    SuccessQos2 = 0x02,
    Failure = 0x80,
}

impl TryFrom<u8> for SubscribeReturnCode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(SubscribeReturnCode::SuccessQos0),
            0x01 => Ok(SubscribeReturnCode::SuccessQos1),
            0x02 => Ok(SubscribeReturnCode::SuccessQos2),
            0x80 => Ok(SubscribeReturnCode::Failure),
            _ => Err(DecodeError::ProtocolViolation(format!(
                "invalid subscribe return code: {:#04x}",
                value
            ))),
        }
    }
}

impl From<QoS> for SubscribeReturnCode {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => SubscribeReturnCode::SuccessQos0,
            QoS::AtLeastOnce => SubscribeReturnCode::SuccessQos1,
            QoS::ExactlyOnce => SubscribeReturnCode::SuccessQos2,
        }
    }
}

fn set_bit(byte: u8, mask: u8, set: bool) -> u8 {
    if set {
        byte | mask
    } else {
        byte & !mask
    }
}

/// CONNECT flag byte.
///
/// Bit 7 username, bit 6 password, bit 5 will retain, bits 4-3 will QoS,
/// bit 2 will, bit 1 clean session, bit 0 reserved. The reserved bit is
/// never set: construction from a wire byte rejects it and the `with_*`
/// setters leave it untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectFlags(u8);

impl ConnectFlags {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn byte(self) -> u8 {
        self.0
    }

    pub fn username(self) -> bool {
        self.0 & 0x80 != 0
    }

    pub fn password(self) -> bool {
        self.0 & 0x40 != 0
    }

    pub fn will_retain(self) -> bool {
        self.0 & 0x20 != 0
    }

    pub fn will_qos(self) -> QoS {
        match (self.0 >> 3) & 0x03 {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce,
        }
    }

    pub fn will(self) -> bool {
        self.0 & 0x04 != 0
    }

    pub fn clean_session(self) -> bool {
        self.0 & 0x02 != 0
    }

    pub fn with_username(self, set: bool) -> Self {
        Self(set_bit(self.0, 0x80, set))
    }

    pub fn with_password(self, set: bool) -> Self {
        Self(set_bit(self.0, 0x40, set))
    }

    pub fn with_will_retain(self, set: bool) -> Self {
        Self(set_bit(self.0, 0x20, set))
    }

    pub fn with_will_qos(self, qos: QoS) -> Self {
        Self((self.0 & !0x18) | ((qos as u8) << 3))
    }

    pub fn with_will(self, set: bool) -> Self {
        Self(set_bit(self.0, 0x04, set))
    }

    pub fn with_clean_session(self, set: bool) -> Self {
        Self(set_bit(self.0, 0x02, set))
    }
}

impl TryFrom<u8> for ConnectFlags {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        // MQTT-3.1.2-3: the reserved flag bit must be zero
        if byte & 0x01 != 0 {
            return Err(DecodeError::ProtocolViolation(
                "reserved connect flag bit must be zero".into(),
            ));
        }
        QoS::try_from((byte >> 3) & 0x03)?;
        Ok(Self(byte))
    }
}

/// CONNACK acknowledge flag byte. Bit 0 is session present; bits 7-1 are
/// reserved and dropped on the way in, so a stored value is always
/// canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnAckFlags(u8);

impl ConnAckFlags {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn from_byte(byte: u8) -> Self {
        Self(byte & 0x01)
    }

    pub fn byte(self) -> u8 {
        self.0
    }

    pub fn session_present(self) -> bool {
        self.0 & 0x01 != 0
    }

    pub fn with_session_present(self, set: bool) -> Self {
        Self(set_bit(self.0, 0x01, set))
    }
}

/// Decoded fixed header: packet type, raw flag nibble, remaining length.
///
/// The remaining length is informational on the way back out; [`encode`]
/// always recomputes it from the body it builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub flags: u8,
    pub remaining_length: u32,
}

impl FixedHeader {
    /// Decode from the front of `buf`. Returns the header and its encoded
    /// size (2-5 bytes).
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        if buf.is_empty() {
            return Err(DecodeError::Truncated);
        }
        let first = buf[0];
        let packet_type = PacketType::try_from(first >> 4)?;
        let flags = first & 0x0F;

        // MQTT-2.2.2-1/2: the lower nibble is 0010 for PUBREL, SUBSCRIBE
        // and UNSUBSCRIBE, 0000 for every type other than PUBLISH
        let expected = match packet_type {
            PacketType::Publish => flags,
            PacketType::Pubrel | PacketType::Subscribe | PacketType::Unsubscribe => 0x02,
            _ => 0x00,
        };
        if flags != expected {
            return Err(DecodeError::MalformedFixedHeader { packet_type, flags });
        }

        let (remaining_length, len_bytes) = varint::decode(&buf[1..])?;
        Ok((
            Self {
                packet_type,
                flags,
                remaining_length,
            },
            1 + len_bytes,
        ))
    }
}

/// A topic filter paired with the QoS requested for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub filter: String,
    pub qos: QoS,
}

/// MQTT Packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    Connack(Connack),
    Publish(Publish),
    Puback { packet_id: u16 },
    Pubrec { packet_id: u16 },
    Pubrel { packet_id: u16 },
    Pubcomp { packet_id: u16 },
    Subscribe(Subscribe),
    Suback(Suback),
    Unsubscribe(Unsubscribe),
    Unsuback { packet_id: u16 },
    Pingreq,
    Pingresp,
    Disconnect,
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::Connack(_) => PacketType::Connack,
            Packet::Publish(_) => PacketType::Publish,
            Packet::Puback { .. } => PacketType::Puback,
            Packet::Pubrec { .. } => PacketType::Pubrec,
            Packet::Pubrel { .. } => PacketType::Pubrel,
            Packet::Pubcomp { .. } => PacketType::Pubcomp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::Suback(_) => PacketType::Suback,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::Unsuback { .. } => PacketType::Unsuback,
            Packet::Pingreq => PacketType::Pingreq,
            Packet::Pingresp => PacketType::Pingresp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }
}

/// CONNECT packet data.
///
/// Each optional field is present exactly when the matching bit in `flags`
/// is set; [`encode`] rejects a value where the two disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub protocol_name: String,
    pub protocol_level: u8,
    pub flags: ConnectFlags,
    pub keep_alive: u16,
    pub client_id: String,
    pub will_topic: Option<String>,
    pub will_message: Option<Vec<u8>>,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
}

impl Connect {
    /// A minimal CONNECT with the given client identifier and no optional
    /// fields.
    pub fn new(client_id: impl Into<String>) -> Self {
        Connect {
            protocol_name: PROTOCOL_NAME.into(),
            protocol_level: PROTOCOL_LEVEL,
            flags: ConnectFlags::new(),
            keep_alive: 0,
            client_id: client_id.into(),
            will_topic: None,
            will_message: None,
            username: None,
            password: None,
        }
    }
}

/// CONNACK packet data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connack {
    pub flags: ConnAckFlags,
    pub return_code: ConnectReturnCode,
}

/// PUBLISH packet data.
///
/// `packet_id` is present exactly when `qos` is above [`QoS::AtMostOnce`].
/// The payload is the remainder of the packet body and may be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    pub packet_id: Option<u16>,
    pub payload: Bytes,
}

/// SUBSCRIBE packet data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub packet_id: u16,
    pub topics: Vec<Topic>,
}

/// SUBACK packet data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suback {
    pub packet_id: u16,
    pub return_codes: Vec<SubscribeReturnCode>,
}

/// UNSUBSCRIBE packet data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    pub packet_id: u16,
    pub topics: Vec<String>,
}

/// Bounded reader over a packet body.
struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        if self.remaining() < 1 {
            return Err(DecodeError::Truncated);
        }
        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16, DecodeError> {
        if self.remaining() < 2 {
            return Err(DecodeError::Truncated);
        }
        let value = u16::from_be_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        Ok(value)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::Truncated);
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        // MQTT-1.5.3-2: UTF-8 string MUST NOT contain null character U+0000
        if bytes.contains(&0u8) {
            return Err(DecodeError::ProtocolViolation(
                "UTF-8 string must not contain null character".into(),
            ));
        }
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::BadUtf8)
    }

    fn read_binary(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_u16()? as usize;
        Ok(self.read_bytes(len)?.to_vec())
    }

    fn finish(&self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}

/// Decode one packet from the front of `buf`.
///
/// Returns the packet and the number of bytes consumed, so callers can
/// slide their buffer and call again for stream framing. A
/// [`DecodeError::Truncated`] result means the buffer does not yet hold a
/// complete packet; accumulate more bytes and retry. Any other error means
/// the stream is corrupt and the connection should be closed.
pub fn decode(buf: &[u8]) -> Result<(Packet, usize), DecodeError> {
    let (header, header_len) = FixedHeader::decode(buf)?;
    let total = header_len + header.remaining_length as usize;
    if buf.len() < total {
        return Err(DecodeError::Truncated);
    }

    let body = &buf[header_len..total];
    let packet = decode_body(&header, body).map_err(|err| match err {
        // The declared body was fully present, so running dry inside it
        // means the remaining length under-declares the packet's fields.
        DecodeError::Truncated => DecodeError::ProtocolViolation(
            "remaining length does not cover the packet fields".into(),
        ),
        other => other,
    })?;

    log::trace!("decoded {:?} packet, {} bytes", header.packet_type, total);
    Ok((packet, total))
}

fn decode_body(header: &FixedHeader, body: &[u8]) -> Result<Packet, DecodeError> {
    match header.packet_type {
        PacketType::Connect => decode_connect(body),
        PacketType::Connack => decode_connack(body),
        PacketType::Publish => decode_publish(header.flags, body),
        PacketType::Puback => Ok(Packet::Puback {
            packet_id: decode_packet_id(body)?,
        }),
        PacketType::Pubrec => Ok(Packet::Pubrec {
            packet_id: decode_packet_id(body)?,
        }),
        PacketType::Pubrel => Ok(Packet::Pubrel {
            packet_id: decode_packet_id(body)?,
        }),
        PacketType::Pubcomp => Ok(Packet::Pubcomp {
            packet_id: decode_packet_id(body)?,
        }),
        PacketType::Subscribe => decode_subscribe(body),
        PacketType::Suback => decode_suback(body),
        PacketType::Unsubscribe => decode_unsubscribe(body),
        PacketType::Unsuback => Ok(Packet::Unsuback {
            packet_id: decode_packet_id(body)?,
        }),
        PacketType::Pingreq => {
            expect_empty(body, "PINGREQ")?;
            Ok(Packet::Pingreq)
        }
        PacketType::Pingresp => {
            expect_empty(body, "PINGRESP")?;
            Ok(Packet::Pingresp)
        }
        PacketType::Disconnect => {
            expect_empty(body, "DISCONNECT")?;
            Ok(Packet::Disconnect)
        }
    }
}

fn expect_empty(body: &[u8], name: &str) -> Result<(), DecodeError> {
    if body.is_empty() {
        Ok(())
    } else {
        Err(DecodeError::ProtocolViolation(format!(
            "{} remaining length must be 0",
            name
        )))
    }
}

fn decode_packet_id(body: &[u8]) -> Result<u16, DecodeError> {
    let mut dec = Decoder::new(body);
    let packet_id = dec.read_u16()?;
    dec.finish()?;
    Ok(packet_id)
}

fn decode_connect(body: &[u8]) -> Result<Packet, DecodeError> {
    let mut dec = Decoder::new(body);

    let protocol_name = dec.read_string()?;
    if protocol_name != PROTOCOL_NAME {
        return Err(DecodeError::ProtocolViolation(format!(
            "invalid protocol name: {:?}",
            protocol_name
        )));
    }

    let protocol_level = dec.read_u8()?;
    if protocol_level != PROTOCOL_LEVEL {
        return Err(DecodeError::ProtocolViolation(format!(
            "unsupported protocol level: {}",
            protocol_level
        )));
    }

    let flags = ConnectFlags::try_from(dec.read_u8()?)?;

    // MQTT-3.1.2-11/13: Will QoS must be 0 when the Will flag is 0
    if !flags.will() && flags.will_qos() != QoS::AtMostOnce {
        return Err(DecodeError::ProtocolViolation(
            "will QoS must be 0 when will flag is 0".into(),
        ));
    }

    // MQTT-3.1.2-15: Will Retain must be 0 when the Will flag is 0
    if !flags.will() && flags.will_retain() {
        return Err(DecodeError::ProtocolViolation(
            "will retain must be 0 when will flag is 0".into(),
        ));
    }

    // MQTT-3.1.2-22: Password flag must be 0 when the Username flag is 0
    if !flags.username() && flags.password() {
        return Err(DecodeError::ProtocolViolation(
            "password flag must be 0 when username flag is 0".into(),
        ));
    }

    let keep_alive = dec.read_u16()?;
    let client_id = dec.read_string()?;

    let (will_topic, will_message) = if flags.will() {
        (Some(dec.read_string()?), Some(dec.read_binary()?))
    } else {
        (None, None)
    };

    let username = if flags.username() {
        Some(dec.read_string()?)
    } else {
        None
    };

    let password = if flags.password() {
        Some(dec.read_binary()?)
    } else {
        None
    };

    dec.finish()?;

    Ok(Packet::Connect(Connect {
        protocol_name,
        protocol_level,
        flags,
        keep_alive,
        client_id,
        will_topic,
        will_message,
        username,
        password,
    }))
}

fn decode_connack(body: &[u8]) -> Result<Packet, DecodeError> {
    let mut dec = Decoder::new(body);
    let flags = ConnAckFlags::from_byte(dec.read_u8()?);
    let return_code = ConnectReturnCode::try_from(dec.read_u8()?)?;
    dec.finish()?;
    Ok(Packet::Connack(Connack { flags, return_code }))
}

fn decode_publish(flags: u8, body: &[u8]) -> Result<Packet, DecodeError> {
    let dup = flags & 0x08 != 0;
    let qos = QoS::try_from((flags >> 1) & 0x03)?;
    let retain = flags & 0x01 != 0;

    // MQTT-3.3.1-2: DUP must be 0 for QoS 0 messages
    if qos == QoS::AtMostOnce && dup {
        return Err(DecodeError::ProtocolViolation(
            "DUP must be 0 for QoS 0 publish".into(),
        ));
    }

    let mut dec = Decoder::new(body);
    let topic = dec.read_string()?;
    validate_topic_name(&topic).map_err(DecodeError::ProtocolViolation)?;

    let packet_id = if qos != QoS::AtMostOnce {
        Some(dec.read_u16()?)
    } else {
        None
    };

    let payload = Bytes::copy_from_slice(dec.read_bytes(dec.remaining())?);

    Ok(Packet::Publish(Publish {
        dup,
        qos,
        retain,
        topic,
        packet_id,
        payload,
    }))
}

fn decode_subscribe(body: &[u8]) -> Result<Packet, DecodeError> {
    let mut dec = Decoder::new(body);
    let packet_id = dec.read_u16()?;

    let mut topics = Vec::new();
    while dec.remaining() > 0 {
        let filter = dec.read_string()?;
        validate_topic_filter(&filter).map_err(DecodeError::ProtocolViolation)?;

        let qos_byte = dec.read_u8()?;
        // MQTT-3.8.3-4: bits 7-2 of the requested QoS byte are reserved
        if qos_byte & !0x03 != 0 {
            return Err(DecodeError::ProtocolViolation(format!(
                "reserved bits set in subscribe QoS byte: {:#04x}",
                qos_byte
            )));
        }
        let qos = QoS::try_from(qos_byte)?;

        topics.push(Topic { filter, qos });
    }

    // MQTT-3.8.3-3: at least one filter is required
    if topics.is_empty() {
        return Err(DecodeError::ProtocolViolation(
            "SUBSCRIBE with no topic filters".into(),
        ));
    }

    Ok(Packet::Subscribe(Subscribe { packet_id, topics }))
}

fn decode_suback(body: &[u8]) -> Result<Packet, DecodeError> {
    let mut dec = Decoder::new(body);
    let packet_id = dec.read_u16()?;

    let mut return_codes = Vec::new();
    while dec.remaining() > 0 {
        return_codes.push(SubscribeReturnCode::try_from(dec.read_u8()?)?);
    }

    if return_codes.is_empty() {
        return Err(DecodeError::ProtocolViolation(
            "SUBACK with no return codes".into(),
        ));
    }

    Ok(Packet::Suback(Suback {
        packet_id,
        return_codes,
    }))
}

fn decode_unsubscribe(body: &[u8]) -> Result<Packet, DecodeError> {
    let mut dec = Decoder::new(body);
    let packet_id = dec.read_u16()?;

    let mut topics = Vec::new();
    while dec.remaining() > 0 {
        let filter = dec.read_string()?;
        validate_topic_filter(&filter).map_err(DecodeError::ProtocolViolation)?;
        topics.push(filter);
    }

    // MQTT-3.10.3-2: at least one filter is required
    if topics.is_empty() {
        return Err(DecodeError::ProtocolViolation(
            "UNSUBSCRIBE with no topic filters".into(),
        ));
    }

    Ok(Packet::Unsubscribe(Unsubscribe { packet_id, topics }))
}

// MQTT-3.3.2-1/2: topic names are at least one character and carry no
// wildcards.
fn validate_topic_name(topic: &str) -> Result<(), String> {
    if topic.is_empty() {
        return Err("publish topic name must be at least 1 character".into());
    }
    if topic.contains(['+', '#']) {
        return Err(format!(
            "publish topic name must not contain wildcards: {:?}",
            topic
        ));
    }
    Ok(())
}

// MQTT-4.7.3-1: topic filters are at least one character.
fn validate_topic_filter(filter: &str) -> Result<(), String> {
    if filter.is_empty() {
        return Err("topic filter must be at least 1 character".into());
    }
    Ok(())
}

/// Encode a packet into a fresh buffer.
pub fn encode(packet: &Packet) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    encode_into(packet, &mut buf)?;
    Ok(buf)
}

/// Encode a packet, appending to `buf`.
///
/// Nothing is appended when encoding fails.
pub fn encode_into(packet: &Packet, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
    validate(packet)?;

    let body = encode_body(packet)?;
    if body.len() > varint::MAX_REMAINING_LENGTH as usize {
        return Err(EncodeError::PayloadTooLarge(body.len()));
    }

    buf.push(first_byte(packet));
    varint::encode_to_vec(body.len() as u32, buf);
    buf.extend_from_slice(&body);

    log::trace!(
        "encoded {:?} packet, {} bytes",
        packet.packet_type(),
        1 + varint::encoded_len(body.len() as u32) + body.len()
    );
    Ok(())
}

fn first_byte(packet: &Packet) -> u8 {
    let flags = match packet {
        Packet::Publish(publish) => {
            let mut flags = (publish.qos as u8) << 1;
            if publish.dup {
                flags |= 0x08;
            }
            if publish.retain {
                flags |= 0x01;
            }
            flags
        }
        Packet::Pubrel { .. } | Packet::Subscribe(_) | Packet::Unsubscribe(_) => 0x02,
        _ => 0x00,
    };
    ((packet.packet_type() as u8) << 4) | flags
}

/// Encode-side mirror of the decode invariants. Rejects inconsistent
/// values before any output is produced.
fn validate(packet: &Packet) -> Result<(), EncodeError> {
    match packet {
        Packet::Connect(connect) => {
            if connect.protocol_name != PROTOCOL_NAME {
                return Err(EncodeError::InvalidPacket(format!(
                    "invalid protocol name: {:?}",
                    connect.protocol_name
                )));
            }
            if connect.protocol_level != PROTOCOL_LEVEL {
                return Err(EncodeError::InvalidPacket(format!(
                    "unsupported protocol level: {}",
                    connect.protocol_level
                )));
            }
            let flags = connect.flags;
            if flags.will() {
                if connect.will_topic.is_none() || connect.will_message.is_none() {
                    return Err(EncodeError::InvalidPacket(
                        "will flag set without will topic and message".into(),
                    ));
                }
            } else {
                if connect.will_topic.is_some() || connect.will_message.is_some() {
                    return Err(EncodeError::InvalidPacket(
                        "will topic or message present without will flag".into(),
                    ));
                }
                if flags.will_qos() != QoS::AtMostOnce || flags.will_retain() {
                    return Err(EncodeError::InvalidPacket(
                        "will QoS and retain must be 0 when will flag is 0".into(),
                    ));
                }
            }
            if flags.username() != connect.username.is_some() {
                return Err(EncodeError::InvalidPacket(
                    "username flag does not match username field".into(),
                ));
            }
            if flags.password() != connect.password.is_some() {
                return Err(EncodeError::InvalidPacket(
                    "password flag does not match password field".into(),
                ));
            }
            if !flags.username() && flags.password() {
                return Err(EncodeError::InvalidPacket(
                    "password flag set without username flag".into(),
                ));
            }
        }
        Packet::Publish(publish) => {
            validate_topic_name(&publish.topic).map_err(EncodeError::InvalidPacket)?;
            if publish.qos == QoS::AtMostOnce {
                if publish.packet_id.is_some() {
                    return Err(EncodeError::InvalidPacket(
                        "packet id must be absent for QoS 0 publish".into(),
                    ));
                }
                if publish.dup {
                    return Err(EncodeError::InvalidPacket(
                        "DUP must be 0 for QoS 0 publish".into(),
                    ));
                }
            } else if publish.packet_id.is_none() {
                return Err(EncodeError::InvalidPacket(
                    "packet id required for QoS > 0 publish".into(),
                ));
            }
        }
        Packet::Subscribe(subscribe) => {
            if subscribe.topics.is_empty() {
                return Err(EncodeError::InvalidPacket(
                    "SUBSCRIBE with no topic filters".into(),
                ));
            }
            for topic in &subscribe.topics {
                validate_topic_filter(&topic.filter).map_err(EncodeError::InvalidPacket)?;
            }
        }
        Packet::Suback(suback) => {
            if suback.return_codes.is_empty() {
                return Err(EncodeError::InvalidPacket(
                    "SUBACK with no return codes".into(),
                ));
            }
        }
        Packet::Unsubscribe(unsubscribe) => {
            if unsubscribe.topics.is_empty() {
                return Err(EncodeError::InvalidPacket(
                    "UNSUBSCRIBE with no topic filters".into(),
                ));
            }
            for filter in &unsubscribe.topics {
                validate_topic_filter(filter).map_err(EncodeError::InvalidPacket)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn encode_body(packet: &Packet) -> Result<Vec<u8>, EncodeError> {
    let mut body = Vec::new();
    match packet {
        Packet::Connect(connect) => {
            write_string(&mut body, &connect.protocol_name)?;
            body.push(connect.protocol_level);
            body.push(connect.flags.byte());
            body.extend_from_slice(&connect.keep_alive.to_be_bytes());
            write_string(&mut body, &connect.client_id)?;
            if let Some(ref topic) = connect.will_topic {
                write_string(&mut body, topic)?;
            }
            if let Some(ref message) = connect.will_message {
                write_binary(&mut body, message)?;
            }
            if let Some(ref username) = connect.username {
                write_string(&mut body, username)?;
            }
            if let Some(ref password) = connect.password {
                write_binary(&mut body, password)?;
            }
        }
        Packet::Connack(connack) => {
            body.push(connack.flags.byte());
            body.push(connack.return_code as u8);
        }
        Packet::Publish(publish) => {
            write_string(&mut body, &publish.topic)?;
            if let Some(packet_id) = publish.packet_id {
                body.extend_from_slice(&packet_id.to_be_bytes());
            }
            body.extend_from_slice(&publish.payload);
        }
        Packet::Puback { packet_id }
        | Packet::Pubrec { packet_id }
        | Packet::Pubrel { packet_id }
        | Packet::Pubcomp { packet_id }
        | Packet::Unsuback { packet_id } => {
            body.extend_from_slice(&packet_id.to_be_bytes());
        }
        Packet::Subscribe(subscribe) => {
            body.extend_from_slice(&subscribe.packet_id.to_be_bytes());
            for topic in &subscribe.topics {
                write_string(&mut body, &topic.filter)?;
                body.push(topic.qos as u8);
            }
        }
        Packet::Suback(suback) => {
            body.extend_from_slice(&suback.packet_id.to_be_bytes());
            for code in &suback.return_codes {
                body.push(*code as u8);
            }
        }
        Packet::Unsubscribe(unsubscribe) => {
            body.extend_from_slice(&unsubscribe.packet_id.to_be_bytes());
            for filter in &unsubscribe.topics {
                write_string(&mut body, filter)?;
            }
        }
        Packet::Pingreq | Packet::Pingresp | Packet::Disconnect => {}
    }
    Ok(body)
}

fn write_string(buf: &mut Vec<u8>, value: &str) -> Result<(), EncodeError> {
    // MQTT-1.5.3-2: UTF-8 string MUST NOT contain null character U+0000
    if value.contains('\0') {
        return Err(EncodeError::InvalidPacket(
            "string field must not contain null character".into(),
        ));
    }
    write_binary(buf, value.as_bytes())
}

fn write_binary(buf: &mut Vec<u8>, value: &[u8]) -> Result<(), EncodeError> {
    if value.len() > u16::MAX as usize {
        return Err(EncodeError::StringTooLong(value.len()));
    }
    buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
    buf.extend_from_slice(value);
    Ok(())
}
