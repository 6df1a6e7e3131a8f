// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};

/// Encode a typed message into its wire representation (payload only,
/// not including the `[length][type]` frame header).
pub trait EncodePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError>;
}

/// Decode a typed message from its payload bytes (the frame header has
/// already been stripped by the caller).
pub trait DecodePacket: Sized {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError>;
}

/// 16-bit message identifier, used to correlate PUBLISH/PUBACK and
/// SUBSCRIBE/SUBACK pairs.
pub type MessageId = u16;

/// 16-bit topic alias. `0x0000` and `0xFFFF` are reserved.
pub type TopicAlias = u16;

/// MQTT-SN QoS levels. `-1` is the "publish without a prior CONNECT"
/// level unique to MQTT-SN, used by very constrained devices.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum QoS {
    AtMostOnceNoConnect,
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl QoS {
    #[must_use]
    pub const fn to_bits(self) -> u8 {
        match self {
            Self::AtMostOnceNoConnect => 0b11,
            Self::AtMostOnce => 0b00,
            Self::AtLeastOnce => 0b01,
            Self::ExactlyOnce => 0b10,
        }
    }

    pub fn from_bits(bits: u8) -> Result<Self, DecodeError> {
        match bits & 0b11 {
            0b00 => Ok(Self::AtMostOnce),
            0b01 => Ok(Self::AtLeastOnce),
            0b10 => Ok(Self::ExactlyOnce),
            0b11 => Ok(Self::AtMostOnceNoConnect),
            _ => unreachable!("masked to 2 bits"),
        }
    }
}

/// How a PUBLISH/REGISTER topic field should be interpreted.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TopicIdType {
    /// Allocated at runtime via REGISTER/REGACK.
    Normal,
    /// Negotiated out of band; stable across sessions.
    Predefined,
    /// Two ASCII characters packed directly into the 16-bit field.
    Short,
}

impl TopicIdType {
    #[must_use]
    pub const fn to_bits(self) -> u8 {
        match self {
            Self::Normal => 0b00,
            Self::Predefined => 0b01,
            Self::Short => 0b10,
        }
    }

    pub fn from_bits(bits: u8) -> Result<Self, DecodeError> {
        match bits & 0b11 {
            0b00 => Ok(Self::Normal),
            0b01 => Ok(Self::Predefined),
            0b10 => Ok(Self::Short),
            _ => Err(DecodeError::FieldOutOfRange("topic_id_type")),
        }
    }
}

/// Wire protocol generation.
///
/// `V1_2` is the plain OASIS draft. `V2_0` additionally allows PUBLISH,
/// and in principle any other message, to travel wrapped in an
/// [`crate::integrity::IntegrityFrame`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ProtocolVersion {
    V1_2,
    V2_0,
}

/// One-byte message type tag, identical across both protocol versions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Advertise = 0x00,
    SearchGw = 0x01,
    GwInfo = 0x02,
    Connect = 0x04,
    ConnAck = 0x05,
    WillTopicReq = 0x06,
    WillTopic = 0x07,
    WillMsgReq = 0x08,
    WillMsg = 0x09,
    Register = 0x0A,
    RegAck = 0x0B,
    Publish = 0x0C,
    PubAck = 0x0D,
    PubComp = 0x0E,
    PubRec = 0x0F,
    PubRel = 0x10,
    Subscribe = 0x12,
    SubAck = 0x13,
    Unsubscribe = 0x14,
    UnsubAck = 0x15,
    PingReq = 0x16,
    PingResp = 0x17,
    Disconnect = 0x18,
    WillTopicUpd = 0x1A,
    WillTopicResp = 0x1B,
    WillMsgUpd = 0x1C,
    WillMsgResp = 0x1D,
    /// MQTT-SN v2.0 integrity envelope.
    Encapsulated = 0xFE,
}

impl MessageType {
    pub fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        Ok(match byte {
            0x00 => Self::Advertise,
            0x01 => Self::SearchGw,
            0x02 => Self::GwInfo,
            0x04 => Self::Connect,
            0x05 => Self::ConnAck,
            0x06 => Self::WillTopicReq,
            0x07 => Self::WillTopic,
            0x08 => Self::WillMsgReq,
            0x09 => Self::WillMsg,
            0x0A => Self::Register,
            0x0B => Self::RegAck,
            0x0C => Self::Publish,
            0x0D => Self::PubAck,
            0x0E => Self::PubComp,
            0x0F => Self::PubRec,
            0x10 => Self::PubRel,
            0x12 => Self::Subscribe,
            0x13 => Self::SubAck,
            0x14 => Self::Unsubscribe,
            0x15 => Self::UnsubAck,
            0x16 => Self::PingReq,
            0x17 => Self::PingResp,
            0x18 => Self::Disconnect,
            0x1A => Self::WillTopicUpd,
            0x1B => Self::WillTopicResp,
            0x1C => Self::WillMsgUpd,
            0x1D => Self::WillMsgResp,
            0xFE => Self::Encapsulated,
            other => return Err(DecodeError::UnknownType(other)),
        })
    }

    #[must_use]
    pub const fn to_byte(self) -> u8 {
        self as u8
    }
}
