// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{DecodePacket, EncodePacket};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::flags::Flags;

/// Fixed protocol id byte mandated by the OASIS spec.
const PROTOCOL_ID: u8 = 0x01;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectPacket {
    pub flags: Flags,
    pub duration: u16,
    pub client_id: String,
}

impl ConnectPacket {
    #[must_use]
    pub const fn new(flags: Flags, duration: u16, client_id: String) -> Self {
        Self {
            flags,
            duration,
            client_id,
        }
    }
}

impl EncodePacket for ConnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        if self.client_id.is_empty() || self.client_id.len() > 0xFFFF {
            return Err(EncodeError::InvalidData("client_id length out of range"));
        }
        let start = buf.len();
        buf.push(self.flags.to_byte());
        buf.push(PROTOCOL_ID);
        buf.extend_from_slice(&self.duration.to_be_bytes());
        buf.extend_from_slice(self.client_id.as_bytes());
        Ok(buf.len() - start)
    }
}

impl DecodePacket for ConnectPacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        let flags = Flags::from_byte(ba.read_u8()?)?;
        let protocol_id = ba.read_u8()?;
        if protocol_id != PROTOCOL_ID {
            return Err(DecodeError::FieldOutOfRange("protocol_id"));
        }
        let duration = ba.read_u16()?;
        let client_id = String::from_utf8(ba.read_rest().to_vec())?;
        if client_id.is_empty() {
            return Err(DecodeError::FieldOutOfRange("client_id"));
        }
        Ok(Self {
            flags,
            duration,
            client_id,
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ReturnCode {
    Accepted = 0x00,
    Congestion = 0x01,
    InvalidTopicId = 0x02,
    NotSupported = 0x03,
}

impl ReturnCode {
    pub fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        Ok(match byte {
            0x00 => Self::Accepted,
            0x01 => Self::Congestion,
            0x02 => Self::InvalidTopicId,
            0x03 => Self::NotSupported,
            other => {
                log::debug!("unrecognized return code byte: {other}");
                return Err(DecodeError::FieldOutOfRange("return_code"));
            }
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConnAckPacket {
    pub return_code: ReturnCode,
}

impl ConnAckPacket {
    #[must_use]
    pub const fn new(return_code: ReturnCode) -> Self {
        Self { return_code }
    }
}

impl EncodePacket for ConnAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(self.return_code as u8);
        Ok(1)
    }
}

impl DecodePacket for ConnAckPacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            return_code: ReturnCode::from_byte(ba.read_u8()?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{QoS, TopicIdType};

    #[test]
    fn connect_round_trips() {
        let packet = ConnectPacket::new(
            Flags {
                will: true,
                clean_session: true,
                qos: QoS::AtMostOnce,
                topic_id_type: TopicIdType::Normal,
                ..Flags::default()
            },
            60,
            "device-A".to_string(),
        );
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(ConnectPacket::decode(&mut ba).unwrap(), packet);
    }

    #[test]
    fn rejects_empty_client_id() {
        let mut buf = vec![Flags::default().to_byte(), PROTOCOL_ID, 0x00, 0x3C];
        buf.truncate(4);
        let mut ba = ByteArray::new(&buf);
        assert_eq!(ConnectPacket::decode(&mut ba), Err(DecodeError::FieldOutOfRange("client_id")));
    }
}
