// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{DecodePacket, EncodePacket, MessageId, TopicAlias};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegisterPacket {
    /// `0x0000` when the client is requesting a new alias.
    pub topic_id: TopicAlias,
    pub msg_id: MessageId,
    pub topic_name: String,
}

impl EncodePacket for RegisterPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        if self.topic_name.is_empty() {
            return Err(EncodeError::InvalidData("topic_name must not be empty"));
        }
        let start = buf.len();
        buf.extend_from_slice(&self.topic_id.to_be_bytes());
        buf.extend_from_slice(&self.msg_id.to_be_bytes());
        buf.extend_from_slice(self.topic_name.as_bytes());
        Ok(buf.len() - start)
    }
}

impl DecodePacket for RegisterPacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        let topic_id = ba.read_u16()?;
        let msg_id = ba.read_u16()?;
        let topic_name = String::from_utf8(ba.read_rest().to_vec())?;
        if topic_name.is_empty() {
            return Err(DecodeError::FieldOutOfRange("topic_name"));
        }
        Ok(Self {
            topic_id,
            msg_id,
            topic_name,
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum RegisterReturnCode {
    Accepted = 0x00,
    Congestion = 0x01,
    InvalidTopicId = 0x02,
    NotSupported = 0x03,
}

impl RegisterReturnCode {
    pub fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        Ok(match byte {
            0x00 => Self::Accepted,
            0x01 => Self::Congestion,
            0x02 => Self::InvalidTopicId,
            0x03 => Self::NotSupported,
            other => {
                log::debug!("unrecognized regack return code byte: {other}");
                return Err(DecodeError::FieldOutOfRange("return_code"));
            }
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RegAckPacket {
    pub topic_id: TopicAlias,
    pub msg_id: MessageId,
    pub return_code: RegisterReturnCode,
}

impl EncodePacket for RegAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let start = buf.len();
        buf.extend_from_slice(&self.topic_id.to_be_bytes());
        buf.extend_from_slice(&self.msg_id.to_be_bytes());
        buf.push(self.return_code as u8);
        Ok(buf.len() - start)
    }
}

impl DecodePacket for RegAckPacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            topic_id: ba.read_u16()?,
            msg_id: ba.read_u16()?,
            return_code: RegisterReturnCode::from_byte(ba.read_u8()?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_round_trips() {
        let packet = RegisterPacket {
            topic_id: 0,
            msg_id: 7,
            topic_name: "sensors/temperature".to_string(),
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(RegisterPacket::decode(&mut ba).unwrap(), packet);
    }

    #[test]
    fn regack_round_trips() {
        let packet = RegAckPacket {
            topic_id: 42,
            msg_id: 7,
            return_code: RegisterReturnCode::Accepted,
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(RegAckPacket::decode(&mut ba).unwrap(), packet);
    }
}
