// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{DecodePacket, EncodePacket, MessageId, TopicAlias};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::flags::Flags;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublishPacket {
    pub flags: Flags,
    pub topic_id: TopicAlias,
    pub msg_id: MessageId,
    pub data: Vec<u8>,
}

impl EncodePacket for PublishPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let start = buf.len();
        buf.push(self.flags.to_byte());
        buf.extend_from_slice(&self.topic_id.to_be_bytes());
        buf.extend_from_slice(&self.msg_id.to_be_bytes());
        buf.extend_from_slice(&self.data);
        Ok(buf.len() - start)
    }
}

impl DecodePacket for PublishPacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        let flags = Flags::from_byte(ba.read_u8()?)?;
        let topic_id = ba.read_u16()?;
        let msg_id = ba.read_u16()?;
        let data = ba.read_rest().to_vec();
        Ok(Self {
            flags,
            topic_id,
            msg_id,
            data,
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum PubAckReturnCode {
    Accepted = 0x00,
    Congestion = 0x01,
    InvalidTopicId = 0x02,
    NotSupported = 0x03,
}

impl PubAckReturnCode {
    pub fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        Ok(match byte {
            0x00 => Self::Accepted,
            0x01 => Self::Congestion,
            0x02 => Self::InvalidTopicId,
            0x03 => Self::NotSupported,
            other => {
                log::debug!("unrecognized puback return code byte: {other}");
                return Err(DecodeError::FieldOutOfRange("return_code"));
            }
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PubAckPacket {
    pub topic_id: TopicAlias,
    pub msg_id: MessageId,
    pub return_code: PubAckReturnCode,
}

impl EncodePacket for PubAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let start = buf.len();
        buf.extend_from_slice(&self.topic_id.to_be_bytes());
        buf.extend_from_slice(&self.msg_id.to_be_bytes());
        buf.push(self.return_code as u8);
        Ok(buf.len() - start)
    }
}

impl DecodePacket for PubAckPacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            topic_id: ba.read_u16()?,
            msg_id: ba.read_u16()?,
            return_code: PubAckReturnCode::from_byte(ba.read_u8()?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{QoS, TopicIdType};

    #[test]
    fn publish_round_trips() {
        let packet = PublishPacket {
            flags: Flags {
                qos: QoS::AtLeastOnce,
                topic_id_type: TopicIdType::Normal,
                ..Flags::default()
            },
            topic_id: 9,
            msg_id: 100,
            data: b"23.5".to_vec(),
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(PublishPacket::decode(&mut ba).unwrap(), packet);
    }

    #[test]
    fn puback_round_trips() {
        let packet = PubAckPacket {
            topic_id: 9,
            msg_id: 100,
            return_code: PubAckReturnCode::Congestion,
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(PubAckPacket::decode(&mut ba).unwrap(), packet);
    }
}
