// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{DecodePacket, EncodePacket, MessageId, TopicIdType};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::messages::subscribe::SubscribeTopic;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UnsubscribeFlags {
    pub topic_id_type: TopicIdType,
}

impl UnsubscribeFlags {
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        self.topic_id_type.to_bits()
    }

    pub fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        Ok(Self {
            topic_id_type: TopicIdType::from_bits(byte)?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnsubscribePacket {
    pub flags: UnsubscribeFlags,
    pub msg_id: MessageId,
    pub topic: SubscribeTopic,
}

impl EncodePacket for UnsubscribePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let start = buf.len();
        buf.push(self.flags.to_byte());
        buf.extend_from_slice(&self.msg_id.to_be_bytes());
        match &self.topic {
            SubscribeTopic::Name(name) => buf.extend_from_slice(name.as_bytes()),
            SubscribeTopic::Predefined(id) => buf.extend_from_slice(&id.to_be_bytes()),
            SubscribeTopic::Short(bytes) => buf.extend_from_slice(bytes),
        }
        Ok(buf.len() - start)
    }
}

impl DecodePacket for UnsubscribePacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        let flags = UnsubscribeFlags::from_byte(ba.read_u8()?)?;
        let msg_id = ba.read_u16()?;
        let topic = match flags.topic_id_type {
            TopicIdType::Normal => SubscribeTopic::Name(String::from_utf8(ba.read_rest().to_vec())?),
            TopicIdType::Predefined => SubscribeTopic::Predefined(ba.read_u16()?),
            TopicIdType::Short => {
                let bytes = ba.read_bytes(2)?;
                SubscribeTopic::Short([bytes[0], bytes[1]])
            }
        };
        Ok(Self {
            flags,
            msg_id,
            topic,
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UnsubAckPacket {
    pub msg_id: MessageId,
}

impl EncodePacket for UnsubAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.extend_from_slice(&self.msg_id.to_be_bytes());
        Ok(2)
    }
}

impl DecodePacket for UnsubAckPacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            msg_id: ba.read_u16()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsubscribe_round_trips() {
        let packet = UnsubscribePacket {
            flags: UnsubscribeFlags {
                topic_id_type: TopicIdType::Normal,
            },
            msg_id: 8,
            topic: SubscribeTopic::Name("sensors/#".to_string()),
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(UnsubscribePacket::decode(&mut ba).unwrap(), packet);
    }

    #[test]
    fn unsuback_round_trips() {
        let packet = UnsubAckPacket { msg_id: 8 };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(UnsubAckPacket::decode(&mut ba).unwrap(), packet);
    }

}
