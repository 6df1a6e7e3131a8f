// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The four-message will-registration handshake that follows a CONNECT
//! whose `will` flag is set.

use crate::base::{DecodePacket, EncodePacket};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::flags::Flags;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub struct WillTopicReqPacket;

impl EncodePacket for WillTopicReqPacket {
    fn encode(&self, _buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        Ok(0)
    }
}

impl DecodePacket for WillTopicReqPacket {
    fn decode(_ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        Ok(Self)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WillTopicPacket {
    pub flags: Flags,
    pub will_topic: String,
}

impl EncodePacket for WillTopicPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let start = buf.len();
        buf.push(self.flags.to_byte());
        buf.extend_from_slice(self.will_topic.as_bytes());
        Ok(buf.len() - start)
    }
}

impl DecodePacket for WillTopicPacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        let flags = Flags::from_byte(ba.read_u8()?)?;
        let will_topic = String::from_utf8(ba.read_rest().to_vec())?;
        Ok(Self { flags, will_topic })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub struct WillMsgReqPacket;

impl EncodePacket for WillMsgReqPacket {
    fn encode(&self, _buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        Ok(0)
    }
}

impl DecodePacket for WillMsgReqPacket {
    fn decode(_ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        Ok(Self)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WillMsgPacket {
    pub will_msg: Vec<u8>,
}

impl EncodePacket for WillMsgPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.extend_from_slice(&self.will_msg);
        Ok(self.will_msg.len())
    }
}

impl DecodePacket for WillMsgPacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            will_msg: ba.read_rest().to_vec(),
        })
    }
}
