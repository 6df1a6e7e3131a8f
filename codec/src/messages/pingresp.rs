// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{DecodePacket, EncodePacket};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub struct PingRespPacket;

impl EncodePacket for PingRespPacket {
    fn encode(&self, _buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        Ok(0)
    }
}

impl DecodePacket for PingRespPacket {
    fn decode(_ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        Ok(Self)
    }
}
