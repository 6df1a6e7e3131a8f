// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{DecodePacket, EncodePacket};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};

/// A DISCONNECT with a `duration` puts the session to sleep for that
/// many seconds rather than tearing it down; absent, it is a normal
/// disconnect.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub struct DisconnectPacket {
    pub duration: Option<u16>,
}

impl EncodePacket for DisconnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        if let Some(duration) = self.duration {
            buf.extend_from_slice(&duration.to_be_bytes());
            Ok(2)
        } else {
            Ok(0)
        }
    }
}

impl DecodePacket for DisconnectPacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        if ba.is_empty() {
            Ok(Self { duration: None })
        } else {
            Ok(Self {
                duration: Some(ba.read_u16()?),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleeping_disconnect_round_trips() {
        let packet = DisconnectPacket { duration: Some(300) };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(DisconnectPacket::decode(&mut ba).unwrap(), packet);
    }

    #[test]
    fn plain_disconnect_round_trips() {
        let packet = DisconnectPacket::default();
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(DisconnectPacket::decode(&mut ba).unwrap(), packet);
    }
}
