// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::base::{DecodePacket, EncodePacket};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};

/// PINGREQ sent by a sleeping client carries its own client id so the
/// gateway knows whose queue to flush; a keep-alive ping from an awake
/// client omits it.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct PingReqPacket {
    pub client_id: Option<String>,
}

impl EncodePacket for PingReqPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        if let Some(client_id) = &self.client_id {
            buf.extend_from_slice(client_id.as_bytes());
            Ok(client_id.len())
        } else {
            Ok(0)
        }
    }
}

impl DecodePacket for PingReqPacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        if ba.is_empty() {
            Ok(Self { client_id: None })
        } else {
            Ok(Self {
                client_id: Some(String::from_utf8(ba.read_rest().to_vec())?),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_ping_round_trips() {
        let packet = PingReqPacket::default();
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(PingReqPacket::decode(&mut ba).unwrap(), packet);
    }

    #[test]
    fn sleeping_client_ping_round_trips() {
        let packet = PingReqPacket {
            client_id: Some("device-A".to_string()),
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(PingReqPacket::decode(&mut ba).unwrap(), packet);
    }
}
