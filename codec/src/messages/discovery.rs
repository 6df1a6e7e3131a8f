// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Gateway discovery: ADVERTISE, SEARCHGW, GWINFO. Not core to the
//! gateway's session/queue logic but decoded so a deployment can expose
//! itself on the discovery broadcast channel.

use crate::base::{DecodePacket, EncodePacket};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AdvertisePacket {
    pub gw_id: u8,
    pub duration: u16,
}

impl EncodePacket for AdvertisePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(self.gw_id);
        buf.extend_from_slice(&self.duration.to_be_bytes());
        Ok(3)
    }
}

impl DecodePacket for AdvertisePacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            gw_id: ba.read_u8()?,
            duration: ba.read_u16()?,
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SearchGwPacket {
    pub radius: u8,
}

impl EncodePacket for SearchGwPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(self.radius);
        Ok(1)
    }
}

impl DecodePacket for SearchGwPacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            radius: ba.read_u8()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GwInfoPacket {
    pub gw_id: u8,
    /// Present only when a client, rather than the gateway itself,
    /// relays this packet.
    pub gw_add: Option<Vec<u8>>,
}

impl EncodePacket for GwInfoPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let start = buf.len();
        buf.push(self.gw_id);
        if let Some(gw_add) = &self.gw_add {
            buf.extend_from_slice(gw_add);
        }
        Ok(buf.len() - start)
    }
}

impl DecodePacket for GwInfoPacket {
    fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        let gw_id = ba.read_u8()?;
        let gw_add = if ba.is_empty() {
            None
        } else {
            Some(ba.read_rest().to_vec())
        };
        Ok(Self { gw_id, gw_add })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertise_round_trips() {
        let packet = AdvertisePacket { gw_id: 1, duration: 900 };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(AdvertisePacket::decode(&mut ba).unwrap(), packet);
    }

    #[test]
    fn gwinfo_without_address_round_trips() {
        let packet = GwInfoPacket { gw_id: 3, gw_add: None };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(GwInfoPacket::decode(&mut ba).unwrap(), packet);
    }
}
