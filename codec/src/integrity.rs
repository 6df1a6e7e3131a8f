// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The v2.0 integrity envelope: a frame that wraps another, arbitrary,
//! MQTT-SN frame together with the authentication material needed to
//! verify it.

use crate::byte_array::{self, ByteArray};
use crate::error::{DecodeError, EncodeError};

/// MAC/AEAD algorithm protecting the encapsulated packet.
///
/// `HmacSha256` is parsed (it is a legitimate byte value on the wire)
/// but always rejected by [`ProtectionScheme::validate`]: the gateway
/// never accepts it as a signing algorithm, only recognizes the code
/// point so it can report the precise rejection reason.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum ProtectionScheme {
    HmacSha256 = 0x00,
    HmacSha3_256 = 0x01,
    Cmac128 = 0x02,
    Cmac192 = 0x03,
    Cmac256 = 0x04,
    AesCcm64_128 = 0x10,
    AesCcm64_256 = 0x11,
    AesCcm128_128 = 0x12,
    AesCcm128_256 = 0x13,
    AesGcm128 = 0x40,
    AesGcm192 = 0x41,
    AesGcm256 = 0x42,
    ChaCha20Poly1305 = 0x49,
}

impl ProtectionScheme {
    pub fn parse(byte: u8) -> Result<Self, DecodeError> {
        Ok(match byte {
            0x00 => Self::HmacSha256,
            0x01 => Self::HmacSha3_256,
            0x02 => Self::Cmac128,
            0x03 => Self::Cmac192,
            0x04 => Self::Cmac256,
            0x10 => Self::AesCcm64_128,
            0x11 => Self::AesCcm64_256,
            0x12 => Self::AesCcm128_128,
            0x13 => Self::AesCcm128_256,
            0x40 => Self::AesGcm128,
            0x41 => Self::AesGcm192,
            0x42 => Self::AesGcm256,
            0x49 => Self::ChaCha20Poly1305,
            other => return Err(DecodeError::InvalidProtectionScheme(other)),
        })
    }

    /// Reject schemes that parse cleanly but are not acceptable for use,
    /// namely plain HMAC-SHA256.
    pub fn validate(self) -> Result<Self, DecodeError> {
        if self == Self::HmacSha256 {
            Err(DecodeError::InvalidProtectionScheme(Self::HmacSha256 as u8))
        } else {
            Ok(self)
        }
    }

    #[must_use]
    pub const fn to_byte(self) -> u8 {
        self as u8
    }
}

/// 8-byte sender identifier, zero-padded on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SenderId(pub [u8; 8]);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IntegrityFrame {
    pub scheme: ProtectionScheme,
    pub sender_id: SenderId,
    pub nonce: u32,
    pub key_material: u64,
    pub counter: u64,
    /// The wrapped frame, undecoded (a recursively valid MQTT-SN frame).
    pub encapsulated: Vec<u8>,
    pub auth_tag: Vec<u8>,
}

impl IntegrityFrame {
    /// Decode the message payload (everything after the `[length][type]`
    /// header, i.e. starting at what the spec calls "byte 0").
    ///
    /// `total_length` is the full frame length as declared by the outer
    /// [`crate::header::FixedHeader`], used to derive the encapsulated
    /// packet length per the spec's subtraction formula.
    pub fn decode(payload: &[u8], header_len: usize, total_length: usize) -> Result<Self, DecodeError> {
        let mut ba = ByteArray::new(payload);

        let flags = ba.read_u8()?;
        let auth_tag_len = usize::from((flags >> 4) & 0x0F) * 4;
        let key_width = Self::index_to_width((flags >> 2) & 0b11)?;
        let counter_width = Self::index_to_width(flags & 0b11)?;

        let scheme = ProtectionScheme::parse(ba.read_u8()?)?.validate()?;

        let sender_bytes = ba.read_bytes(8)?;
        let mut sender_id = [0u8; 8];
        sender_id.copy_from_slice(sender_bytes);

        let nonce = ba.read_u32()?;

        let key_material = byte_array::read_width(&mut ba, key_width)?;
        let counter = byte_array::read_width(&mut ba, counter_width)?;

        let fixed_header_len = 1 + 1 + 8 + 4; // flags, scheme, sender, nonce
        let declared_optional_len = usize::from(key_width) + usize::from(counter_width);
        let consumed_before_body = header_len + fixed_header_len + declared_optional_len;

        if total_length < consumed_before_body + auth_tag_len {
            return Err(DecodeError::InvalidIntegrityLayout(
                "total length too small for declared key/counter/tag widths",
            ));
        }
        let encapsulated_len = total_length - consumed_before_body - auth_tag_len;

        if ba.remaining_bytes() != encapsulated_len + auth_tag_len {
            return Err(DecodeError::InvalidIntegrityLayout(
                "declared length disagrees with actual buffer content",
            ));
        }

        let encapsulated = ba.read_bytes(encapsulated_len)?.to_vec();
        let auth_tag = ba.read_bytes(auth_tag_len)?.to_vec();
        if auth_tag.len() != auth_tag_len {
            return Err(DecodeError::InvalidIntegrityLayout(
                "derived auth tag length mismatch",
            ));
        }

        Ok(Self {
            scheme,
            sender_id: SenderId(sender_id),
            nonce,
            key_material,
            counter,
            encapsulated,
            auth_tag,
        })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        if self.key_material > u64::from(u32::MAX) || self.counter > u64::from(u32::MAX) {
            return Err(EncodeError::ValueTooLarge);
        }
        self.scheme
            .validate()
            .map_err(|_| EncodeError::InvalidData("protection scheme not allowed"))?;
        if self.auth_tag.len() % 4 != 0 || self.auth_tag.len() > 0xF0 {
            return Err(EncodeError::InvalidData("auth tag length must be a multiple of 4"));
        }

        let key_width = byte_array::encoded_width(self.key_material);
        let counter_width = byte_array::encoded_width(self.counter);
        let auth_tag_index = (self.auth_tag.len() / 4) as u8;

        let start = buf.len();
        let flags = (auth_tag_index << 4) | (Self::width_to_index(key_width) << 2) | Self::width_to_index(counter_width);
        buf.push(flags);
        buf.push(self.scheme.to_byte());
        buf.extend_from_slice(&self.sender_id.0);
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        byte_array::write_width(buf, self.key_material, key_width);
        byte_array::write_width(buf, self.counter, counter_width);
        buf.extend_from_slice(&self.encapsulated);
        buf.extend_from_slice(&self.auth_tag);
        Ok(buf.len() - start)
    }

    const fn index_to_width(index: u8) -> Result<u8, DecodeError> {
        match index {
            0b00 => Ok(0),
            0b01 => Ok(2),
            0b10 => Ok(4),
            _ => Err(DecodeError::InvalidIntegrityLayout("reserved key/counter width index")),
        }
    }

    const fn width_to_index(width: u8) -> u8 {
        match width {
            0 => 0b00,
            2 => 0b01,
            4 => 0b10,
            _ => unreachable!("width is always 0, 2 or 4"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::MessageType;
    use crate::header::FixedHeader;

    fn sample_inner() -> Vec<u8> {
        let mut inner = Vec::new();
        FixedHeader::encode(&mut inner, 2, MessageType::PingReq);
        inner.extend_from_slice(&[0xAB, 0xCD]);
        inner
    }

    #[test]
    fn round_trips_chacha20_poly1305() {
        let frame = IntegrityFrame {
            scheme: ProtectionScheme::ChaCha20Poly1305,
            sender_id: SenderId([1, 2, 3, 4, 5, 6, 7, 8]),
            nonce: 0x1122_3344,
            key_material: 0x0102_0304,
            counter: 0x0005,
            encapsulated: sample_inner(),
            auth_tag: vec![0xAAu8; 16],
        };

        let mut payload = Vec::new();
        frame.encode(&mut payload).unwrap();

        // header_len(2) + payload makes up total_length.
        let total_length = payload.len() + 2;
        let decoded = IntegrityFrame::decode(&payload, 2, total_length).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn rejects_hmac_sha256() {
        let frame = IntegrityFrame {
            scheme: ProtectionScheme::HmacSha256,
            sender_id: SenderId([0; 8]),
            nonce: 0,
            key_material: 0,
            counter: 0,
            encapsulated: sample_inner(),
            auth_tag: vec![0u8; 16],
        };
        let mut payload = Vec::new();
        assert_eq!(
            frame.encode(&mut payload),
            Err(EncodeError::InvalidData("protection scheme not allowed"))
        );
    }

    #[test]
    fn rejects_mismatched_tag_length() {
        let frame = IntegrityFrame {
            scheme: ProtectionScheme::ChaCha20Poly1305,
            sender_id: SenderId([0; 8]),
            nonce: 0,
            key_material: 0,
            counter: 0,
            encapsulated: sample_inner(),
            auth_tag: vec![0xAAu8; 16],
        };
        let mut payload = Vec::new();
        frame.encode(&mut payload).unwrap();
        // Lie about the total length so the derived tag length is wrong.
        let wrong_total = payload.len() + 2 - 4;
        assert!(IntegrityFrame::decode(&payload, 2, wrong_total).is_err());
    }
}
