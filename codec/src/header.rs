// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The `[length][type]` frame header shared by every MQTT-SN message.

use crate::base::MessageType;
use crate::byte_array::ByteArray;
use crate::error::DecodeError;

/// Length is encoded as one byte if the total frame (header included)
/// fits in 0xFF bytes, else as `0x01 HI LO` (a 3-byte extended form).
const EXTENDED_LENGTH_MARKER: u8 = 0x01;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FixedHeader {
    /// Total frame length, header included.
    total_length: usize,
    message_type: MessageType,
}

impl FixedHeader {
    #[must_use]
    pub const fn new(total_length: usize, message_type: MessageType) -> Self {
        Self {
            total_length,
            message_type,
        }
    }

    #[must_use]
    pub const fn total_length(&self) -> usize {
        self.total_length
    }

    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Number of bytes this header itself occupies (1 or 3).
    #[must_use]
    pub const fn header_len(&self) -> usize {
        if self.total_length > 0xFF {
            4
        } else {
            2
        }
    }

    /// Decode the header, leaving the cursor positioned at the start of
    /// the message payload.
    pub fn decode(ba: &mut ByteArray<'_>) -> Result<Self, DecodeError> {
        let first = ba.read_u8()?;
        let total_length = if first == EXTENDED_LENGTH_MARKER {
            usize::from(ba.read_u16()?)
        } else {
            usize::from(first)
        };

        if total_length < 2 {
            return Err(DecodeError::InvalidLength);
        }
        // Reject the non-canonical extended encoding of a length that
        // would have fit in the 1-byte form.
        if first == EXTENDED_LENGTH_MARKER && total_length <= 0xFF {
            return Err(DecodeError::InvalidLength);
        }

        let type_byte = ba.read_u8()?;
        let message_type = MessageType::from_byte(type_byte)?;

        let header_len = if first == EXTENDED_LENGTH_MARKER { 4 } else { 2 };
        if total_length < header_len {
            return Err(DecodeError::InvalidLength);
        }

        Ok(Self {
            total_length,
            message_type,
        })
    }

    /// Write the `[length][type]` prefix for a payload of `payload_len`
    /// bytes, choosing the shortest valid form.
    pub fn encode(buf: &mut Vec<u8>, payload_len: usize, message_type: MessageType) {
        if payload_len + 2 <= 0xFF {
            buf.push((payload_len + 2) as u8);
        } else {
            let total_length = payload_len + 4;
            buf.push(EXTENDED_LENGTH_MARKER);
            buf.extend_from_slice(&(total_length as u16).to_be_bytes());
        }
        buf.push(message_type.to_byte());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_round_trips() {
        let mut buf = Vec::new();
        FixedHeader::encode(&mut buf, 3, MessageType::PingReq);
        assert_eq!(buf, vec![5, MessageType::PingReq.to_byte()]);

        let mut ba = ByteArray::new(&buf);
        let header = FixedHeader::decode(&mut ba).unwrap();
        assert_eq!(header.total_length(), 5);
        assert_eq!(header.header_len(), 2);
        assert_eq!(header.message_type(), MessageType::PingReq);
    }

    #[test]
    fn extended_form_used_above_0xff() {
        let payload_len = 300;
        let mut buf = Vec::new();
        FixedHeader::encode(&mut buf, payload_len, MessageType::Publish);
        assert_eq!(buf[0], EXTENDED_LENGTH_MARKER);

        let mut ba = ByteArray::new(&buf);
        let header = FixedHeader::decode(&mut ba).unwrap();
        assert_eq!(header.total_length(), payload_len + 4);
        assert_eq!(header.header_len(), 4);
    }

    #[test]
    fn rejects_non_canonical_extended_length() {
        let buf = vec![EXTENDED_LENGTH_MARKER, 0x00, 0x0A, MessageType::PingReq.to_byte()];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(FixedHeader::decode(&mut ba), Err(DecodeError::InvalidLength));
    }

    #[test]
    fn rejects_unknown_type() {
        let buf = vec![3, 0x7F];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(FixedHeader::decode(&mut ba), Err(DecodeError::UnknownType(0x7F)));
    }
}
