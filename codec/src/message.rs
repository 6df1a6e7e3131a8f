// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The aggregate [`Message`] enum and the [`MessageFactory`] that turns
//! raw bytes into one, so callers never have to know a frame's byte
//! offsets or dispatch on [`MessageType`] themselves.

use crate::base::{DecodePacket, EncodePacket, MessageType};
use crate::byte_array::ByteArray;
use crate::error::{DecodeError, EncodeError};
use crate::header::FixedHeader;
use crate::integrity::IntegrityFrame;
use crate::messages::connect::{ConnAckPacket, ConnectPacket};
use crate::messages::disconnect::DisconnectPacket;
use crate::messages::discovery::{AdvertisePacket, GwInfoPacket, SearchGwPacket};
use crate::messages::pingreq::PingReqPacket;
use crate::messages::pingresp::PingRespPacket;
use crate::messages::publish::{PubAckPacket, PublishPacket};
use crate::messages::qos2::{self, Qos2Kind, Qos2Packet};
use crate::messages::register::{RegAckPacket, RegisterPacket};
use crate::messages::subscribe::{SubAckPacket, SubscribePacket};
use crate::messages::unsubscribe::{UnsubAckPacket, UnsubscribePacket};
use crate::messages::will::{WillMsgPacket, WillMsgReqPacket, WillTopicPacket, WillTopicReqPacket};

/// Every MQTT-SN message the gateway understands, decoded to its typed
/// payload. `Encapsulated` is intentionally left wrapped: the dispatcher
/// decides whether to unwrap it based on the session's negotiated
/// protocol version, rather than the factory guessing.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Advertise(AdvertisePacket),
    SearchGw(SearchGwPacket),
    GwInfo(GwInfoPacket),
    Connect(ConnectPacket),
    ConnAck(ConnAckPacket),
    WillTopicReq(WillTopicReqPacket),
    WillTopic(WillTopicPacket),
    WillMsgReq(WillMsgReqPacket),
    WillMsg(WillMsgPacket),
    Register(RegisterPacket),
    RegAck(RegAckPacket),
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    PubRec(Qos2Packet),
    PubRel(Qos2Packet),
    PubComp(Qos2Packet),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq(PingReqPacket),
    PingResp(PingRespPacket),
    Disconnect(DisconnectPacket),
    Encapsulated(IntegrityFrame),
}

impl Message {
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Advertise(_) => MessageType::Advertise,
            Self::SearchGw(_) => MessageType::SearchGw,
            Self::GwInfo(_) => MessageType::GwInfo,
            Self::Connect(_) => MessageType::Connect,
            Self::ConnAck(_) => MessageType::ConnAck,
            Self::WillTopicReq(_) => MessageType::WillTopicReq,
            Self::WillTopic(_) => MessageType::WillTopic,
            Self::WillMsgReq(_) => MessageType::WillMsgReq,
            Self::WillMsg(_) => MessageType::WillMsg,
            Self::Register(_) => MessageType::Register,
            Self::RegAck(_) => MessageType::RegAck,
            Self::Publish(_) => MessageType::Publish,
            Self::PubAck(_) => MessageType::PubAck,
            Self::PubRec(_) => MessageType::PubRec,
            Self::PubRel(_) => MessageType::PubRel,
            Self::PubComp(_) => MessageType::PubComp,
            Self::Subscribe(_) => MessageType::Subscribe,
            Self::SubAck(_) => MessageType::SubAck,
            Self::Unsubscribe(_) => MessageType::Unsubscribe,
            Self::UnsubAck(_) => MessageType::UnsubAck,
            Self::PingReq(_) => MessageType::PingReq,
            Self::PingResp(_) => MessageType::PingResp,
            Self::Disconnect(_) => MessageType::Disconnect,
            Self::Encapsulated(_) => MessageType::Encapsulated,
        }
    }

    fn encode_payload(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        match self {
            Self::Advertise(packet) => packet.encode(buf),
            Self::SearchGw(packet) => packet.encode(buf),
            Self::GwInfo(packet) => packet.encode(buf),
            Self::Connect(packet) => packet.encode(buf),
            Self::ConnAck(packet) => packet.encode(buf),
            Self::WillTopicReq(packet) => packet.encode(buf),
            Self::WillTopic(packet) => packet.encode(buf),
            Self::WillMsgReq(packet) => packet.encode(buf),
            Self::WillMsg(packet) => packet.encode(buf),
            Self::Register(packet) => packet.encode(buf),
            Self::RegAck(packet) => packet.encode(buf),
            Self::Publish(packet) => packet.encode(buf),
            Self::PubAck(packet) => packet.encode(buf),
            Self::PubRec(packet) | Self::PubRel(packet) | Self::PubComp(packet) => packet.encode(buf),
            Self::Subscribe(packet) => packet.encode(buf),
            Self::SubAck(packet) => packet.encode(buf),
            Self::Unsubscribe(packet) => packet.encode(buf),
            Self::UnsubAck(packet) => packet.encode(buf),
            Self::PingReq(packet) => packet.encode(buf),
            Self::PingResp(packet) => packet.encode(buf),
            Self::Disconnect(packet) => packet.encode(buf),
            Self::Encapsulated(frame) => frame.encode(buf),
        }
    }

    /// Encode a complete frame: `[length][type]payload`.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut payload = Vec::new();
        self.encode_payload(&mut payload)?;
        let mut buf = Vec::with_capacity(payload.len() + 4);
        FixedHeader::encode(&mut buf, payload.len(), self.message_type());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }
}

/// Decodes a complete frame (header and payload) into a typed
/// [`Message`], without callers needing to know the fixed header shape
/// or per-message byte layout.
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageFactory;

impl MessageFactory {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    pub fn parse(&self, bytes: &[u8]) -> Result<Message, DecodeError> {
        let mut header_cursor = ByteArray::new(bytes);
        let header = FixedHeader::decode(&mut header_cursor)?;
        if header.total_length() != bytes.len() {
            return Err(DecodeError::InvalidLength);
        }

        let payload = &bytes[header.header_len()..];
        let mut ba = ByteArray::new(payload);

        Ok(match header.message_type() {
            MessageType::Advertise => Message::Advertise(AdvertisePacket::decode(&mut ba)?),
            MessageType::SearchGw => Message::SearchGw(SearchGwPacket::decode(&mut ba)?),
            MessageType::GwInfo => Message::GwInfo(GwInfoPacket::decode(&mut ba)?),
            MessageType::Connect => Message::Connect(ConnectPacket::decode(&mut ba)?),
            MessageType::ConnAck => Message::ConnAck(ConnAckPacket::decode(&mut ba)?),
            MessageType::WillTopicReq => Message::WillTopicReq(WillTopicReqPacket::decode(&mut ba)?),
            MessageType::WillTopic => Message::WillTopic(WillTopicPacket::decode(&mut ba)?),
            MessageType::WillMsgReq => Message::WillMsgReq(WillMsgReqPacket::decode(&mut ba)?),
            MessageType::WillMsg => Message::WillMsg(WillMsgPacket::decode(&mut ba)?),
            MessageType::Register => Message::Register(RegisterPacket::decode(&mut ba)?),
            MessageType::RegAck => Message::RegAck(RegAckPacket::decode(&mut ba)?),
            MessageType::Publish => Message::Publish(PublishPacket::decode(&mut ba)?),
            MessageType::PubAck => Message::PubAck(PubAckPacket::decode(&mut ba)?),
            MessageType::PubRec => Message::PubRec(qos2::decode_with_kind(&mut ba, Qos2Kind::PubRec)?),
            MessageType::PubRel => Message::PubRel(qos2::decode_with_kind(&mut ba, Qos2Kind::PubRel)?),
            MessageType::PubComp => Message::PubComp(qos2::decode_with_kind(&mut ba, Qos2Kind::PubComp)?),
            MessageType::Subscribe => Message::Subscribe(SubscribePacket::decode(&mut ba)?),
            MessageType::SubAck => Message::SubAck(SubAckPacket::decode(&mut ba)?),
            MessageType::Unsubscribe => Message::Unsubscribe(UnsubscribePacket::decode(&mut ba)?),
            MessageType::UnsubAck => Message::UnsubAck(UnsubAckPacket::decode(&mut ba)?),
            MessageType::PingReq => Message::PingReq(PingReqPacket::decode(&mut ba)?),
            MessageType::PingResp => Message::PingResp(PingRespPacket::decode(&mut ba)?),
            MessageType::Disconnect => Message::Disconnect(DisconnectPacket::decode(&mut ba)?),
            MessageType::WillTopicUpd
            | MessageType::WillTopicResp
            | MessageType::WillMsgUpd
            | MessageType::WillMsgResp => {
                return Err(DecodeError::UnknownType(header.message_type().to_byte()));
            }
            MessageType::Encapsulated => Message::Encapsulated(IntegrityFrame::decode(
                payload,
                header.header_len(),
                header.total_length(),
            )?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{QoS, TopicIdType};
    use crate::flags::Flags;

    #[test]
    fn round_trips_connect_through_factory() {
        let message = Message::Connect(ConnectPacket::new(
            Flags {
                clean_session: true,
                qos: QoS::AtMostOnce,
                topic_id_type: TopicIdType::Normal,
                ..Flags::default()
            },
            60,
            "device-A".to_string(),
        ));
        let bytes = message.encode().unwrap();
        let decoded = MessageFactory::new().parse(&bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn rejects_frame_with_trailing_bytes() {
        let message = Message::PingResp(PingRespPacket);
        let mut bytes = message.encode().unwrap();
        bytes.push(0xFF);
        assert_eq!(
            MessageFactory::new().parse(&bytes),
            Err(DecodeError::InvalidLength)
        );
    }

    #[test]
    fn rejects_will_update_messages_as_unsupported() {
        let bytes = vec![2, MessageType::WillTopicUpd.to_byte()];
        assert_eq!(
            MessageFactory::new().parse(&bytes),
            Err(DecodeError::UnknownType(MessageType::WillTopicUpd.to_byte()))
        );
    }
}
