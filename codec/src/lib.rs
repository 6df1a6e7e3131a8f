// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Wire codec for the MQTT-SN protocol, both the 1.2 draft and the 2.0
//! draft's additional integrity envelope.
//!
//! [`MessageFactory`] is the main entry point: it turns a raw frame into
//! a typed [`Message`] and back, so callers never deal with byte
//! offsets, and rarely need to import anything from the `messages`
//! module directly.

pub mod base;
pub mod byte_array;
pub mod error;
pub mod flags;
pub mod header;
pub mod integrity;
pub mod message;
pub mod messages;

pub use base::{DecodePacket, EncodePacket, MessageId, MessageType, ProtocolVersion, QoS, TopicAlias, TopicIdType};
pub use error::{DecodeError, EncodeError};
pub use flags::Flags;
pub use header::FixedHeader;
pub use integrity::{IntegrityFrame, ProtectionScheme, SenderId};
pub use message::{Message, MessageFactory};
