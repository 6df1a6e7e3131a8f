// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::fmt;

use sngw_codec::{ProtocolVersion, QoS};
use uuid::Uuid;

/// Opaque client identifier presented at CONNECT time (1..65535 bytes,
/// enforced by the codec).
pub type ClientId = String;

/// Session identifier assigned by the session registry; stable for the
/// lifetime of the session, independent of the underlying network
/// address (a sleeping device may resume on a new address).
pub type SessionId = u64;

/// Content-addressed handle into the message registry.
pub type PayloadId = Uuid;

/// Opaque transport-level peer address (e.g. the textual form of a UDP
/// `(ip, port)` pair). The core never parses it, only compares and
/// hashes it.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NetworkAddress(String);

impl NetworkAddress {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A will record registered during the CONNECT/WILLTOPIC/WILLMSG
/// handshake, published by the gateway if the session is later found
/// `LOST` rather than cleanly disconnected.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WillRecord {
    pub topic: String,
    pub qos: QoS,
    pub retain: bool,
    pub payload: Vec<u8>,
}

/// Immutable facts about a session fixed at CONNECT time.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub client_id: ClientId,
    pub keepalive_secs: u16,
    pub session_expiry_secs: u32,
    pub clean_session: bool,
    pub protocol_version: ProtocolVersion,
    pub will: Option<WillRecord>,
}

/// `0xFFFF_FFFF` session-expiry means "never expires" per §3.
pub const SESSION_EXPIRY_NEVER: u32 = 0xFFFF_FFFF;
