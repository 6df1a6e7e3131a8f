// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The per-device session: its lifecycle state machine (§4.3) plus the
//! queue, topic registry and inflight state it owns. Sessions are
//! plain data owned by [`crate::runtime::Runtime`]; the dispatcher
//! (the single task with exclusive access to `Runtime`) is what gives
//! access to one session at a time its serialization guarantee, not a
//! per-session actor.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sngw_codec::{MessageId, QoS};

use crate::message_state::{MessageStateService, RetryPolicy};
use crate::queue::OutboundQueue;
use crate::topic_registry::TopicRegistry;
use crate::types::{SessionId, SessionParams};

/// A QoS 2 PUBLISH held between PUBREC and PUBREL: the device's payload
/// is not handed to the subscription trie until the handshake completes,
/// so a retransmitted PUBLISH before PUBREL does not fan out twice.
#[derive(Debug, Clone)]
pub struct PendingQos2Inbound {
    pub topic: String,
    pub qos: QoS,
    pub retain: bool,
    pub data: Vec<u8>,
}

/// `DISCONNECTED` is both the initial and the terminal state.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SessionState {
    Disconnected,
    Active,
    Asleep,
    Awake,
    Lost,
}

pub struct Session {
    pub id: SessionId,
    pub params: SessionParams,
    state: SessionState,
    last_seen: Instant,
    session_started: Instant,
    pub topics: TopicRegistry,
    pub queue: OutboundQueue,
    pub message_state: MessageStateService,
    pub subscriptions: Vec<String>,
    pending_qos2_inbound: HashMap<MessageId, PendingQos2Inbound>,
}

impl Session {
    #[must_use]
    pub fn new(id: SessionId, params: SessionParams, queue_capacity: usize, retry_policy: &RetryPolicy) -> Self {
        let now = Instant::now();
        Self {
            id,
            params,
            state: SessionState::Active,
            last_seen: now,
            session_started: now,
            topics: TopicRegistry::new(),
            queue: OutboundQueue::new(queue_capacity),
            message_state: MessageStateService::new(retry_policy),
            subscriptions: Vec::new(),
            pending_qos2_inbound: HashMap::new(),
        }
    }

    pub fn stash_qos2_inbound(&mut self, msg_id: MessageId, pending: PendingQos2Inbound) {
        self.pending_qos2_inbound.insert(msg_id, pending);
    }

    pub fn take_qos2_inbound(&mut self, msg_id: MessageId) -> Option<PendingQos2Inbound> {
        self.pending_qos2_inbound.remove(&msg_id)
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn last_seen(&self) -> Instant {
        self.last_seen
    }

    #[must_use]
    pub const fn session_started(&self) -> Instant {
        self.session_started
    }

    /// Any inbound traffic resets the keepalive clock and revives a
    /// `LOST` session back to `ACTIVE`.
    pub fn on_traffic(&mut self, now: Instant) {
        self.last_seen = now;
        if self.state == SessionState::Lost {
            self.state = SessionState::Active;
        }
    }

    pub fn on_disconnect(&mut self, duration: Option<u16>) {
        self.state = match duration {
            None | Some(0) => SessionState::Disconnected,
            Some(_) => SessionState::Asleep,
        };
    }

    /// A PINGREQ that carries the client id wakes an `ASLEEP` session so
    /// its queue can be drained.
    pub fn on_pingreq_with_client_id(&mut self) {
        if self.state == SessionState::Asleep {
            self.state = SessionState::Awake;
        }
    }

    /// Called once an `AWAKE` session's queue has been fully drained.
    pub fn on_queue_drained(&mut self) {
        if self.state == SessionState::Awake {
            self.state = SessionState::Asleep;
        }
    }

    #[must_use]
    pub fn keepalive_expired(&self, now: Instant, grace_factor: f64) -> bool {
        if self.params.keepalive_secs == 0 {
            return false;
        }
        let grace = Duration::from_secs_f64(f64::from(self.params.keepalive_secs) * grace_factor);
        now.duration_since(self.last_seen) > grace
    }

    pub fn on_keepalive_expired(&mut self) {
        self.state = SessionState::Lost;
    }

    /// Sessions are scheduled for queue-processor ticks only while
    /// `ACTIVE` or `AWAKE`, per §5.
    #[must_use]
    pub fn is_schedulable(&self) -> bool {
        matches!(self.state, SessionState::Active | SessionState::Awake)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state == SessionState::Disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sngw_codec::ProtocolVersion;

    fn params() -> SessionParams {
        SessionParams {
            client_id: "device-A".to_string(),
            keepalive_secs: 60,
            session_expiry_secs: 3600,
            clean_session: true,
            protocol_version: ProtocolVersion::V1_2,
            will: None,
        }
    }

    #[test]
    fn sleep_wake_cycle() {
        let mut session = Session::new(1, params(), 16, &RetryPolicy::default());
        assert_eq!(session.state(), SessionState::Active);

        session.on_disconnect(Some(300));
        assert_eq!(session.state(), SessionState::Asleep);

        session.on_pingreq_with_client_id();
        assert_eq!(session.state(), SessionState::Awake);

        session.on_queue_drained();
        assert_eq!(session.state(), SessionState::Asleep);
    }

    #[test]
    fn clean_disconnect_is_terminal() {
        let mut session = Session::new(1, params(), 16, &RetryPolicy::default());
        session.on_disconnect(Some(0));
        assert!(session.is_terminal());
    }

    #[test]
    fn keepalive_and_traffic_revival() {
        let mut session = Session::new(1, params(), 16, &RetryPolicy::default());
        let later = Instant::now() + Duration::from_secs(1000);
        assert!(session.keepalive_expired(later, 1.5));
        session.on_keepalive_expired();
        assert_eq!(session.state(), SessionState::Lost);

        session.on_traffic(later);
        assert_eq!(session.state(), SessionState::Active);
    }
}
