// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The periodic heartbeat (§5): sweeps every session for keepalive and
//! expiry timeouts, retransmits or exhausts overdue inflight publishes,
//! and drains the outbound queue of every schedulable (`ACTIVE`/`AWAKE`)
//! session, honoring each session's own backoff deadline rather than
//! hammering it on every tick.

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, warn};

use crate::handler::{check_session_retry, drive_session_queue, publish_will, OutboundFrame};
use crate::runtime::Runtime;
use crate::types::SessionId;

pub struct Scheduler {
    next_due: HashMap<SessionId, Instant>,
    max_retries: u32,
}

impl Scheduler {
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self { next_due: HashMap::new(), max_retries }
    }

    /// Run one scheduling pass. Returns every frame that needs to reach
    /// the transport as a result: queued publishes/registers drained
    /// this tick and any retransmits that came due.
    pub fn tick(&mut self, runtime: &mut Runtime, now: Instant) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();

        let (lost, expired) = runtime.sessions.sweep(now);
        for session_id in lost {
            debug!("session {session_id} marked LOST by keepalive sweep");
            publish_will(runtime, session_id);
            self.next_due.remove(&session_id);
        }
        for session_id in expired {
            debug!("session {session_id} removed by session-expiry sweep");
            self.next_due.remove(&session_id);
        }

        for session_id in runtime.sessions.schedulable_ids() {
            let Some(address) = runtime.network.address_for(session_id).cloned() else {
                continue;
            };

            frames.extend(check_session_retry(runtime, &address, session_id, now, self.max_retries));

            if self.next_due.get(&session_id).is_some_and(|due| now < *due) {
                continue;
            }

            let (queue_frames, next_due) = drive_session_queue(runtime, &address, session_id);
            frames.extend(queue_frames);
            match next_due {
                Some(deadline) => {
                    self.next_due.insert(session_id, deadline);
                }
                None => {
                    self.next_due.remove(&session_id);
                }
            }
        }

        if !frames.is_empty() {
            warn!("scheduler tick produced {} outbound frame(s)", frames.len());
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_state::RetryPolicy;
    use crate::session_registry::SessionLimits;
    use crate::subscription::SubscriptionLimits;
    use crate::types::{NetworkAddress, SessionParams};
    use sngw_codec::ProtocolVersion;

    fn params(client_id: &str) -> SessionParams {
        SessionParams {
            client_id: client_id.to_string(),
            keepalive_secs: 60,
            session_expiry_secs: crate::types::SESSION_EXPIRY_NEVER,
            clean_session: true,
            protocol_version: ProtocolVersion::V1_2,
            will: None,
        }
    }

    #[test]
    fn tick_drains_a_queued_publish_without_waiting_for_pingreq() {
        let mut runtime = Runtime::new(SessionLimits::default(), SubscriptionLimits::default(), RetryPolicy::default(), Vec::new());
        let address = NetworkAddress::new("10.0.0.9:1883");
        let session_id = runtime.finalize_connect(address.clone(), crate::runtime::PendingConnect {
            client_id: "device-A".to_string(),
            keepalive_secs: 60,
            session_expiry_secs: crate::types::SESSION_EXPIRY_NEVER,
            clean_session: true,
            protocol_version: ProtocolVersion::V1_2,
            will_topic: None,
        }, None).unwrap();

        runtime.subscriptions.subscribe(session_id, "sensors/temp", sngw_codec::QoS::AtLeastOnce).unwrap();
        let payload = runtime.messages.insert(b"21.5".to_vec(), 1);
        let session = runtime.sessions.get_mut(session_id).unwrap();
        session.queue.push(crate::queue::QueuedPublish {
            topic: "sensors/temp".to_string(),
            qos: sngw_codec::QoS::AtLeastOnce,
            retain: false,
            payload,
        }).unwrap();

        let mut scheduler = Scheduler::new(RetryPolicy::default().max_retries);
        let frames = scheduler.tick(&mut runtime, Instant::now());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].to, address);
    }

    #[test]
    fn tick_marks_an_unresponsive_session_lost() {
        let mut runtime = Runtime::new(SessionLimits::default(), SubscriptionLimits::default(), RetryPolicy::default(), Vec::new());
        let address = NetworkAddress::new("10.0.0.9:1883");
        let session_id = runtime.sessions.connect(params("device-A"), &RetryPolicy::default()).unwrap();
        runtime.network.bind(address, session_id);

        let mut scheduler = Scheduler::new(RetryPolicy::default().max_retries);
        let later = Instant::now() + std::time::Duration::from_secs(1000);
        scheduler.tick(&mut runtime, later);

        assert_eq!(runtime.sessions.get(session_id).unwrap().state(), crate::session::SessionState::Lost);
    }
}
