// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Tracks a session's single outbound inflight publish and drives the
//! queue processor that feeds it, per §4.5: at most one publish
//! in-flight per session at any instant.

use std::time::{Duration, Instant};

use rand::Rng;
use sngw_codec::{MessageId, QoS, TopicAlias};

use crate::queue::OutboundQueue;
use crate::topic_registry::{AliasKind, TopicRegistry};
use crate::types::PayloadId;

#[derive(Debug, Clone)]
struct InflightPublish {
    msg_id: MessageId,
    topic_alias: TopicAlias,
    qos: QoS,
    payload: PayloadId,
    attempt: u32,
    next_retry_deadline: Instant,
}

#[derive(Debug, Clone)]
struct PendingRegister {
    topic: String,
    msg_id: MessageId,
}

/// What the queue processor wants the caller to do next.
#[derive(Debug, Clone)]
pub enum ProcessorOutcome {
    /// Queue is empty; stop scheduling this session until new work
    /// arrives.
    RemoveProcess,
    /// Come back no sooner than the returned deadline.
    BackoffProcess(Instant),
    /// More work is immediately ready; call again right away.
    Reprocess,
    /// Send a REGISTER for a topic the device does not yet know an
    /// alias for; the publish that triggered this stays queued until
    /// the matching REGACK arrives.
    SendRegister { alias: TopicAlias, topic: String, msg_id: MessageId },
    /// Send this publish; the caller is responsible for encoding and
    /// transport delivery.
    SendPublish {
        topic_alias: TopicAlias,
        msg_id: MessageId,
        qos: QoS,
        retain: bool,
        payload: PayloadId,
        dup: bool,
    },
}

pub enum RetryOutcome {
    /// Nothing due yet.
    Idle,
    /// Re-send the inflight publish with DUP set.
    Retransmit {
        topic_alias: TopicAlias,
        msg_id: MessageId,
        qos: QoS,
        payload: PayloadId,
    },
    /// Retries exhausted; move to the dead-letter queue and clear the
    /// slot.
    Exhausted { topic_alias: TopicAlias, payload: PayloadId },
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 5,
            backoff_base: Duration::from_millis(200),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default)]
pub struct MessageStateService {
    inflight: Option<InflightPublish>,
    pending_register: Option<PendingRegister>,
    next_msg_id: MessageId,
    consecutive_backoffs: u32,
    policy_timeout: Duration,
    policy_backoff_base: Duration,
    policy_backoff_cap: Duration,
}

impl MessageStateService {
    #[must_use]
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            inflight: None,
            pending_register: None,
            next_msg_id: 1,
            consecutive_backoffs: 0,
            policy_timeout: policy.timeout,
            policy_backoff_base: policy.backoff_base,
            policy_backoff_cap: policy.backoff_cap,
        }
    }

    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.inflight.is_some()
    }

    fn next_msg_id(&mut self) -> MessageId {
        let id = self.next_msg_id;
        self.next_msg_id = self.next_msg_id.wrapping_add(1);
        if self.next_msg_id == 0 {
            self.next_msg_id = 1;
        }
        id
    }

    /// Exponential backoff with full jitter: scaling the same delay down
    /// by a random factor keeps many sessions backing off in lockstep
    /// from retrying in the same instant.
    fn backoff_deadline(&mut self) -> Instant {
        let exponent = self.consecutive_backoffs.min(16);
        let delay = self
            .policy_backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.policy_backoff_cap);
        self.consecutive_backoffs += 1;
        let jitter = rand::rng().random_range(0.5..=1.0);
        Instant::now() + delay.mul_f64(jitter)
    }

    /// Drive the queue one step, per §4.5 of the component design.
    pub fn process_next(&mut self, queue: &mut OutboundQueue, topics: &mut TopicRegistry) -> ProcessorOutcome {
        if self.inflight.is_some() || self.pending_register.is_some() {
            return ProcessorOutcome::BackoffProcess(self.backoff_deadline());
        }

        let Some(item) = queue.peek() else {
            self.consecutive_backoffs = 0;
            return ProcessorOutcome::RemoveProcess;
        };

        match topics.lookup_by_topic(&item.topic) {
            Some((alias, AliasKind::Normal | AliasKind::Predefined)) => {
                let item = queue.pop().expect("peeked above");
                let msg_id = self.next_msg_id();
                self.inflight = Some(InflightPublish {
                    msg_id,
                    topic_alias: alias,
                    qos: item.qos,
                    payload: item.payload,
                    attempt: 0,
                    next_retry_deadline: Instant::now() + self.policy_timeout,
                });
                self.consecutive_backoffs = 0;
                ProcessorOutcome::SendPublish {
                    topic_alias: alias,
                    msg_id,
                    qos: item.qos,
                    retain: item.retain,
                    payload: item.payload,
                    dup: false,
                }
            }
            Some((_, AliasKind::Short)) | None => {
                let topic = item.topic.clone();
                let alias = match topics.register(&topic) {
                    Ok(alias) => alias,
                    Err(_) => return ProcessorOutcome::BackoffProcess(self.backoff_deadline()),
                };
                let msg_id = self.next_msg_id();
                self.pending_register = Some(PendingRegister { topic: topic.clone(), msg_id });
                ProcessorOutcome::SendRegister { alias, topic, msg_id }
            }
        }
    }

    /// Called when the REGACK for a pending REGISTER arrives; returns
    /// `true` if it matched the outstanding registration, in which case
    /// the caller should invoke [`Self::process_next`] again to send the
    /// publish that was waiting behind it.
    pub fn on_regack(&mut self, msg_id: MessageId) -> bool {
        if self.pending_register.as_ref().is_some_and(|pending| pending.msg_id == msg_id) {
            self.pending_register = None;
            true
        } else {
            false
        }
    }

    /// Called on PUBACK with a matching message id; clears the inflight
    /// slot and returns its payload so the caller can release the
    /// reference in the message registry.
    pub fn on_puback(&mut self, msg_id: MessageId) -> Option<PayloadId> {
        if self.inflight.as_ref().is_some_and(|inflight| inflight.msg_id == msg_id) {
            self.inflight.take().map(|inflight| inflight.payload)
        } else {
            None
        }
    }

    /// Check whether the inflight publish's retry deadline has passed.
    pub fn check_retry(&mut self, now: Instant, max_retries: u32) -> RetryOutcome {
        let Some(inflight) = &mut self.inflight else {
            return RetryOutcome::Idle;
        };
        if now < inflight.next_retry_deadline {
            return RetryOutcome::Idle;
        }
        if inflight.attempt >= max_retries {
            let payload = inflight.payload;
            let topic_alias = inflight.topic_alias;
            self.inflight = None;
            return RetryOutcome::Exhausted { topic_alias, payload };
        }
        inflight.attempt += 1;
        inflight.next_retry_deadline = now + self.policy_timeout;
        RetryOutcome::Retransmit {
            topic_alias: inflight.topic_alias,
            msg_id: inflight.msg_id,
            qos: inflight.qos,
            payload: inflight.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueuedPublish;

    fn item(topic: &str) -> QueuedPublish {
        QueuedPublish {
            topic: topic.to_string(),
            qos: QoS::AtLeastOnce,
            retain: false,
            payload: uuid::Uuid::new_v4(),
        }
    }

    #[test]
    fn fresh_topic_is_registered_before_publish() {
        let mut service = MessageStateService::new(&RetryPolicy::default());
        let mut topics = TopicRegistry::new();
        let mut queue = OutboundQueue::new(4);
        queue.push(item("sensors/temp")).unwrap();

        match service.process_next(&mut queue, &mut topics) {
            ProcessorOutcome::SendRegister { msg_id, .. } => {
                assert!(service.on_regack(msg_id));
            }
            other => panic!("expected SendRegister, got {other:?}"),
        }

        match service.process_next(&mut queue, &mut topics) {
            ProcessorOutcome::SendPublish { .. } => {}
            other => panic!("expected SendPublish, got {other:?}"),
        }
        assert!(service.is_occupied());
    }

    #[test]
    fn inflight_exclusivity_forces_backoff() {
        let mut service = MessageStateService::new(&RetryPolicy::default());
        let mut topics = TopicRegistry::new();
        topics.register("sensors/temp").unwrap();
        let mut queue = OutboundQueue::new(4);
        queue.push(item("sensors/temp")).unwrap();
        queue.push(item("sensors/temp")).unwrap();

        assert!(matches!(
            service.process_next(&mut queue, &mut topics),
            ProcessorOutcome::SendPublish { .. }
        ));
        assert!(matches!(
            service.process_next(&mut queue, &mut topics),
            ProcessorOutcome::BackoffProcess(_)
        ));
    }

    #[test]
    fn retry_exhaustion_clears_inflight_slot() {
        let mut service = MessageStateService::new(&RetryPolicy {
            timeout: Duration::from_millis(0),
            max_retries: 2,
            ..RetryPolicy::default()
        });
        let mut topics = TopicRegistry::new();
        topics.register("sensors/temp").unwrap();
        let mut queue = OutboundQueue::new(4);
        queue.push(item("sensors/temp")).unwrap();
        service.process_next(&mut queue, &mut topics);

        let now = Instant::now() + Duration::from_secs(1);
        assert!(matches!(service.check_retry(now, 2), RetryOutcome::Retransmit { .. }));
        assert!(matches!(service.check_retry(now, 2), RetryOutcome::Retransmit { .. }));
        assert!(matches!(service.check_retry(now, 2), RetryOutcome::Exhausted { .. }));
        assert!(!service.is_occupied());
    }
}
