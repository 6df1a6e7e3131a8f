// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The single task with exclusive access to [`Runtime`] (§5, §9's "no
//! ambient singletons": one `Runtime` handle passed explicitly rather
//! than service locators). Transport reader tasks and the scheduler
//! task feed it over channels; all operations on a given session are
//! therefore serialized simply because only this task ever touches
//! `Runtime`, with no per-session lock needed.

use std::sync::Arc;
use std::time::Instant;

use log::warn;
use sngw_codec::{Message, MessageFactory, ProtocolVersion};
use tokio::sync::mpsc;

use crate::commands::{DispatcherToTransportCmd, SchedulerToDispatcherCmd, TransportToDispatcherCmd};
use crate::handler::{self, OutboundFrame};
use crate::metrics::Metrics;
use crate::runtime::Runtime;
use crate::scheduler::Scheduler;
use crate::types::NetworkAddress;

pub struct Dispatcher {
    runtime: Runtime,
    factory: MessageFactory,
    protocol_version: ProtocolVersion,
    integrity_enabled: bool,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(runtime: Runtime, protocol_version: ProtocolVersion, integrity_enabled: bool, metrics: Arc<Metrics>) -> Self {
        Self {
            runtime,
            factory: MessageFactory::new(),
            protocol_version,
            integrity_enabled,
            metrics,
        }
    }

    /// Drive the dispatcher until both inbound channels close: a
    /// transport reader's sender dropping and the scheduler's sender
    /// dropping together is this task's shutdown signal (§5: shutdown
    /// is cooperative, readers and the scheduler stop first).
    pub async fn run(
        mut self,
        mut transport_rx: mpsc::Receiver<TransportToDispatcherCmd>,
        mut scheduler_rx: mpsc::Receiver<SchedulerToDispatcherCmd>,
        transport_tx: mpsc::Sender<DispatcherToTransportCmd>,
        mut scheduler: Scheduler,
    ) {
        loop {
            tokio::select! {
                cmd = transport_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    let frames = self.handle_transport_cmd(cmd);
                    self.send_frames(&transport_tx, frames).await;
                }
                tick = scheduler_rx.recv() => {
                    let Some(SchedulerToDispatcherCmd::Tick) = tick else { break };
                    let frames = scheduler.tick(&mut self.runtime, Instant::now());
                    self.send_frames(&transport_tx, frames).await;
                }
            }
        }
    }

    fn handle_transport_cmd(&mut self, cmd: TransportToDispatcherCmd) -> Vec<OutboundFrame> {
        let TransportToDispatcherCmd::Datagram(from, bytes) = cmd;
        self.handle_datagram(from, &bytes)
    }

    fn handle_datagram(&mut self, from: NetworkAddress, bytes: &[u8]) -> Vec<OutboundFrame> {
        match self.factory.parse(bytes) {
            Ok(message) => self.dispatch_message(from, message),
            Err(err) => {
                warn!("dropping malformed frame from {from}: {err:?}");
                self.metrics.codec_error();
                Vec::new()
            }
        }
    }

    fn dispatch_message(&mut self, from: NetworkAddress, message: Message) -> Vec<OutboundFrame> {
        match message {
            Message::Encapsulated(frame) => self.unwrap_integrity(from, &frame.encapsulated),
            other => handler::handle_message(&mut self.runtime, from, other, self.protocol_version),
        }
    }

    /// Unwrap a v2.0 integrity envelope and dispatch what it encloses.
    /// The envelope's own byte layout was already validated by
    /// [`sngw_codec::integrity::IntegrityFrame::decode`] (auth-tag
    /// length, key/counter widths); verifying the tag itself against
    /// live key material is a deployment-specific concern the core does
    /// not own (§6 names no key-distribution contract), so a deployment
    /// that enables `integrityEnabled` is expected to have already
    /// authenticated the frame at the transport boundary before handing
    /// it here.
    fn unwrap_integrity(&mut self, from: NetworkAddress, encapsulated: &[u8]) -> Vec<OutboundFrame> {
        if !self.integrity_enabled {
            warn!("rejecting integrity-enveloped frame from {from}: integrity disabled");
            self.metrics.codec_error();
            return Vec::new();
        }
        match self.factory.parse(encapsulated) {
            Ok(inner) => handler::handle_message(&mut self.runtime, from, inner, ProtocolVersion::V2_0),
            Err(err) => {
                warn!("dropping malformed encapsulated frame from {from}: {err:?}");
                self.metrics.codec_error();
                Vec::new()
            }
        }
    }

    async fn send_frames(&self, tx: &mpsc::Sender<DispatcherToTransportCmd>, frames: Vec<OutboundFrame>) {
        for frame in frames {
            if tx.send(DispatcherToTransportCmd::Send(frame.to, frame.bytes)).await.is_err() {
                warn!("transport command channel closed; dropping remaining outbound frames");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_state::RetryPolicy;
    use crate::session_registry::SessionLimits;
    use crate::subscription::SubscriptionLimits;

    fn dispatcher() -> Dispatcher {
        let runtime = Runtime::new(SessionLimits::default(), SubscriptionLimits::default(), RetryPolicy::default(), Vec::new());
        Dispatcher::new(runtime, ProtocolVersion::V1_2, false, Arc::new(Metrics::new()))
    }

    #[test]
    fn malformed_datagram_bumps_codec_error_metric() {
        let mut dispatcher = dispatcher();
        let from = NetworkAddress::new("10.0.0.1:1883");
        let frames = dispatcher.handle_datagram(from, &[0xFF]);
        assert!(frames.is_empty());
        assert_eq!(dispatcher.metrics.codec_errors(), 1);
    }

    #[test]
    fn encapsulated_frame_rejected_when_integrity_disabled() {
        let mut dispatcher = dispatcher();
        let from = NetworkAddress::new("10.0.0.1:1883");
        let mut payload = Vec::new();
        sngw_codec::FixedHeader::encode(&mut payload, 0, sngw_codec::MessageType::PingReq);
        let frames = dispatcher.unwrap_integrity(from, &payload);
        assert!(frames.is_empty());
        assert_eq!(dispatcher.metrics.codec_errors(), 1);
    }
}
