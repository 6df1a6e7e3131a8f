// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The transport contract (§6): how a raw datagram reaches the core and
//! how a response frame leaves it. UDP sockets, BLE radios, and the
//! in-process loopback are external collaborators that implement this
//! trait from inside their own tokio tasks; this crate names the
//! contract and the command types ([`crate::commands`]) those tasks
//! exchange with the dispatcher, but does not own a socket itself.

use crate::error::Error;
use crate::types::NetworkAddress;

/// A concrete transport (UDP, BLE, loopback, ...) a reader task drives.
///
/// Implementations typically wrap non-blocking async I/O internally and
/// forward decoded datagrams to the dispatcher over an
/// `mpsc::Sender<TransportToDispatcherCmd>`, rather than being called
/// synchronously from the dispatch loop; this trait describes the
/// operations the reader task performs on it, not a calling convention.
pub trait Transport: Send {
    /// Bind/start listening per `bind_spec` (e.g. a UDP socket address).
    fn listen(&mut self, bind_spec: &str) -> Result<(), Error>;

    /// Send `bytes` to `address`. A failed send is reported back as an
    /// error for the caller to act on (e.g. mark the session LOST), not
    /// retried internally.
    fn send(&mut self, address: &NetworkAddress, bytes: &[u8]) -> Result<(), Error>;

    /// Block until the next datagram is available, or return `None` once
    /// [`Self::stop`] has been called.
    fn receive(&mut self) -> Result<Option<(NetworkAddress, Vec<u8>)>, Error>;

    /// Send `bytes` to every address the transport can reach. Used for
    /// `ADVERTISE`/`GWINFO` discovery; transports with no broadcast
    /// domain (loopback) may no-op.
    fn broadcast(&mut self, bytes: &[u8]) -> Result<(), Error>;

    /// Stop accepting new datagrams and unblock any pending
    /// [`Self::receive`] call.
    fn stop(&mut self);
}
