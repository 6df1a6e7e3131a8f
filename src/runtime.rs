// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The one piece of shared mutable state the dispatcher and handler
//! operate on. Passed in explicitly rather than reached for through
//! ambient singletons, so every entry point's dependencies are visible
//! in its signature.

use std::collections::HashMap;
use std::sync::Arc;

use sngw_codec::{QoS, TopicAlias};

use crate::auth::{AllowAnonymous, AuthService};
use crate::message_registry::MessageRegistry;
use crate::message_state::RetryPolicy;
use crate::network::NetworkRegistry;
use crate::session::Session;
use crate::session_registry::{SessionLimits, SessionRegistry};
use crate::subscription::{SubscriptionLimits, SubscriptionTrie};
use crate::types::{ClientId, NetworkAddress, SessionId, SessionParams, WillRecord};

/// A CONNECT whose `will` flag is set is held here, address-keyed, while
/// the WILLTOPICREQ/WILLTOPIC/WILLMSGREQ/WILLMSG handshake runs; no
/// session exists yet to hold it.
#[derive(Debug, Clone)]
pub struct PendingConnect {
    pub client_id: ClientId,
    pub keepalive_secs: u16,
    pub session_expiry_secs: u32,
    pub clean_session: bool,
    pub protocol_version: sngw_codec::ProtocolVersion,
    pub will_topic: Option<(String, QoS, bool)>,
}

pub struct Runtime {
    pub sessions: SessionRegistry,
    pub network: NetworkRegistry,
    pub subscriptions: SubscriptionTrie,
    pub messages: MessageRegistry,
    pub retry_policy: RetryPolicy,
    pub predefined_aliases: Vec<(TopicAlias, String)>,
    pub auth: Arc<dyn AuthService>,
    pending_connects: HashMap<NetworkAddress, PendingConnect>,
}

impl Runtime {
    #[must_use]
    pub fn new(
        session_limits: SessionLimits,
        subscription_limits: SubscriptionLimits,
        retry_policy: RetryPolicy,
        predefined_aliases: Vec<(TopicAlias, String)>,
    ) -> Self {
        Self::with_auth(session_limits, subscription_limits, retry_policy, predefined_aliases, Arc::new(AllowAnonymous))
    }

    #[must_use]
    pub fn with_auth(
        session_limits: SessionLimits,
        subscription_limits: SubscriptionLimits,
        retry_policy: RetryPolicy,
        predefined_aliases: Vec<(TopicAlias, String)>,
        auth: Arc<dyn AuthService>,
    ) -> Self {
        Self {
            sessions: SessionRegistry::new(session_limits),
            network: NetworkRegistry::new(),
            subscriptions: SubscriptionTrie::new(subscription_limits),
            messages: MessageRegistry::new(),
            retry_policy,
            predefined_aliases,
            auth,
            pending_connects: HashMap::new(),
        }
    }

    pub fn stash_pending_connect(&mut self, address: NetworkAddress, pending: PendingConnect) {
        self.pending_connects.insert(address, pending);
    }

    pub fn pending_connect_mut(&mut self, address: &NetworkAddress) -> Option<&mut PendingConnect> {
        self.pending_connects.get_mut(address)
    }

    pub fn take_pending_connect(&mut self, address: &NetworkAddress) -> Option<PendingConnect> {
        self.pending_connects.remove(address)
    }

    /// Finish a CONNECT (with or without a will) once every field needed
    /// for [`SessionParams`] is known: create or resume the session, bind
    /// the network address, and seed the session's predefined aliases.
    pub fn finalize_connect(
        &mut self,
        address: NetworkAddress,
        pending: PendingConnect,
        will: Option<WillRecord>,
    ) -> Result<SessionId, crate::error::Error> {
        if !self.auth.authenticate(&pending.client_id)? {
            return Err(crate::error::Error::new(
                crate::error::ErrorKind::ProtocolViolation,
                "CONNECT rejected by auth service",
            ));
        }
        let params = SessionParams {
            client_id: pending.client_id,
            keepalive_secs: pending.keepalive_secs,
            session_expiry_secs: pending.session_expiry_secs,
            clean_session: pending.clean_session,
            protocol_version: pending.protocol_version,
            will,
        };
        let session_id = self.sessions.connect(params, &self.retry_policy)?;
        self.network.bind(address, session_id);
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.topics.seed_predefined(self.predefined_aliases.clone());
        }
        Ok(session_id)
    }

    /// Tear down a session entirely: unbind its address, clear its
    /// subscriptions, and drop it from the registry.
    pub fn remove_session(&mut self, session_id: SessionId) -> Option<Session> {
        self.network.unbind(session_id);
        self.subscriptions.remove_session(session_id);
        self.sessions.remove(session_id)
    }
}
