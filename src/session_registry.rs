// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Creates, looks up and expires sessions, and drives their state
//! machine transitions that are observable only at the registry level
//! (keepalive sweeps, session-expiry removal).

use std::collections::HashMap;
use std::time::Instant;

use crate::error::{Error, ErrorKind};
use crate::message_state::RetryPolicy;
use crate::session::Session;
use crate::types::{ClientId, SessionId, SessionParams, SESSION_EXPIRY_NEVER};

#[derive(Debug, Clone)]
pub struct SessionLimits {
    pub max_sessions: usize,
    pub queue_capacity: usize,
    pub keepalive_grace_factor: f64,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_sessions: 10_000,
            queue_capacity: 32,
            keepalive_grace_factor: 1.5,
        }
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    by_client_id: HashMap<ClientId, SessionId>,
    next_id: SessionId,
    limits: SessionLimits,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            sessions: HashMap::new(),
            by_client_id: HashMap::new(),
            next_id: 1,
            limits,
        }
    }

    /// Create a fresh session for `params`, or resume the existing one
    /// for the same client id if present and not `clean_session`.
    pub fn connect(&mut self, params: SessionParams, retry_policy: &RetryPolicy) -> Result<SessionId, Error> {
        if let Some(&existing_id) = self.by_client_id.get(&params.client_id) {
            if !params.clean_session {
                if let Some(session) = self.sessions.get_mut(&existing_id) {
                    session.on_traffic(Instant::now());
                    session.params = params;
                    return Ok(existing_id);
                }
            } else {
                self.remove(existing_id);
            }
        }

        if self.sessions.len() >= self.limits.max_sessions {
            return Err(Error::new(ErrorKind::SessionNotFound, "session table full"));
        }

        let id = self.next_id;
        self.next_id += 1;
        let client_id = params.client_id.clone();
        let session = Session::new(id, params, self.limits.queue_capacity, retry_policy);
        self.sessions.insert(id, session);
        self.by_client_id.insert(client_id, id);
        Ok(id)
    }

    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    #[must_use]
    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    #[must_use]
    pub fn find_by_client_id(&self, client_id: &str) -> Option<SessionId> {
        self.by_client_id.get(client_id).copied()
    }

    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        if let Some(session) = self.sessions.remove(&id) {
            self.by_client_id.remove(&session.params.client_id);
            Some(session)
        } else {
            None
        }
    }

    #[must_use]
    pub fn schedulable_ids(&self) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|session| session.is_schedulable())
            .map(|session| session.id)
            .collect()
    }

    /// Sweep every session for keepalive and session-expiry timeouts.
    /// Returns the ids that were removed outright (expired) separately
    /// from those merely marked `LOST`.
    pub fn sweep(&mut self, now: Instant) -> (Vec<SessionId>, Vec<SessionId>) {
        let mut lost = Vec::new();
        let mut expired = Vec::new();

        for session in self.sessions.values_mut() {
            if session.keepalive_expired(now, self.limits.keepalive_grace_factor) {
                session.on_keepalive_expired();
                lost.push(session.id);
            }
            if session.params.session_expiry_secs != SESSION_EXPIRY_NEVER {
                let expiry = std::time::Duration::from_secs(u64::from(session.params.session_expiry_secs));
                if now.duration_since(session.session_started()) > expiry {
                    expired.push(session.id);
                }
            }
        }

        for id in &expired {
            self.remove(*id);
        }

        (lost, expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sngw_codec::ProtocolVersion;

    fn params(client_id: &str, clean_session: bool) -> SessionParams {
        SessionParams {
            client_id: client_id.to_string(),
            keepalive_secs: 60,
            session_expiry_secs: SESSION_EXPIRY_NEVER,
            clean_session,
            protocol_version: ProtocolVersion::V1_2,
            will: None,
        }
    }

    #[test]
    fn resumes_session_for_non_clean_reconnect() {
        let mut registry = SessionRegistry::new(SessionLimits::default());
        let policy = RetryPolicy::default();
        let first = registry.connect(params("device-A", false), &policy).unwrap();
        let second = registry.connect(params("device-A", false), &policy).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn clean_session_replaces_prior_session() {
        let mut registry = SessionRegistry::new(SessionLimits::default());
        let policy = RetryPolicy::default();
        let first = registry.connect(params("device-A", false), &policy).unwrap();
        let second = registry.connect(params("device-A", true), &policy).unwrap();
        assert_ne!(first, second);
        assert!(registry.get(first).is_none());
    }
}
