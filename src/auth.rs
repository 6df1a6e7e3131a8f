// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Optional authentication service consulted on `CONNECT` (§4.6). MQTT-SN
//! carries no username/password in its `CONNECT` packet, so the contract
//! authenticates on `client_id` alone; a deployment that needs richer
//! credentials (a pre-shared key carried in the integrity envelope's
//! sender id, say) plugs its own [`AuthService`] in rather than this
//! crate growing a wire field the protocol doesn't have.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::error::Error;

/// Checked once per `CONNECT`, before a session is created or resumed.
pub trait AuthService: Send + Sync {
    /// Returns `Ok(true)` to admit the client, `Ok(false)` to reject it
    /// with `CONNACK(NotSupported)`, and `Err` if the backend itself
    /// failed (rejected with `CONNACK(Congestion)` by the caller).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not be reached.
    fn authenticate(&self, client_id: &str) -> Result<bool, Error>;
}

/// Admits every `client_id`. Matches [`crate::config::Config::allow_anonymous`]
/// left at its default.
#[derive(Debug, Default)]
pub struct AllowAnonymous;

impl AuthService for AllowAnonymous {
    fn authenticate(&self, _client_id: &str) -> Result<bool, Error> {
        Ok(true)
    }
}

/// Admits only `client_id`s present in a fixed allow-list, the way the
/// broker this gateway descends from matched credentials against a
/// loaded password file, minus the password half MQTT-SN has no room
/// for on the wire.
#[derive(Debug, Default)]
pub struct StaticClientIdAuth {
    allowed: Mutex<HashSet<String>>,
}

impl StaticClientIdAuth {
    #[must_use]
    pub fn new(allowed: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed: Mutex::new(allowed.into_iter().collect()),
        }
    }

    pub fn allow(&self, client_id: impl Into<String>) {
        self.allowed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(client_id.into());
    }

    pub fn revoke(&self, client_id: &str) {
        self.allowed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(client_id);
    }
}

impl AuthService for StaticClientIdAuth {
    fn authenticate(&self, client_id: &str) -> Result<bool, Error> {
        Ok(self
            .allowed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(client_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_anonymous_admits_everyone() {
        let auth = AllowAnonymous;
        assert!(auth.authenticate("any-client").unwrap());
    }

    #[test]
    fn static_list_rejects_unknown_client() {
        let auth = StaticClientIdAuth::new(["known".to_string()]);
        assert!(auth.authenticate("known").unwrap());
        assert!(!auth.authenticate("unknown").unwrap());
    }

    #[test]
    fn revoke_removes_a_previously_allowed_client() {
        let auth = StaticClientIdAuth::new(["known".to_string()]);
        auth.revoke("known");
        assert!(!auth.authenticate("known").unwrap());
    }
}
