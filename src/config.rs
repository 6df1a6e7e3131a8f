// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Configuration options recognized by the core (§6). Loaded from a TOML
//! file the way the broker this gateway descends from loaded its own
//! config; trimmed to the options the core engine itself consults.
//! Listener bind addresses, TLS and dashboard settings belong to the
//! external transport/admin collaborators, not this crate.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use sngw_codec::{ProtocolVersion, TopicAlias};

use crate::error::{Error, ErrorKind};
use crate::message_state::RetryPolicy;
use crate::session_registry::SessionLimits;
use crate::subscription::SubscriptionLimits;

/// `maxInflightMessages` is fixed at 1 by the protocol (§6) and is
/// therefore not a configurable field.
pub const MAX_INFLIGHT_MESSAGES: usize = 1;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubscriptionLimitsConfig {
    pub max_path_length: usize,
    pub max_segments: usize,
    pub max_members_per_node: usize,
}

impl Default for SubscriptionLimitsConfig {
    fn default() -> Self {
        let defaults = SubscriptionLimits::default();
        Self {
            max_path_length: defaults.max_path_len,
            max_segments: defaults.max_segments,
            max_members_per_node: defaults.max_members_per_node,
        }
    }
}

impl From<SubscriptionLimitsConfig> for SubscriptionLimits {
    fn from(config: SubscriptionLimitsConfig) -> Self {
        Self {
            max_path_len: config.max_path_length,
            max_segments: config.max_segments,
            max_members_per_node: config.max_members_per_node,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
pub enum ProtocolVersionConfig {
    #[serde(rename = "1.2")]
    V1_2,
    #[serde(rename = "2.0")]
    V2_0,
}

impl From<ProtocolVersionConfig> for ProtocolVersion {
    fn from(value: ProtocolVersionConfig) -> Self {
        match value {
            ProtocolVersionConfig::V1_2 => Self::V1_2,
            ProtocolVersionConfig::V2_0 => Self::V2_0,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Log {
    pub console_log: bool,
    pub level: LogLevel,
    pub log_file: Option<String>,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            console_log: true,
            level: LogLevel::Info,
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_sessions: usize,
    pub max_queue_size: usize,
    pub retry_timeout_ms: u64,
    pub max_retries: u32,
    pub keepalive_grace_factor: f64,
    /// Alias keyed by its decimal string form, since TOML tables require
    /// string keys; use [`Self::predefined_alias_entries`] to get the
    /// parsed `(alias, topic)` pairs the topic registry wants.
    pub predefined_aliases: HashMap<String, String>,
    pub subscription_limits: SubscriptionLimitsConfig,
    pub protocol_version: ProtocolVersionConfig,
    pub integrity_enabled: bool,
    pub allow_anonymous: bool,
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        let sessions = SessionLimits::default();
        Self {
            max_sessions: sessions.max_sessions,
            max_queue_size: sessions.queue_capacity,
            #[allow(clippy::cast_possible_truncation)]
            retry_timeout_ms: retry.timeout.as_millis() as u64,
            max_retries: retry.max_retries,
            keepalive_grace_factor: sessions.keepalive_grace_factor,
            predefined_aliases: HashMap::new(),
            subscription_limits: SubscriptionLimitsConfig::default(),
            protocol_version: ProtocolVersionConfig::V1_2,
            integrity_enabled: false,
            allow_anonymous: true,
            log: Log::default(),
        }
    }
}

impl Config {
    /// Parse a TOML config file.
    pub fn load(contents: &str) -> Result<Self, Error> {
        toml::from_str(contents)
            .map_err(|err| Error::from_string(ErrorKind::ConfigError, format!("invalid config: {err}")))
    }

    #[must_use]
    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            max_sessions: self.max_sessions,
            queue_capacity: self.max_queue_size,
            keepalive_grace_factor: self.keepalive_grace_factor,
        }
    }

    #[must_use]
    pub fn subscription_limits(&self) -> SubscriptionLimits {
        self.subscription_limits.clone().into()
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(self.retry_timeout_ms),
            max_retries: self.max_retries,
            ..RetryPolicy::default()
        }
    }

    /// Parse the string-keyed predefined alias table into `(alias,
    /// topic)` pairs, silently skipping malformed keys (logged by the
    /// caller via [`log::warn`], not here, to keep this pure).
    #[must_use]
    pub fn predefined_alias_entries(&self) -> Vec<(TopicAlias, String)> {
        self.predefined_aliases
            .iter()
            .filter_map(|(alias, topic)| alias.parse::<TopicAlias>().ok().map(|alias| (alias, topic.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_component_defaults() {
        let config = Config::default();
        assert_eq!(config.max_sessions, SessionLimits::default().max_sessions);
        assert!(config.allow_anonymous);
    }

    #[test]
    fn parses_minimal_toml() {
        let toml = r#"
            max_sessions = 100
            allow_anonymous = false
        "#;
        let config = Config::load(toml).unwrap();
        assert_eq!(config.max_sessions, 100);
        assert!(!config.allow_anonymous);
        assert_eq!(config.max_retries, Config::default().max_retries);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(Config::load("not valid = [").is_err());
    }
}
