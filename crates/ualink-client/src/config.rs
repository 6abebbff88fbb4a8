// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client configuration.
//!
//! All behavior that a script would otherwise set through library-wide
//! defaults is carried by an explicit [`ClientConfig`] passed to
//! constructors.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use ualink_client::config::{ClientConfig, ConnectionStrategy};
//!
//! let config = ClientConfig::builder()
//!     .endpoint_must_exist(true)
//!     .connection_strategy(ConnectionStrategy::new(
//!         2,
//!         Duration::from_secs(2),
//!         Duration::from_secs(10),
//!     ))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.connection_strategy.delay_for_attempt(1), Duration::from_secs(2));
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, ConnectError, UaError, UaResult};
use crate::types::humantime_serde;

// =============================================================================
// Endpoint
// =============================================================================

/// Address of a server endpoint.
///
/// Validated on construction; a Channel holds one for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    url: String,
}

impl Endpoint {
    /// URL scheme accepted by the client.
    pub const SCHEME: &'static str = "opc.tcp://";

    /// Parses and validates an endpoint URL.
    pub fn parse(url: impl Into<String>) -> Result<Self, ConnectError> {
        let url = url.into();
        let Some(rest) = url.strip_prefix(Self::SCHEME) else {
            return Err(ConnectError::invalid_endpoint(
                url,
                format!("endpoint must start with {}", Self::SCHEME),
            ));
        };
        let host = rest.split('/').next().unwrap_or_default();
        if host.is_empty() {
            return Err(ConnectError::invalid_endpoint(url, "missing host"));
        }
        Ok(Self { url })
    }

    /// Returns the URL.
    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns `host[:port]`.
    pub fn authority(&self) -> &str {
        self.url[Self::SCHEME.len()..]
            .split('/')
            .next()
            .unwrap_or_default()
    }

    /// Compares URLs ignoring case and a trailing slash.
    pub fn matches(&self, other: &str) -> bool {
        self.url.trim_end_matches('/').eq_ignore_ascii_case(other.trim_end_matches('/'))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = ConnectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.url
    }
}

// =============================================================================
// ConnectionStrategy
// =============================================================================

/// Bounded exponential backoff for connection establishment.
///
/// The delay after failed attempt `i` (1-based) is
/// `min(initial_delay * 2^(i-1), max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStrategy {
    /// Maximum connection attempts, 0 means retry forever.
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,

    /// Delay after the first failed attempt.
    #[serde(default = "default_initial_delay")]
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Upper bound for any delay.
    #[serde(default = "default_max_delay")]
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

fn default_max_retry() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

impl Default for ConnectionStrategy {
    fn default() -> Self {
        Self {
            max_retry: default_max_retry(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
        }
    }
}

impl ConnectionStrategy {
    /// Creates a strategy.
    pub fn new(max_retry: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retry,
            initial_delay,
            max_delay,
        }
    }

    /// Creates a strategy that retries forever.
    pub fn infinite(initial_delay: Duration, max_delay: Duration) -> Self {
        Self::new(0, initial_delay, max_delay)
    }

    /// Returns the delay to wait after failed attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Returns `true` once `attempts` attempts have been made and no more are allowed.
    #[inline]
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_retry != 0 && attempts >= self.max_retry
    }

    /// Returns `true` if this strategy never gives up.
    #[inline]
    pub fn is_infinite(&self) -> bool {
        self.max_retry == 0
    }

    /// Validates the strategy.
    pub fn validate(&self) -> UaResult<()> {
        if self.max_delay < self.initial_delay {
            return Err(UaError::invalid_config(
                "connection_strategy.max_delay",
                "must not be shorter than initial_delay",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// ClientConfig
// =============================================================================

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Application name sent with session creation.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Session name; generated when absent.
    #[serde(default)]
    pub session_name: Option<String>,

    /// Requested session timeout.
    #[serde(default = "default_session_timeout")]
    #[serde(with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Per-request response timeout.
    #[serde(default = "default_request_timeout")]
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Fail `connect()` when the server does not advertise the endpoint.
    #[serde(default)]
    pub endpoint_must_exist: bool,

    /// Retry policy for connection establishment and reconnection.
    #[serde(default)]
    pub connection_strategy: ConnectionStrategy,

    /// Capacity of each subscription's delivery queue.
    #[serde(default = "default_delivery_queue_capacity")]
    pub delivery_queue_capacity: usize,
}

fn default_application_name() -> String {
    "ualink".to_string()
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_delivery_queue_capacity() -> usize {
    256
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            session_name: None,
            session_timeout: default_session_timeout(),
            request_timeout: default_request_timeout(),
            endpoint_must_exist: false,
            connection_strategy: ConnectionStrategy::default(),
            delivery_queue_capacity: default_delivery_queue_capacity(),
        }
    }
}

impl ClientConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(input: &str) -> UaResult<Self> {
        let config: Self = toml::from_str(input)
            .map_err(|e| ConfigurationError::parse("toml", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(input: &str) -> UaResult<Self> {
        let config: Self = serde_json::from_str(input)
            .map_err(|e| ConfigurationError::parse("json", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates this configuration.
    pub fn validate(&self) -> UaResult<()> {
        if self.application_name.trim().is_empty() {
            return Err(UaError::invalid_config("application_name", "must not be empty"));
        }
        if self.request_timeout.is_zero() {
            return Err(UaError::invalid_config(
                "request_timeout",
                "must be greater than 0",
            ));
        }
        if self.session_timeout.is_zero() {
            return Err(UaError::invalid_config(
                "session_timeout",
                "must be greater than 0",
            ));
        }
        if self.delivery_queue_capacity == 0 {
            return Err(UaError::invalid_config(
                "delivery_queue_capacity",
                "must be greater than 0",
            ));
        }
        self.connection_strategy.validate()
    }

    /// Returns the configured session name or a generated one.
    pub fn effective_session_name(&self) -> String {
        self.session_name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.application_name, uuid::Uuid::new_v4()))
    }
}

// =============================================================================
// ClientConfigBuilder
// =============================================================================

/// Builder for `ClientConfig`.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    application_name: Option<String>,
    session_name: Option<String>,
    session_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    endpoint_must_exist: Option<bool>,
    connection_strategy: Option<ConnectionStrategy>,
    delivery_queue_capacity: Option<usize>,
}

impl ClientConfigBuilder {
    /// Sets the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Sets the session name.
    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = Some(name.into());
        self
    }

    /// Sets the session timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Sets the request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Requires the server to advertise the endpoint.
    pub fn endpoint_must_exist(mut self, must_exist: bool) -> Self {
        self.endpoint_must_exist = Some(must_exist);
        self
    }

    /// Sets the connection strategy.
    pub fn connection_strategy(mut self, strategy: ConnectionStrategy) -> Self {
        self.connection_strategy = Some(strategy);
        self
    }

    /// Sets the delivery queue capacity.
    pub fn delivery_queue_capacity(mut self, capacity: usize) -> Self {
        self.delivery_queue_capacity = Some(capacity);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> UaResult<ClientConfig> {
        let defaults = ClientConfig::default();
        let config = ClientConfig {
            application_name: self.application_name.unwrap_or(defaults.application_name),
            session_name: self.session_name,
            session_timeout: self.session_timeout.unwrap_or(defaults.session_timeout),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            endpoint_must_exist: self.endpoint_must_exist.unwrap_or(defaults.endpoint_must_exist),
            connection_strategy: self
                .connection_strategy
                .unwrap_or(defaults.connection_strategy),
            delivery_queue_capacity: self
                .delivery_queue_capacity
                .unwrap_or(defaults.delivery_queue_capacity),
        };
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parse() {
        let endpoint = Endpoint::parse("opc.tcp://localhost:26543").unwrap();
        assert_eq!(endpoint.url(), "opc.tcp://localhost:26543");
        assert_eq!(endpoint.authority(), "localhost:26543");
        assert!(endpoint.matches("OPC.TCP://localhost:26543/"));

        assert!(Endpoint::parse("http://localhost:4840").is_err());
        assert!(Endpoint::parse("opc.tcp://").is_err());
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let strategy =
            ConnectionStrategy::new(5, Duration::from_millis(2000), Duration::from_millis(10_000));
        let delays: Vec<_> = (1..=5).map(|i| strategy.delay_for_attempt(i)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(2000),
                Duration::from_millis(4000),
                Duration::from_millis(8000),
                Duration::from_millis(10_000),
                Duration::from_millis(10_000),
            ]
        );
    }

    #[test]
    fn test_delay_is_non_decreasing_for_large_attempts() {
        let strategy = ConnectionStrategy::new(0, Duration::from_secs(1), Duration::from_secs(30));
        let mut previous = Duration::ZERO;
        for attempt in 1..200 {
            let delay = strategy.delay_for_attempt(attempt);
            assert!(delay >= previous);
            assert!(delay <= strategy.max_delay);
            previous = delay;
        }
    }

    #[test]
    fn test_exhaustion() {
        let strategy = ConnectionStrategy::new(2, Duration::from_secs(1), Duration::from_secs(2));
        assert!(!strategy.is_exhausted(1));
        assert!(strategy.is_exhausted(2));

        let infinite = ConnectionStrategy::infinite(Duration::from_secs(1), Duration::from_secs(2));
        assert!(infinite.is_infinite());
        assert!(!infinite.is_exhausted(u32::MAX));
    }

    #[test]
    fn test_builder_validation() {
        assert!(ClientConfig::builder().build().is_ok());
        assert!(ClientConfig::builder()
            .request_timeout(Duration::ZERO)
            .build()
            .is_err());
        assert!(ClientConfig::builder()
            .connection_strategy(ConnectionStrategy::new(
                1,
                Duration::from_secs(5),
                Duration::from_secs(1),
            ))
            .build()
            .is_err());
    }

    #[test]
    fn test_from_toml() {
        let config = ClientConfig::from_toml_str(
            r#"
            application_name = "demo"
            endpoint_must_exist = true
            request_timeout = "2s"

            [connection_strategy]
            max_retry = 2
            initial_delay = "2s"
            max_delay = "10s"
            "#,
        )
        .unwrap();

        assert_eq!(config.application_name, "demo");
        assert!(config.endpoint_must_exist);
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(config.connection_strategy.max_retry, 2);
        assert_eq!(config.delivery_queue_capacity, 256);
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        let error = ClientConfig::from_json_str(r#"{"delivery_queue_capacity": 0}"#).unwrap_err();
        assert!(error.to_string().contains("delivery_queue_capacity"));

        let error = ClientConfig::from_json_str("not json").unwrap_err();
        assert_eq!(error.category(), "configuration");
    }

    #[test]
    fn test_generated_session_name() {
        let config = ClientConfig::default();
        let a = config.effective_session_name();
        let b = config.effective_session_name();
        assert!(a.starts_with("ualink-"));
        assert_ne!(a, b);
    }
}
