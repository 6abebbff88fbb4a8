// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! High-level client entry point.
//!
//! [`UaClient`] bundles a configuration and a [`Connector`] and creates the
//! [`Channel`] for an endpoint on `connect()`. Channel events are re-emitted
//! on the client's own registry so listeners can be attached before the
//! channel exists.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::client::channel::{Channel, ChannelState, Connector};
use crate::client::session::Session;
use crate::config::{ClientConfig, Endpoint};
use crate::error::{SessionError, UaErrorContext, UaResult};
use crate::events::{ChannelEvent, ChannelEventKind, EventRegistry, ListenerId};

const FORWARDED_KINDS: [ChannelEventKind; 5] = [
    ChannelEventKind::Backoff,
    ChannelEventKind::Connected,
    ChannelEventKind::ConnectionLost,
    ChannelEventKind::Reconnected,
    ChannelEventKind::Closed,
];

/// Client facade: connect, create sessions, disconnect.
///
/// # Example
///
/// ```rust,ignore
/// let client = UaClient::new(ClientConfig::default(), connector)?;
/// client.on_backoff(|attempt, delay| println!("retry {attempt} in {delay:?}"));
/// client.connect("opc.tcp://localhost:4840").await?;
///
/// let session = client.create_session().await?;
/// let value = session.read_value("ns=1;s=Temperature").await?;
///
/// session.close().await?;
/// client.disconnect().await?;
/// ```
pub struct UaClient {
    config: Arc<ClientConfig>,
    connector: Arc<dyn Connector>,
    channel: RwLock<Option<Arc<Channel>>>,
    events: Arc<EventRegistry<ChannelEvent>>,
}

impl UaClient {
    /// Creates a client after validating `config`.
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> UaResult<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            connector,
            channel: RwLock::new(None),
            events: Arc::new(EventRegistry::new()),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the current channel, if `connect()` was called.
    pub fn channel(&self) -> Option<Arc<Channel>> {
        self.channel.read().clone()
    }

    /// Returns the channel state, `Disconnected` before the first connect.
    pub fn state(&self) -> ChannelState {
        self.channel()
            .map(|channel| channel.state())
            .unwrap_or_default()
    }

    /// Returns the registry receiving every channel event.
    pub fn events(&self) -> &EventRegistry<ChannelEvent> {
        &self.events
    }

    /// Registers a `backoff` listener receiving `(attempt, delay)`.
    pub fn on_backoff<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.events.on(ChannelEventKind::Backoff, move |event| {
            if let ChannelEvent::Backoff { attempt, delay } = event {
                listener(*attempt, *delay);
            }
        })
    }

    /// Connects to `endpoint_url`.
    ///
    /// Reuses the current channel when it targets the same endpoint; a
    /// channel to a different endpoint is disconnected first.
    pub async fn connect(&self, endpoint_url: &str) -> UaResult<()> {
        let endpoint = Endpoint::parse(endpoint_url)?;
        let channel = self.channel_for(endpoint).await?;
        channel.connect().await.with_endpoint(endpoint_url)
    }

    async fn channel_for(&self, endpoint: Endpoint) -> UaResult<Arc<Channel>> {
        if let Some(current) = self.channel() {
            if current.endpoint().matches(endpoint.url()) {
                return Ok(current);
            }
            current.disconnect().await?;
        }

        let channel = Channel::new(endpoint, Arc::clone(&self.config), Arc::clone(&self.connector));
        for kind in FORWARDED_KINDS {
            let events = Arc::clone(&self.events);
            channel.events().on(kind, move |event| {
                events.emit(event);
            });
        }

        *self.channel.write() = Some(Arc::clone(&channel));
        Ok(channel)
    }

    /// Creates a session on the connected channel.
    pub async fn create_session(&self) -> UaResult<Session> {
        let channel = self
            .channel()
            .ok_or_else(|| SessionError::create_failed("client is not connected"))?;
        Session::create(channel).await
    }

    /// Disconnects, closing every session first. Idempotent.
    pub async fn disconnect(&self) -> UaResult<()> {
        match self.channel() {
            Some(channel) => channel.disconnect().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for UaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UaClient")
            .field("application_name", &self.config.application_name)
            .field("channel", &self.channel())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::channel::Link;
    use crate::error::{ConnectError, UaError};
    use async_trait::async_trait;

    struct NoServer;

    #[async_trait]
    impl Connector for NoServer {
        async fn open(&self, _endpoint: &Endpoint) -> std::io::Result<Link> {
            Err(std::io::ErrorKind::ConnectionRefused.into())
        }
    }

    #[tokio::test]
    async fn test_create_session_requires_connect() {
        let client = UaClient::new(ClientConfig::default(), Arc::new(NoServer)).unwrap();
        let error = client.create_session().await.unwrap_err();
        assert!(matches!(
            error,
            UaError::Session(SessionError::SessionCreateFailed { .. })
        ));
        assert_eq!(client.state(), ChannelState::Disconnected);
        client.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let client = UaClient::new(ClientConfig::default(), Arc::new(NoServer)).unwrap();
        let error = client.connect("http://localhost:4840").await.unwrap_err();
        assert!(matches!(
            error,
            UaError::Connect(ConnectError::InvalidEndpoint { .. })
        ));
        assert!(client.channel().is_none());
    }
}
