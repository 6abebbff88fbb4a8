// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session lifecycle and attribute services.
//!
//! A [`Session`] is created over a connected [`Channel`] and carries the
//! server-assigned authentication token on every request. It owns the
//! subscriptions created through it; closing the session terminates them.
//!
//! Status codes returned by the server are data. Only transport failures,
//! service faults and local validation produce errors.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::client::channel::Channel;
use crate::client::subscription::Subscription;
use crate::error::{SessionError, TransportError, UaError, UaErrorContext, UaResult};
use crate::events::TerminationReason;
use crate::protocol::{AuthToken, ServiceRequest, ServiceResponse};
use crate::types::{
    AttributeId, DataValue, NodeId, ReadValueId, ReferenceDescription, StatusCode,
    SubscriptionId, SubscriptionParameters, TimestampsToReturn, Variant,
};

// =============================================================================
// SessionState
// =============================================================================

/// State of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session is usable.
    #[default]
    Active,

    /// `close()` is running.
    Closing,

    /// Session is closed.
    Closed,
}

impl SessionState {
    /// Returns `true` if the session accepts requests.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

// =============================================================================
// ServiceClient
// =============================================================================

/// Issues typed service calls with a session token attached.
#[derive(Clone)]
pub(crate) struct ServiceClient {
    channel: Arc<Channel>,
    token: AuthToken,
}

impl ServiceClient {
    pub(crate) fn new(channel: Arc<Channel>, token: AuthToken) -> Self {
        Self { channel, token }
    }

    pub(crate) fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    pub(crate) async fn call(&self, body: ServiceRequest) -> UaResult<ServiceResponse> {
        self.channel.send(Some(self.token.clone()), body).await
    }

    pub(crate) async fn read(
        &self,
        nodes: Vec<ReadValueId>,
        timestamps: TimestampsToReturn,
    ) -> UaResult<Vec<DataValue>> {
        let expected = nodes.len();
        match self.call(ServiceRequest::Read { nodes, timestamps }).await? {
            ServiceResponse::Read { results } if results.len() == expected => Ok(results),
            ServiceResponse::Read { .. } => Err(unexpected("Read", "Read (result count mismatch)")),
            ServiceResponse::ServiceFault { status } => Err(UaError::service(status)),
            other => Err(unexpected("Read", other.name())),
        }
    }
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("endpoint", &self.channel.endpoint().url())
            .finish()
    }
}

pub(crate) fn unexpected(expected: &'static str, actual: &'static str) -> UaError {
    TransportError::UnexpectedResponse { expected, actual }.into()
}

// =============================================================================
// SessionStats
// =============================================================================

/// Statistics for session operations.
#[derive(Debug, Default)]
pub struct SessionStats {
    browses: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    bad_statuses: AtomicU64,
}

impl SessionStats {
    fn record_browse(&self) {
        self.browses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_reads(&self, values: &[DataValue]) {
        self.reads.fetch_add(values.len() as u64, Ordering::Relaxed);
        let bad = values.iter().filter(|v| v.status.is_bad()).count() as u64;
        self.bad_statuses.fetch_add(bad, Ordering::Relaxed);
    }

    fn record_write(&self, status: StatusCode) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if status.is_bad() {
            self.bad_statuses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns the number of browse calls.
    pub fn browses(&self) -> u64 {
        self.browses.load(Ordering::Relaxed)
    }

    /// Returns the number of values read.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns the number of write calls.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns the number of Bad statuses seen in reads and writes.
    pub fn bad_statuses(&self) -> u64 {
        self.bad_statuses.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Session
// =============================================================================

pub(crate) struct SessionShared {
    session_id: String,
    name: String,
    revised_timeout: Duration,
    client: ServiceClient,
    state: RwLock<SessionState>,
    subscriptions: Mutex<HashMap<SubscriptionId, Subscription>>,
    stats: SessionStats,
}

impl SessionShared {
    pub(crate) fn client(&self) -> &ServiceClient {
        &self.client
    }

    pub(crate) fn forget_subscription(&self, id: SubscriptionId) {
        self.subscriptions.lock().remove(&id);
    }
}

/// A session on a connected channel.
///
/// `Session` is a cheap handle; clones refer to the same session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<SessionShared>,
}

impl Session {
    /// Creates and activates a session.
    ///
    /// Fails with `SessionCreateFailed` when the channel is not connected or
    /// the server rejects the request.
    pub async fn create(channel: Arc<Channel>) -> UaResult<Session> {
        if !channel.is_connected() {
            return Err(SessionError::create_failed(format!(
                "channel to {} is {}",
                channel.endpoint(),
                channel.state()
            ))
            .into());
        }

        let config = channel.config();
        let name = config.effective_session_name();
        let request = ServiceRequest::CreateSession {
            session_name: name.clone(),
            application_name: config.application_name.clone(),
            requested_timeout: config.session_timeout,
        };

        let (session_id, auth_token, revised_timeout) = match channel.send(None, request).await? {
            ServiceResponse::CreateSession {
                session_id,
                auth_token,
                revised_timeout,
            } => (session_id, auth_token, revised_timeout),
            ServiceResponse::ServiceFault { status } => {
                return Err(SessionError::create_failed_with_status(
                    format!("server rejected session '{}'", name),
                    status,
                )
                .into());
            }
            other => return Err(unexpected("CreateSession", other.name())),
        };

        let shared = Arc::new(SessionShared {
            session_id,
            name,
            revised_timeout,
            client: ServiceClient::new(Arc::clone(&channel), auth_token),
            state: RwLock::new(SessionState::Active),
            subscriptions: Mutex::new(HashMap::new()),
            stats: SessionStats::default(),
        });
        channel.register_session(&shared);

        tracing::info!(
            session_id = %shared.session_id,
            session_name = %shared.name,
            timeout = ?shared.revised_timeout,
            "Session created"
        );

        Ok(Session { shared })
    }

    pub(crate) fn from_shared(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the server-assigned session id.
    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Returns the session name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns the server-revised session timeout.
    pub fn revised_timeout(&self) -> Duration {
        self.shared.revised_timeout
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        *self.shared.state.read()
    }

    /// Returns `true` if the session accepts requests.
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Returns the underlying channel.
    pub fn channel(&self) -> &Arc<Channel> {
        self.shared.client.channel()
    }

    /// Returns the live subscriptions.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.shared.subscriptions.lock().values().cloned().collect()
    }

    /// Returns the statistics.
    pub fn stats(&self) -> &SessionStats {
        &self.shared.stats
    }

    fn ensure_active(&self) -> UaResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(SessionError::closed(self.shared.session_id.clone()).into())
        }
    }

    // =========================================================================
    // Attribute Services
    // =========================================================================

    /// Lists the references of `node_id`. An empty list is a valid result.
    pub async fn browse(&self, node_id: impl Into<NodeId>) -> UaResult<Vec<ReferenceDescription>> {
        self.ensure_active()?;
        let node_id = node_id.into();
        tracing::debug!(node_id = %node_id, "Browse");

        let response = self
            .shared
            .client
            .call(ServiceRequest::Browse {
                node_id: node_id.clone(),
            })
            .await
            .with_node(node_id.as_str())?;

        match response {
            ServiceResponse::Browse { references } => {
                self.shared.stats.record_browse();
                Ok(references)
            }
            ServiceResponse::ServiceFault { status } => Err(UaError::service(status)),
            other => Err(unexpected("Browse", other.name())),
        }
    }

    /// Reads one attribute with both timestamps.
    ///
    /// A non-Good status is returned inside the [`DataValue`].
    pub async fn read(&self, node_id: impl Into<NodeId>, attribute_id: AttributeId) -> UaResult<DataValue> {
        let mut results = self
            .read_many(vec![ReadValueId::new(node_id, attribute_id)], TimestampsToReturn::Both)
            .await?;
        results.pop().ok_or_else(|| unexpected("Read", "Read (empty)"))
    }

    /// Reads the `Value` attribute of a node.
    pub async fn read_value(&self, node_id: impl Into<NodeId>) -> UaResult<DataValue> {
        self.read(node_id, AttributeId::Value).await
    }

    /// Reads several attributes in one request. Results follow request order.
    pub async fn read_many(
        &self,
        nodes: Vec<ReadValueId>,
        timestamps: TimestampsToReturn,
    ) -> UaResult<Vec<DataValue>> {
        self.ensure_active()?;
        if nodes.is_empty() {
            return Err(SessionError::invalid_parameter("nodes", "nothing to read").into());
        }
        tracing::debug!(count = nodes.len(), timestamps = ?timestamps, "Read");

        let results = self.shared.client.read(nodes, timestamps).await?;
        self.shared.stats.record_reads(&results);
        Ok(results)
    }

    /// Writes one attribute and returns the operation status.
    pub async fn write(
        &self,
        node_id: impl Into<NodeId>,
        attribute_id: AttributeId,
        value: impl Into<Variant>,
    ) -> UaResult<StatusCode> {
        self.ensure_active()?;
        let node_id = node_id.into();
        let value = value.into();
        tracing::debug!(node_id = %node_id, attribute = ?attribute_id, value = %value, "Write");

        let response = self
            .shared
            .client
            .call(ServiceRequest::Write {
                node_id: node_id.clone(),
                attribute_id,
                value,
            })
            .await
            .with_node(node_id.as_str())?;

        match response {
            ServiceResponse::Write { status } => {
                self.shared.stats.record_write(status);
                if !status.is_good() {
                    tracing::debug!(node_id = %node_id, status = %status, "Write returned non-Good status");
                }
                Ok(status)
            }
            ServiceResponse::ServiceFault { status } => Err(UaError::service(status)),
            other => Err(unexpected("Write", other.name())),
        }
    }

    /// Writes the `Value` attribute of a node.
    pub async fn write_value(
        &self,
        node_id: impl Into<NodeId>,
        value: impl Into<Variant>,
    ) -> UaResult<StatusCode> {
        self.write(node_id, AttributeId::Value, value).await
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Creates a subscription.
    ///
    /// Fails with `InvalidParameter` for a zero publishing interval, keepalive
    /// count or lifetime count.
    pub async fn create_subscription(&self, parameters: SubscriptionParameters) -> UaResult<Subscription> {
        self.ensure_active()?;
        parameters.validate()?;

        let subscription = Subscription::create(&self.shared, parameters).await?;

        let accepted = {
            let mut subscriptions = self.shared.subscriptions.lock();
            if self.is_active() {
                subscriptions.insert(subscription.id(), subscription.clone());
                true
            } else {
                false
            }
        };
        if !accepted {
            subscription.terminate_with(TerminationReason::SessionClosed).await;
            return Err(SessionError::closed(self.shared.session_id.clone()).into());
        }

        Ok(subscription)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Closes the session. Idempotent.
    ///
    /// Terminates every subscription, then sends a best-effort `CloseSession`.
    pub async fn close(&self) -> UaResult<()> {
        {
            let mut state = self.shared.state.write();
            if *state != SessionState::Active {
                return Ok(());
            }
            *state = SessionState::Closing;
        }
        tracing::trace!(
            session_id = %self.shared.session_id,
            old_state = %SessionState::Active,
            new_state = %SessionState::Closing,
            "Session state changed"
        );

        let subscriptions: Vec<Subscription> = self.shared.subscriptions.lock().values().cloned().collect();
        for subscription in subscriptions {
            subscription.terminate_with(TerminationReason::SessionClosed).await;
        }

        let request = ServiceRequest::CloseSession {
            delete_subscriptions: true,
        };
        match self.shared.client.call(request).await {
            Ok(ServiceResponse::CloseSession) => {}
            Ok(ServiceResponse::ServiceFault { status }) => {
                tracing::warn!(session_id = %self.shared.session_id, status = %status, "CloseSession faulted");
            }
            Ok(other) => {
                tracing::warn!(session_id = %self.shared.session_id, response = other.name(), "Unexpected CloseSession response");
            }
            Err(error) => {
                tracing::warn!(session_id = %self.shared.session_id, error = %error, "CloseSession failed");
            }
        }

        self.channel().forget_session(&self.shared);
        *self.shared.state.write() = SessionState::Closed;
        tracing::info!(session_id = %self.shared.session_id, "Session closed");
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.shared.session_id)
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
