// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! An in-process server speaking the client's service messages over
//! [`Link`]s, for testing the client without a network.
//!
//! ## Design Principles
//!
//! - Configurable behavior for different test scenarios
//! - Recording of interactions for verification
//! - Thread-safe for concurrent testing
//! - Easy to set up error injection

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use ualink_client::protocol::{
    AuthToken, EndpointDescription, RequestEnvelope, ResponseEnvelope, ServiceRequest,
    ServiceResponse,
};
use ualink_client::{
    AttributeId, Connector, DataValue, Endpoint, Link, NodeId, ReadValueId, ReferenceDescription,
    StatusCode, SubscriptionId, SubscriptionParameters, Variant,
};

// =============================================================================
// Mock Node
// =============================================================================

/// A variable or folder in the mock address space.
#[derive(Debug, Clone)]
struct MockNode {
    value: DataValue,
    writable: bool,
    references: Vec<ReferenceDescription>,
}

// =============================================================================
// Mock Server
// =============================================================================

#[derive(Debug, Default)]
struct ServerState {
    /// Refuse every connection attempt.
    unreachable: AtomicBool,

    /// Swallow requests without answering.
    silent: AtomicBool,

    /// Fault CreateSession requests.
    refuse_sessions: AtomicBool,

    /// Return the requested lifetime count unrevised.
    echo_lifetime: AtomicBool,

    /// Endpoints returned by GetEndpoints; empty echoes the requested URL.
    advertised: RwLock<Vec<String>>,

    /// Address space.
    nodes: RwLock<HashMap<NodeId, MockNode>>,

    /// Per-node response delay for Read.
    read_delays: RwLock<HashMap<NodeId, Duration>>,

    /// Valid session tokens. Sessions outlive links.
    sessions: RwLock<HashSet<AuthToken>>,

    /// Live subscriptions.
    subscriptions: RwLock<HashSet<SubscriptionId>>,

    /// Subscriptions deleted by the client.
    deleted_subscriptions: RwLock<Vec<SubscriptionId>>,

    /// Tasks serving open links.
    links: Mutex<Vec<JoinHandle<()>>>,

    /// Connection attempt count.
    connect_attempts: AtomicU64,

    /// Read count per node.
    reads: RwLock<HashMap<NodeId, u64>>,

    /// Service names in arrival order.
    requests: Mutex<Vec<&'static str>>,

    next_session: AtomicU32,
    next_subscription: AtomicU32,
    sequence_number: AtomicU32,
}

/// A configurable in-process server.
///
/// Clones share the same state, so a test can keep one handle while the
/// client owns another as its [`Connector`].
#[derive(Debug, Clone, Default)]
pub struct MockServer {
    state: Arc<ServerState>,
}

impl MockServer {
    /// Create an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns this server as a connector for the client.
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    // =========================================================================
    // Address Space
    // =========================================================================

    /// Add a writable variable.
    pub fn add_variable(&self, node_id: impl Into<NodeId>, value: impl Into<Variant>) {
        self.insert_node(node_id.into(), value.into(), true);
    }

    /// Add a read-only variable.
    pub fn add_read_only(&self, node_id: impl Into<NodeId>, value: impl Into<Variant>) {
        self.insert_node(node_id.into(), value.into(), false);
    }

    /// Add a folder without a value.
    pub fn add_folder(&self, node_id: impl Into<NodeId>) {
        self.insert_node(node_id.into(), Variant::Empty, false);
    }

    fn insert_node(&self, node_id: NodeId, value: Variant, writable: bool) {
        let node = MockNode {
            value: DataValue::new(value).with_source_timestamp(Utc::now()),
            writable,
            references: Vec::new(),
        };
        self.state.nodes.write().insert(node_id, node);
    }

    /// Add a forward reference from `parent`.
    pub fn add_reference(&self, parent: impl Into<NodeId>, reference: ReferenceDescription) {
        let parent = parent.into();
        let mut nodes = self.state.nodes.write();
        let node = nodes.entry(parent).or_insert_with(|| MockNode {
            value: DataValue::new(Variant::Empty),
            writable: false,
            references: Vec::new(),
        });
        node.references.push(reference);
    }

    /// Change a value as the process would.
    pub fn set_value(&self, node_id: impl Into<NodeId>, value: impl Into<Variant>) {
        if let Some(node) = self.state.nodes.write().get_mut(&node_id.into()) {
            node.value = DataValue::new(value).with_source_timestamp(Utc::now());
        }
    }

    /// Change a status as the process would.
    pub fn set_status(&self, node_id: impl Into<NodeId>, status: StatusCode) {
        if let Some(node) = self.state.nodes.write().get_mut(&node_id.into()) {
            node.value = node.value.clone().with_status(status);
        }
    }

    /// Returns the stored value of a node.
    pub fn value(&self, node_id: impl Into<NodeId>) -> Option<DataValue> {
        self.state
            .nodes
            .read()
            .get(&node_id.into())
            .map(|node| node.value.clone())
    }

    // =========================================================================
    // Error Injection
    // =========================================================================

    /// Refuse (`true`) or accept connection attempts.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Stop (`true`) or resume answering requests.
    pub fn set_silent(&self, silent: bool) {
        self.state.silent.store(silent, Ordering::SeqCst);
    }

    /// Fault (`true`) or accept CreateSession.
    pub fn set_refuse_sessions(&self, refuse: bool) {
        self.state.refuse_sessions.store(refuse, Ordering::SeqCst);
    }

    /// Echo (`true`) or revise the requested subscription lifetime count.
    pub fn set_echo_lifetime(&self, echo: bool) {
        self.state.echo_lifetime.store(echo, Ordering::SeqCst);
    }

    /// Set the endpoints returned by GetEndpoints.
    pub fn advertise(&self, endpoints: Vec<String>) {
        *self.state.advertised.write() = endpoints;
    }

    /// Delay Read responses touching `node_id`.
    pub fn set_read_delay(&self, node_id: impl Into<NodeId>, delay: Duration) {
        self.state.read_delays.write().insert(node_id.into(), delay);
    }

    /// Close every open link from the server side.
    pub fn drop_links(&self) {
        let links = std::mem::take(&mut *self.state.links.lock());
        for link in links {
            link.abort();
        }
    }

    /// Forget a subscription so its keepalives fault.
    pub fn drop_subscription(&self, subscription_id: SubscriptionId) {
        self.state.subscriptions.write().remove(&subscription_id);
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Number of connection attempts.
    pub fn connect_attempts(&self) -> u64 {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    /// Number of reads that touched `node_id`.
    pub fn read_count(&self, node_id: impl Into<NodeId>) -> u64 {
        self.state
            .reads
            .read()
            .get(&node_id.into())
            .copied()
            .unwrap_or(0)
    }

    /// Number of requests received for `service`.
    pub fn request_count(&self, service: &str) -> usize {
        self.state
            .requests
            .lock()
            .iter()
            .filter(|name| **name == service)
            .count()
    }

    /// Number of open sessions.
    pub fn active_sessions(&self) -> usize {
        self.state.sessions.read().len()
    }

    /// Number of live subscriptions.
    pub fn active_subscriptions(&self) -> usize {
        self.state.subscriptions.read().len()
    }

    /// Subscriptions deleted by the client.
    pub fn deleted_subscriptions(&self) -> Vec<SubscriptionId> {
        self.state.deleted_subscriptions.read().clone()
    }
}

#[async_trait]
impl Connector for MockServer {
    async fn open(&self, endpoint: &Endpoint) -> io::Result<Link> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.state.unreachable.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} refused the connection", endpoint.authority()),
            ));
        }

        let (request_tx, request_rx) = mpsc::channel(64);
        let (response_tx, response_rx) = mpsc::channel(64);
        let task = tokio::spawn(serve(Arc::clone(&self.state), request_rx, response_tx));
        self.state.links.lock().push(task);

        Ok(Link::new(request_tx, response_rx))
    }
}

async fn serve(
    state: Arc<ServerState>,
    mut requests: mpsc::Receiver<RequestEnvelope>,
    responses: mpsc::Sender<ResponseEnvelope>,
) {
    while let Some(request) = requests.recv().await {
        state.requests.lock().push(request.body.name());
        if state.silent.load(Ordering::SeqCst) {
            continue;
        }

        let delay = state.read_delay(&request.body);
        if delay.is_zero() {
            let response = state.handle(request);
            if responses.send(response).await.is_err() {
                break;
            }
        } else {
            // A weak sender lets the link close while replies are pending.
            let responses = responses.downgrade();
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let response = state.handle(request);
                if let Some(responses) = responses.upgrade() {
                    let _ = responses.send(response).await;
                }
            });
        }
    }
}

impl ServerState {
    fn read_delay(&self, body: &ServiceRequest) -> Duration {
        let ServiceRequest::Read { nodes, .. } = body else {
            return Duration::ZERO;
        };
        let delays = self.read_delays.read();
        nodes
            .iter()
            .filter_map(|n| delays.get(&n.node_id).copied())
            .max()
            .unwrap_or(Duration::ZERO)
    }

    fn handle(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let RequestEnvelope {
            request_id,
            auth_token,
            body,
        } = request;
        let response = match body {
            ServiceRequest::GetEndpoints { endpoint_url } => self.get_endpoints(endpoint_url),
            ServiceRequest::CreateSession {
                requested_timeout, ..
            } => self.create_session(requested_timeout),
            other => match auth_token.filter(|t| self.sessions.read().contains(t)) {
                Some(token) => self.handle_session_request(token, other),
                None => ServiceResponse::fault(StatusCode::BAD_SESSION_ID_INVALID),
            },
        };
        ResponseEnvelope::new(request_id, response)
    }

    fn handle_session_request(&self, token: AuthToken, body: ServiceRequest) -> ServiceResponse {
        match body {
            ServiceRequest::CloseSession { .. } => {
                self.sessions.write().remove(&token);
                ServiceResponse::CloseSession
            }
            ServiceRequest::Browse { node_id } => match self.nodes.read().get(&node_id) {
                Some(node) => ServiceResponse::Browse {
                    references: node.references.clone(),
                },
                None => ServiceResponse::fault(StatusCode::BAD_NODE_ID_UNKNOWN),
            },
            ServiceRequest::Read { nodes, timestamps } => ServiceResponse::Read {
                results: nodes.iter().map(|n| self.read(n).filtered(timestamps)).collect(),
            },
            ServiceRequest::Write {
                node_id,
                attribute_id,
                value,
            } => ServiceResponse::Write {
                status: self.write(&node_id, attribute_id, value),
            },
            ServiceRequest::CreateSubscription { parameters } => self.create_subscription(&parameters),
            ServiceRequest::DeleteSubscription { subscription_id } => {
                let status = if self.subscriptions.write().remove(&subscription_id) {
                    self.deleted_subscriptions.write().push(subscription_id);
                    StatusCode::GOOD
                } else {
                    StatusCode::BAD_SUBSCRIPTION_ID_INVALID
                };
                ServiceResponse::DeleteSubscription { status }
            }
            ServiceRequest::Publish { subscription_id } => {
                if self.subscriptions.read().contains(&subscription_id) {
                    ServiceResponse::Publish {
                        subscription_id,
                        sequence_number: self.sequence_number.fetch_add(1, Ordering::SeqCst) + 1,
                    }
                } else {
                    ServiceResponse::fault(StatusCode::BAD_SUBSCRIPTION_ID_INVALID)
                }
            }
            ServiceRequest::GetEndpoints { .. } | ServiceRequest::CreateSession { .. } => {
                ServiceResponse::fault(StatusCode::BAD_SERVICE_UNSUPPORTED)
            }
        }
    }

    fn get_endpoints(&self, endpoint_url: String) -> ServiceResponse {
        let advertised = self.advertised.read().clone();
        let urls = if advertised.is_empty() {
            vec![endpoint_url]
        } else {
            advertised
        };
        ServiceResponse::GetEndpoints {
            endpoints: urls.into_iter().map(EndpointDescription::unsecured).collect(),
        }
    }

    fn create_session(&self, requested_timeout: Duration) -> ServiceResponse {
        if self.refuse_sessions.load(Ordering::SeqCst) {
            return ServiceResponse::fault(StatusCode::BAD_TOO_MANY_SESSIONS);
        }
        let n = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let auth_token = AuthToken(format!("token-{}", n));
        self.sessions.write().insert(auth_token.clone());
        ServiceResponse::CreateSession {
            session_id: format!("ns=1;i={}", 1000 + n),
            auth_token,
            revised_timeout: requested_timeout,
        }
    }

    fn create_subscription(&self, parameters: &SubscriptionParameters) -> ServiceResponse {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst) + 1);
        self.subscriptions.write().insert(id);

        let keepalive = parameters.requested_max_keep_alive_count;
        let lifetime = if self.echo_lifetime.load(Ordering::SeqCst) {
            parameters.requested_lifetime_count
        } else {
            parameters.requested_lifetime_count.max(keepalive.saturating_mul(3))
        };
        ServiceResponse::CreateSubscription {
            subscription_id: id,
            revised_publishing_interval: parameters.requested_publishing_interval,
            revised_lifetime_count: lifetime,
            revised_max_keep_alive_count: keepalive,
        }
    }

    fn read(&self, target: &ReadValueId) -> DataValue {
        *self.reads.write().entry(target.node_id.clone()).or_insert(0) += 1;

        let nodes = self.nodes.read();
        let Some(node) = nodes.get(&target.node_id) else {
            return DataValue::from_status(StatusCode::BAD_NODE_ID_UNKNOWN);
        };
        let value = match target.attribute_id {
            AttributeId::Value => node.value.clone(),
            AttributeId::NodeId | AttributeId::BrowseName | AttributeId::DisplayName => {
                DataValue::new(target.node_id.as_str())
            }
            _ => DataValue::from_status(StatusCode::BAD_ATTRIBUTE_ID_INVALID),
        };
        value.with_server_timestamp(Utc::now())
    }

    fn write(&self, node_id: &NodeId, attribute_id: AttributeId, value: Variant) -> StatusCode {
        if attribute_id != AttributeId::Value {
            return StatusCode::BAD_NOT_WRITABLE;
        }
        let mut nodes = self.nodes.write();
        match nodes.get_mut(node_id) {
            None => StatusCode::BAD_NODE_ID_UNKNOWN,
            Some(node) if !node.writable => StatusCode::BAD_NOT_WRITABLE,
            Some(node) => {
                node.value = DataValue::new(value).with_source_timestamp(Utc::now());
                StatusCode::GOOD
            }
        }
    }
}
