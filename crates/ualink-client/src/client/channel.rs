// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Transport channel: connection lifecycle and request correlation.
//!
//! A [`Channel`] owns at most one [`Link`] to its endpoint. Requests are
//! multiplexed over the link and matched to responses through a shared
//! correlation table keyed by [`RequestId`], so responses may arrive in
//! any order.
//!
//! # State Machine
//!
//! ```text
//!                 connect()
//! Disconnected ─────────────► Connecting ──────► Connected
//!      ▲                          │                 │
//!      │      exhausted / aborted │      link lost  │
//!      ├──────────────────────────┘                 ▼
//!      │            reconnect exhausted          Faulted
//!      └─────────────────────────────────────────── │ ──► Connected (reconnected)
//! ```
//!
//! `disconnect()` moves any state to Disconnected.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::client::session::{Session, SessionShared};
use crate::config::{ClientConfig, Endpoint};
use crate::error::{ConnectError, TransportError, UaError, UaResult};
use crate::events::{ChannelEvent, ChannelEventKind, EventRegistry, ListenerId};
use crate::protocol::{
    AuthToken, RequestEnvelope, RequestId, ResponseEnvelope, ServiceRequest, ServiceResponse,
};

// =============================================================================
// Connector
// =============================================================================

/// A bidirectional message link to a server.
#[derive(Debug)]
pub struct Link {
    /// Requests towards the server.
    pub outbound: mpsc::Sender<RequestEnvelope>,
    /// Responses from the server. Closing it signals link loss.
    pub inbound: mpsc::Receiver<ResponseEnvelope>,
}

impl Link {
    /// Creates a link from its two halves.
    pub fn new(
        outbound: mpsc::Sender<RequestEnvelope>,
        inbound: mpsc::Receiver<ResponseEnvelope>,
    ) -> Self {
        Self { outbound, inbound }
    }
}

/// Opens links to endpoints.
///
/// This is the seam between the client core and the byte-level transport.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens one link. Each call is one connection attempt.
    async fn open(&self, endpoint: &Endpoint) -> io::Result<Link>;
}

// =============================================================================
// ChannelState
// =============================================================================

/// Channel connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// No link.
    #[default]
    Disconnected,
    /// `connect()` is running.
    Connecting,
    /// Link established.
    Connected,
    /// Link lost; reconnecting.
    Faulted,
}

impl ChannelState {
    /// Returns `true` if requests can be sent.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Faulted => write!(f, "Faulted"),
        }
    }
}

// =============================================================================
// Correlation Table
// =============================================================================

type ResponseSlot = oneshot::Sender<Result<ServiceResponse, TransportError>>;

/// In-flight requests awaiting a response.
#[derive(Debug, Default)]
struct PendingTable {
    slots: DashMap<RequestId, ResponseSlot>,
}

impl PendingTable {
    fn register(&self, id: RequestId) -> oneshot::Receiver<Result<ServiceResponse, TransportError>> {
        let (tx, rx) = oneshot::channel();
        self.slots.insert(id, tx);
        rx
    }

    fn complete(&self, id: RequestId, response: ServiceResponse) -> bool {
        match self.slots.remove(&id) {
            Some((_, slot)) => slot.send(Ok(response)).is_ok(),
            None => false,
        }
    }

    fn fail_all(&self, error: &TransportError) -> usize {
        let ids: Vec<RequestId> = self.slots.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, slot)) = self.slots.remove(&id) {
                let _ = slot.send(Err(error.clone()));
                failed += 1;
            }
        }
        failed
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Releases a correlation slot when the awaiting request ends for any reason.
struct SlotGuard<'a> {
    table: &'a PendingTable,
    id: RequestId,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.table.slots.remove(&self.id);
    }
}

// =============================================================================
// ChannelStats
// =============================================================================

/// Statistics for channel operations.
#[derive(Debug, Default)]
pub struct ChannelStats {
    connect_attempts: AtomicU64,
    backoffs: AtomicU64,
    requests_sent: AtomicU64,
    responses_received: AtomicU64,
    request_timeouts: AtomicU64,
    late_responses: AtomicU64,
    reconnects: AtomicU64,
}

impl ChannelStats {
    fn record_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_backoff(&self) {
        self.backoffs.fetch_add(1, Ordering::Relaxed);
    }

    fn record_request(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    fn record_response(&self) {
        self.responses_received.fetch_add(1, Ordering::Relaxed);
    }

    fn record_timeout(&self) {
        self.request_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_late_response(&self) {
        self.late_responses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of connection attempts.
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    /// Returns the number of backoff waits.
    pub fn backoffs(&self) -> u64 {
        self.backoffs.load(Ordering::Relaxed)
    }

    /// Returns the number of requests written to the link.
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent.load(Ordering::Relaxed)
    }

    /// Returns the number of responses matched to a request.
    pub fn responses_received(&self) -> u64 {
        self.responses_received.load(Ordering::Relaxed)
    }

    /// Returns the number of timed-out requests.
    pub fn request_timeouts(&self) -> u64 {
        self.request_timeouts.load(Ordering::Relaxed)
    }

    /// Returns the number of responses that arrived after their request ended.
    pub fn late_responses(&self) -> u64 {
        self.late_responses.load(Ordering::Relaxed)
    }

    /// Returns the number of successful reconnections.
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Channel
// =============================================================================

struct LinkHandle {
    outbound: mpsc::Sender<RequestEnvelope>,
    reader: JoinHandle<()>,
}

/// A single logical connection to one endpoint.
pub struct Channel {
    endpoint: Endpoint,
    config: Arc<ClientConfig>,
    connector: Arc<dyn Connector>,
    state: RwLock<ChannelState>,
    link: Mutex<Option<LinkHandle>>,
    pending: Arc<PendingTable>,
    next_request_id: AtomicU32,
    /// Bumped by `disconnect()`; cancels connect and reconnect loops.
    epoch: watch::Sender<u64>,
    closing: AtomicBool,
    sessions: Mutex<Vec<Weak<SessionShared>>>,
    events: EventRegistry<ChannelEvent>,
    stats: Arc<ChannelStats>,
    self_ref: Weak<Channel>,
}

impl Channel {
    /// Creates a disconnected channel for `endpoint`.
    pub fn new(
        endpoint: Endpoint,
        config: Arc<ClientConfig>,
        connector: Arc<dyn Connector>,
    ) -> Arc<Self> {
        let (epoch, _) = watch::channel(0);
        Arc::new_cyclic(|self_ref| Self {
            endpoint,
            config,
            connector,
            state: RwLock::new(ChannelState::Disconnected),
            link: Mutex::new(None),
            pending: Arc::new(PendingTable::default()),
            next_request_id: AtomicU32::new(1),
            epoch,
            closing: AtomicBool::new(false),
            sessions: Mutex::new(Vec::new()),
            events: EventRegistry::new(),
            stats: Arc::new(ChannelStats::default()),
            self_ref: self_ref.clone(),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the current state.
    pub fn state(&self) -> ChannelState {
        *self.state.read()
    }

    /// Returns `true` if connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Returns the number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Returns the statistics.
    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Returns the event registry.
    pub fn events(&self) -> &EventRegistry<ChannelEvent> {
        &self.events
    }

    /// Registers a `backoff` listener receiving `(attempt, delay)`.
    pub fn on_backoff<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(u32, std::time::Duration) + Send + Sync + 'static,
    {
        self.events.on(ChannelEventKind::Backoff, move |event| {
            if let ChannelEvent::Backoff { attempt, delay } = event {
                listener(*attempt, *delay);
            }
        })
    }

    // =========================================================================
    // Connection Lifecycle
    // =========================================================================

    /// Connects, retrying per the configured strategy.
    ///
    /// Fails with `EndpointNotFound` when `endpoint_must_exist` is set and the
    /// server does not advertise the endpoint, and with `Unreachable` once
    /// `max_retry` attempts have failed. Returns immediately when already
    /// connected.
    pub async fn connect(&self) -> UaResult<()> {
        let generation = {
            let mut state = self.state.write();
            match *state {
                ChannelState::Connected => return Ok(()),
                ChannelState::Connecting | ChannelState::Faulted => {
                    return Err(ConnectError::InProgress {
                        endpoint: self.endpoint.url().to_string(),
                    }
                    .into());
                }
                ChannelState::Disconnected => *state = ChannelState::Connecting,
            }
            *self.epoch.borrow()
        };
        tracing::info!(endpoint = %self.endpoint, "Connecting");

        let result = self.establish(generation).await;

        let mut state = self.state.write();
        match result {
            Ok(()) if self.is_current(generation) => {
                *state = ChannelState::Connected;
                drop(state);
                tracing::info!(endpoint = %self.endpoint, "Connected");
                self.events.emit(&ChannelEvent::Connected {
                    endpoint: self.endpoint.url().to_string(),
                });
                Ok(())
            }
            Ok(()) => {
                // Superseded by disconnect(); drop a link installed after its teardown.
                let stale = *state == ChannelState::Disconnected;
                drop(state);
                if stale {
                    self.teardown_link(&TransportError::ConnectionClosed);
                }
                Err(TransportError::ConnectionClosed.into())
            }
            Err(error) => {
                if *state == ChannelState::Connecting {
                    *state = ChannelState::Disconnected;
                }
                drop(state);
                error.log("connect");
                Err(error)
            }
        }
    }

    /// Disconnects. Idempotent.
    ///
    /// Closes registered sessions first, then releases the link and fails
    /// every in-flight request with `ConnectionClosed`.
    pub async fn disconnect(&self) -> UaResult<()> {
        if self.state() == ChannelState::Disconnected {
            return Ok(());
        }
        if self.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        {
            let state = self.state.read();
            if *state == ChannelState::Disconnected {
                drop(state);
                self.closing.store(false, Ordering::Release);
                return Ok(());
            }
            // connect() reads the generation under the same lock.
            self.epoch.send_modify(|epoch| *epoch += 1);
        }

        for session in self.live_sessions() {
            if let Err(error) = session.close().await {
                error.log("disconnect: close session");
            }
        }

        let failed = self.teardown_link(&TransportError::ConnectionClosed);
        let previous = std::mem::replace(&mut *self.state.write(), ChannelState::Disconnected);

        tracing::info!(
            endpoint = %self.endpoint,
            failed_requests = failed,
            "Disconnected"
        );
        if previous != ChannelState::Disconnected {
            self.events.emit(&ChannelEvent::Closed);
        }

        self.closing.store(false, Ordering::Release);
        Ok(())
    }

    /// Runs attempts until one succeeds, the strategy is exhausted, or the
    /// generation is superseded by `disconnect()`.
    async fn establish(&self, generation: u64) -> UaResult<()> {
        let strategy = self.config.connection_strategy;
        let mut epoch = self.epoch.subscribe();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.stats.record_attempt();
            tracing::debug!(endpoint = %self.endpoint, attempt, "Connection attempt");

            let opened = tokio::select! {
                opened = tokio::time::timeout(self.config.request_timeout, self.connector.open(&self.endpoint)) => opened,
                _ = epoch.changed() => return Err(TransportError::ConnectionClosed.into()),
            };

            let reason = match opened {
                Ok(Ok(link)) => {
                    if !self.install_link(link, generation) {
                        return Err(TransportError::ConnectionClosed.into());
                    }

                    if !self.config.endpoint_must_exist {
                        return Ok(());
                    }
                    match self.verify_endpoint().await {
                        Ok(()) => return Ok(()),
                        Err(error @ UaError::Connect(_)) => {
                            self.teardown_link(&TransportError::ConnectionClosed);
                            return Err(error);
                        }
                        Err(error) => {
                            self.teardown_link(&TransportError::ConnectionLost);
                            error.to_string()
                        }
                    }
                }
                Ok(Err(error)) => error.to_string(),
                Err(_) => format!("no link after {:?}", self.config.request_timeout),
            };

            if strategy.is_exhausted(attempt) {
                return Err(ConnectError::unreachable(self.endpoint.url(), attempt, reason).into());
            }

            let delay = strategy.delay_for_attempt(attempt);
            self.stats.record_backoff();
            tracing::warn!(
                endpoint = %self.endpoint,
                attempt,
                delay = ?delay,
                reason = %reason,
                "Connection attempt failed, backing off"
            );
            self.events.emit(&ChannelEvent::Backoff { attempt, delay });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = epoch.changed() => return Err(TransportError::ConnectionClosed.into()),
            }
        }
    }

    async fn verify_endpoint(&self) -> UaResult<()> {
        let request = ServiceRequest::GetEndpoints {
            endpoint_url: self.endpoint.url().to_string(),
        };
        match self.exchange(None, request).await? {
            ServiceResponse::GetEndpoints { endpoints } => {
                if endpoints.iter().any(|d| self.endpoint.matches(&d.endpoint_url)) {
                    return Ok(());
                }
                let advertised = endpoints.into_iter().map(|d| d.endpoint_url).collect();
                Err(ConnectError::endpoint_not_found(self.endpoint.url(), advertised).into())
            }
            ServiceResponse::ServiceFault { status } => Err(UaError::service(status)),
            other => Err(TransportError::UnexpectedResponse {
                expected: "GetEndpoints",
                actual: other.name(),
            }
            .into()),
        }
    }

    /// Installs `link` unless `generation` was superseded. The check runs under
    /// the link lock, so a concurrent teardown either removes the link or
    /// causes it to be refused.
    fn install_link(&self, link: Link, generation: u64) -> bool {
        let mut slot = self.link.lock();
        if !self.is_current(generation) {
            return false;
        }

        let Link { outbound, inbound } = link;
        let reader = tokio::spawn(read_loop(
            self.self_ref.clone(),
            Arc::clone(&self.pending),
            Arc::clone(&self.stats),
            inbound,
            generation,
        ));

        if let Some(previous) = slot.replace(LinkHandle { outbound, reader }) {
            previous.reader.abort();
        }
        true
    }

    fn teardown_link(&self, error: &TransportError) -> usize {
        if let Some(link) = self.link.lock().take() {
            link.reader.abort();
        }
        self.pending.fail_all(error)
    }

    fn is_current(&self, generation: u64) -> bool {
        *self.epoch.borrow() == generation
    }

    /// Called by the reader task when the server side closed the link.
    fn handle_link_lost(self: Arc<Self>, generation: u64) {
        if !self.is_current(generation) {
            self.pending.fail_all(&TransportError::ConnectionLost);
            return;
        }

        {
            let mut state = self.state.write();
            if *state != ChannelState::Connected {
                drop(state);
                self.pending.fail_all(&TransportError::ConnectionLost);
                return;
            }
            *state = ChannelState::Faulted;
        }

        // The reader is the current task; dropping its handle detaches it.
        drop(self.link.lock().take());
        let failed = self.pending.fail_all(&TransportError::ConnectionLost);

        tracing::warn!(
            endpoint = %self.endpoint,
            failed_requests = failed,
            "Connection lost, reconnecting"
        );
        self.events.emit(&ChannelEvent::ConnectionLost);

        tokio::spawn(async move { self.reconnect(generation).await });
    }

    async fn reconnect(self: Arc<Self>, generation: u64) {
        match self.establish(generation).await {
            Ok(()) => {
                {
                    let mut state = self.state.write();
                    if *state != ChannelState::Faulted || !self.is_current(generation) {
                        let stale = *state == ChannelState::Disconnected;
                        drop(state);
                        if stale {
                            self.teardown_link(&TransportError::ConnectionClosed);
                        }
                        return;
                    }
                    *state = ChannelState::Connected;
                }
                self.stats.record_reconnect();
                tracing::info!(endpoint = %self.endpoint, "Reconnected");
                self.events.emit(&ChannelEvent::Reconnected);
            }
            Err(error) => {
                error.log("reconnect");
                let closed = {
                    let mut state = self.state.write();
                    if *state == ChannelState::Faulted && self.is_current(generation) {
                        *state = ChannelState::Disconnected;
                        true
                    } else {
                        false
                    }
                };
                if closed {
                    for session in self.live_sessions() {
                        if let Err(error) = session.close().await {
                            error.log("reconnect: close session");
                        }
                    }
                    self.events.emit(&ChannelEvent::Closed);
                }
            }
        }
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Sends a request and awaits its response.
    ///
    /// Fails with `ConnectionLost` while faulted and `ConnectionClosed` while
    /// disconnected. A service fault is returned as a response, not an error.
    pub async fn send(
        &self,
        auth_token: Option<AuthToken>,
        body: ServiceRequest,
    ) -> UaResult<ServiceResponse> {
        match self.state() {
            ChannelState::Connected => self.exchange(auth_token, body).await,
            ChannelState::Faulted => Err(TransportError::ConnectionLost.into()),
            ChannelState::Disconnected | ChannelState::Connecting => {
                Err(TransportError::ConnectionClosed.into())
            }
        }
    }

    async fn exchange(
        &self,
        auth_token: Option<AuthToken>,
        body: ServiceRequest,
    ) -> UaResult<ServiceResponse> {
        let outbound = self
            .link
            .lock()
            .as_ref()
            .map(|link| link.outbound.clone())
            .ok_or(TransportError::ConnectionClosed)?;

        let request_id = RequestId(self.next_request_id.fetch_add(1, Ordering::Relaxed));
        let service = body.name();
        let receiver = self.pending.register(request_id);
        let _slot = SlotGuard {
            table: &self.pending,
            id: request_id,
        };

        tracing::trace!(request_id = %request_id, service, "Sending request");
        let envelope = RequestEnvelope {
            request_id,
            auth_token,
            body,
        };
        if outbound.send(envelope).await.is_err() {
            return Err(TransportError::ConnectionLost.into());
        }
        self.stats.record_request();

        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(_)) => Err(TransportError::ConnectionClosed.into()),
            Err(_) => {
                self.stats.record_timeout();
                tracing::warn!(
                    request_id = %request_id,
                    service,
                    timeout = ?timeout,
                    "Request timed out"
                );
                Err(TransportError::request_timeout(request_id.0, timeout).into())
            }
        }
    }

    // =========================================================================
    // Session Registry
    // =========================================================================

    pub(crate) fn register_session(&self, session: &Arc<SessionShared>) {
        let mut sessions = self.sessions.lock();
        sessions.retain(|weak| weak.strong_count() > 0);
        sessions.push(Arc::downgrade(session));
    }

    pub(crate) fn forget_session(&self, session: &Arc<SessionShared>) {
        let target = Arc::downgrade(session);
        self.sessions
            .lock()
            .retain(|weak| weak.strong_count() > 0 && !weak.ptr_eq(&target));
    }

    fn live_sessions(&self) -> Vec<Session> {
        self.sessions
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .map(Session::from_shared)
            .collect()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("endpoint", &self.endpoint.url())
            .field("state", &self.state())
            .field("pending_requests", &self.pending.len())
            .finish()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.reader.abort();
        }
    }
}

/// Routes responses to their pending request until the link closes.
async fn read_loop(
    channel: Weak<Channel>,
    pending: Arc<PendingTable>,
    stats: Arc<ChannelStats>,
    mut inbound: mpsc::Receiver<ResponseEnvelope>,
    generation: u64,
) {
    while let Some(envelope) = inbound.recv().await {
        let request_id = envelope.request_id;
        if pending.complete(request_id, envelope.body) {
            stats.record_response();
        } else {
            stats.record_late_response();
            tracing::debug!(request_id = %request_id, "Discarding response without pending request");
        }
    }

    if let Some(channel) = channel.upgrade() {
        channel.handle_link_lost(generation);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionStrategy;
    use crate::protocol::EndpointDescription;
    use parking_lot::Mutex as SyncMutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Refuses every attempt and records when each one happened.
    #[derive(Default)]
    struct RefusingConnector {
        attempts: SyncMutex<Vec<Instant>>,
    }

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn open(&self, _endpoint: &Endpoint) -> io::Result<Link> {
            self.attempts.lock().push(Instant::now());
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"))
        }
    }

    /// Answers requests with an echo task; `advertised` feeds GetEndpoints.
    struct EchoConnector {
        advertised: Vec<String>,
    }

    #[async_trait]
    impl Connector for EchoConnector {
        async fn open(&self, _endpoint: &Endpoint) -> io::Result<Link> {
            let (out_tx, mut out_rx) = mpsc::channel::<RequestEnvelope>(16);
            let (in_tx, in_rx) = mpsc::channel(16);
            let advertised = self.advertised.clone();
            tokio::spawn(async move {
                while let Some(request) = out_rx.recv().await {
                    let body = match request.body {
                        ServiceRequest::GetEndpoints { .. } => ServiceResponse::GetEndpoints {
                            endpoints: advertised
                                .iter()
                                .map(|url| EndpointDescription::unsecured(url.clone()))
                                .collect(),
                        },
                        ServiceRequest::Browse { .. } => {
                            ServiceResponse::Browse { references: vec![] }
                        }
                        _ => continue,
                    };
                    let _ = in_tx.send(ResponseEnvelope::new(request.request_id, body)).await;
                }
            });
            Ok(Link::new(out_tx, in_rx))
        }
    }

    fn config(max_retry: u32, must_exist: bool) -> Arc<ClientConfig> {
        Arc::new(
            ClientConfig::builder()
                .endpoint_must_exist(must_exist)
                .request_timeout(Duration::from_millis(500))
                .connection_strategy(ConnectionStrategy::new(
                    max_retry,
                    Duration::from_millis(100),
                    Duration::from_millis(250),
                ))
                .build()
                .unwrap(),
        )
    }

    fn endpoint() -> Endpoint {
        Endpoint::parse("opc.tcp://localhost:26543").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_after_exact_attempts() {
        let connector = Arc::new(RefusingConnector::default());
        let channel = Channel::new(endpoint(), config(4, false), connector.clone());

        let delays = Arc::new(SyncMutex::new(Vec::new()));
        {
            let delays = delays.clone();
            channel.on_backoff(move |attempt, delay| delays.lock().push((attempt, delay)));
        }

        let error = channel.connect().await.unwrap_err();
        assert!(matches!(
            error,
            UaError::Connect(ConnectError::Unreachable { attempts: 4, .. })
        ));
        assert_eq!(channel.state(), ChannelState::Disconnected);

        let attempts = connector.attempts.lock().clone();
        assert_eq!(attempts.len(), 4);
        let gaps: Vec<_> = attempts.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(250),
            ]
        );
        assert_eq!(
            *delays.lock(),
            vec![
                (1, Duration::from_millis(100)),
                (2, Duration::from_millis(200)),
                (3, Duration::from_millis(250)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_has_no_backoff() {
        let connector = Arc::new(RefusingConnector::default());
        let channel = Channel::new(endpoint(), config(1, false), connector.clone());

        assert!(channel.connect().await.is_err());
        assert_eq!(connector.attempts.lock().len(), 1);
        assert_eq!(channel.stats().backoffs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoint_must_exist() {
        let connector = Arc::new(EchoConnector {
            advertised: vec!["opc.tcp://otherhost:4840".into()],
        });
        let channel = Channel::new(endpoint(), config(3, true), connector);

        let error = channel.connect().await.unwrap_err();
        assert!(matches!(
            error,
            UaError::Connect(ConnectError::EndpointNotFound { .. })
        ));
        assert_eq!(channel.stats().connect_attempts(), 1);
        assert_eq!(channel.state(), ChannelState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_send_disconnect() {
        let connector = Arc::new(EchoConnector {
            advertised: vec!["opc.tcp://localhost:26543/".into()],
        });
        let channel = Channel::new(endpoint(), config(1, true), connector);
        channel.connect().await.unwrap();
        assert!(channel.is_connected());

        let response = channel
            .send(
                None,
                ServiceRequest::Browse {
                    node_id: "ns=0;i=85".into(),
                },
            )
            .await
            .unwrap();
        assert!(matches!(response, ServiceResponse::Browse { .. }));
        assert_eq!(channel.pending_requests(), 0);

        let closed = Arc::new(SyncMutex::new(0));
        {
            let closed = closed.clone();
            channel
                .events()
                .on(ChannelEventKind::Closed, move |_| *closed.lock() += 1);
        }
        channel.disconnect().await.unwrap();
        channel.disconnect().await.unwrap();
        assert_eq!(*closed.lock(), 1);
        assert_eq!(channel.state(), ChannelState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_request_times_out_and_releases_slot() {
        let connector = Arc::new(EchoConnector { advertised: vec![] });
        let channel = Channel::new(endpoint(), config(1, false), connector);
        channel.connect().await.unwrap();

        // The echo server ignores Publish.
        let error = channel
            .send(
                None,
                ServiceRequest::Publish {
                    subscription_id: crate::types::SubscriptionId(1),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            UaError::Transport(TransportError::RequestTimeout { .. })
        ));
        assert_eq!(channel.pending_requests(), 0);
        assert_eq!(channel.stats().request_timeouts(), 1);
    }

    #[tokio::test]
    async fn test_send_while_disconnected() {
        let channel = Channel::new(
            endpoint(),
            config(1, false),
            Arc::new(RefusingConnector::default()),
        );
        let error = channel
            .send(
                None,
                ServiceRequest::Browse {
                    node_id: "ns=0;i=85".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            UaError::Transport(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_superseded_link_is_refused() {
        let channel = Channel::new(
            endpoint(),
            config(1, false),
            Arc::new(RefusingConnector::default()),
        );
        channel.epoch.send_modify(|epoch| *epoch += 1);

        let (out_tx, mut out_rx) = mpsc::channel::<RequestEnvelope>(1);
        let (_in_tx, in_rx) = mpsc::channel(1);
        assert!(!channel.install_link(Link::new(out_tx, in_rx), 0));
        assert!(channel.link.lock().is_none());
        assert!(out_rx.recv().await.is_none());

        let (out_tx, _out_rx) = mpsc::channel::<RequestEnvelope>(1);
        let (_in_tx, in_rx) = mpsc::channel(1);
        assert!(channel.install_link(Link::new(out_tx, in_rx), 1));
        assert!(channel.link.lock().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_connect_racing_disconnect_leaves_no_link() {
        for _ in 0..64 {
            let channel = Channel::new(
                endpoint(),
                config(1, false),
                Arc::new(EchoConnector { advertised: vec![] }),
            );
            let connecting = {
                let channel = Arc::clone(&channel);
                tokio::spawn(async move { channel.connect().await })
            };
            let disconnecting = {
                let channel = Arc::clone(&channel);
                tokio::spawn(async move { channel.disconnect().await })
            };
            let connected = connecting.await.unwrap();
            disconnecting.await.unwrap().unwrap();

            match channel.state() {
                ChannelState::Connected => {
                    assert!(connected.is_ok());
                    assert!(channel.link.lock().is_some());
                }
                state => {
                    assert_eq!(state, ChannelState::Disconnected);
                    assert!(channel.link.lock().is_none());
                    assert_eq!(channel.pending_requests(), 0);
                }
            }
        }
    }

    #[test]
    fn test_pending_table_fail_all() {
        let table = PendingTable::default();
        let mut a = table.register(RequestId(1));
        let mut b = table.register(RequestId(2));
        assert_eq!(table.fail_all(&TransportError::ConnectionLost), 2);
        assert_eq!(table.len(), 0);
        assert_eq!(a.try_recv().unwrap().unwrap_err(), TransportError::ConnectionLost);
        assert_eq!(b.try_recv().unwrap().unwrap_err(), TransportError::ConnectionLost);
        assert!(!table.complete(RequestId(1), ServiceResponse::CloseSession));
    }
}
