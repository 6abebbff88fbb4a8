// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! Wires a [`UaClient`] to a seeded [`MockServer`] and records events with
//! their virtual time offsets.
//!
//! ## Design Principles
//!
//! - One call from an empty test to a live session
//! - The server handle stays with the test for error injection
//! - Event timing is asserted against the paused tokio clock

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use ualink_client::{Channel, ClientConfig, Session, UaClient, UaResult};

use super::fixtures::{ConfigFixtures, EndpointFixtures, ServerFixtures};
use super::init_test_logging;
use super::mocks::MockServer;

// =============================================================================
// Test Harness
// =============================================================================

/// A client connected to an in-process server.
pub struct TestHarness {
    /// Server handle for error injection and verification.
    pub server: MockServer,

    /// Client under test.
    pub client: UaClient,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Create a harness with [`ConfigFixtures::fast`] and three attempts.
    pub fn new() -> Self {
        Self::with_config(ConfigFixtures::fast(3))
    }

    /// Create a harness with a custom configuration and the plant server.
    pub fn with_config(config: ClientConfig) -> Self {
        Self::with_server(config, ServerFixtures::plant())
    }

    /// Create a harness around an existing server.
    pub fn with_server(config: ClientConfig, server: MockServer) -> Self {
        init_test_logging();
        let client = UaClient::new(config, server.connector()).expect("harness config is valid");
        Self { server, client }
    }

    /// Connect to [`EndpointFixtures::LOCAL`].
    pub async fn connect(&self) -> UaResult<()> {
        self.client.connect(EndpointFixtures::LOCAL).await
    }

    /// Connect and create a session, panicking on failure.
    pub async fn session(&self) -> Session {
        self.connect().await.expect("connect");
        self.client.create_session().await.expect("create session")
    }

    /// The client's channel, panicking before the first connect.
    pub fn channel(&self) -> Arc<Channel> {
        self.client.channel().expect("connect() was called")
    }
}

// =============================================================================
// Event Recorder
// =============================================================================

/// Collects events with the virtual time they were observed at.
pub struct EventRecorder<T> {
    start: Instant,
    events: Arc<Mutex<Vec<(Duration, T)>>>,
}

impl<T> Clone for EventRecorder<T> {
    fn clone(&self) -> Self {
        Self {
            start: self.start,
            events: Arc::clone(&self.events),
        }
    }
}

impl<T: Clone + Send + 'static> Default for EventRecorder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> EventRecorder<T> {
    /// Create a recorder measuring offsets from now.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a recorder measuring offsets from `start`.
    pub fn starting_at(start: Instant) -> Self {
        Self {
            start,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record an event.
    pub fn record(&self, event: T) {
        self.events.lock().push((self.start.elapsed(), event));
    }

    /// A closure that records into this recorder.
    pub fn sink(&self) -> impl Fn(T) + Send + Sync + 'static {
        let recorder = self.clone();
        move |event| recorder.record(event)
    }

    /// Recorded events in order.
    pub fn events(&self) -> Vec<T> {
        self.events.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    /// Recorded events with their offsets.
    pub fn timed(&self) -> Vec<(Duration, T)> {
        self.events.lock().clone()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Start offset of the recorder.
    pub fn start(&self) -> Instant {
        self.start
    }
}

impl<T: fmt::Debug> fmt::Debug for EventRecorder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRecorder")
            .field("events", &*self.events.lock())
            .finish()
    }
}

// =============================================================================
// Time Helpers
// =============================================================================

/// Sleep until `offset_ms` after `start` on the tokio clock.
pub async fn advance_to(start: Instant, offset_ms: u64) {
    tokio::time::sleep_until(start + Duration::from_millis(offset_ms)).await;
}

/// Milliseconds shorthand.
pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
