// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Custom Test Assertions
//!
//! Domain-specific assertion helpers for client integration tests.
//!
//! ## Design Principles
//!
//! - Provide clear, informative failure messages
//! - Match error variants without spelling out every field

use std::time::Duration;

use tokio::time::Instant;
use ualink_client::{
    ConnectError, DataValue, SessionError, StatusCode, SubscriptionError, TransportError, UaError,
    Variant,
};

// =============================================================================
// DataValue Assertions
// =============================================================================

/// Assertion extensions for DataValue.
pub trait DataValueAssertions {
    /// Assert that the status is Good.
    fn assert_good(&self);

    /// Assert a specific status.
    fn assert_status(&self, expected: StatusCode);

    /// Assert the value.
    fn assert_value(&self, expected: impl Into<Variant>);

    /// Assert which timestamps are present.
    fn assert_timestamps(&self, source: bool, server: bool);
}

impl DataValueAssertions for DataValue {
    fn assert_good(&self) {
        assert!(
            self.status.is_good(),
            "Expected Good status, but got {} (value {})",
            self.status,
            self.value
        );
    }

    fn assert_status(&self, expected: StatusCode) {
        assert_eq!(
            self.status, expected,
            "Expected status {}, but got {}",
            expected, self.status
        );
    }

    fn assert_value(&self, expected: impl Into<Variant>) {
        let expected = expected.into();
        assert_eq!(
            self.value, expected,
            "Expected value {}, but got {}",
            expected, self.value
        );
    }

    fn assert_timestamps(&self, source: bool, server: bool) {
        assert_eq!(
            self.source_timestamp.is_some(),
            source,
            "Unexpected source timestamp presence: {:?}",
            self.source_timestamp
        );
        assert_eq!(
            self.server_timestamp.is_some(),
            server,
            "Unexpected server timestamp presence: {:?}",
            self.server_timestamp
        );
    }
}

// =============================================================================
// Error Assertions
// =============================================================================

/// Assert `Unreachable` after exactly `attempts` attempts.
pub fn assert_unreachable(error: &UaError, attempts: u32) {
    match error {
        UaError::Connect(ConnectError::Unreachable { attempts: actual, .. }) => {
            assert_eq!(*actual, attempts, "Unexpected attempt count in {}", error)
        }
        other => panic!("Expected Unreachable, got {:?}", other),
    }
}

/// Assert `EndpointNotFound`.
pub fn assert_endpoint_not_found(error: &UaError) {
    assert!(
        matches!(error, UaError::Connect(ConnectError::EndpointNotFound { .. })),
        "Expected EndpointNotFound, got {:?}",
        error
    );
}

/// Assert a specific transport error, ignoring `RequestTimeout` fields.
pub fn assert_transport(error: &UaError, expected: &TransportError) {
    match (error, expected) {
        (
            UaError::Transport(TransportError::RequestTimeout { .. }),
            TransportError::RequestTimeout { .. },
        ) => {}
        (UaError::Transport(actual), _) => assert_eq!(actual, expected),
        (other, _) => panic!("Expected transport error {:?}, got {:?}", expected, other),
    }
}

/// Assert `RequestTimeout`.
pub fn assert_request_timeout(error: &UaError) {
    assert!(
        matches!(error, UaError::Transport(TransportError::RequestTimeout { .. })),
        "Expected RequestTimeout, got {:?}",
        error
    );
}

/// Assert `InvalidParameter` naming `parameter`.
pub fn assert_invalid_parameter(error: &UaError, parameter: &str) {
    match error {
        UaError::Session(SessionError::InvalidParameter { parameter: actual, .. }) => {
            assert_eq!(*actual, parameter)
        }
        other => panic!("Expected InvalidParameter({}), got {:?}", parameter, other),
    }
}

/// Assert `SessionCreateFailed`, optionally with a server status.
pub fn assert_session_create_failed(error: &UaError, status: Option<StatusCode>) {
    match error {
        UaError::Session(SessionError::SessionCreateFailed { status: actual, .. }) => {
            assert_eq!(*actual, status)
        }
        other => panic!("Expected SessionCreateFailed, got {:?}", other),
    }
}

/// Assert `SessionError::Closed`.
pub fn assert_session_closed(error: &UaError) {
    assert!(
        matches!(error, UaError::Session(SessionError::Closed { .. })),
        "Expected closed session, got {:?}",
        error
    );
}

/// Assert `SubscriptionError::Terminated`.
pub fn assert_subscription_terminated(error: &UaError) {
    assert!(
        matches!(error, UaError::Subscription(SubscriptionError::Terminated { .. })),
        "Expected terminated subscription, got {:?}",
        error
    );
}

/// Assert a service fault with `status`.
pub fn assert_service_fault(error: &UaError, status: StatusCode) {
    match error {
        UaError::Service(actual) => assert_eq!(*actual, status),
        other => panic!("Expected service fault {}, got {:?}", status, other),
    }
}

// =============================================================================
// Timing Assertions
// =============================================================================

/// Assert that `expected` elapsed since `start`, within a millisecond.
pub fn assert_elapsed(start: Instant, expected: Duration) {
    let elapsed = start.elapsed();
    let tolerance = Duration::from_millis(1);
    assert!(
        elapsed >= expected && elapsed <= expected + tolerance,
        "Expected {:?} elapsed, but got {:?}",
        expected,
        elapsed
    );
}
