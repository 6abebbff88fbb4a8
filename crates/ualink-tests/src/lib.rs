// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # ualink Integration Tests
//!
//! Integration tests for `ualink-client` against an in-process mock
//! server. All timing-sensitive tests run on a paused tokio clock, so
//! intervals, backoff delays and timeouts are exact and instantaneous.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities, fixtures, and helpers
//!   - `fixtures`: Pre-built node ids, endpoints and configurations
//!   - `assertions`: Custom assertion helpers
//!   - `mocks`: `MockServer`, a configurable `Connector`
//!   - `harness`: Client/server harness and event recorder
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p ualink-tests
//!
//! # Run specific test suite
//! cargo test -p ualink-tests --test integration_channel
//! cargo test -p ualink-tests --test integration_session
//! cargo test -p ualink-tests --test integration_subscription
//!
//! # Run with client logs
//! RUST_LOG=ualink_client=trace cargo test -p ualink-tests -- --nocapture
//! ```
//!
//! ## Test Categories
//!
//! ### Channel Tests (`integration_channel.rs`)
//! - Backoff schedule and attempt counting
//! - Endpoint verification
//! - Request correlation, timeouts and late responses
//! - Link loss and reconnection
//!
//! ### Session Tests (`integration_session.rs`)
//! - Browse, read and write
//! - Session creation failures and close semantics
//!
//! ### Subscription Tests (`integration_subscription.rs`)
//! - Queue overflow policies
//! - Keepalive and lifetime supervision
//! - Termination ordering
//!
//! ## Writing New Tests
//!
//! ```rust,ignore
//! use ualink_tests::common::{NodeFixtures, TestHarness};
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_something() {
//!     let harness = TestHarness::new();
//!     let session = harness.session().await;
//!     let value = session.read_value(NodeFixtures::TEMPERATURE).await.unwrap();
//!     // ... test logic
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::assertions::*;
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::*;
    pub use crate::common::mocks::*;
}
