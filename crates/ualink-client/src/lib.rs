// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA session and subscription client core.
//!
//! This crate implements the client side of an OPC UA conversation on top
//! of an abstract message transport:
//!
//! # Features
//!
//! - Connection establishment with bounded exponential backoff
//! - Request/response correlation over one channel, out-of-order safe
//! - Automatic reconnection after link loss
//! - Sessions with browse, read and write
//! - Subscriptions with keepalive and lifetime supervision
//! - Monitored items with bounded notification queues
//!
//! The byte-level transport is supplied through the [`Connector`] trait.
//!
//! # Error Handling
//!
//! ```text
//! UaError
//! ├── Connect       - Endpoint lookup and reachability
//! ├── Session       - Session creation, parameters, closed sessions
//! ├── Transport     - Closed or lost links, request timeouts
//! ├── Subscription  - Terminated subscriptions, unknown items
//! ├── Service       - Server faults
//! └── Configuration - Invalid settings
//! ```
//!
//! Bad and Uncertain status codes on individual values are data, never
//! errors.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use ualink_client::{
//!     ClientConfig, MonitoringParameters, ReadValueId, SubscriptionParameters,
//!     TimestampsToReturn, UaClient,
//! };
//!
//! let client = UaClient::new(ClientConfig::default(), connector)?;
//! client.connect("opc.tcp://localhost:4840").await?;
//! let session = client.create_session().await?;
//!
//! let subscription = session
//!     .create_subscription(SubscriptionParameters::with_interval(Duration::from_millis(500)))
//!     .await?;
//! let item = subscription
//!     .monitor(
//!         ReadValueId::value("ns=1;s=Temperature"),
//!         MonitoringParameters::default(),
//!         TimestampsToReturn::Both,
//!     )
//!     .await?;
//! item.on_changed(|value| println!("temperature: {}", value.value));
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod types;

// Re-export commonly used types
pub use error::{
    ConfigurationError, ConnectError, ErrorCode, ErrorSeverity, SessionError, SubscriptionError,
    TransportError, UaError, UaErrorContext, UaResult,
};

pub use config::{ClientConfig, ClientConfigBuilder, ConnectionStrategy, Endpoint};

pub use types::{
    AttributeId, DataValue, Deadband, MonitoredItemId, MonitoringParameters, NodeClass, NodeId,
    ReadValueId, ReferenceDescription, StatusCode, SubscriptionId, SubscriptionParameters,
    TimestampsToReturn, Variant,
};

pub use events::{
    ChannelEvent, ChannelEventKind, EventRegistry, ListenerId, MonitoredItemEvent,
    MonitoredItemEventKind, SubscriptionEvent, SubscriptionEventKind, TerminationReason,
};

// Re-export client types
pub use client::{
    Channel, ChannelState, ChannelStats, Connector, Link, MonitoredItem, MonitoredItemStats,
    NotificationQueue, Session, SessionState, SessionStats, Subscription, SubscriptionState,
    SubscriptionStats, UaClient,
};
