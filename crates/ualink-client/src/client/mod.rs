// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client layers, from the transport channel up to monitored items.
//!
//! - **Channel**: connection lifecycle, backoff and request correlation
//! - **Session**: browse, read, write and subscription ownership
//! - **Subscription**: publish cycles, keepalive and lifetime
//! - **Monitored Item**: sampling, change filtering and queueing
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          UaClient                               │
//! │             (connect / create_session / disconnect)             │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Session                                │
//! │                 (browse / read / write)                         │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │ owns
//!                              ▼
//! ┌──────────────────────────────┐      ┌──────────────────────────┐
//! │        Subscription          │ owns │      MonitoredItem       │
//! │ (publish task, delivery task)│─────►│ (sampler, queue)         │
//! └──────────────────────────────┘      └──────────────────────────┘
//!                              │ requests
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Channel                                │
//! │        (Connector link, correlation table, reconnect)           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Closing an owner cascades to everything below it.

mod channel;
mod monitored_item;
mod session;
mod subscription;
mod wrapper;

pub use channel::{Channel, ChannelState, ChannelStats, Connector, Link};
pub use monitored_item::{MonitoredItem, MonitoredItemStats, NotificationQueue};
pub use session::{Session, SessionState, SessionStats};
pub use subscription::{Subscription, SubscriptionState, SubscriptionStats};
pub use wrapper::UaClient;
