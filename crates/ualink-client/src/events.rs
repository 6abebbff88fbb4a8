// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Listener registry and the events emitted by each client layer.
//!
//! Every emitter owns an [`EventRegistry`] mapping an event kind to an
//! ordered list of listeners. Listeners run in registration order and can
//! be removed with the [`ListenerId`] returned on registration.
//!
//! # Latched Events
//!
//! Lifecycle events that happen once (`started`, `terminated`) are latched:
//! a listener registered after the event fired is invoked immediately, so
//! callers never race the emitter. Each listener still sees the event
//! exactly once.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ualink_client::events::{ChannelEvent, ChannelEventKind, EventRegistry};
//!
//! let registry = EventRegistry::<ChannelEvent>::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = seen.clone();
//!
//! let id = registry.on(ChannelEventKind::Backoff, move |_| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//! registry.emit(&ChannelEvent::Backoff { attempt: 1, delay: Duration::from_secs(2) });
//! registry.off(id);
//! registry.emit(&ChannelEvent::Backoff { attempt: 2, delay: Duration::from_secs(4) });
//!
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{DataValue, SubscriptionId};

// =============================================================================
// Event Trait
// =============================================================================

/// An event that can be dispatched through an [`EventRegistry`].
pub trait Event: Clone + Send + Sync + 'static {
    /// Discriminant used to select listeners.
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// Returns the kind of this event.
    fn kind(&self) -> Self::Kind;

    /// Returns `true` if late listeners should receive this event on registration.
    fn is_latched(&self) -> bool {
        false
    }
}

/// A registered callback.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned by [`EventRegistry::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

// =============================================================================
// EventRegistry
// =============================================================================

struct Registration<E: Event> {
    id: ListenerId,
    kind: E::Kind,
    listener: Listener<E>,
}

struct RegistryState<E: Event> {
    registrations: Vec<Registration<E>>,
    latched: HashMap<E::Kind, E>,
}

/// Ordered listener lists keyed by event kind.
pub struct EventRegistry<E: Event> {
    state: RwLock<RegistryState<E>>,
    next_id: AtomicU64,
}

impl<E: Event> EventRegistry<E> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                registrations: Vec::new(),
                latched: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a listener for `kind`.
    ///
    /// If `kind` is latched and already fired, the listener runs before this
    /// call returns.
    pub fn on<F>(&self, kind: E::Kind, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let listener: Listener<E> = Arc::new(listener);
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let latched = {
            let mut state = self.state.write();
            state.registrations.push(Registration {
                id,
                kind,
                listener: Arc::clone(&listener),
            });
            state.latched.get(&kind).cloned()
        };

        if let Some(event) = latched {
            invoke(&listener, &event);
        }
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut state = self.state.write();
        let before = state.registrations.len();
        state.registrations.retain(|r| r.id != id);
        state.registrations.len() != before
    }

    /// Invokes every listener registered for the event's kind, in order.
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&self, event: &E) -> usize {
        let kind = event.kind();
        let listeners: Vec<Listener<E>> = if event.is_latched() {
            let mut state = self.state.write();
            state.latched.insert(kind, event.clone());
            collect(&state.registrations, kind)
        } else {
            collect(&self.state.read().registrations, kind)
        };

        for listener in &listeners {
            invoke(listener, event);
        }
        listeners.len()
    }

    /// Returns the number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.state
            .read()
            .registrations
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }

    /// Returns `true` if a latched event of `kind` has fired.
    pub fn has_fired(&self, kind: E::Kind) -> bool {
        self.state.read().latched.contains_key(&kind)
    }

    /// Removes every listener. Latched state is kept.
    pub fn clear(&self) {
        self.state.write().registrations.clear();
    }
}

impl<E: Event> Default for EventRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> fmt::Debug for EventRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("EventRegistry")
            .field("listeners", &state.registrations.len())
            .field("latched", &state.latched.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn collect<E: Event>(registrations: &[Registration<E>], kind: E::Kind) -> Vec<Listener<E>> {
    registrations
        .iter()
        .filter(|r| r.kind == kind)
        .map(|r| Arc::clone(&r.listener))
        .collect()
}

fn invoke<E: Event>(listener: &Listener<E>, event: &E) {
    if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
        tracing::error!(kind = ?event.kind(), "Event listener panicked");
    }
}

// =============================================================================
// Channel Events
// =============================================================================

/// Events emitted by a transport channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A connection attempt failed; the next one starts after `delay`.
    Backoff {
        /// Failed attempt number (1-based).
        attempt: u32,
        /// Delay before the next attempt.
        delay: Duration,
    },
    /// The channel connected.
    Connected {
        /// Endpoint URL.
        endpoint: String,
    },
    /// The link dropped unexpectedly; reconnection starts.
    ConnectionLost,
    /// The channel reconnected after a loss.
    Reconnected,
    /// The channel closed.
    Closed,
}

/// Kinds of [`ChannelEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelEventKind {
    /// `backoff`
    Backoff,
    /// `connected`
    Connected,
    /// `connection_lost`
    ConnectionLost,
    /// `reconnected`
    Reconnected,
    /// `closed`
    Closed,
}

impl Event for ChannelEvent {
    type Kind = ChannelEventKind;

    fn kind(&self) -> ChannelEventKind {
        match self {
            Self::Backoff { .. } => ChannelEventKind::Backoff,
            Self::Connected { .. } => ChannelEventKind::Connected,
            Self::ConnectionLost => ChannelEventKind::ConnectionLost,
            Self::Reconnected => ChannelEventKind::Reconnected,
            Self::Closed => ChannelEventKind::Closed,
        }
    }
}

// =============================================================================
// Subscription Events
// =============================================================================

/// Why a subscription terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// `terminate()` was called.
    Requested,
    /// The owning session closed.
    SessionClosed,
    /// No publish activity within the lifetime count.
    Expired,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "requested"),
            Self::SessionClosed => write!(f, "session_closed"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Events emitted by a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEvent {
    /// The server acknowledged creation.
    Started {
        /// Subscription id.
        subscription_id: SubscriptionId,
        /// Revised publishing interval.
        publishing_interval: Duration,
    },
    /// A keepalive publish was acknowledged.
    KeepAlive {
        /// Subscription id.
        subscription_id: SubscriptionId,
        /// Sequence number returned by the server.
        sequence_number: u32,
    },
    /// The subscription terminated. Always the last event.
    Terminated {
        /// Subscription id.
        subscription_id: SubscriptionId,
        /// Why it terminated.
        reason: TerminationReason,
    },
}

/// Kinds of [`SubscriptionEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionEventKind {
    /// `started`
    Started,
    /// `keepalive`
    KeepAlive,
    /// `terminated`
    Terminated,
}

impl Event for SubscriptionEvent {
    type Kind = SubscriptionEventKind;

    fn kind(&self) -> SubscriptionEventKind {
        match self {
            Self::Started { .. } => SubscriptionEventKind::Started,
            Self::KeepAlive { .. } => SubscriptionEventKind::KeepAlive,
            Self::Terminated { .. } => SubscriptionEventKind::Terminated,
        }
    }

    fn is_latched(&self) -> bool {
        !matches!(self, Self::KeepAlive { .. })
    }
}

// =============================================================================
// Monitored Item Events
// =============================================================================

/// Events emitted by a monitored item.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitoredItemEvent {
    /// A notification was delivered.
    Changed(DataValue),
    /// The item stopped monitoring.
    Terminated,
}

/// Kinds of [`MonitoredItemEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitoredItemEventKind {
    /// `changed`
    Changed,
    /// `terminated`
    Terminated,
}

impl Event for MonitoredItemEvent {
    type Kind = MonitoredItemEventKind;

    fn kind(&self) -> MonitoredItemEventKind {
        match self {
            Self::Changed(_) => MonitoredItemEventKind::Changed,
            Self::Terminated => MonitoredItemEventKind::Terminated,
        }
    }

    fn is_latched(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

// =============================================================================
// Tests
// =============================================================================
