// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscriptions: publish cycles, keepalive and lifetime supervision.
//!
//! Each subscription runs two tasks:
//!
//! - a **publish task** ticking every publishing interval. It drains queued
//!   notifications from the monitored items, sends keepalive round trips after
//!   `max_keep_alive_count` empty cycles, and expires the subscription after
//!   `lifetime_count` cycles without publish activity.
//! - a **delivery task** that invokes listeners. The publish task hands work
//!   over through a bounded queue, so listeners never run on the publish task
//!   and always observe events in publish order.
//!
//! # State Machine
//!
//! ```text
//! Creating ──► Normal ◄──────► KeepAlivePending
//!                 │                   │
//!                 └──────► Terminated ◄┘
//! ```
//!
//! `Terminated` is absorbing and its event is always the last one delivered.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::client::monitored_item::MonitoredItem;
use crate::client::session::{unexpected, ServiceClient, SessionShared};
use crate::error::{SubscriptionError, UaError, UaResult};
use crate::events::{
    EventRegistry, ListenerId, SubscriptionEvent, SubscriptionEventKind, TerminationReason,
};
use crate::protocol::{ServiceRequest, ServiceResponse};
use crate::types::{
    DataValue, MonitoredItemId, MonitoringParameters, ReadValueId, SubscriptionId,
    SubscriptionParameters, TimestampsToReturn,
};

// =============================================================================
// SubscriptionState
// =============================================================================

/// State of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Waiting for the server to acknowledge creation.
    #[default]
    Creating,

    /// Publishing; the last cycle delivered data.
    Normal,

    /// Idle; the last publish activity was a keepalive.
    KeepAlivePending,

    /// Terminated. Absorbing.
    Terminated,
}

impl SubscriptionState {
    /// Returns `true` once terminated.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => write!(f, "Creating"),
            Self::Normal => write!(f, "Normal"),
            Self::KeepAlivePending => write!(f, "KeepAlivePending"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

// =============================================================================
// SubscriptionStats
// =============================================================================

/// Statistics for a subscription.
#[derive(Debug, Default)]
pub struct SubscriptionStats {
    publish_cycles: AtomicU64,
    notifications: AtomicU64,
    keepalives: AtomicU64,
    keepalive_failures: AtomicU64,
}

impl SubscriptionStats {
    /// Returns the number of publish cycles run.
    pub fn publish_cycles(&self) -> u64 {
        self.publish_cycles.load(Ordering::Relaxed)
    }

    /// Returns the number of notifications handed to delivery.
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    /// Returns the number of acknowledged keepalives.
    pub fn keepalives(&self) -> u64 {
        self.keepalives.load(Ordering::Relaxed)
    }

    /// Returns the number of keepalives that were not acknowledged.
    pub fn keepalive_failures(&self) -> u64 {
        self.keepalive_failures.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Delivery
// =============================================================================

enum Delivery {
    Started { publishing_interval: Duration },
    KeepAlive { sequence_number: u32 },
    Changes(Vec<(MonitoredItem, DataValue)>),
    ItemRemoved(MonitoredItem),
    Terminated {
        reason: TerminationReason,
        items: Vec<MonitoredItem>,
    },
}

async fn delivery_loop(
    subscription_id: SubscriptionId,
    mut deliveries: mpsc::Receiver<Delivery>,
    events: Arc<EventRegistry<SubscriptionEvent>>,
) {
    while let Some(delivery) = deliveries.recv().await {
        match delivery {
            Delivery::Started { publishing_interval } => {
                events.emit(&SubscriptionEvent::Started {
                    subscription_id,
                    publishing_interval,
                });
            }
            Delivery::KeepAlive { sequence_number } => {
                events.emit(&SubscriptionEvent::KeepAlive {
                    subscription_id,
                    sequence_number,
                });
            }
            Delivery::Changes(batch) => {
                for (item, value) in batch {
                    item.deliver(value);
                }
            }
            Delivery::ItemRemoved(item) => item.notify_terminated(),
            Delivery::Terminated { reason, items } => {
                for item in &items {
                    item.notify_terminated();
                }
                events.emit(&SubscriptionEvent::Terminated {
                    subscription_id,
                    reason,
                });
                break;
            }
        }
    }
}

// =============================================================================
// Subscription
// =============================================================================

struct SubscriptionShared {
    id: SubscriptionId,
    publishing_interval: Duration,
    lifetime_count: u32,
    max_keep_alive_count: u32,
    max_notifications_per_publish: u32,
    priority: u8,
    publishing_enabled: AtomicBool,
    client: ServiceClient,
    session: Weak<SessionShared>,
    state: RwLock<SubscriptionState>,
    items: Mutex<BTreeMap<MonitoredItemId, MonitoredItem>>,
    next_item_id: AtomicU32,
    events: Arc<EventRegistry<SubscriptionEvent>>,
    deliveries: mpsc::Sender<Delivery>,
    publish_task: Mutex<Option<JoinHandle<()>>>,
    delivery_task: Mutex<Option<JoinHandle<()>>>,
    stats: SubscriptionStats,
}

/// Counters carried across publish cycles.
#[derive(Debug, Default)]
struct PublishCycle {
    idle: u32,
    lifetime_idle: u32,
    cursor: usize,
}

impl SubscriptionShared {
    fn set_state(&self, new_state: SubscriptionState) {
        let mut state = self.state.write();
        if *state == new_state || state.is_terminal() {
            return;
        }
        let old_state = std::mem::replace(&mut *state, new_state);
        tracing::trace!(
            subscription_id = %self.id,
            old_state = %old_state,
            new_state = %new_state,
            "Subscription state changed"
        );
    }

    /// Takes up to `max_notifications_per_publish` notifications, one item at
    /// a time in registration order, starting at `cursor`.
    fn drain(&self, cursor: &mut usize) -> Vec<(MonitoredItem, DataValue)> {
        let items: Vec<MonitoredItem> = self.items.lock().values().cloned().collect();
        if items.is_empty() {
            return Vec::new();
        }

        let limit = match self.max_notifications_per_publish {
            0 => usize::MAX,
            max => max as usize,
        };
        let count = items.len();
        let mut batch = Vec::new();
        let mut index = *cursor % count;
        let mut empty_run = 0;

        while batch.len() < limit && empty_run < count {
            match items[index].take_notification() {
                Some(value) => {
                    batch.push((items[index].clone(), value));
                    empty_run = 0;
                }
                None => empty_run += 1,
            }
            index = (index + 1) % count;
        }

        *cursor = if batch.len() >= limit { index } else { 0 };
        batch
    }

    /// Runs one publish cycle. Returns `false` once the subscription expired.
    async fn run_cycle(self: &Arc<Self>, cycle: &mut PublishCycle) -> bool {
        self.stats.publish_cycles.fetch_add(1, Ordering::Relaxed);

        let batch = if self.publishing_enabled.load(Ordering::Acquire) {
            self.drain(&mut cycle.cursor)
        } else {
            Vec::new()
        };

        if !batch.is_empty() {
            cycle.idle = 0;
            cycle.lifetime_idle = 0;
            self.set_state(SubscriptionState::Normal);
            self.stats
                .notifications
                .fetch_add(batch.len() as u64, Ordering::Relaxed);
            tracing::trace!(subscription_id = %self.id, notifications = batch.len(), "Publishing");
            let _ = self.deliveries.send(Delivery::Changes(batch)).await;
            return true;
        }

        cycle.idle += 1;
        cycle.lifetime_idle += 1;

        if cycle.idle >= self.max_keep_alive_count {
            cycle.idle = 0;
            if let Some(sequence_number) = self.keepalive().await {
                cycle.lifetime_idle = 0;
                self.set_state(SubscriptionState::KeepAlivePending);
                self.stats.keepalives.fetch_add(1, Ordering::Relaxed);
                let _ = self
                    .deliveries
                    .send(Delivery::KeepAlive { sequence_number })
                    .await;
            } else {
                self.stats.keepalive_failures.fetch_add(1, Ordering::Relaxed);
            }
        }

        if cycle.lifetime_idle >= self.lifetime_count {
            tracing::warn!(
                subscription_id = %self.id,
                lifetime_count = self.lifetime_count,
                "Subscription lifetime expired"
            );
            self.finish(TerminationReason::Expired).await;
            return false;
        }

        true
    }

    async fn keepalive(&self) -> Option<u32> {
        let request = ServiceRequest::Publish {
            subscription_id: self.id,
        };
        match self.client.call(request).await {
            Ok(ServiceResponse::Publish {
                sequence_number, ..
            }) => Some(sequence_number),
            Ok(ServiceResponse::ServiceFault { status }) => {
                tracing::warn!(subscription_id = %self.id, status = %status, "Keepalive rejected");
                None
            }
            Ok(other) => {
                unexpected("Publish", other.name()).log("keepalive");
                None
            }
            Err(error) => {
                tracing::warn!(subscription_id = %self.id, error = %error, "Keepalive failed");
                None
            }
        }
    }

    /// Terminates once. Returns `false` if already terminated.
    async fn finish(self: &Arc<Self>, reason: TerminationReason) -> bool {
        {
            let mut state = self.state.write();
            if state.is_terminal() {
                return false;
            }
            let old_state = std::mem::replace(&mut *state, SubscriptionState::Terminated);
            tracing::trace!(
                subscription_id = %self.id,
                old_state = %old_state,
                new_state = %SubscriptionState::Terminated,
                "Subscription state changed"
            );
        }

        let publish = self.publish_task.lock().take();
        if let Some(handle) = publish {
            // Expiry runs on the publish task itself.
            if reason != TerminationReason::Expired {
                handle.abort();
                let _ = handle.await;
            }
        }

        let items: Vec<MonitoredItem> = std::mem::take(&mut *self.items.lock()).into_values().collect();
        for item in &items {
            item.deactivate().await;
        }

        if reason == TerminationReason::Requested {
            let request = ServiceRequest::DeleteSubscription {
                subscription_id: self.id,
            };
            match self.client.call(request).await {
                Ok(ServiceResponse::DeleteSubscription { status }) if status.is_good() => {}
                Ok(other) => {
                    tracing::warn!(subscription_id = %self.id, response = other.name(), "DeleteSubscription not acknowledged");
                }
                Err(error) => {
                    tracing::warn!(subscription_id = %self.id, error = %error, "DeleteSubscription failed");
                }
            }
        }

        let _ = self.deliveries.send(Delivery::Terminated { reason, items }).await;
        let delivery = self.delivery_task.lock().take();
        if let Some(handle) = delivery {
            let _ = handle.await;
        }

        if let Some(session) = self.session.upgrade() {
            session.forget_subscription(self.id);
        }

        tracing::info!(subscription_id = %self.id, reason = %reason, "Subscription terminated");
        true
    }
}

impl Drop for SubscriptionShared {
    fn drop(&mut self) {
        if let Some(handle) = self.publish_task.get_mut().take() {
            handle.abort();
        }
        if let Some(handle) = self.delivery_task.get_mut().take() {
            handle.abort();
        }
    }
}

async fn publish_loop(subscription: Weak<SubscriptionShared>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cycle = PublishCycle::default();

    loop {
        ticker.tick().await;
        let Some(shared) = subscription.upgrade() else { break };
        if !shared.run_cycle(&mut cycle).await {
            break;
        }
    }
}

/// A subscription owned by a session.
///
/// `Subscription` is a cheap handle; clones refer to the same subscription.
#[derive(Clone)]
pub struct Subscription {
    shared: Arc<SubscriptionShared>,
}

impl Subscription {
    /// Creates the subscription server-side and starts publishing.
    pub(crate) async fn create(
        session: &Arc<SessionShared>,
        parameters: SubscriptionParameters,
    ) -> UaResult<Subscription> {
        parameters.validate()?;
        let client = session.client().clone();

        let request = ServiceRequest::CreateSubscription {
            parameters: parameters.clone(),
        };
        let (id, publishing_interval, lifetime_count, max_keep_alive_count) =
            match client.call(request).await? {
                ServiceResponse::CreateSubscription {
                    subscription_id,
                    revised_publishing_interval,
                    revised_lifetime_count,
                    revised_max_keep_alive_count,
                } => (
                    subscription_id,
                    revised_publishing_interval,
                    revised_lifetime_count,
                    revised_max_keep_alive_count,
                ),
                ServiceResponse::ServiceFault { status } => return Err(UaError::service(status)),
                other => return Err(unexpected("CreateSubscription", other.name())),
            };

        // Servers may echo a lifetime too short to outlast three keepalive periods.
        let max_keep_alive_count = max_keep_alive_count.max(1);
        let lifetime_count = lifetime_count.max(max_keep_alive_count.saturating_mul(3));

        let capacity = client.channel().config().delivery_queue_capacity;
        let (deliveries, receiver) = mpsc::channel(capacity);
        let events = Arc::new(EventRegistry::new());
        let delivery_task = tokio::spawn(delivery_loop(id, receiver, Arc::clone(&events)));

        let shared = Arc::new(SubscriptionShared {
            id,
            publishing_interval,
            lifetime_count,
            max_keep_alive_count,
            max_notifications_per_publish: parameters.max_notifications_per_publish,
            priority: parameters.priority,
            publishing_enabled: AtomicBool::new(parameters.publishing_enabled),
            client,
            session: Arc::downgrade(session),
            state: RwLock::new(SubscriptionState::Creating),
            items: Mutex::new(BTreeMap::new()),
            next_item_id: AtomicU32::new(1),
            events,
            deliveries,
            publish_task: Mutex::new(None),
            delivery_task: Mutex::new(Some(delivery_task)),
            stats: SubscriptionStats::default(),
        });

        shared.set_state(SubscriptionState::Normal);
        let _ = shared
            .deliveries
            .send(Delivery::Started {
                publishing_interval,
            })
            .await;

        let publish_task = tokio::spawn(publish_loop(Arc::downgrade(&shared), publishing_interval));
        *shared.publish_task.lock() = Some(publish_task);

        tracing::info!(
            subscription_id = %id,
            publishing_interval = ?publishing_interval,
            lifetime_count,
            max_keep_alive_count,
            "Subscription started"
        );

        Ok(Subscription { shared })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the server-assigned id.
    pub fn id(&self) -> SubscriptionId {
        self.shared.id
    }

    /// Returns the revised publishing interval.
    pub fn publishing_interval(&self) -> Duration {
        self.shared.publishing_interval
    }

    /// Returns the revised lifetime count.
    pub fn lifetime_count(&self) -> u32 {
        self.shared.lifetime_count
    }

    /// Returns the revised keepalive count.
    pub fn max_keep_alive_count(&self) -> u32 {
        self.shared.max_keep_alive_count
    }

    /// Returns the per-cycle notification limit (0 is unlimited).
    pub fn max_notifications_per_publish(&self) -> u32 {
        self.shared.max_notifications_per_publish
    }

    /// Returns the priority.
    pub fn priority(&self) -> u8 {
        self.shared.priority
    }

    /// Returns `true` if publish cycles deliver notifications.
    pub fn is_publishing_enabled(&self) -> bool {
        self.shared.publishing_enabled.load(Ordering::Acquire)
    }

    /// Returns the current state.
    pub fn state(&self) -> SubscriptionState {
        *self.shared.state.read()
    }

    /// Returns `true` once terminated.
    pub fn is_terminated(&self) -> bool {
        self.state().is_terminal()
    }

    /// Returns the monitored items in registration order.
    pub fn monitored_items(&self) -> Vec<MonitoredItem> {
        self.shared.items.lock().values().cloned().collect()
    }

    /// Returns the statistics.
    pub fn stats(&self) -> &SubscriptionStats {
        &self.shared.stats
    }

    /// Returns the event registry.
    pub fn events(&self) -> &EventRegistry<SubscriptionEvent> {
        &self.shared.events
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Registers a listener for `kind`.
    pub fn on<F>(&self, kind: SubscriptionEventKind, listener: F) -> ListenerId
    where
        F: Fn(&SubscriptionEvent) + Send + Sync + 'static,
    {
        self.shared.events.on(kind, listener)
    }

    /// Registers a `started` listener receiving the revised publishing interval.
    pub fn on_started<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.on(SubscriptionEventKind::Started, move |event| {
            if let SubscriptionEvent::Started {
                publishing_interval, ..
            } = event
            {
                listener(*publishing_interval);
            }
        })
    }

    /// Registers a `keepalive` listener receiving the sequence number.
    pub fn on_keepalive<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.on(SubscriptionEventKind::KeepAlive, move |event| {
            if let SubscriptionEvent::KeepAlive {
                sequence_number, ..
            } = event
            {
                listener(*sequence_number);
            }
        })
    }

    /// Registers a `terminated` listener.
    pub fn on_terminated<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(TerminationReason) + Send + Sync + 'static,
    {
        self.on(SubscriptionEventKind::Terminated, move |event| {
            if let SubscriptionEvent::Terminated { reason, .. } = event {
                listener(*reason);
            }
        })
    }

    /// Removes a listener.
    pub fn off(&self, id: ListenerId) -> bool {
        self.shared.events.off(id)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Starts monitoring an attribute.
    ///
    /// Fails with `InvalidParameter` if `queue_size` is 0 or the sampling
    /// interval is zero.
    pub async fn monitor(
        &self,
        item_to_monitor: ReadValueId,
        parameters: MonitoringParameters,
        timestamps: TimestampsToReturn,
    ) -> UaResult<MonitoredItem> {
        self.ensure_alive()?;
        parameters.validate()?;

        let id = MonitoredItemId(self.shared.next_item_id.fetch_add(1, Ordering::Relaxed));
        let item = MonitoredItem::start(
            id,
            self.shared.id,
            item_to_monitor,
            parameters,
            timestamps,
            self.shared.client.clone(),
        );

        let inserted = {
            let mut items = self.shared.items.lock();
            if self.is_terminated() {
                false
            } else {
                items.insert(id, item.clone());
                true
            }
        };
        if !inserted {
            item.deactivate().await;
            return Err(self.terminated_error());
        }

        Ok(item)
    }

    /// Stops monitoring an item and emits its `terminated` event.
    pub async fn remove_monitored_item(&self, id: MonitoredItemId) -> UaResult<()> {
        self.ensure_alive()?;
        let item = self
            .shared
            .items
            .lock()
            .remove(&id)
            .ok_or(SubscriptionError::ItemNotFound {
                subscription_id: self.shared.id.0,
                item_id: id.0,
            })?;

        item.deactivate().await;
        retire_item(&self.shared.deliveries, item).await;
        tracing::debug!(subscription_id = %self.shared.id, item_id = %id, "Monitored item removed");
        Ok(())
    }

    /// Enables or disables notification delivery. Sampling continues.
    pub fn set_publishing_enabled(&self, enabled: bool) -> UaResult<()> {
        self.ensure_alive()?;
        let previous = self.shared.publishing_enabled.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            tracing::debug!(subscription_id = %self.shared.id, enabled, "Publishing mode changed");
        }
        Ok(())
    }

    /// Terminates the subscription. Idempotent.
    ///
    /// Returns after the `terminated` event has been delivered.
    pub async fn terminate(&self) -> UaResult<()> {
        self.terminate_with(TerminationReason::Requested).await;
        Ok(())
    }

    pub(crate) async fn terminate_with(&self, reason: TerminationReason) -> bool {
        self.shared.finish(reason).await
    }

    fn ensure_alive(&self) -> UaResult<()> {
        if self.is_terminated() {
            Err(self.terminated_error())
        } else {
            Ok(())
        }
    }

    fn terminated_error(&self) -> UaError {
        SubscriptionError::Terminated {
            subscription_id: self.shared.id.0,
        }
        .into()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("publishing_interval", &self.shared.publishing_interval)
            .field("items", &self.shared.items.lock().len())
            .finish()
    }
}

/// Queues the removed item's `terminated` event behind pending notifications,
/// or emits it directly once the delivery task has exited.
async fn retire_item(deliveries: &mpsc::Sender<Delivery>, item: MonitoredItem) {
    if let Err(mpsc::error::SendError(Delivery::ItemRemoved(item))) =
        deliveries.send(Delivery::ItemRemoved(item)).await
    {
        item.notify_terminated();
    }
}

// =============================================================================
// Tests
// =============================================================================
