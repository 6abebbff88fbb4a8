// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Monitored items: sampling, change filtering and the notification queue.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::client::session::ServiceClient;
use crate::events::{EventRegistry, ListenerId, MonitoredItemEvent, MonitoredItemEventKind};
use crate::types::{
    DataValue, MonitoredItemId, MonitoringParameters, ReadValueId, SubscriptionId,
    TimestampsToReturn,
};

// =============================================================================
// NotificationQueue
// =============================================================================

/// Bounded FIFO of pending notifications.
///
/// When full, `discard_oldest` drops the head to make room; otherwise the
/// incoming value is dropped.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    entries: VecDeque<DataValue>,
    capacity: usize,
    discard_oldest: bool,
    overflow_count: u64,
}

impl NotificationQueue {
    /// Creates an empty queue. A capacity of 0 is raised to 1.
    pub fn new(capacity: usize, discard_oldest: bool) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::new(),
            capacity,
            discard_oldest,
            overflow_count: 0,
        }
    }

    /// Appends a value and returns the one discarded on overflow, if any.
    pub fn push(&mut self, value: DataValue) -> Option<DataValue> {
        if self.entries.len() < self.capacity {
            self.entries.push_back(value);
            return None;
        }

        self.overflow_count += 1;
        if self.discard_oldest {
            let dropped = self.entries.pop_front();
            self.entries.push_back(value);
            dropped
        } else {
            Some(value)
        }
    }

    /// Removes the oldest value.
    pub fn pop(&mut self) -> Option<DataValue> {
        self.entries.pop_front()
    }

    /// Removes all values in FIFO order.
    pub fn drain(&mut self) -> Vec<DataValue> {
        self.entries.drain(..).collect()
    }

    /// Returns the queued values without removing them.
    pub fn snapshot(&self) -> Vec<DataValue> {
        self.entries.iter().cloned().collect()
    }

    /// Returns the number of queued values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns how many pushes overflowed.
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count
    }
}

// =============================================================================
// MonitoredItemStats
// =============================================================================

/// Statistics for a monitored item.
#[derive(Debug, Default)]
pub struct MonitoredItemStats {
    samples: AtomicU64,
    notifications: AtomicU64,
    filtered: AtomicU64,
    sample_failures: AtomicU64,
}

impl MonitoredItemStats {
    /// Returns the number of samples taken.
    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    /// Returns the number of samples queued as notifications.
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    /// Returns the number of samples suppressed as unchanged.
    pub fn filtered(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }

    /// Returns the number of failed sampling reads.
    pub fn sample_failures(&self) -> u64 {
        self.sample_failures.load(Ordering::Relaxed)
    }
}

// =============================================================================
// MonitoredItem
// =============================================================================

struct ItemShared {
    id: MonitoredItemId,
    subscription_id: SubscriptionId,
    item_to_monitor: ReadValueId,
    parameters: MonitoringParameters,
    timestamps: TimestampsToReturn,
    queue: Mutex<NotificationQueue>,
    last_reported: Mutex<Option<DataValue>>,
    events: EventRegistry<MonitoredItemEvent>,
    active: AtomicBool,
    sampler: Mutex<Option<JoinHandle<()>>>,
    stats: MonitoredItemStats,
}

/// A data point watched by a subscription.
///
/// Handles are cheap to clone. Listeners registered with
/// [`on_changed`](Self::on_changed) receive each delivered notification once,
/// in queue order.
#[derive(Clone)]
pub struct MonitoredItem {
    shared: Arc<ItemShared>,
}

impl MonitoredItem {
    /// Creates the item and starts its sampler.
    pub(crate) fn start(
        id: MonitoredItemId,
        subscription_id: SubscriptionId,
        item_to_monitor: ReadValueId,
        parameters: MonitoringParameters,
        timestamps: TimestampsToReturn,
        client: ServiceClient,
    ) -> Self {
        let queue = NotificationQueue::new(parameters.queue_size as usize, parameters.discard_oldest);
        let interval = parameters.sampling_interval;
        let shared = Arc::new(ItemShared {
            id,
            subscription_id,
            item_to_monitor,
            parameters,
            timestamps,
            queue: Mutex::new(queue),
            last_reported: Mutex::new(None),
            events: EventRegistry::new(),
            active: AtomicBool::new(true),
            sampler: Mutex::new(None),
            stats: MonitoredItemStats::default(),
        });

        let sampler = tokio::spawn(sample_loop(Arc::downgrade(&shared), client, interval));
        *shared.sampler.lock() = Some(sampler);

        tracing::debug!(
            subscription_id = %subscription_id,
            item_id = %id,
            node_id = %shared.item_to_monitor.node_id,
            sampling_interval = ?interval,
            "Monitored item started"
        );

        Self { shared }
    }

    /// Returns the item id.
    pub fn id(&self) -> MonitoredItemId {
        self.shared.id
    }

    /// Returns the owning subscription id.
    pub fn subscription_id(&self) -> SubscriptionId {
        self.shared.subscription_id
    }

    /// Returns the monitored attribute.
    pub fn item_to_monitor(&self) -> &ReadValueId {
        &self.shared.item_to_monitor
    }

    /// Returns the monitoring parameters.
    pub fn parameters(&self) -> &MonitoringParameters {
        &self.shared.parameters
    }

    /// Returns which timestamps notifications carry.
    pub fn timestamps(&self) -> TimestampsToReturn {
        self.shared.timestamps
    }

    /// Returns `true` while sampling.
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Returns the number of notifications awaiting publish.
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Returns the number of queue overflows.
    pub fn overflow_count(&self) -> u64 {
        self.shared.queue.lock().overflow_count()
    }

    /// Returns the last value that passed the change filter.
    pub fn last_value(&self) -> Option<DataValue> {
        self.shared.last_reported.lock().clone()
    }

    /// Returns the statistics.
    pub fn stats(&self) -> &MonitoredItemStats {
        &self.shared.stats
    }

    /// Returns the event registry.
    pub fn events(&self) -> &EventRegistry<MonitoredItemEvent> {
        &self.shared.events
    }

    /// Registers a `changed` listener.
    pub fn on_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&DataValue) + Send + Sync + 'static,
    {
        self.shared.events.on(MonitoredItemEventKind::Changed, move |event| {
            if let MonitoredItemEvent::Changed(value) = event {
                listener(value);
            }
        })
    }

    /// Registers a `terminated` listener.
    pub fn on_terminated<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared
            .events
            .on(MonitoredItemEventKind::Terminated, move |_| listener())
    }

    /// Removes a listener.
    pub fn off(&self, id: ListenerId) -> bool {
        self.shared.events.off(id)
    }

    // =========================================================================
    // Subscription-facing
    // =========================================================================

    /// Offers a sample; queued only if it passes the change filter.
    pub(crate) fn offer(&self, sample: DataValue) -> bool {
        let shared = &self.shared;
        if !shared.active.load(Ordering::Acquire) {
            return false;
        }
        shared.stats.samples.fetch_add(1, Ordering::Relaxed);

        let mut last = shared.last_reported.lock();
        if let Some(previous) = last.as_ref() {
            if !shared.parameters.deadband.passes(previous, &sample) {
                shared.stats.filtered.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        }

        let notification = sample.filtered(shared.timestamps);
        *last = Some(sample);
        drop(last);

        if let Some(dropped) = shared.queue.lock().push(notification) {
            tracing::debug!(
                item_id = %shared.id,
                dropped = %dropped.value,
                discard_oldest = shared.parameters.discard_oldest,
                "Notification queue overflow"
            );
        }
        shared.stats.notifications.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Takes the oldest queued notification.
    pub(crate) fn take_notification(&self) -> Option<DataValue> {
        self.shared.queue.lock().pop()
    }

    /// Stops sampling and waits for the sampler to finish.
    pub(crate) async fn deactivate(&self) {
        if !self.shared.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let sampler = self.shared.sampler.lock().take();
        if let Some(handle) = sampler {
            handle.abort();
            let _ = handle.await;
        }
        self.shared.queue.lock().drain();
        tracing::debug!(item_id = %self.shared.id, "Monitored item stopped");
    }

    /// Emits `changed` unless the item already terminated.
    pub(crate) fn deliver(&self, value: DataValue) {
        if self.shared.events.has_fired(MonitoredItemEventKind::Terminated) {
            return;
        }
        self.shared.events.emit(&MonitoredItemEvent::Changed(value));
    }

    pub(crate) fn notify_terminated(&self) {
        if !self.shared.events.has_fired(MonitoredItemEventKind::Terminated) {
            self.shared.events.emit(&MonitoredItemEvent::Terminated);
        }
    }
}

impl fmt::Debug for MonitoredItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoredItem")
            .field("id", &self.shared.id)
            .field("node_id", &self.shared.item_to_monitor.node_id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for ItemShared {
    fn drop(&mut self) {
        if let Some(handle) = self.sampler.get_mut().take() {
            handle.abort();
        }
    }
}

async fn sample_loop(item: Weak<ItemShared>, client: ServiceClient, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(shared) = item.upgrade() else { break };
        if !shared.active.load(Ordering::Acquire) {
            break;
        }

        let target = vec![shared.item_to_monitor.clone()];
        match client.read(target, TimestampsToReturn::Both).await {
            Ok(mut results) => {
                if let Some(sample) = results.pop() {
                    MonitoredItem { shared }.offer(sample);
                }
            }
            Err(error) => {
                shared.stats.sample_failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(item_id = %shared.id, error = %error, "Sampling read failed");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn values(queue: &NotificationQueue) -> Vec<i64> {
        queue
            .snapshot()
            .iter()
            .filter_map(|v| v.value.as_i64())
            .collect()
    }

    #[test]
    fn test_discard_oldest_keeps_newest() {
        let mut queue = NotificationQueue::new(2, true);
        assert!(queue.push(DataValue::new(1)).is_none());
        assert!(queue.push(DataValue::new(2)).is_none());
        let dropped = queue.push(DataValue::new(3)).unwrap();

        assert_eq!(dropped.value.as_i64(), Some(1));
        assert_eq!(values(&queue), vec![2, 3]);
        assert_eq!(queue.overflow_count(), 1);
    }

    #[test]
    fn test_discard_newest_keeps_oldest() {
        let mut queue = NotificationQueue::new(2, false);
        queue.push(DataValue::new(1));
        queue.push(DataValue::new(2));
        let dropped = queue.push(DataValue::new(3)).unwrap();

        assert_eq!(dropped.value.as_i64(), Some(3));
        assert_eq!(values(&queue), vec![1, 2]);
    }

    #[test]
    fn test_pop_and_drain_are_fifo() {
        let mut queue = NotificationQueue::new(3, true);
        for i in 1..=3 {
            queue.push(DataValue::new(i));
        }
        assert_eq!(queue.pop().and_then(|v| v.value.as_i64()), Some(1));
        let rest: Vec<_> = queue.drain().iter().filter_map(|v| v.value.as_i64()).collect();
        assert_eq!(rest, vec![2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let queue = NotificationQueue::new(0, true);
        assert_eq!(queue.capacity(), 1);
    }

    #[test]
    fn test_large_capacity_grows_on_demand() {
        let mut queue = NotificationQueue::new(u32::MAX as usize, false);
        assert_eq!(queue.capacity(), u32::MAX as usize);
        for i in 1..=3 {
            assert!(queue.push(DataValue::new(i)).is_none());
        }
        assert_eq!(values(&queue), vec![1, 2, 3]);
        assert_eq!(queue.overflow_count(), 0);
    }
}
