// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Subscription Integration Tests
//!
//! Integration tests for subscriptions and monitored items including:
//!
//! - Publish cycles and notification delivery order
//! - Queue overflow policies
//! - Keepalive and lifetime supervision
//! - Termination ordering and idempotence
//!
//! Tests run on a paused clock, except the slow-listener test which needs
//! real worker threads. Sampling phases are chosen so that no value change
//! lands on the same instant as a publish tick.
//!
//! ## Test Categories
//!
//! - `test_publish_*`: Notification delivery
//! - `test_queue_*`: Overflow policies
//! - `test_keepalive_*` / `test_lifetime_*`: Supervision
//! - `test_terminate_*`: Termination semantics
//! - `test_invalid_*`: Parameter validation

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use ualink_client::{
    Deadband, MonitoredItem, MonitoringParameters, ReadValueId, Session, StatusCode,
    Subscription, SubscriptionError, SubscriptionParameters, SubscriptionState,
    TerminationReason, TimestampsToReturn, UaError, Variant,
};

use ualink_tests::common::{
    advance_to, assert_invalid_parameter, assert_subscription_terminated, ms, DataValueAssertions,
    EventRecorder, NodeFixtures, ParameterFixtures, TestHarness,
};

async fn monitor(
    subscription: &Subscription,
    node: &'static str,
    parameters: MonitoringParameters,
) -> MonitoredItem {
    subscription
        .monitor(ReadValueId::value(node), parameters, TimestampsToReturn::Both)
        .await
        .unwrap()
}

fn record_values(item: &MonitoredItem) -> EventRecorder<Variant> {
    let recorder = EventRecorder::new();
    let sink = recorder.sink();
    item.on_changed(move |value| sink(value.value.clone()));
    recorder
}

/// A shared, labelled event log across several emitters.
#[derive(Clone, Default)]
struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn watch_item(&self, item: &MonitoredItem, label: &'static str) {
        let log = self.clone();
        item.on_changed(move |_| log.push(format!("{}:changed", label)));
        let log = self.clone();
        item.on_terminated(move || log.push(format!("{}:terminated", label)));
    }

    fn watch_subscription(&self, subscription: &Subscription) {
        let log = self.clone();
        subscription.on_terminated(move |reason| log.push(format!("subscription:{}", reason)));
    }
}

async fn subscribe(session: &Session, parameters: SubscriptionParameters) -> (Subscription, Instant) {
    let start = Instant::now();
    let subscription = session.create_subscription(parameters).await.unwrap();
    (subscription, start)
}

// =============================================================================
// Publish Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_publish_started_event_is_latched() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let (subscription, _) = subscribe(&session, ParameterFixtures::subscription(100, 3)).await;

    tokio::time::sleep(ms(10)).await;
    let started = EventRecorder::new();
    let sink = started.sink();
    subscription.on_started(move |interval| sink(interval));

    assert_eq!(started.events(), vec![ms(100)]);
    assert_eq!(subscription.state(), SubscriptionState::Normal);
    assert_eq!(session.subscriptions().len(), 1);
    assert_eq!(harness.server.active_subscriptions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_publish_initial_value_on_first_cycle() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let (subscription, start) = subscribe(&session, ParameterFixtures::subscription(100, 3)).await;
    let item = monitor(
        &subscription,
        NodeFixtures::TEMPERATURE,
        ParameterFixtures::monitoring(30, 1, true),
    )
    .await;
    let values = record_values(&item);

    advance_to(start, 90).await;
    assert!(values.is_empty());
    assert_eq!(item.queued(), 1);

    advance_to(start, 150).await;
    assert_eq!(values.events(), vec![Variant::Double(21.5)]);
    assert_eq!(item.queued(), 0);
    assert_eq!(subscription.stats().notifications(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_publish_delivers_value_changes() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let (subscription, start) = subscribe(&session, ParameterFixtures::subscription(100, 3)).await;
    let item = monitor(
        &subscription,
        NodeFixtures::SETPOINT,
        ParameterFixtures::monitoring(30, 1, true),
    )
    .await;
    let values = record_values(&item);

    advance_to(start, 140).await;
    session.write_value(NodeFixtures::SETPOINT, 25.0).await.unwrap();
    advance_to(start, 250).await;

    assert_eq!(values.events(), vec![Variant::Double(20.0), Variant::Double(25.0)]);
    item.last_value().unwrap().assert_value(25.0);
}

#[tokio::test(start_paused = true)]
async fn test_publish_round_robin_across_items() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let parameters = ParameterFixtures::subscription(100, 10).max_notifications(2);
    let (subscription, start) = subscribe(&session, parameters).await;

    let log = Log::default();
    for (node, label) in [
        (NodeFixtures::TEMPERATURE, "temperature"),
        (NodeFixtures::PRESSURE, "pressure"),
        (NodeFixtures::SETPOINT, "setpoint"),
    ] {
        let item = monitor(&subscription, node, ParameterFixtures::monitoring(30, 1, true)).await;
        log.watch_item(&item, label);
    }

    advance_to(start, 150).await;
    assert_eq!(log.entries(), vec!["temperature:changed", "pressure:changed"]);

    advance_to(start, 250).await;
    assert_eq!(
        log.entries(),
        vec!["temperature:changed", "pressure:changed", "setpoint:changed"]
    );
    assert_eq!(subscription.max_notifications_per_publish(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_publish_disabled_holds_notifications() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let parameters = ParameterFixtures::subscription(100, 3).publishing_enabled(false);
    let (subscription, start) = subscribe(&session, parameters).await;
    let item = monitor(
        &subscription,
        NodeFixtures::TEMPERATURE,
        ParameterFixtures::monitoring(30, 5, true),
    )
    .await;
    let values = record_values(&item);

    advance_to(start, 350).await;
    assert!(values.is_empty());
    assert_eq!(item.queued(), 1);
    assert!(!subscription.is_publishing_enabled());

    subscription.set_publishing_enabled(true).unwrap();
    advance_to(start, 450).await;
    assert_eq!(values.events(), vec![Variant::Double(21.5)]);
}

#[tokio::test(start_paused = true)]
async fn test_publish_filters_timestamps() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let (subscription, start) = subscribe(&session, ParameterFixtures::subscription(100, 3)).await;

    let mut recorders = Vec::new();
    for timestamps in [
        TimestampsToReturn::Source,
        TimestampsToReturn::Server,
        TimestampsToReturn::Neither,
    ] {
        let item = subscription
            .monitor(
                ReadValueId::value(NodeFixtures::PRESSURE),
                ParameterFixtures::monitoring(30, 1, true),
                timestamps,
            )
            .await
            .unwrap();
        let recorder = EventRecorder::new();
        let sink = recorder.sink();
        item.on_changed(move |value| sink(value.clone()));
        recorders.push(recorder);
    }

    advance_to(start, 150).await;

    recorders[0].events()[0].assert_timestamps(true, false);
    recorders[1].events()[0].assert_timestamps(false, true);
    recorders[2].events()[0].assert_timestamps(false, false);
}

#[tokio::test(start_paused = true)]
async fn test_publish_absolute_deadband() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let (subscription, start) = subscribe(&session, ParameterFixtures::subscription(1000, 3)).await;
    let item = monitor(
        &subscription,
        NodeFixtures::TEMPERATURE,
        ParameterFixtures::monitoring(50, 10, true).deadband(Deadband::Absolute { value: 1.0 }),
    )
    .await;
    let values = record_values(&item);

    advance_to(start, 75).await;
    harness.server.set_value(NodeFixtures::TEMPERATURE, 22.0);
    advance_to(start, 175).await;
    harness.server.set_value(NodeFixtures::TEMPERATURE, 23.0);
    advance_to(start, 1050).await;

    assert_eq!(values.events(), vec![Variant::Double(21.5), Variant::Double(23.0)]);
    assert!(item.stats().filtered() > 0);
}

#[tokio::test(start_paused = true)]
async fn test_publish_status_change_is_reported() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let (subscription, start) = subscribe(&session, ParameterFixtures::subscription(100, 3)).await;
    let item = monitor(
        &subscription,
        NodeFixtures::LEVEL,
        ParameterFixtures::monitoring(30, 1, true),
    )
    .await;
    let statuses = EventRecorder::new();
    let sink = statuses.sink();
    item.on_changed(move |value| sink(value.status));

    advance_to(start, 140).await;
    harness
        .server
        .set_status(NodeFixtures::LEVEL, StatusCode::UNCERTAIN_LAST_USABLE_VALUE);
    advance_to(start, 250).await;

    assert_eq!(
        statuses.events(),
        vec![StatusCode::GOOD, StatusCode::UNCERTAIN_LAST_USABLE_VALUE]
    );
}

#[tokio::test(start_paused = true)]
async fn test_publish_survives_reconnect() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let (subscription, start) = subscribe(&session, ParameterFixtures::subscription(100, 3)).await;
    let item = monitor(
        &subscription,
        NodeFixtures::SETPOINT,
        ParameterFixtures::monitoring(30, 1, true),
    )
    .await;
    let values = record_values(&item);

    advance_to(start, 150).await;
    harness.server.drop_links();
    advance_to(start, 200).await;
    assert!(harness.channel().is_connected());
    harness.server.set_value(NodeFixtures::SETPOINT, 18.5);

    advance_to(start, 350).await;
    assert_eq!(values.events(), vec![Variant::Double(20.0), Variant::Double(18.5)]);
    assert!(!subscription.is_terminated());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_publish_slow_listener_does_not_stall_other_subscriptions() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let slow = session
        .create_subscription(ParameterFixtures::subscription(50, 3))
        .await
        .unwrap();
    let fast = session
        .create_subscription(ParameterFixtures::subscription(50, 3))
        .await
        .unwrap();

    // The first notification parks the slow subscription's delivery task
    // until `release` is dropped.
    let (release, parked) = std::sync::mpsc::channel::<()>();
    let parked = Mutex::new(parked);
    let (entered_tx, mut entered) = mpsc::unbounded_channel();
    let blocked = monitor(
        &slow,
        NodeFixtures::TEMPERATURE,
        ParameterFixtures::monitoring(20, 1, true),
    )
    .await;
    blocked.on_changed(move |_| {
        let _ = entered_tx.send(());
        let _ = parked.lock().recv();
    });

    let (values_tx, mut values) = mpsc::unbounded_channel();
    let item = monitor(
        &fast,
        NodeFixtures::PRESSURE,
        ParameterFixtures::monitoring(20, 1, true),
    )
    .await;
    item.on_changed(move |value| {
        let _ = values_tx.send(value.value.clone());
    });

    let wait = Duration::from_secs(2);
    let entered = timeout(wait, entered.recv()).await;
    harness.server.set_value(NodeFixtures::PRESSURE, 2.5);
    let delivered = timeout(wait, async {
        while let Some(value) = values.recv().await {
            if value == Variant::Double(2.5) {
                return true;
            }
        }
        false
    })
    .await;
    drop(release);

    assert_eq!(entered, Ok(Some(())));
    assert_eq!(delivered, Ok(true));
    assert!(!slow.is_terminated());
    assert!(!fast.is_terminated());
}

// =============================================================================
// Queue Tests
// =============================================================================

async fn overflow_scenario(discard_oldest: bool) -> (MonitoredItem, Vec<Variant>) {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let (subscription, start) = subscribe(&session, ParameterFixtures::subscription(1000, 3)).await;
    let item = monitor(
        &subscription,
        NodeFixtures::LEVEL,
        ParameterFixtures::monitoring(100, 2, discard_oldest),
    )
    .await;
    let values = record_values(&item);

    // Samples at 0, 100 and 200ms see 1, 2 and 3.
    advance_to(start, 50).await;
    harness.server.set_value(NodeFixtures::LEVEL, 2);
    advance_to(start, 150).await;
    harness.server.set_value(NodeFixtures::LEVEL, 3);

    advance_to(start, 950).await;
    assert!(values.is_empty());
    assert_eq!(item.queued(), 2);

    advance_to(start, 1050).await;
    (item, values.events())
}

#[tokio::test(start_paused = true)]
async fn test_queue_discard_oldest() {
    let (item, delivered) = overflow_scenario(true).await;

    assert_eq!(delivered, vec![Variant::Int32(2), Variant::Int32(3)]);
    assert_eq!(item.overflow_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_queue_discard_newest() {
    let (item, delivered) = overflow_scenario(false).await;

    assert_eq!(delivered, vec![Variant::Int32(1), Variant::Int32(2)]);
    assert_eq!(item.overflow_count(), 1);
    item.last_value().unwrap().assert_value(3);
}

#[tokio::test(start_paused = true)]
async fn test_queue_maximum_size_is_accepted() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let (subscription, start) = subscribe(&session, ParameterFixtures::subscription(100, 3)).await;
    let item = monitor(
        &subscription,
        NodeFixtures::TEMPERATURE,
        ParameterFixtures::monitoring(30, u32::MAX, true),
    )
    .await;
    let values = record_values(&item);

    advance_to(start, 150).await;

    assert_eq!(item.parameters().queue_size, u32::MAX);
    assert_eq!(values.events(), vec![Variant::Double(21.5)]);
    assert_eq!(item.overflow_count(), 0);
}

// =============================================================================
// Keepalive / Lifetime Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_keepalive_after_idle_intervals() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let (subscription, start) = subscribe(&session, ParameterFixtures::subscription(100, 3)).await;
    let item = monitor(
        &subscription,
        NodeFixtures::TEMPERATURE,
        ParameterFixtures::monitoring(25, 1, true),
    )
    .await;
    let values = record_values(&item);
    let keepalives = EventRecorder::new();
    let sink = keepalives.sink();
    subscription.on_keepalive(move |sequence_number| sink(sequence_number));

    // Data at 100ms, then empty cycles at 200, 300 and 400ms.
    advance_to(start, 350).await;
    assert!(keepalives.is_empty());

    advance_to(start, 420).await;
    assert_eq!(keepalives.len(), 1);
    assert_eq!(subscription.state(), SubscriptionState::KeepAlivePending);

    // Sampled at 450ms, published at 500ms.
    advance_to(start, 430).await;
    harness.server.set_value(NodeFixtures::TEMPERATURE, 30.0);
    advance_to(start, 550).await;
    assert_eq!(values.len(), 2);
    assert_eq!(keepalives.len(), 1);
    assert_eq!(subscription.state(), SubscriptionState::Normal);

    advance_to(start, 850).await;
    assert_eq!(keepalives.events(), vec![1, 2]);
    assert_eq!(subscription.stats().keepalives(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_keeps_idle_subscription_alive() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let parameters = ParameterFixtures::subscription(100, 2).lifetime_count(6);
    let (subscription, start) = subscribe(&session, parameters).await;

    advance_to(start, 2050).await;

    assert!(!subscription.is_terminated());
    assert_eq!(subscription.stats().keepalives(), 10);
    assert_eq!(subscription.stats().keepalive_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_lifetime_expires_without_acknowledged_keepalives() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let parameters = ParameterFixtures::subscription(100, 2).lifetime_count(4);
    let (subscription, start) = subscribe(&session, parameters).await;
    assert_eq!(subscription.lifetime_count(), 6);

    let reasons = EventRecorder::new();
    let sink = reasons.sink();
    subscription.on_terminated(move |reason| sink(reason));
    harness.server.drop_subscription(subscription.id());

    // Keepalives fail at 200, 400 and 600ms; the sixth empty cycle expires.
    advance_to(start, 550).await;
    assert!(!subscription.is_terminated());

    advance_to(start, 650).await;
    assert_eq!(reasons.events(), vec![TerminationReason::Expired]);
    assert_eq!(subscription.state(), SubscriptionState::Terminated);
    assert_eq!(subscription.stats().keepalive_failures(), 3);
    assert!(session.subscriptions().is_empty());
    assert_eq!(harness.server.request_count("DeleteSubscription"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_lifetime_is_raised_above_three_keepalives() {
    let harness = TestHarness::new();
    harness.server.set_echo_lifetime(true);
    let session = harness.session().await;
    let parameters = ParameterFixtures::subscription(100, 2).lifetime_count(4);
    let (subscription, start) = subscribe(&session, parameters).await;
    assert_eq!(subscription.lifetime_count(), 6);
    assert_eq!(subscription.max_keep_alive_count(), 2);

    harness.server.drop_subscription(subscription.id());

    // An unclamped lifetime of 4 would expire at 400ms.
    advance_to(start, 550).await;
    assert!(!subscription.is_terminated());

    advance_to(start, 650).await;
    assert_eq!(subscription.state(), SubscriptionState::Terminated);
}

// =============================================================================
// Terminate Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_terminate_event_is_last() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let (subscription, start) = subscribe(&session, ParameterFixtures::subscription(100, 10)).await;

    let log = Log::default();
    let mut items = Vec::new();
    for (node, label) in [
        (NodeFixtures::TEMPERATURE, "temperature"),
        (NodeFixtures::PRESSURE, "pressure"),
    ] {
        let item = monitor(&subscription, node, ParameterFixtures::monitoring(30, 1, true)).await;
        log.watch_item(&item, label);
        items.push(item);
    }
    log.watch_subscription(&subscription);

    advance_to(start, 150).await;
    subscription.terminate().await.unwrap();

    let expected = vec![
        "temperature:changed",
        "pressure:changed",
        "temperature:terminated",
        "pressure:terminated",
        "subscription:requested",
    ];
    assert_eq!(log.entries(), expected);
    assert!(items.iter().all(|item| !item.is_active()));
    assert!(subscription.monitored_items().is_empty());

    // Sampling stopped and nothing else is delivered.
    let reads = harness.server.read_count(NodeFixtures::TEMPERATURE);
    harness.server.set_value(NodeFixtures::TEMPERATURE, 99.0);
    advance_to(start, 1150).await;
    assert_eq!(harness.server.read_count(NodeFixtures::TEMPERATURE), reads);
    assert_eq!(log.entries(), expected);

    assert_eq!(harness.server.deleted_subscriptions(), vec![subscription.id()]);
    assert!(session.subscriptions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_terminate_is_idempotent() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let (subscription, _) = subscribe(&session, ParameterFixtures::subscription(100, 3)).await;
    let reasons = EventRecorder::new();
    let sink = reasons.sink();
    subscription.on_terminated(move |reason| sink(reason));

    subscription.terminate().await.unwrap();
    subscription.terminate().await.unwrap();

    assert_eq!(reasons.events(), vec![TerminationReason::Requested]);
    assert_eq!(harness.server.request_count("DeleteSubscription"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_terminate_late_listener_is_invoked() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let (subscription, _) = subscribe(&session, ParameterFixtures::subscription(100, 3)).await;
    subscription.terminate().await.unwrap();

    let reasons = EventRecorder::new();
    let sink = reasons.sink();
    subscription.on_terminated(move |reason| sink(reason));

    assert_eq!(reasons.events(), vec![TerminationReason::Requested]);
}

#[tokio::test(start_paused = true)]
async fn test_terminate_on_session_close() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let reasons = EventRecorder::new();
    for interval in [100, 250] {
        let (subscription, _) =
            subscribe(&session, ParameterFixtures::subscription(interval, 3)).await;
        let sink = reasons.sink();
        subscription.on_terminated(move |reason| sink(reason));
    }

    session.close().await.unwrap();

    assert_eq!(
        reasons.events(),
        vec![TerminationReason::SessionClosed, TerminationReason::SessionClosed]
    );
    assert!(session.subscriptions().is_empty());
    assert_eq!(harness.server.request_count("DeleteSubscription"), 0);
    assert_eq!(harness.server.request_count("CloseSession"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_terminate_on_disconnect() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let (subscription, _) = subscribe(&session, ParameterFixtures::subscription(100, 3)).await;
    let item = monitor(
        &subscription,
        NodeFixtures::PRESSURE,
        ParameterFixtures::monitoring(30, 1, true),
    )
    .await;

    harness.client.disconnect().await.unwrap();

    assert_eq!(subscription.state(), SubscriptionState::Terminated);
    assert!(!item.is_active());
    assert!(!session.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_terminate_rejects_further_operations() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let (subscription, _) = subscribe(&session, ParameterFixtures::subscription(100, 3)).await;
    let item = monitor(
        &subscription,
        NodeFixtures::PRESSURE,
        ParameterFixtures::monitoring(30, 1, true),
    )
    .await;
    subscription.terminate().await.unwrap();

    let error = subscription
        .monitor(
            ReadValueId::value(NodeFixtures::TEMPERATURE),
            ParameterFixtures::monitoring(30, 1, true),
            TimestampsToReturn::Both,
        )
        .await
        .unwrap_err();
    assert_subscription_terminated(&error);
    assert_subscription_terminated(&subscription.set_publishing_enabled(false).unwrap_err());
    assert_subscription_terminated(
        &subscription
            .remove_monitored_item(item.id())
            .await
            .unwrap_err(),
    );
}

#[tokio::test(start_paused = true)]
async fn test_remove_monitored_item() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let (subscription, start) = subscribe(&session, ParameterFixtures::subscription(100, 3)).await;
    let item = monitor(
        &subscription,
        NodeFixtures::TEMPERATURE,
        ParameterFixtures::monitoring(30, 1, true),
    )
    .await;
    let terminated = EventRecorder::new();
    let sink = terminated.sink();
    item.on_terminated(move || sink(()));

    advance_to(start, 150).await;
    subscription.remove_monitored_item(item.id()).await.unwrap();
    advance_to(start, 160).await;

    assert_eq!(terminated.len(), 1);
    assert!(!item.is_active());
    assert!(subscription.monitored_items().is_empty());
    assert!(!subscription.is_terminated());

    let reads = harness.server.read_count(NodeFixtures::TEMPERATURE);
    advance_to(start, 500).await;
    assert_eq!(harness.server.read_count(NodeFixtures::TEMPERATURE), reads);

    let error = subscription
        .remove_monitored_item(item.id())
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        UaError::Subscription(SubscriptionError::ItemNotFound { .. })
    ));
}

// =============================================================================
// Validation Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_invalid_subscription_parameters() {
    let harness = TestHarness::new();
    let session = harness.session().await;

    let cases = [
        (
            SubscriptionParameters::with_interval(ms(0)),
            "requested_publishing_interval",
        ),
        (
            ParameterFixtures::subscription(100, 0),
            "requested_max_keep_alive_count",
        ),
        (
            ParameterFixtures::subscription(100, 3).lifetime_count(0),
            "requested_lifetime_count",
        ),
    ];
    for (parameters, field) in cases {
        let error = session.create_subscription(parameters).await.unwrap_err();
        assert_invalid_parameter(&error, field);
    }
    assert_eq!(harness.server.request_count("CreateSubscription"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_monitoring_parameters() {
    let harness = TestHarness::new();
    let session = harness.session().await;
    let (subscription, _) = subscribe(&session, ParameterFixtures::subscription(100, 3)).await;

    let cases = [
        (ParameterFixtures::monitoring(30, 0, true), "queue_size"),
        (ParameterFixtures::monitoring(0, 1, true), "sampling_interval"),
        (
            ParameterFixtures::monitoring(30, 1, true).deadband(Deadband::Absolute { value: -1.0 }),
            "deadband",
        ),
    ];
    for (parameters, field) in cases {
        let error = subscription
            .monitor(
                ReadValueId::value(NodeFixtures::TEMPERATURE),
                parameters,
                TimestampsToReturn::Both,
            )
            .await
            .unwrap_err();
        assert_invalid_parameter(&error, field);
    }
    assert!(subscription.monitored_items().is_empty());
}
