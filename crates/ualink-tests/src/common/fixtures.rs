// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Pre-built node ids, endpoints, configurations and parameters so tests
//! share one vocabulary.

use std::time::Duration;

use ualink_client::{
    ClientConfig, ConnectionStrategy, MonitoringParameters, NodeClass, NodeId,
    ReferenceDescription, SubscriptionParameters,
};

use super::mocks::MockServer;

// =============================================================================
// Node Fixtures
// =============================================================================

/// Node ids of the seeded plant address space.
pub struct NodeFixtures;

impl NodeFixtures {
    /// Folder holding the plant variables.
    pub const PLANT: &'static str = "ns=1;s=Plant";
    /// Writable Double, initially 21.5.
    pub const TEMPERATURE: &'static str = "ns=1;s=Temperature";
    /// Writable Double, initially 1.013.
    pub const PRESSURE: &'static str = "ns=1;s=Pressure";
    /// Writable Double, initially 20.0.
    pub const SETPOINT: &'static str = "ns=1;s=Setpoint";
    /// Writable Int32, initially 1.
    pub const LEVEL: &'static str = "ns=1;s=Level";
    /// Read-only String.
    pub const SERIAL_NUMBER: &'static str = "ns=1;s=SerialNumber";
    /// Not present in the address space.
    pub const UNKNOWN: &'static str = "ns=1;s=DoesNotExist";

    /// The standard Objects folder.
    pub fn objects() -> NodeId {
        NodeId::objects_folder()
    }

    /// Variables under [`Self::PLANT`], in browse order.
    pub fn plant_variables() -> [&'static str; 5] {
        [
            Self::TEMPERATURE,
            Self::PRESSURE,
            Self::SETPOINT,
            Self::LEVEL,
            Self::SERIAL_NUMBER,
        ]
    }
}

// =============================================================================
// Endpoint Fixtures
// =============================================================================

/// Endpoint URLs.
pub struct EndpointFixtures;

impl EndpointFixtures {
    /// The endpoint tests connect to.
    pub const LOCAL: &'static str = "opc.tcp://localhost:4840";
    /// An endpoint the server does not serve.
    pub const OTHER: &'static str = "opc.tcp://otherhost:4840";
}

// =============================================================================
// Config Fixtures
// =============================================================================

/// Client configurations.
pub struct ConfigFixtures;

impl ConfigFixtures {
    /// Backoff starting at 100ms, capped at 250ms.
    pub fn strategy(max_retry: u32) -> ConnectionStrategy {
        ConnectionStrategy::new(max_retry, Duration::from_millis(100), Duration::from_millis(250))
    }

    /// Short delays and a 1s request timeout.
    pub fn fast(max_retry: u32) -> ClientConfig {
        ClientConfig::builder()
            .application_name("ualink-tests")
            .request_timeout(Duration::from_secs(1))
            .connection_strategy(Self::strategy(max_retry))
            .build()
            .expect("fixture config is valid")
    }

    /// Like [`Self::fast`] but requires the endpoint to be advertised.
    pub fn strict_endpoint(max_retry: u32) -> ClientConfig {
        ClientConfig {
            endpoint_must_exist: true,
            ..Self::fast(max_retry)
        }
    }
}

// =============================================================================
// Parameter Fixtures
// =============================================================================

/// Subscription and monitoring parameters.
pub struct ParameterFixtures;

impl ParameterFixtures {
    /// Subscription publishing every `interval_ms` with a keepalive count.
    pub fn subscription(interval_ms: u64, keepalive: u32) -> SubscriptionParameters {
        SubscriptionParameters::with_interval(Duration::from_millis(interval_ms))
            .max_keep_alive_count(keepalive)
            .lifetime_count(keepalive * 10)
    }

    /// Monitoring sampling every `sampling_ms`.
    pub fn monitoring(sampling_ms: u64, queue_size: u32, discard_oldest: bool) -> MonitoringParameters {
        MonitoringParameters::with_sampling_interval(Duration::from_millis(sampling_ms))
            .queue_size(queue_size)
            .discard_oldest(discard_oldest)
    }
}

// =============================================================================
// Server Fixtures
// =============================================================================

/// Pre-seeded mock servers.
pub struct ServerFixtures;

impl ServerFixtures {
    /// A server with a small plant: Objects -> Plant -> five variables.
    pub fn plant() -> MockServer {
        let server = MockServer::new();

        server.add_folder(NodeFixtures::objects());
        server.add_folder(NodeFixtures::PLANT);
        server.add_variable(NodeFixtures::TEMPERATURE, 21.5);
        server.add_variable(NodeFixtures::PRESSURE, 1.013);
        server.add_variable(NodeFixtures::SETPOINT, 20.0);
        server.add_variable(NodeFixtures::LEVEL, 1);
        server.add_read_only(NodeFixtures::SERIAL_NUMBER, "SN-0042");

        server.add_reference(
            NodeFixtures::objects(),
            ReferenceDescription::new(NodeFixtures::PLANT, "Plant", NodeClass::Object),
        );
        for node in NodeFixtures::plant_variables() {
            let name = node.trim_start_matches("ns=1;s=");
            server.add_reference(
                NodeFixtures::PLANT,
                ReferenceDescription::new(node, name, NodeClass::Variable),
            );
        }

        server
    }
}
