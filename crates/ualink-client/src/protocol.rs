// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Service messages exchanged over a channel link.
//!
//! Requests and responses travel as typed envelopes. The correlation id is
//! allocated by the channel; a [`Connector`](crate::client::Connector)
//! implementation decides how envelopes reach the server.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{
    AttributeId, DataValue, NodeId, ReadValueId, ReferenceDescription, StatusCode,
    SubscriptionId, SubscriptionParameters, TimestampsToReturn, Variant,
};

// =============================================================================
// Identifiers
// =============================================================================

/// Locally generated request correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u32);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Server-assigned session authentication token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(pub String);

impl fmt::Display for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Envelopes
// =============================================================================

/// A request on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Correlation id, echoed by the response.
    pub request_id: RequestId,
    /// Session token, absent for session-less services.
    pub auth_token: Option<AuthToken>,
    /// Service payload.
    pub body: ServiceRequest,
}

/// A response on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Id of the request being answered.
    pub request_id: RequestId,
    /// Service payload.
    pub body: ServiceResponse,
}

impl ResponseEnvelope {
    /// Creates a response for `request_id`.
    pub fn new(request_id: RequestId, body: ServiceResponse) -> Self {
        Self { request_id, body }
    }
}

// =============================================================================
// Service Requests
// =============================================================================

/// Endpoint advertised by a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescription {
    /// Endpoint URL.
    pub endpoint_url: String,
    /// Security policy URI.
    pub security_policy_uri: String,
}

impl EndpointDescription {
    /// Creates an unsecured endpoint description.
    pub fn unsecured(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            security_policy_uri: "http://opcfoundation.org/UA/SecurityPolicy#None".to_string(),
        }
    }
}

/// Service requests issued by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "service", rename_all = "snake_case")]
pub enum ServiceRequest {
    /// Lists the server's endpoints.
    GetEndpoints {
        /// URL the client connected to.
        endpoint_url: String,
    },
    /// Creates and activates a session.
    CreateSession {
        /// Client session name.
        session_name: String,
        /// Client application name.
        application_name: String,
        /// Requested session timeout.
        requested_timeout: Duration,
    },
    /// Closes the session.
    CloseSession {
        /// Delete the session's subscriptions server-side.
        delete_subscriptions: bool,
    },
    /// Lists references of a node.
    Browse {
        /// Starting node.
        node_id: NodeId,
    },
    /// Reads attributes.
    Read {
        /// Attributes to read.
        nodes: Vec<ReadValueId>,
        /// Timestamps to return.
        timestamps: TimestampsToReturn,
    },
    /// Writes one attribute.
    Write {
        /// Target node.
        node_id: NodeId,
        /// Target attribute.
        attribute_id: AttributeId,
        /// Value to write.
        value: Variant,
    },
    /// Creates a subscription.
    CreateSubscription {
        /// Requested parameters.
        parameters: SubscriptionParameters,
    },
    /// Deletes a subscription.
    DeleteSubscription {
        /// Subscription to delete.
        subscription_id: SubscriptionId,
    },
    /// Keepalive publish for a subscription.
    Publish {
        /// Subscription id.
        subscription_id: SubscriptionId,
    },
}

impl ServiceRequest {
    /// Returns the service name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetEndpoints { .. } => "GetEndpoints",
            Self::CreateSession { .. } => "CreateSession",
            Self::CloseSession { .. } => "CloseSession",
            Self::Browse { .. } => "Browse",
            Self::Read { .. } => "Read",
            Self::Write { .. } => "Write",
            Self::CreateSubscription { .. } => "CreateSubscription",
            Self::DeleteSubscription { .. } => "DeleteSubscription",
            Self::Publish { .. } => "Publish",
        }
    }
}

// =============================================================================
// Service Responses
// =============================================================================

/// Service responses returned by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "service", rename_all = "snake_case")]
pub enum ServiceResponse {
    /// Advertised endpoints.
    GetEndpoints {
        /// Endpoint descriptions.
        endpoints: Vec<EndpointDescription>,
    },
    /// Session created and activated.
    CreateSession {
        /// Server-assigned session id.
        session_id: String,
        /// Token to attach to later requests.
        auth_token: AuthToken,
        /// Revised session timeout.
        revised_timeout: Duration,
    },
    /// Session closed.
    CloseSession,
    /// Browse result.
    Browse {
        /// References in server order.
        references: Vec<ReferenceDescription>,
    },
    /// Read results, one per requested attribute.
    Read {
        /// Values in request order.
        results: Vec<DataValue>,
    },
    /// Write result.
    Write {
        /// Operation status.
        status: StatusCode,
    },
    /// Subscription created.
    CreateSubscription {
        /// Server-assigned id.
        subscription_id: SubscriptionId,
        /// Revised publishing interval.
        revised_publishing_interval: Duration,
        /// Revised lifetime count.
        revised_lifetime_count: u32,
        /// Revised keepalive count.
        revised_max_keep_alive_count: u32,
    },
    /// Subscription deleted.
    DeleteSubscription {
        /// Operation status.
        status: StatusCode,
    },
    /// Keepalive acknowledged.
    Publish {
        /// Subscription id.
        subscription_id: SubscriptionId,
        /// Sequence number of the acknowledged message.
        sequence_number: u32,
    },
    /// The service failed as a whole.
    ServiceFault {
        /// Failure status.
        status: StatusCode,
    },
}

impl ServiceResponse {
    /// Returns the service name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetEndpoints { .. } => "GetEndpoints",
            Self::CreateSession { .. } => "CreateSession",
            Self::CloseSession => "CloseSession",
            Self::Browse { .. } => "Browse",
            Self::Read { .. } => "Read",
            Self::Write { .. } => "Write",
            Self::CreateSubscription { .. } => "CreateSubscription",
            Self::DeleteSubscription { .. } => "DeleteSubscription",
            Self::Publish { .. } => "Publish",
            Self::ServiceFault { .. } => "ServiceFault",
        }
    }

    /// Creates a service fault.
    pub fn fault(status: StatusCode) -> Self {
        Self::ServiceFault { status }
    }
}
