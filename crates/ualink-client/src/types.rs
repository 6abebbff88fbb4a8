// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Value and parameter types shared by every client layer.
//!
//! - **NodeId**: opaque node reference (`ns=1;s=Temperature`)
//! - **StatusCode**: 32-bit status with Good/Uncertain/Bad severity
//! - **Variant**: closed set of value kinds carried by reads and writes
//! - **DataValue**: value + status + timestamps, immutable once produced
//! - **SubscriptionParameters / MonitoringParameters**: requested settings
//!
//! # Examples
//!
//! ```
//! use ualink_client::types::{DataValue, NodeId, StatusCode, Variant};
//!
//! let node = NodeId::new("ns=1;s=Temperature");
//! let value = DataValue::new(Variant::Double(21.5));
//!
//! assert_eq!(node.as_str(), "ns=1;s=Temperature");
//! assert!(value.status.is_good());
//! assert_eq!(StatusCode::BAD_NODE_ID_UNKNOWN.name(), "BadNodeIdUnknown");
//! ```

use std::fmt;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SessionError, UaResult};

// =============================================================================
// NodeId
// =============================================================================

/// Node reference of the form `ns=<index>;<kind>=<value>`.
///
/// The client treats it as an opaque key and passes it through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node reference.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The standard Objects folder (`ns=0;i=85`).
    pub fn objects_folder() -> Self {
        Self::new("ns=0;i=85")
    }

    /// Returns the identifier string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// =============================================================================
// Identifiers
// =============================================================================

/// Server-assigned subscription identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u32);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Monitored item identifier, unique within its subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonitoredItemId(pub u32);

impl fmt::Display for MonitoredItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mi-{}", self.0)
    }
}

// =============================================================================
// AttributeId
// =============================================================================

/// Node attribute identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttributeId {
    /// Node ID attribute.
    NodeId,
    /// Node class attribute.
    NodeClass,
    /// Browse name attribute.
    BrowseName,
    /// Display name attribute.
    DisplayName,
    /// Description attribute.
    Description,
    /// Value attribute.
    #[default]
    Value,
    /// Data type attribute.
    DataType,
    /// Access level attribute.
    AccessLevel,
    /// User access level attribute.
    UserAccessLevel,
    /// Minimum sampling interval attribute.
    MinimumSamplingInterval,
}

impl AttributeId {
    /// Returns the numeric attribute id.
    pub const fn value(&self) -> u32 {
        match self {
            Self::NodeId => 1,
            Self::NodeClass => 2,
            Self::BrowseName => 3,
            Self::DisplayName => 4,
            Self::Description => 5,
            Self::Value => 13,
            Self::DataType => 14,
            Self::AccessLevel => 17,
            Self::UserAccessLevel => 18,
            Self::MinimumSamplingInterval => 19,
        }
    }
}

// =============================================================================
// StatusCode
// =============================================================================

/// Operation status code.
///
/// The top two bits carry the severity: `00` Good, `01` Uncertain, `10` Bad.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Good.
    pub const GOOD: Self = Self(0x0000_0000);
    /// Uncertain.
    pub const UNCERTAIN: Self = Self(0x4000_0000);
    /// Bad.
    pub const BAD: Self = Self(0x8000_0000);
    /// Unexpected error.
    pub const BAD_UNEXPECTED_ERROR: Self = Self(0x8001_0000);
    /// Internal error.
    pub const BAD_INTERNAL_ERROR: Self = Self(0x8002_0000);
    /// Communication error.
    pub const BAD_COMMUNICATION_ERROR: Self = Self(0x8005_0000);
    /// Timeout.
    pub const BAD_TIMEOUT: Self = Self(0x800A_0000);
    /// Service unsupported.
    pub const BAD_SERVICE_UNSUPPORTED: Self = Self(0x800B_0000);
    /// Server shutting down.
    pub const BAD_SHUTDOWN: Self = Self(0x800C_0000);
    /// Nothing to do.
    pub const BAD_NOTHING_TO_DO: Self = Self(0x800F_0000);
    /// Session id invalid.
    pub const BAD_SESSION_ID_INVALID: Self = Self(0x8025_0000);
    /// Session closed.
    pub const BAD_SESSION_CLOSED: Self = Self(0x8026_0000);
    /// Subscription id invalid.
    pub const BAD_SUBSCRIPTION_ID_INVALID: Self = Self(0x8028_0000);
    /// Waiting for initial data.
    pub const BAD_WAITING_FOR_INITIAL_DATA: Self = Self(0x8032_0000);
    /// Node id invalid.
    pub const BAD_NODE_ID_INVALID: Self = Self(0x8033_0000);
    /// Node id unknown.
    pub const BAD_NODE_ID_UNKNOWN: Self = Self(0x8034_0000);
    /// Attribute id invalid.
    pub const BAD_ATTRIBUTE_ID_INVALID: Self = Self(0x8035_0000);
    /// Not readable.
    pub const BAD_NOT_READABLE: Self = Self(0x803A_0000);
    /// Not writable.
    pub const BAD_NOT_WRITABLE: Self = Self(0x803B_0000);
    /// Out of range.
    pub const BAD_OUT_OF_RANGE: Self = Self(0x803C_0000);
    /// Too many sessions.
    pub const BAD_TOO_MANY_SESSIONS: Self = Self(0x8056_0000);
    /// Type mismatch.
    pub const BAD_TYPE_MISMATCH: Self = Self(0x8074_0000);
    /// Last usable value.
    pub const UNCERTAIN_LAST_USABLE_VALUE: Self = Self(0x4090_0000);
    /// Initial value.
    pub const UNCERTAIN_INITIAL_VALUE: Self = Self(0x4092_0000);

    const SEVERITY_MASK: u32 = 0xC000_0000;

    /// Returns the raw code.
    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns `true` if the severity is Good.
    #[inline]
    pub const fn is_good(&self) -> bool {
        self.0 & Self::SEVERITY_MASK == 0
    }

    /// Returns `true` if the severity is Uncertain.
    #[inline]
    pub const fn is_uncertain(&self) -> bool {
        self.0 & Self::SEVERITY_MASK == 0x4000_0000
    }

    /// Returns `true` if the severity is Bad.
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns the symbolic name, or the severity name for unknown codes.
    pub fn name(&self) -> &'static str {
        match self.0 & 0xFFFF_0000 {
            0x0000_0000 => "Good",
            0x4000_0000 => "Uncertain",
            0x8000_0000 => "Bad",
            0x8001_0000 => "BadUnexpectedError",
            0x8002_0000 => "BadInternalError",
            0x8005_0000 => "BadCommunicationError",
            0x800A_0000 => "BadTimeout",
            0x800B_0000 => "BadServiceUnsupported",
            0x800C_0000 => "BadShutdown",
            0x800F_0000 => "BadNothingToDo",
            0x8025_0000 => "BadSessionIdInvalid",
            0x8026_0000 => "BadSessionClosed",
            0x8028_0000 => "BadSubscriptionIdInvalid",
            0x8032_0000 => "BadWaitingForInitialData",
            0x8033_0000 => "BadNodeIdInvalid",
            0x8034_0000 => "BadNodeIdUnknown",
            0x8035_0000 => "BadAttributeIdInvalid",
            0x803A_0000 => "BadNotReadable",
            0x803B_0000 => "BadNotWritable",
            0x803C_0000 => "BadOutOfRange",
            0x8056_0000 => "BadTooManySessions",
            0x8074_0000 => "BadTypeMismatch",
            0x4090_0000 => "UncertainLastUsableValue",
            0x4092_0000 => "UncertainInitialValue",
            _ if self.is_good() => "Good",
            _ if self.is_uncertain() => "Uncertain",
            _ => "Bad",
        }
    }
}

impl fmt::Debug for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusCode({} 0x{:08X})", self.name(), self.0)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

// =============================================================================
// Variant
// =============================================================================

/// Closed set of value kinds carried by reads, writes and notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Variant {
    /// No value.
    #[default]
    Empty,
    /// Boolean value.
    Boolean(bool),
    /// Signed 8-bit integer.
    SByte(i8),
    /// Unsigned 8-bit integer.
    Byte(u8),
    /// Signed 16-bit integer.
    Int16(i16),
    /// Unsigned 16-bit integer.
    UInt16(u16),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 64-bit integer.
    UInt64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Timestamp.
    DateTime(DateTime<Utc>),
    /// Raw bytes.
    ByteString(Vec<u8>),
    /// Homogeneous array.
    Array(Vec<Variant>),
}

impl Variant {
    /// Returns the data type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Empty => "Null",
            Self::Boolean(_) => "Boolean",
            Self::SByte(_) => "SByte",
            Self::Byte(_) => "Byte",
            Self::Int16(_) => "Int16",
            Self::UInt16(_) => "UInt16",
            Self::Int32(_) => "Int32",
            Self::UInt32(_) => "UInt32",
            Self::Int64(_) => "Int64",
            Self::UInt64(_) => "UInt64",
            Self::Float(_) => "Float",
            Self::Double(_) => "Double",
            Self::String(_) => "String",
            Self::DateTime(_) => "DateTime",
            Self::ByteString(_) => "ByteString",
            Self::Array(_) => "Array",
        }
    }

    /// Returns `true` if this is the empty variant.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns `true` for integer and floating point kinds.
    pub fn is_numeric(&self) -> bool {
        self.as_f64().is_some()
    }

    /// Attempts to read the value as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::SByte(v) => Some(*v as f64),
            Self::Byte(v) => Some(*v as f64),
            Self::Int16(v) => Some(*v as f64),
            Self::UInt16(v) => Some(*v as f64),
            Self::Int32(v) => Some(*v as f64),
            Self::UInt32(v) => Some(*v as f64),
            Self::Int64(v) => Some(*v as f64),
            Self::UInt64(v) => Some(*v as f64),
            Self::Float(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Attempts to read the value as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::SByte(v) => Some(*v as i64),
            Self::Byte(v) => Some(*v as i64),
            Self::Int16(v) => Some(*v as i64),
            Self::UInt16(v) => Some(*v as i64),
            Self::Int32(v) => Some(*v as i64),
            Self::UInt32(v) => Some(*v as i64),
            Self::Int64(v) => Some(*v),
            Self::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Attempts to read the value as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Attempts to read the value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "null"),
            Self::Boolean(v) => write!(f, "{}", v),
            Self::SByte(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::UInt16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "\"{}\"", v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::ByteString(v) => write!(f, "b64:{}", BASE64.encode(v)),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

// =============================================================================
// TimestampsToReturn
// =============================================================================

/// Which timestamps a read or notification carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimestampsToReturn {
    /// Source timestamp only.
    Source,
    /// Server timestamp only.
    Server,
    /// Both timestamps.
    #[default]
    Both,
    /// No timestamps.
    Neither,
}

impl TimestampsToReturn {
    /// Returns `true` if the source timestamp is kept.
    pub const fn includes_source(&self) -> bool {
        matches!(self, Self::Source | Self::Both)
    }

    /// Returns `true` if the server timestamp is kept.
    pub const fn includes_server(&self) -> bool {
        matches!(self, Self::Server | Self::Both)
    }
}

// =============================================================================
// DataValue
// =============================================================================

/// A value with its status and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DataValue {
    /// The value.
    pub value: Variant,
    /// Status of the value.
    pub status: StatusCode,
    /// Time the value was produced at the source.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Time the server observed the value.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// Creates a Good value without timestamps.
    pub fn new(value: impl Into<Variant>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    /// Creates an empty value carrying a status.
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Sets the status.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Sets the source timestamp.
    pub fn with_source_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.source_timestamp = Some(timestamp);
        self
    }

    /// Sets the server timestamp.
    pub fn with_server_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.server_timestamp = Some(timestamp);
        self
    }

    /// Returns `true` if the status is Good.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status.is_good()
    }

    /// Returns a copy with timestamps stripped per `timestamps`.
    pub fn filtered(&self, timestamps: TimestampsToReturn) -> Self {
        Self {
            value: self.value.clone(),
            status: self.status,
            source_timestamp: self.source_timestamp.filter(|_| timestamps.includes_source()),
            server_timestamp: self.server_timestamp.filter(|_| timestamps.includes_server()),
        }
    }

    /// Compares value and status, ignoring timestamps.
    pub fn same_sample(&self, other: &Self) -> bool {
        self.status == other.status && self.value == other.value
    }
}

// =============================================================================
// Browse Types
// =============================================================================

/// Node class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    /// Unknown class.
    #[default]
    Unspecified,
    /// Object node.
    Object,
    /// Variable node.
    Variable,
    /// Method node.
    Method,
    /// Object type node.
    ObjectType,
    /// Variable type node.
    VariableType,
    /// Reference type node.
    ReferenceType,
    /// Data type node.
    DataType,
    /// View node.
    View,
}

impl NodeClass {
    /// Returns the bit mask value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::Unspecified => 0,
            Self::Object => 1,
            Self::Variable => 2,
            Self::Method => 4,
            Self::ObjectType => 8,
            Self::VariableType => 16,
            Self::ReferenceType => 32,
            Self::DataType => 64,
            Self::View => 128,
        }
    }
}

/// A reference returned by browse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDescription {
    /// Target node.
    pub node_id: NodeId,
    /// Qualified browse name.
    pub browse_name: String,
    /// Localized display name.
    pub display_name: String,
    /// Class of the target node.
    pub node_class: NodeClass,
    /// `true` for forward references.
    pub is_forward: bool,
}

impl ReferenceDescription {
    /// Creates a forward reference whose display name equals its browse name.
    pub fn new(node_id: impl Into<NodeId>, browse_name: impl Into<String>, node_class: NodeClass) -> Self {
        let browse_name = browse_name.into();
        Self {
            node_id: node_id.into(),
            display_name: browse_name.clone(),
            browse_name,
            node_class,
            is_forward: true,
        }
    }
}

/// A node attribute to read or monitor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadValueId {
    /// Target node.
    pub node_id: NodeId,
    /// Target attribute.
    #[serde(default)]
    pub attribute_id: AttributeId,
}

impl ReadValueId {
    /// Creates a reference to an attribute.
    pub fn new(node_id: impl Into<NodeId>, attribute_id: AttributeId) -> Self {
        Self {
            node_id: node_id.into(),
            attribute_id,
        }
    }

    /// Creates a reference to the Value attribute.
    pub fn value(node_id: impl Into<NodeId>) -> Self {
        Self::new(node_id, AttributeId::Value)
    }
}

// =============================================================================
// SubscriptionParameters
// =============================================================================

/// Requested subscription settings.
///
/// The server may revise the counts; the revised values are what the
/// subscription runs with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionParameters {
    /// Publishing interval.
    #[serde(default = "default_publishing_interval")]
    #[serde(with = "humantime_serde")]
    pub requested_publishing_interval: Duration,

    /// Intervals without publish activity before the subscription expires.
    #[serde(default = "default_lifetime_count")]
    pub requested_lifetime_count: u32,

    /// Empty intervals before a keepalive is sent.
    #[serde(default = "default_keepalive_count")]
    pub requested_max_keep_alive_count: u32,

    /// Notifications per publish cycle, 0 means unlimited.
    #[serde(default)]
    pub max_notifications_per_publish: u32,

    /// Whether publish cycles deliver notifications.
    #[serde(default = "default_true")]
    pub publishing_enabled: bool,

    /// Relative priority (higher is more important).
    #[serde(default)]
    pub priority: u8,
}

fn default_publishing_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_lifetime_count() -> u32 {
    60
}

fn default_keepalive_count() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for SubscriptionParameters {
    fn default() -> Self {
        Self {
            requested_publishing_interval: default_publishing_interval(),
            requested_lifetime_count: default_lifetime_count(),
            requested_max_keep_alive_count: default_keepalive_count(),
            max_notifications_per_publish: 0,
            publishing_enabled: true,
            priority: 0,
        }
    }
}

impl SubscriptionParameters {
    /// Creates parameters with a custom publishing interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            requested_publishing_interval: interval,
            ..Default::default()
        }
    }

    /// Sets the lifetime count.
    pub fn lifetime_count(mut self, count: u32) -> Self {
        self.requested_lifetime_count = count;
        self
    }

    /// Sets the keepalive count.
    pub fn max_keep_alive_count(mut self, count: u32) -> Self {
        self.requested_max_keep_alive_count = count;
        self
    }

    /// Sets the notifications-per-publish limit.
    pub fn max_notifications(mut self, max: u32) -> Self {
        self.max_notifications_per_publish = max;
        self
    }

    /// Sets the priority.
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Enables or disables publishing.
    pub fn publishing_enabled(mut self, enabled: bool) -> Self {
        self.publishing_enabled = enabled;
        self
    }

    /// Validates the parameters before they are sent.
    pub fn validate(&self) -> UaResult<()> {
        if self.requested_publishing_interval.is_zero() {
            return Err(SessionError::invalid_parameter(
                "requested_publishing_interval",
                "must be greater than 0",
            )
            .into());
        }
        if self.requested_max_keep_alive_count == 0 {
            return Err(SessionError::invalid_parameter(
                "requested_max_keep_alive_count",
                "must be greater than 0",
            )
            .into());
        }
        if self.requested_lifetime_count == 0 {
            return Err(SessionError::invalid_parameter(
                "requested_lifetime_count",
                "must be greater than 0",
            )
            .into());
        }
        Ok(())
    }
}

// =============================================================================
// MonitoringParameters
// =============================================================================

/// Sampling and queueing policy for a monitored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringParameters {
    /// Sampling interval.
    #[serde(default = "default_sampling_interval")]
    #[serde(with = "humantime_serde")]
    pub sampling_interval: Duration,

    /// Queue capacity, at least 1.
    #[serde(default = "default_queue_size")]
    pub queue_size: u32,

    /// Drop the oldest entry (`true`) or the new sample (`false`) on overflow.
    #[serde(default = "default_true")]
    pub discard_oldest: bool,

    /// Change filter.
    #[serde(default)]
    pub deadband: Deadband,
}

fn default_sampling_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_queue_size() -> u32 {
    1
}

impl Default for MonitoringParameters {
    fn default() -> Self {
        Self {
            sampling_interval: default_sampling_interval(),
            queue_size: default_queue_size(),
            discard_oldest: true,
            deadband: Deadband::None,
        }
    }
}

impl MonitoringParameters {
    /// Creates parameters with a custom sampling interval.
    pub fn with_sampling_interval(interval: Duration) -> Self {
        Self {
            sampling_interval: interval,
            ..Default::default()
        }
    }

    /// Sets the queue size.
    pub fn queue_size(mut self, size: u32) -> Self {
        self.queue_size = size;
        self
    }

    /// Sets the discard policy.
    pub fn discard_oldest(mut self, discard_oldest: bool) -> Self {
        self.discard_oldest = discard_oldest;
        self
    }

    /// Sets the deadband filter.
    pub fn deadband(mut self, deadband: Deadband) -> Self {
        self.deadband = deadband;
        self
    }

    /// Validates the parameters.
    pub fn validate(&self) -> UaResult<()> {
        if self.queue_size < 1 {
            return Err(SessionError::invalid_parameter("queue_size", "must be at least 1").into());
        }
        if self.sampling_interval.is_zero() {
            return Err(SessionError::invalid_parameter(
                "sampling_interval",
                "must be greater than 0",
            )
            .into());
        }
        if let Deadband::Absolute { value } = self.deadband {
            if value.is_nan() || value < 0.0 {
                return Err(SessionError::invalid_parameter(
                    "deadband",
                    "absolute deadband must be a non-negative number",
                )
                .into());
            }
        }
        Ok(())
    }
}

/// Data change filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Deadband {
    /// Any change in value or status is reported.
    #[default]
    None,

    /// Numeric changes must exceed `value` to be reported.
    Absolute {
        /// Absolute change threshold.
        value: f64,
    },
}

impl Deadband {
    /// Returns `true` if `next` should be reported after `last`.
    pub fn passes(&self, last: &DataValue, next: &DataValue) -> bool {
        if last.status != next.status {
            return true;
        }
        match self {
            Self::None => last.value != next.value,
            Self::Absolute { value } => match (last.value.as_f64(), next.value.as_f64()) {
                (Some(a), Some(b)) => (b - a).abs() > *value,
                _ => last.value != next.value,
            },
        }
    }
}

// =============================================================================
// humantime_serde helper
// =============================================================================

pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_severity() {
        assert!(StatusCode::GOOD.is_good());
        assert!(StatusCode::UNCERTAIN_INITIAL_VALUE.is_uncertain());
        assert!(StatusCode::BAD_NOT_WRITABLE.is_bad());
        assert!(!StatusCode::BAD_NOT_WRITABLE.is_good());
        assert_eq!(StatusCode(0x8034_0012).name(), "BadNodeIdUnknown");
        assert_eq!(StatusCode(0x80FF_0000).name(), "Bad");
    }

    #[test]
    fn test_status_code_display() {
        assert_eq!(StatusCode::GOOD.to_string(), "Good (0x00000000)");
        assert_eq!(
            StatusCode::BAD_TYPE_MISMATCH.to_string(),
            "BadTypeMismatch (0x80740000)"
        );
    }

    #[test]
    fn test_variant_conversions() {
        assert_eq!(Variant::Int32(7).as_f64(), Some(7.0));
        assert_eq!(Variant::UInt64(u64::MAX).as_i64(), None);
        assert_eq!(Variant::from("hello").as_str(), Some("hello"));
        assert!(Variant::Double(1.5).is_numeric());
        assert!(!Variant::Boolean(true).is_numeric());
        assert_eq!(Variant::ByteString(vec![1, 2, 3]).to_string(), "b64:AQID");
        assert_eq!(
            Variant::Array(vec![Variant::Int32(1), Variant::Int32(2)]).to_string(),
            "[1, 2]"
        );
    }

    #[test]
    fn test_data_value_filtered_timestamps() {
        let now = Utc::now();
        let value = DataValue::new(1.0)
            .with_source_timestamp(now)
            .with_server_timestamp(now);

        let source = value.filtered(TimestampsToReturn::Source);
        assert!(source.source_timestamp.is_some());
        assert!(source.server_timestamp.is_none());

        let server = value.filtered(TimestampsToReturn::Server);
        assert!(server.source_timestamp.is_none());
        assert!(server.server_timestamp.is_some());

        let neither = value.filtered(TimestampsToReturn::Neither);
        assert!(neither.source_timestamp.is_none() && neither.server_timestamp.is_none());

        assert_eq!(value.filtered(TimestampsToReturn::Both), value);
    }

    #[test]
    fn test_same_sample_ignores_timestamps() {
        let a = DataValue::new(5).with_source_timestamp(Utc::now());
        let b = DataValue::new(5);
        assert!(a.same_sample(&b));
        assert!(!a.same_sample(&b.clone().with_status(StatusCode::BAD)));
    }

    #[test]
    fn test_deadband() {
        let last = DataValue::new(10.0);
        assert!(Deadband::None.passes(&last, &DataValue::new(10.1)));
        assert!(!Deadband::None.passes(&last, &DataValue::new(10.0)));

        let band = Deadband::Absolute { value: 0.5 };
        assert!(!band.passes(&last, &DataValue::new(10.4)));
        assert!(band.passes(&last, &DataValue::new(10.6)));
        assert!(band.passes(&last, &DataValue::new(10.0).with_status(StatusCode::BAD)));
        assert!(band.passes(&DataValue::new("a"), &DataValue::new("b")));
    }

    #[test]
    fn test_subscription_parameters_validation() {
        assert!(SubscriptionParameters::default().validate().is_ok());
        assert!(SubscriptionParameters::with_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(SubscriptionParameters::default()
            .max_keep_alive_count(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_monitoring_parameters_validation() {
        assert!(MonitoringParameters::default().validate().is_ok());
        let error = MonitoringParameters::default().queue_size(0).validate().unwrap_err();
        assert!(error.to_string().contains("queue_size"));
        assert!(MonitoringParameters::default()
            .deadband(Deadband::Absolute { value: -1.0 })
            .validate()
            .is_err());
    }

    #[test]
    fn test_subscription_parameters_serde() {
        let params: SubscriptionParameters = serde_json::from_str(
            r#"{"requested_publishing_interval": "250ms", "priority": 10}"#,
        )
        .unwrap();
        assert_eq!(params.requested_publishing_interval, Duration::from_millis(250));
        assert_eq!(params.priority, 10);
        assert_eq!(params.requested_max_keep_alive_count, 10);
        assert!(params.publishing_enabled);
    }
}
