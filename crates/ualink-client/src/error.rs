// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client error types with diagnostics.
//!
//! Errors are grouped by the layer that produced them:
//!
//! ```text
//! UaError
//! ├── Connect       - Connection establishment (retried before surfacing)
//! ├── Session       - Session creation, parameters, closed sessions
//! ├── Transport     - Per-request failures (closed, lost, timed out)
//! ├── Subscription  - Operations on terminated subscriptions
//! ├── Service       - Service fault returned by the server
//! └── Configuration - Invalid settings
//! ```
//!
//! A Bad or Uncertain [`StatusCode`] on a successful read or write is data,
//! not an error. It never travels through this module.
//!
//! # Examples
//!
//! ```
//! use ualink_client::error::{UaError, TransportError};
//!
//! let error = UaError::from(TransportError::ConnectionLost);
//! assert!(error.is_retryable());
//! assert_eq!(error.category(), "transport");
//! ```

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

use crate::types::StatusCode;

// =============================================================================
// UaError - Main Error Type
// =============================================================================

/// The main error type for client operations.
#[derive(Debug, Error)]
pub enum UaError {
    /// Connection establishment errors.
    #[error("{0}")]
    Connect(#[from] ConnectError),

    /// Session lifecycle and parameter errors.
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Per-request transport errors.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// Subscription errors.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// The server answered the request with a service fault.
    #[error("Service fault: {0}")]
    Service(StatusCode),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),
}

impl UaError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates an endpoint-not-found error.
    pub fn endpoint_not_found(endpoint: impl Into<String>, advertised: Vec<String>) -> Self {
        Self::Connect(ConnectError::endpoint_not_found(endpoint, advertised))
    }

    /// Creates an unreachable error.
    pub fn unreachable(endpoint: impl Into<String>, attempts: u32, reason: impl Into<String>) -> Self {
        Self::Connect(ConnectError::unreachable(endpoint, attempts, reason))
    }

    /// Creates a session creation error.
    pub fn session_create_failed(reason: impl Into<String>) -> Self {
        Self::Session(SessionError::create_failed(reason))
    }

    /// Creates an invalid parameter error.
    pub fn invalid_parameter(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::Session(SessionError::invalid_parameter(parameter, reason))
    }

    /// Creates a service fault error.
    pub fn service(status: StatusCode) -> Self {
        Self::Service(status)
    }

    /// Creates a configuration error for an invalid value.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration(ConfigurationError::invalid_value(field, reason))
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect(e) => e.is_retryable(),
            Self::Session(e) => e.is_retryable(),
            Self::Transport(e) => e.is_retryable(),
            Self::Subscription(_) => false,
            Self::Service(status) => status.is_uncertain(),
            Self::Configuration(_) => false,
        }
    }

    /// Returns the suggested retry delay, `None` if not retryable.
    pub fn suggested_retry_delay(&self) -> Option<Duration> {
        if !self.is_retryable() {
            return None;
        }

        match self {
            Self::Transport(e) => Some(e.suggested_retry_delay()),
            Self::Connect(_) => Some(Duration::from_secs(5)),
            _ => Some(Duration::from_secs(1)),
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connect(e) => e.severity(),
            Self::Session(e) => e.severity(),
            Self::Transport(e) => e.severity(),
            Self::Subscription(_) => ErrorSeverity::Warning,
            Self::Service(_) => ErrorSeverity::Warning,
            Self::Configuration(_) => ErrorSeverity::Critical,
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Session(_) => "session",
            Self::Transport(_) => "transport",
            Self::Subscription(_) => "subscription",
            Self::Service(_) => "service",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Returns a unique error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connect(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
            Self::Transport(e) => e.error_code(),
            Self::Subscription(e) => e.error_code(),
            Self::Service(_) => ErrorCode::new(5, 1),
            Self::Configuration(e) => e.error_code(),
        }
    }

    /// Returns recovery hints for this error.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Connect(e) => e.recovery_hints(),
            Self::Session(e) => e.recovery_hints(),
            Self::Transport(e) => e.recovery_hints(),
            Self::Subscription(_) => vec!["Create a new subscription"],
            Self::Service(_) => vec![
                "Inspect the status code name",
                "Verify the node exists and is accessible",
            ],
            Self::Configuration(_) => vec!["Review the client configuration"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Connect(e) => e.user_message(),
            Self::Session(e) => e.user_message(),
            Self::Transport(e) => e.user_message(),
            Self::Subscription(e) => format!("구독 오류: {}", e),
            Self::Service(status) => format!("서버 서비스 오류: {}", status),
            Self::Configuration(e) => format!("설정 오류: {}", e),
        }
    }

    /// Returns the service status code if this is a service fault.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Service(status) => Some(*status),
            Self::Session(SessionError::SessionCreateFailed { status, .. }) => *status,
            _ => None,
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        let code = self.error_code();

        match self.tracing_level() {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
        }
    }
}

// =============================================================================
// ConnectError
// =============================================================================

/// Errors surfaced by `connect()` once the retry strategy is exhausted.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The server does not advertise the requested endpoint.
    #[error("Endpoint not found: '{endpoint}'")]
    EndpointNotFound {
        /// Requested endpoint URL.
        endpoint: String,
        /// Endpoint URLs the server advertised.
        advertised: Vec<String>,
    },

    /// Every connection attempt failed.
    #[error("Endpoint '{endpoint}' unreachable after {attempts} attempt(s): {reason}")]
    Unreachable {
        /// Target endpoint URL.
        endpoint: String,
        /// Number of attempts performed.
        attempts: u32,
        /// Reason reported by the last attempt.
        reason: String,
    },

    /// The endpoint URL is malformed.
    #[error("Invalid endpoint URL: '{url}' - {reason}")]
    InvalidEndpoint {
        /// The invalid URL.
        url: String,
        /// Reason.
        reason: String,
    },

    /// Another connect or reconnect is already running.
    #[error("Connection to '{endpoint}' already in progress")]
    InProgress {
        /// Target endpoint URL.
        endpoint: String,
    },
}

impl ConnectError {
    /// Creates an endpoint-not-found error.
    pub fn endpoint_not_found(endpoint: impl Into<String>, advertised: Vec<String>) -> Self {
        Self::EndpointNotFound {
            endpoint: endpoint.into(),
            advertised,
        }
    }

    /// Creates an unreachable error.
    pub fn unreachable(endpoint: impl Into<String>, attempts: u32, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            endpoint: endpoint.into(),
            attempts,
            reason: reason.into(),
        }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if a later `connect()` call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::InProgress { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Unreachable { .. } => ErrorSeverity::Error,
            Self::InProgress { .. } => ErrorSeverity::Warning,
            Self::EndpointNotFound { .. } | Self::InvalidEndpoint { .. } => ErrorSeverity::Critical,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::EndpointNotFound { .. } => ErrorCode::new(1, 1),
            Self::Unreachable { .. } => ErrorCode::new(1, 2),
            Self::InvalidEndpoint { .. } => ErrorCode::new(1, 3),
            Self::InProgress { .. } => ErrorCode::new(1, 4),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::EndpointNotFound { .. } => vec![
                "Compare the URL with the endpoints the server advertises",
                "Disable endpoint_must_exist to skip the check",
            ],
            Self::Unreachable { .. } => vec![
                "Verify the server is running",
                "Check network connectivity and firewall rules",
                "Increase max_retry or max_delay",
            ],
            Self::InvalidEndpoint { .. } => vec!["Use the form opc.tcp://host:port[/path]"],
            Self::InProgress { .. } => vec!["Wait for the connected or closed event"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::EndpointNotFound { endpoint, .. } => {
                format!("서버에서 엔드포인트를 찾을 수 없음: {}", endpoint)
            }
            Self::Unreachable { endpoint, attempts, .. } => {
                format!("서버에 연결할 수 없음: {} ({}회 시도)", endpoint, attempts)
            }
            Self::InvalidEndpoint { url, .. } => format!("잘못된 엔드포인트 URL: {}", url),
            Self::InProgress { endpoint } => format!("이미 연결 중: {}", endpoint),
        }
    }
}

// =============================================================================
// SessionError
// =============================================================================

/// Session lifecycle and parameter errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session creation failed.
    #[error("Session creation failed: {reason}")]
    SessionCreateFailed {
        /// Failure reason.
        reason: String,
        /// Status code returned by the server, if any.
        status: Option<StatusCode>,
    },

    /// A request parameter was rejected before reaching the server.
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// Parameter name.
        parameter: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The session has been closed.
    #[error("Session '{session_id}' is closed")]
    Closed {
        /// Server-assigned session id.
        session_id: String,
    },
}

impl SessionError {
    /// Creates a session creation error.
    pub fn create_failed(reason: impl Into<String>) -> Self {
        Self::SessionCreateFailed {
            reason: reason.into(),
            status: None,
        }
    }

    /// Creates a session creation error carrying the server status.
    pub fn create_failed_with_status(reason: impl Into<String>, status: StatusCode) -> Self {
        Self::SessionCreateFailed {
            reason: reason.into(),
            status: Some(status),
        }
    }

    /// Creates an invalid parameter error.
    pub fn invalid_parameter(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter,
            reason: reason.into(),
        }
    }

    /// Creates a closed-session error.
    pub fn closed(session_id: impl Into<String>) -> Self {
        Self::Closed {
            session_id: session_id.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SessionCreateFailed { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::SessionCreateFailed { .. } => ErrorSeverity::Error,
            Self::InvalidParameter { .. } => ErrorSeverity::Warning,
            Self::Closed { .. } => ErrorSeverity::Warning,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::SessionCreateFailed { .. } => ErrorCode::new(2, 1),
            Self::InvalidParameter { .. } => ErrorCode::new(2, 2),
            Self::Closed { .. } => ErrorCode::new(2, 3),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::SessionCreateFailed { .. } => vec![
                "Ensure the channel is connected before creating a session",
                "Check the server session limits",
            ],
            Self::InvalidParameter { .. } => vec!["Correct the parameter and retry"],
            Self::Closed { .. } => vec!["Create a new session"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::SessionCreateFailed { reason, .. } => format!("세션 생성 실패: {}", reason),
            Self::InvalidParameter { parameter, .. } => {
                format!("잘못된 매개변수: {}", parameter)
            }
            Self::Closed { .. } => "세션이 이미 종료됨".to_string(),
        }
    }
}

// =============================================================================
// TransportError
// =============================================================================

/// Per-request transport failures.
///
/// These fail only the affected in-flight request(s). The type is `Clone`
/// because one failure is fanned out to every pending request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The channel was closed by the caller.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The link dropped unexpectedly.
    #[error("Connection lost")]
    ConnectionLost,

    /// No response arrived within the request timeout.
    #[error("Request {request_id} timed out after {timeout:?}")]
    RequestTimeout {
        /// Correlation id of the request.
        request_id: u32,
        /// Configured timeout.
        timeout: Duration,
    },

    /// The server answered with a response of the wrong kind.
    #[error("Unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        /// Expected response kind.
        expected: &'static str,
        /// Received response kind.
        actual: &'static str,
    },
}

impl TransportError {
    /// Creates a request timeout error.
    pub fn request_timeout(request_id: u32, timeout: Duration) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout,
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::UnexpectedResponse { .. })
    }

    /// Returns the suggested retry delay.
    pub fn suggested_retry_delay(&self) -> Duration {
        match self {
            Self::ConnectionLost => Duration::from_secs(1),
            Self::RequestTimeout { .. } => Duration::from_millis(500),
            _ => Duration::from_secs(2),
        }
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ConnectionClosed => ErrorSeverity::Info,
            Self::ConnectionLost => ErrorSeverity::Error,
            Self::RequestTimeout { .. } => ErrorSeverity::Warning,
            Self::UnexpectedResponse { .. } => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ConnectionClosed => ErrorCode::new(3, 1),
            Self::ConnectionLost => ErrorCode::new(3, 2),
            Self::RequestTimeout { .. } => ErrorCode::new(3, 3),
            Self::UnexpectedResponse { .. } => ErrorCode::new(3, 4),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::ConnectionClosed => vec!["Reconnect before issuing new requests"],
            Self::ConnectionLost => vec![
                "The channel reconnects automatically per its strategy",
                "Retry the request after the reconnected event",
            ],
            Self::RequestTimeout { .. } => vec![
                "Increase request_timeout",
                "Check server load",
            ],
            Self::UnexpectedResponse { .. } => vec!["Check server compatibility"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::ConnectionClosed => "연결이 종료됨".to_string(),
            Self::ConnectionLost => "연결이 끊어짐".to_string(),
            Self::RequestTimeout { timeout, .. } => format!("요청 시간 초과: {:?}", timeout),
            Self::UnexpectedResponse { .. } => "예상하지 못한 서버 응답".to_string(),
        }
    }
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Subscription errors.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// The subscription has terminated.
    #[error("Subscription {subscription_id} is terminated")]
    Terminated {
        /// Subscription id.
        subscription_id: u32,
    },

    /// The monitored item does not belong to the subscription.
    #[error("Monitored item {item_id} not found in subscription {subscription_id}")]
    ItemNotFound {
        /// Subscription id.
        subscription_id: u32,
        /// Monitored item id.
        item_id: u32,
    },
}

impl SubscriptionError {
    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Terminated { .. } => ErrorCode::new(4, 1),
            Self::ItemNotFound { .. } => ErrorCode::new(4, 2),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A field holds an invalid value.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Reason.
        reason: String,
    },

    /// The configuration document could not be parsed.
    #[error("Failed to parse {format} configuration: {message}")]
    Parse {
        /// Document format.
        format: &'static str,
        /// Parser message.
        message: String,
    },
}

impl ConfigurationError {
    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a parse error.
    pub fn parse(format: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            format,
            message: message.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidValue { .. } => ErrorCode::new(6, 1),
            Self::Parse { .. } => ErrorCode::new(6, 2),
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - immediate action required.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code.
///
/// Format: `UA-XXYY` where XX is category and YY is specific error.
///
/// Categories:
/// - 1: Connect
/// - 2: Session
/// - 3: Transport
/// - 4: Subscription
/// - 5: Service
/// - 6: Configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category.
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }

    /// Returns the full error code as a u16.
    pub fn as_u16(&self) -> u16 {
        ((self.category as u16) << 8) | (self.code as u16)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A Result type with UaError.
pub type UaResult<T> = Result<T, UaError>;

// =============================================================================
// Error Context Extension
// =============================================================================

/// Extension trait for adding context to client errors.
pub trait UaErrorContext<T> {
    /// Logs the error with endpoint context.
    fn with_endpoint(self, endpoint: &str) -> UaResult<T>;

    /// Logs the error with node context.
    fn with_node(self, node_id: &str) -> UaResult<T>;
}

impl<T> UaErrorContext<T> for UaResult<T> {
    fn with_endpoint(self, endpoint: &str) -> UaResult<T> {
        self.map_err(|e| {
            tracing::debug!(endpoint = endpoint, error = %e, "Client error with endpoint context");
            e
        })
    }

    fn with_node(self, node_id: &str) -> UaResult<T> {
        self.map_err(|e| {
            tracing::debug!(node_id = node_id, error = %e, "Client error with node context");
            e
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
