//! Engine-level error handling for Flowguard.
//!
//! [`AuthzError`] is the precise error of the authorization core. At the
//! engine boundary it is wrapped into [`FlowguardError`], which adds a stable
//! error code, a severity used for logging, structured details and a metrics
//! counter. The wrapped error stays reachable through [`FlowguardError::authz`]
//! and its message is kept verbatim as the user message.
//!
//! # Usage
//!
//! ```rust,ignore
//! use flowguard_core::error::{ErrorCode, ErrorContext, Result};
//!
//! fn load_entries(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path).with_error_code(ErrorCode::StoreUnavailable)
//! }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::authz::{AuthzError, StoreError};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for engine operations.
pub type Result<T> = std::result::Result<T, FlowguardError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes. These are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Store Errors (2000-2099)
    StoreUnavailable,
    EntryNotFound,
    DuplicateEntry,

    // Serialization Errors (2200-2299)
    SerializationError,

    // Authorization Errors (4000-4099)
    AuthorizationDenied,
    InvalidResourceForPermission,
    UnknownPermission,

    // Usage Errors (4100-4199)
    InvalidEntry,
    InvalidArgument,
    NotUnique,

    // Configuration Errors (5000-5099)
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,

    // Internal Errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::StoreUnavailable => 2000,
            Self::EntryNotFound => 2004,
            Self::DuplicateEntry => 2005,

            Self::SerializationError => 2200,

            Self::AuthorizationDenied => 4000,
            Self::InvalidResourceForPermission => 4001,
            Self::UnknownPermission => 4002,

            Self::InvalidEntry => 4100,
            Self::InvalidArgument => 4101,
            Self::NotUnique => 4102,

            Self::ConfigurationError => 5000,
            Self::MissingConfiguration => 5001,
            Self::InvalidConfiguration => 5002,

            Self::InternalError => 9000,
        }
    }

    /// Only a store that could not be reached is worth retrying.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable)
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            2000..=2099 => "store",
            2200..=2299 => "serialization",
            4000..=4099 => "authorization",
            4100..=4199 => "usage",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Expected outcomes: denials, bad input
    Low,
    /// Misconfiguration that should be fixed but does not stop the engine
    Medium,
    /// Store or serialization failures
    High,
    /// Broken invariants
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::AuthorizationDenied
            | ErrorCode::InvalidEntry
            | ErrorCode::InvalidArgument
            | ErrorCode::NotUnique
            | ErrorCode::EntryNotFound
            | ErrorCode::DuplicateEntry => Self::Low,

            ErrorCode::InvalidResourceForPermission | ErrorCode::UnknownPermission => Self::Medium,

            ErrorCode::StoreUnavailable
            | ErrorCode::SerializationError
            | ErrorCode::ConfigurationError
            | ErrorCode::MissingConfiguration
            | ErrorCode::InvalidConfiguration => Self::High,

            ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// User the failing operation ran for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    /// Suggested action for resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_resource(mut self, resource_type: impl Into<String>, resource_id: Option<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = resource_id;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggested_action = Some(suggestion.into());
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The engine's error type.
#[derive(Error, Debug)]
pub struct FlowguardError {
    /// Machine-readable error code
    code: ErrorCode,

    /// Message safe to show to the caller
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    details: ErrorDetails,

    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for FlowguardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl FlowguardError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    pub fn configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message)
    }

    pub fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    /// The wrapped authorization error, if this error came from one.
    pub fn authz(&self) -> Option<&AuthzError> {
        self.source.as_deref().and_then(|s| s.downcast_ref::<AuthzError>())
    }

    pub fn is_denied(&self) -> bool {
        self.code == ErrorCode::AuthorizationDenied
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            "flowguard_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Wrap the error as an internal error with this message.
    fn context(self, message: impl Into<String>) -> Result<T>;

    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| FlowguardError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| FlowguardError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| FlowguardError::new(ErrorCode::EntryNotFound, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| FlowguardError::new(code, "Value not present"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════════════════

impl From<AuthzError> for FlowguardError {
    fn from(error: AuthzError) -> Self {
        let code = match &error {
            AuthzError::Denied { .. } => ErrorCode::AuthorizationDenied,
            AuthzError::InvalidResourceForPermission { .. } => ErrorCode::InvalidResourceForPermission,
            AuthzError::UnknownPermission { .. } => ErrorCode::UnknownPermission,
            AuthzError::Configuration(_) => ErrorCode::InvalidConfiguration,
            AuthzError::InvalidEntry(_) => ErrorCode::InvalidEntry,
            AuthzError::EntryNotFound(_) => ErrorCode::EntryNotFound,
            AuthzError::NotUnique { .. } => ErrorCode::NotUnique,
            AuthzError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            AuthzError::Store(StoreError::NotFound(_)) => ErrorCode::EntryNotFound,
            AuthzError::Store(StoreError::Duplicate(_)) => ErrorCode::DuplicateEntry,
            AuthzError::Store(StoreError::Backend(_)) => ErrorCode::StoreUnavailable,
        };

        let mut details = ErrorDetails::new();
        if let AuthzError::Denied { user_id, missing } = &error {
            details = details.with_user(user_id.clone());
            if let [only] = missing.as_slice() {
                details = details.with_resource(only.resource_type.clone(), only.resource_id.clone());
            }
            details = details.with_context("missing", missing.len());
        }

        Self::new(code, error.to_string())
            .with_details(details)
            .with_source(error)
    }
}

impl From<StoreError> for FlowguardError {
    fn from(error: StoreError) -> Self {
        AuthzError::Store(error).into()
    }
}

impl From<serde_json::Error> for FlowguardError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_internal(
            ErrorCode::SerializationError,
            "Failed to process JSON data",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<anyhow::Error> for FlowguardError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<FlowguardError>() {
            Ok(flowguard_error) => flowguard_error,
            Err(error) => match error.downcast::<AuthzError>() {
                Ok(authz_error) => authz_error.into(),
                Err(error) => Self::with_internal(
                    ErrorCode::InternalError,
                    "An internal error occurred",
                    error.to_string(),
                ),
            },
        }
    }
}

impl From<config::ConfigError> for FlowguardError {
    fn from(error: config::ConfigError) -> Self {
        let (code, user_msg) = match &error {
            config::ConfigError::NotFound(_) => (
                ErrorCode::MissingConfiguration,
                "Required configuration not found",
            ),
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => (
                ErrorCode::InvalidConfiguration,
                "Configuration file is invalid",
            ),
            _ => (ErrorCode::ConfigurationError, "Configuration error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
