//! Error types for each layer.
//!
//! `RecoveryError` is what the domain surfaces to callers; its `kind()` is one
//! of four categories so a caller can decide between retrying (persistence,
//! external service) and rejecting (validation, not found).

use serde::Serialize;

/// Configuration resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("missing required setting {key}: {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("failed to parse settings file: {0}")]
    ParseError(String),
}

/// Persistence-layer failures, propagated as-is.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("connection error: {0}")]
    Pool(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[cfg(feature = "libsql")]
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),
}

/// Failures from outbound providers (SMS delivery, billing).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {reason}")]
    Request { provider: String, reason: String },

    #[error("{provider} rejected the request with status {status}: {body}")]
    Rejected {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider} returned an unexpected response: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("webhook signature invalid: {0}")]
    InvalidSignature(String),

    #[error("channel {0} has no delivery provider")]
    UnsupportedChannel(String),
}

/// HTTP gateway lifecycle failures.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway failed to start on {addr}: {reason}")]
    StartupFailed { addr: String, reason: String },
}

/// Domain-facing error for every recovery operation.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Persistence(#[from] DatabaseError),

    #[error(transparent)]
    ExternalService(#[from] ProviderError),
}

impl RecoveryError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::ExternalService(_) => ErrorKind::ExternalService,
        }
    }
}

/// The four caller-visible failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    Persistence,
    ExternalService,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Persistence => "persistence",
            Self::ExternalService => "external_service",
        }
    }

    /// Persistence and provider failures may succeed on retry; the others will not.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Persistence | Self::ExternalService)
    }
}
