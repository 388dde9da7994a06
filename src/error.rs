//! # Error Types
//!
//! Central error taxonomy for the relay core. The classifier in
//! [`crate::transmission::error_classifier`] dispatches on these variants to
//! decide between contingency storage and immediate business failure, so the
//! distinction between "the Authority said no" ([`RelayError::AuthorityRejection`])
//! and "we could not reach the Authority" ([`RelayError::Network`]) is load-bearing.

use std::time::Duration;

/// Network-level failure kinds, preserved from the transport layer so the
/// classifier can map them to distinct contingency types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkErrorKind {
    ConnectionRefused,
    ConnectionReset,
    DnsFailure,
    HostUnreachable,
    Timeout,
    Other,
}

impl std::fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NetworkErrorKind::ConnectionRefused => "connection refused",
            NetworkErrorKind::ConnectionReset => "connection reset",
            NetworkErrorKind::DnsFailure => "dns failure",
            NetworkErrorKind::HostUnreachable => "host unreachable",
            NetworkErrorKind::Timeout => "timeout",
            NetworkErrorKind::Other => "network error",
        };
        write!(f, "{name}")
    }
}

/// Errors raised by the relay core and its collaborators.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RelayError {
    /// Transport-level failure reaching the Authority.
    #[error("Network error ({kind}): {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },

    /// HTTP response with a non-success status that carried no Authority
    /// business payload.
    #[error("HTTP {status} from Authority: {message}")]
    Http { status: u16, message: String },

    /// The Authority processed the request and rejected it. This is a
    /// business answer, not an infrastructure failure.
    #[error("Authority rejected request ({status}): {description}")]
    AuthorityRejection {
        status: String,
        message_code: Option<String>,
        description: String,
    },

    /// The Authority answered but never reached a terminal status for the
    /// document within the immediate-retry window.
    #[error("Authority left document unresolved (last status: {status})")]
    AuthorityUnresolved { status: String },

    /// Caller-supplied deadline or cancellation fired mid-call.
    #[error("Operation '{operation}' cancelled or deadline exceeded")]
    Cancelled { operation: String },

    /// Document signing failed. Never retried.
    #[error("Signing failed for issuer {tax_id}: {reason}")]
    Signing { tax_id: String, reason: String },

    /// Authority token acquisition failed.
    #[error("Authentication with Authority failed: {reason}")]
    Authentication { reason: String },

    /// Repository collaborator failure.
    #[error("Repository error during {operation}: {reason}")]
    Repository { operation: String, reason: String },

    /// Circuit breaker is open; no call was attempted.
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Input or state validation failure in the relay core itself.
    #[error("Validation error on {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Configuration error; requires manual intervention.
    #[error("Configuration error in {source_name}: {reason}")]
    Configuration { source_name: String, reason: String },

    /// The verification deadline elapsed before the Authority resolved a
    /// batch; unresolved documents stay pending.
    #[error("Batch {batch_id} unresolved after {}s", timeout.as_secs())]
    BatchVerificationTimeout { batch_id: String, timeout: Duration },
}

impl RelayError {
    /// True when this error is the Authority answering, as opposed to the
    /// Authority being unreachable.
    pub fn is_business_answer(&self) -> bool {
        matches!(self, RelayError::AuthorityRejection { .. })
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
