//! # Transmission Error Classification
//!
//! Single decision point separating "store for contingency" from "fail the
//! request outright". Every failed transmission passes through
//! [`ContingencyClassifier::classify`], which maps the error to a
//! [`ContingencyType`], a human-readable reason, and a [`RetryPolicy`].
//!
//! Validation and business-rule rejections are marked non-retryable and must
//! never enter contingency storage: retrying them can never succeed.

use std::time::Duration;
use tracing::warn;

use crate::constants::rejection_markers;
use crate::error::{NetworkErrorKind, RelayError};
use crate::models::ContingencyType;

/// Retry behavior computed per failure. Drives both the single-document
/// transmitter's immediate-retry loop and the batch transmitter's
/// token/submission retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub retryable: bool,
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            retryable: false,
            max_attempts: 0,
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Backoff delay before the given attempt (1-based), capped at
    /// `max_interval`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if !self.retryable {
            return Duration::ZERO;
        }
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        self.initial_interval.mul_f64(factor).min(self.max_interval)
    }
}

/// Outcome of classifying one failure.
#[derive(Debug, Clone)]
pub struct ContingencyResult {
    pub contingency_type: ContingencyType,
    pub reason: String,
    pub retry_policy: RetryPolicy,
}

impl ContingencyResult {
    pub fn is_retryable(&self) -> bool {
        self.retry_policy.retryable
    }
}

/// Per-condition retry tuning.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Backoff while the Authority is in announced maintenance.
    pub maintenance_interval: Duration,
    /// Backoff for transient Authority overload.
    pub overload_interval: Duration,
    /// Backoff for connectivity-class failures.
    pub network_interval: Duration,
    /// Backoff when the Authority is unreachable or answering 5xx.
    pub unavailable_interval: Duration,
    /// Cap for all computed backoff delays.
    pub max_interval: Duration,
    /// Exponential multiplier between attempts.
    pub backoff_multiplier: f64,
    /// Attempt budget for retryable conditions.
    pub max_attempts: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            maintenance_interval: Duration::from_secs(15 * 60),
            overload_interval: Duration::from_secs(30),
            network_interval: Duration::from_secs(15),
            unavailable_interval: Duration::from_secs(60),
            max_interval: Duration::from_secs(60 * 60),
            backoff_multiplier: 2.0,
            max_attempts: 3,
        }
    }
}

/// Maps raised errors to contingency classifications, in the precedence
/// order: Authority business answers first, then raw network failures,
/// then cancellation, then generic HTTP, then a conservative catch-all.
#[derive(Debug, Clone, Default)]
pub struct ContingencyClassifier {
    config: ClassifierConfig,
}

impl ContingencyClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Classify a transmission failure.
    pub fn classify(&self, error: &RelayError) -> ContingencyResult {
        match error {
            RelayError::AuthorityRejection { description, .. } => {
                self.classify_rejection(description)
            }
            RelayError::Network { kind, message } => self.classify_network(*kind, message),
            RelayError::AuthorityUnresolved { status } => self.retryable(
                ContingencyType::NoDisponibilidadMh,
                format!("Authority left document unresolved (last status: {status})"),
                self.config.unavailable_interval,
            ),
            RelayError::Cancelled { operation } => self.retryable(
                ContingencyType::NoDisponibilidadMh,
                format!("Deadline exceeded during {operation}"),
                self.config.unavailable_interval,
            ),
            RelayError::CircuitOpen { component } => self.retryable(
                ContingencyType::NoDisponibilidadMh,
                format!("Circuit breaker open for {component}"),
                self.config.unavailable_interval,
            ),
            RelayError::Http { status, message } => self.classify_http(*status, message),
            RelayError::BatchVerificationTimeout { batch_id, .. } => self.retryable(
                ContingencyType::NoDisponibilidadMh,
                format!("Batch {batch_id} verification deadline elapsed"),
                self.config.unavailable_interval,
            ),
            other => {
                // Unknown conditions are treated conservatively: retrying an
                // unclassified failure risks duplicate submissions.
                warn!(error = %other, "Unclassified transmission error, not retrying");
                self.non_retryable(ContingencyType::Otro, other.to_string())
            }
        }
    }

    fn classify_rejection(&self, description: &str) -> ContingencyResult {
        let normalized = normalize(description);
        if normalized.contains(rejection_markers::MAINTENANCE) {
            self.retryable(
                ContingencyType::NoDisponibilidadMh,
                format!("Authority in maintenance: {description}"),
                self.config.maintenance_interval,
            )
        } else if normalized.contains(rejection_markers::OVERLOAD)
            || normalized.contains("saturado")
        {
            self.retryable(
                ContingencyType::NoDisponibilidadMh,
                format!("Authority overloaded: {description}"),
                self.config.overload_interval,
            )
        } else if normalized.contains(rejection_markers::VALIDATION)
            || normalized.contains(rejection_markers::AUTHORIZATION)
        {
            // The Authority processed the request and refused the content;
            // resubmitting the same payload cannot succeed.
            self.non_retryable(
                ContingencyType::Otro,
                format!("Authority refused document content: {description}"),
            )
        } else {
            // Every other business rejection is equally terminal.
            self.non_retryable(
                ContingencyType::Otro,
                format!("Authority rejected document: {description}"),
            )
        }
    }

    fn classify_network(&self, kind: NetworkErrorKind, message: &str) -> ContingencyResult {
        let contingency_type = match kind {
            NetworkErrorKind::ConnectionRefused | NetworkErrorKind::ConnectionReset => {
                ContingencyType::FallaSistemaEmisor
            }
            NetworkErrorKind::DnsFailure
            | NetworkErrorKind::HostUnreachable
            | NetworkErrorKind::Other => ContingencyType::FallaInternet,
            NetworkErrorKind::Timeout => ContingencyType::NoDisponibilidadMh,
        };
        let interval = match kind {
            NetworkErrorKind::Timeout => self.config.unavailable_interval,
            _ => self.config.network_interval,
        };
        self.retryable(contingency_type, format!("{kind}: {message}"), interval)
    }

    fn classify_http(&self, status: u16, message: &str) -> ContingencyResult {
        let retryable = status >= 500 || status == 429;
        if retryable {
            let interval = if status == 429 {
                self.config.overload_interval
            } else {
                self.config.unavailable_interval
            };
            self.retryable(
                ContingencyType::NoDisponibilidadMh,
                format!("Authority returned HTTP {status}: {message}"),
                interval,
            )
        } else {
            self.non_retryable(
                ContingencyType::Otro,
                format!("Authority returned HTTP {status}: {message}"),
            )
        }
    }

    fn retryable(
        &self,
        contingency_type: ContingencyType,
        reason: String,
        initial_interval: Duration,
    ) -> ContingencyResult {
        ContingencyResult {
            contingency_type,
            reason,
            retry_policy: RetryPolicy {
                retryable: true,
                max_attempts: self.config.max_attempts,
                initial_interval,
                max_interval: self.config.max_interval,
                multiplier: self.config.backoff_multiplier,
            },
        }
    }

    fn non_retryable(&self, contingency_type: ContingencyType, reason: String) -> ContingencyResult {
        ContingencyResult {
            contingency_type,
            reason,
            retry_policy: RetryPolicy::no_retry(),
        }
    }
}

/// Lowercase and strip the accented vowels that appear in Authority
/// rejection descriptions, so marker matching is spelling-tolerant.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' => 'u',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ContingencyClassifier {
        ContingencyClassifier::new()
    }

    fn rejection(description: &str) -> RelayError {
        RelayError::AuthorityRejection {
            status: "RECHAZADO".to_string(),
            message_code: Some("004".to_string()),
            description: description.to_string(),
        }
    }

    #[test]
    fn maintenance_rejection_is_retryable_with_long_backoff() {
        let result = classifier().classify(&rejection("Sistema en mantenimiento programado"));
        assert!(result.is_retryable());
        assert_eq!(result.contingency_type, ContingencyType::NoDisponibilidadMh);
        assert_eq!(
            result.retry_policy.initial_interval,
            Duration::from_secs(15 * 60)
        );
    }

    #[test]
    fn overload_rejection_is_retryable_with_short_backoff() {
        let result = classifier().classify(&rejection("Servicio en sobrecarga, reintente"));
        assert!(result.is_retryable());
        assert_eq!(
            result.retry_policy.initial_interval,
            Duration::from_secs(30)
        );
    }

    #[test]
    fn validation_rejection_never_enters_contingency() {
        let result = classifier().classify(&rejection("Error de validación en resumen"));
        assert!(!result.is_retryable());
        assert_eq!(result.contingency_type, ContingencyType::Otro);
        assert!(result.reason.contains("refused document content"));
    }

    #[test]
    fn authorization_rejection_never_enters_contingency() {
        let result = classifier().classify(&rejection("Fallo de autorización del emisor"));
        assert!(!result.is_retryable());
        assert_eq!(result.contingency_type, ContingencyType::Otro);
        assert!(result.reason.contains("refused document content"));
    }

    #[test]
    fn unrecognized_rejection_is_a_business_error() {
        let result = classifier().classify(&rejection("NIT del receptor inválido"));
        assert!(!result.is_retryable());
    }

    #[test]
    fn connection_errors_map_to_connectivity_types() {
        let refused = classifier().classify(&RelayError::Network {
            kind: NetworkErrorKind::ConnectionRefused,
            message: "ECONNREFUSED".to_string(),
        });
        assert!(refused.is_retryable());
        assert_eq!(
            refused.contingency_type,
            ContingencyType::FallaSistemaEmisor
        );

        let dns = classifier().classify(&RelayError::Network {
            kind: NetworkErrorKind::DnsFailure,
            message: "no such host".to_string(),
        });
        assert_eq!(dns.contingency_type, ContingencyType::FallaInternet);
    }

    #[test]
    fn timeout_maps_to_authority_unavailable() {
        let result = classifier().classify(&RelayError::Network {
            kind: NetworkErrorKind::Timeout,
            message: "deadline exceeded".to_string(),
        });
        assert!(result.is_retryable());
        assert_eq!(result.contingency_type, ContingencyType::NoDisponibilidadMh);
    }

    #[test]
    fn cancellation_is_retryable_unavailable() {
        let result = classifier().classify(&RelayError::Cancelled {
            operation: "send_document".to_string(),
        });
        assert!(result.is_retryable());
        assert_eq!(result.contingency_type, ContingencyType::NoDisponibilidadMh);
    }

    #[test]
    fn http_5xx_and_429_are_retryable_other_codes_are_not() {
        for status in [500, 502, 503, 504, 429] {
            let result = classifier().classify(&RelayError::Http {
                status,
                message: "unavailable".to_string(),
            });
            assert!(result.is_retryable(), "status {status} should be retryable");
        }
        for status in [400, 401, 403, 404, 409] {
            let result = classifier().classify(&RelayError::Http {
                status,
                message: "client error".to_string(),
            });
            assert!(!result.is_retryable(), "status {status} should not retry");
        }
    }

    #[test]
    fn unknown_errors_default_to_non_retryable_other() {
        let result = classifier().classify(&RelayError::Signing {
            tax_id: "0614".to_string(),
            reason: "bad key".to_string(),
        });
        assert!(!result.is_retryable());
        assert_eq!(result.contingency_type, ContingencyType::Otro);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            retryable: true,
            max_attempts: 5,
            initial_interval: Duration::from_secs(10),
            max_interval: Duration::from_secs(35),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(35));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(35));
    }
}
