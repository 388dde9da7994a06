//! Outcome of one transmission attempt, single or per-document-within-batch.
//! Produced by the protocol processors, consumed by callers to decide
//! "done" vs "needs contingency".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::authority_status;

/// Result of one transmission attempt as reported by the Authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmitResult {
    /// Authority status string (e.g. `PROCESADO`, `RECHAZADO`).
    pub status: String,
    /// Reception stamp; present only on acceptance.
    pub reception_stamp: Option<String>,
    /// When the Authority processed the attempt.
    pub processed_at: Option<DateTime<Utc>>,
    /// Authority message code, when provided.
    pub message_code: Option<String>,
    /// Human-readable description from the Authority.
    pub description: Option<String>,
    /// Free-text observations attached by the Authority.
    pub observations: Vec<String>,
}

impl TransmitResult {
    /// True when the Authority accepted and stamped the document.
    pub fn is_accepted(&self) -> bool {
        self.status == authority_status::PROCESADO && self.reception_stamp.is_some()
    }

    /// True when the Authority terminally rejected the document.
    pub fn is_rejected(&self) -> bool {
        self.status == authority_status::RECHAZADO
    }
}
