//! # Contingency Records
//!
//! Persistent record of a document that failed immediate transmission and is
//! awaiting replay. Rows are created by the orchestrator, grouped into
//! batches by the batch transmitter, and never hard-deleted: terminal state
//! lands on the parent document, the contingency row keeps its history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::document::DteType;

/// Reason codes for entering contingency, as catalogued by the Authority.
/// The discriminants are the wire values sent in the contingency notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContingencyType {
    /// The Authority's system was unavailable (5xx, maintenance, overload).
    NoDisponibilidadMh = 1,
    /// The issuer's own system failed mid-transmission.
    FallaSistemaEmisor = 2,
    /// Issuer-side internet service failure (connection-level errors).
    FallaInternet = 3,
    /// Issuer-side power failure.
    FallaEnergia = 4,
    /// Any other cause; requires free-text explanation in the notice.
    Otro = 5,
}

impl ContingencyType {
    /// Numeric wire code used in the contingency notice.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for ContingencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ContingencyType::NoDisponibilidadMh => "authority_unavailable",
            ContingencyType::FallaSistemaEmisor => "issuer_system_failure",
            ContingencyType::FallaInternet => "internet_failure",
            ContingencyType::FallaEnergia => "power_failure",
            ContingencyType::Otro => "other",
        };
        write!(f, "{name}")
    }
}

/// One undelivered document awaiting replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContingencyDocument {
    /// Row id.
    pub id: Uuid,
    /// Originating branch/tenant id.
    pub branch_id: String,
    /// Issuer tax id; replay batches are grouped by this first.
    pub issuer_tax_id: String,
    /// Generation code of the stored document payload this row references.
    pub generation_code: String,
    /// Document kind; second-level replay grouping key.
    pub dte_type: DteType,
    /// Why the document entered contingency.
    pub contingency_type: ContingencyType,
    /// Human-readable cause recorded at classification time.
    pub reason: String,
    /// Internal batch correlation id. None until the batch transmitter picks
    /// the row up; immutable once assigned.
    pub batch_id: Option<Uuid>,
    /// Authority-assigned batch code, set on batch acknowledgement.
    pub mh_batch_id: Option<String>,
    /// Post-hoc notes from the Authority's resolution of this document.
    pub observations: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContingencyDocument {
    /// Whether this row has been claimed by a replay batch.
    pub fn is_batched(&self) -> bool {
        self.batch_id.is_some()
    }
}

/// Insert payload for a new contingency row; ids and timestamps are assigned
/// by the repository.
#[derive(Debug, Clone)]
pub struct NewContingencyDocument {
    pub branch_id: String,
    pub issuer_tax_id: String,
    pub generation_code: String,
    pub dte_type: DteType,
    pub contingency_type: ContingencyType,
    pub reason: String,
}

/// Write-back applied to a set of contingency rows when a batch is assigned
/// or resolved.
#[derive(Debug, Clone)]
pub struct BatchResolutionUpdate {
    /// Rows affected, by row id.
    pub ids: Vec<Uuid>,
    /// Internal batch correlation id being assigned or confirmed.
    pub batch_id: Uuid,
    /// Authority batch code, once acknowledged.
    pub mh_batch_id: Option<String>,
    /// Observations to append, keyed per row by generation code upstream and
    /// flattened here per update call.
    pub observations: Vec<String>,
}
