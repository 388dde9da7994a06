//! # Wire Envelopes
//!
//! Request/response shapes for the Authority's reception, batch, and
//! contingency endpoints. Field names follow the Authority's JSON contract
//! (camelCase, Spanish) via serde renames; struct fields stay in the crate's
//! vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which Authority endpoint a single-document request targets. Set by the
/// protocol processor from the document's kind tag; never serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmitKind {
    Reception,
    Invalidation,
}

/// Single-document submission envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(skip, default = "default_submit_kind")]
    pub kind: SubmitKind,
    #[serde(rename = "version")]
    pub version: u32,
    #[serde(rename = "ambiente")]
    pub ambient: String,
    #[serde(rename = "idEnvio")]
    pub send_id: String,
    #[serde(rename = "tipoDte")]
    pub dte_type_code: String,
    #[serde(rename = "codigoGeneracion")]
    pub generation_code: String,
    /// Signed document payload (JWS compact form).
    #[serde(rename = "documento")]
    pub document: String,
}

fn default_submit_kind() -> SubmitKind {
    SubmitKind::Reception
}

/// Authority answer to a single-document submission or status consult.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(rename = "estado")]
    pub status: String,
    #[serde(rename = "codigoGeneracion", default)]
    pub generation_code: Option<String>,
    #[serde(rename = "selloRecibido", default)]
    pub reception_stamp: Option<String>,
    #[serde(rename = "fhProcesamiento", default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(rename = "codigoMsg", default)]
    pub message_code: Option<String>,
    #[serde(rename = "descripcionMsg", default)]
    pub description: Option<String>,
    #[serde(rename = "observaciones", default)]
    pub observations: Vec<String>,
}

/// Grouped submission envelope: an ordered list of signed documents from one
/// issuer, capped at the configured batch size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(rename = "version")]
    pub version: u32,
    #[serde(rename = "ambiente")]
    pub ambient: String,
    #[serde(rename = "idEnvio")]
    pub send_id: Uuid,
    #[serde(rename = "nitEmisor")]
    pub issuer_tax_id: String,
    #[serde(rename = "documentos")]
    pub documents: Vec<String>,
}

/// Immediate acknowledgement of a batch submission. Resolution of the
/// individual documents arrives later via [`ConsultBatchResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    #[serde(rename = "estado")]
    pub status: String,
    #[serde(rename = "idEnvio", default)]
    pub send_id: Option<Uuid>,
    #[serde(rename = "codigoLote", default)]
    pub batch_code: Option<String>,
    #[serde(rename = "fhProcesamiento", default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(rename = "codigoMsg", default)]
    pub message_code: Option<String>,
    #[serde(rename = "descripcionMsg", default)]
    pub description: Option<String>,
}

/// Per-document entry in a batch consultation answer, keyed by the
/// document's own generation code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemResult {
    #[serde(rename = "estado")]
    pub status: String,
    #[serde(rename = "codigoGeneracion")]
    pub generation_code: String,
    #[serde(rename = "selloRecibido", default)]
    pub reception_stamp: Option<String>,
    #[serde(rename = "codigoMsg", default)]
    pub message_code: Option<String>,
    #[serde(rename = "descripcionMsg", default)]
    pub description: Option<String>,
    #[serde(rename = "observaciones", default)]
    pub observations: Vec<String>,
}

/// Answer to a batch status consultation: documents the Authority has
/// processed and documents it has rejected. Documents in neither list are
/// still pending on the Authority side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultBatchResponse {
    #[serde(rename = "estado", default)]
    pub status: Option<String>,
    #[serde(rename = "procesados", default)]
    pub processed: Vec<BatchItemResult>,
    #[serde(rename = "rechazados", default)]
    pub rejected: Vec<BatchItemResult>,
}

impl ConsultBatchResponse {
    /// Whether the Authority has finished processing the batch, i.e. at
    /// least one document has been resolved either way.
    pub fn has_resolutions(&self) -> bool {
        !self.processed.is_empty() || !self.rejected.is_empty()
    }
}

/// Out-of-band contingency declaration: one per originating system, naming
/// the outage window, its cause, and every affected document. Must be
/// accepted before the Authority will take that system's replay batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContingencyNotice {
    #[serde(rename = "version")]
    pub version: u32,
    #[serde(rename = "ambiente")]
    pub ambient: String,
    #[serde(rename = "nitEmisor")]
    pub issuer_tax_id: String,
    #[serde(rename = "fInicio")]
    pub window_start: DateTime<Utc>,
    #[serde(rename = "fFin")]
    pub window_end: DateTime<Utc>,
    #[serde(rename = "tipoContingencia")]
    pub contingency_type: u8,
    #[serde(rename = "motivoContingencia")]
    pub reason: String,
    /// Generation codes of every pending document covered by this notice,
    /// across all document types of the system.
    #[serde(rename = "detalleDTE")]
    pub affected_documents: Vec<ContingencyNoticeItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContingencyNoticeItem {
    #[serde(rename = "codigoGeneracion")]
    pub generation_code: String,
    #[serde(rename = "tipoDoc")]
    pub dte_type_code: String,
}

/// Authority acknowledgement of a contingency notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContingencyNoticeResponse {
    #[serde(rename = "estado")]
    pub status: String,
    #[serde(rename = "fhProcesamiento", default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(rename = "mensaje", default)]
    pub message: Option<String>,
    #[serde(rename = "selloRecibido", default)]
    pub reception_stamp: Option<String>,
}
