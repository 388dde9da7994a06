//! # Transmittable Documents
//!
//! Closed set of document kinds the relay can deliver to the Authority. The
//! kind tag drives protocol processor selection (reception vs invalidation
//! endpoint), so every document entering the transmission layer carries an
//! explicit discriminant instead of being probed structurally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire-level DTE type codes assigned by the Authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DteType {
    /// Consumer invoice ("factura", code 01).
    Invoice,
    /// Fiscal credit document ("comprobante de crédito fiscal", code 03).
    FiscalCredit,
    /// Credit note ("nota de crédito", code 05).
    CreditNote,
    /// Retention document ("comprobante de retención", code 07).
    Retention,
    /// Invalidation event for a previously accepted document.
    Invalidation,
}

impl DteType {
    /// Two-digit wire code used in reception envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            DteType::Invoice => "01",
            DteType::FiscalCredit => "03",
            DteType::CreditNote => "05",
            DteType::Retention => "07",
            DteType::Invalidation => "94",
        }
    }

    /// Whether this kind is submitted through the invalidation endpoint.
    pub fn is_invalidation(&self) -> bool {
        matches!(self, DteType::Invalidation)
    }
}

impl std::fmt::Display for DteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DteType::Invoice => "invoice",
            DteType::FiscalCredit => "fiscal_credit",
            DteType::CreditNote => "credit_note",
            DteType::Retention => "retention",
            DteType::Invalidation => "invalidation",
        };
        write!(f, "{name}")
    }
}

/// A document the relay can transmit: identification plus the JSON body the
/// issuer built. The body is treated as opaque by this crate; only the
/// identification block is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DteDocument {
    /// Document kind; selects the protocol processor.
    pub dte_type: DteType,
    /// Authority-wide unique generation code (UUID, uppercase on the wire).
    pub generation_code: String,
    /// Issuer tax id (NIT) of the originating system.
    pub issuer_tax_id: String,
    /// Originating branch/tenant id.
    pub branch_id: String,
    /// Full document body as issued, prior to signing.
    pub payload: Value,
    /// When the issuer created the document.
    pub issued_at: DateTime<Utc>,
}

impl DteDocument {
    pub fn new(
        dte_type: DteType,
        generation_code: impl Into<String>,
        issuer_tax_id: impl Into<String>,
        branch_id: impl Into<String>,
        payload: Value,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            dte_type,
            generation_code: generation_code.into(),
            issuer_tax_id: issuer_tax_id.into(),
            branch_id: branch_id.into(),
            payload,
            issued_at,
        }
    }

    /// Serialized body handed to the signer.
    pub fn serialize_payload(&self) -> Vec<u8> {
        self.payload.to_string().into_bytes()
    }
}

/// Terminal and transitional states recorded on the parent document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Stored locally, awaiting (re)transmission.
    Pending,
    /// Accepted and stamped by the Authority.
    Received,
    /// Rejected by the Authority for a business reason.
    Rejected,
    /// Invalidated through an accepted invalidation event.
    Invalidated,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dte_type_codes_match_authority_catalog() {
        assert_eq!(DteType::Invoice.code(), "01");
        assert_eq!(DteType::FiscalCredit.code(), "03");
        assert_eq!(DteType::CreditNote.code(), "05");
        assert_eq!(DteType::Retention.code(), "07");
        assert!(DteType::Invalidation.is_invalidation());
        assert!(!DteType::Invoice.is_invalidation());
    }

    #[test]
    fn payload_serializes_for_signing() {
        let doc = DteDocument::new(
            DteType::Invoice,
            "A1B2C3D4",
            "0614-010101-001-2",
            "branch-01",
            json!({"resumen": {"totalPagar": 113.0}}),
            Utc::now(),
        );
        let bytes = doc.serialize_payload();
        assert!(!bytes.is_empty());
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["resumen"]["totalPagar"], json!(113.0));
    }
}
