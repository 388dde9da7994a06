//! # Protocol Processors
//!
//! Translate a domain document plus its signed payload into the Authority's
//! wire request, and the wire response back into a [`TransmitResult`].
//! Selection between the reception and invalidation variants is a pure
//! dispatch on the document's kind tag.

use uuid::Uuid;

use crate::constants::wire_version;
use crate::models::{
    DteDocument, DteType, SubmitKind, SubmitRequest, SubmitResponse, TransmitResult,
};

/// One protocol variant of the Authority's single-document API.
pub trait DocumentProcessor: Send + Sync {
    /// Build the wire request for a signed document.
    fn process_request(&self, signed_payload: &str, document: &DteDocument) -> SubmitRequest;

    /// Interpret the Authority's answer.
    fn process_response(&self, response: SubmitResponse) -> TransmitResult;
}

/// Reception flow: submit a new document.
pub struct SubmitProcessor {
    ambient: String,
}

impl SubmitProcessor {
    pub fn new(ambient: impl Into<String>) -> Self {
        Self {
            ambient: ambient.into(),
        }
    }
}

impl DocumentProcessor for SubmitProcessor {
    fn process_request(&self, signed_payload: &str, document: &DteDocument) -> SubmitRequest {
        SubmitRequest {
            kind: SubmitKind::Reception,
            version: wire_version::RECEPTION,
            ambient: self.ambient.clone(),
            send_id: Uuid::new_v4().to_string(),
            dte_type_code: document.dte_type.code().to_string(),
            generation_code: document.generation_code.to_uppercase(),
            document: signed_payload.to_string(),
        }
    }

    fn process_response(&self, response: SubmitResponse) -> TransmitResult {
        to_transmit_result(response)
    }
}

/// Invalidation flow: void a previously accepted document.
pub struct InvalidationProcessor {
    ambient: String,
}

impl InvalidationProcessor {
    pub fn new(ambient: impl Into<String>) -> Self {
        Self {
            ambient: ambient.into(),
        }
    }
}

impl DocumentProcessor for InvalidationProcessor {
    fn process_request(&self, signed_payload: &str, document: &DteDocument) -> SubmitRequest {
        SubmitRequest {
            kind: SubmitKind::Invalidation,
            version: wire_version::INVALIDATION,
            ambient: self.ambient.clone(),
            send_id: Uuid::new_v4().to_string(),
            dte_type_code: document.dte_type.code().to_string(),
            generation_code: document.generation_code.to_uppercase(),
            document: signed_payload.to_string(),
        }
    }

    fn process_response(&self, response: SubmitResponse) -> TransmitResult {
        to_transmit_result(response)
    }
}

/// Pick the processor for a document's kind.
pub fn processor_for(dte_type: DteType, ambient: &str) -> Box<dyn DocumentProcessor> {
    if dte_type.is_invalidation() {
        Box::new(InvalidationProcessor::new(ambient))
    } else {
        Box::new(SubmitProcessor::new(ambient))
    }
}

fn to_transmit_result(response: SubmitResponse) -> TransmitResult {
    TransmitResult {
        status: response.status,
        reception_stamp: response.reception_stamp,
        processed_at: response.processed_at,
        message_code: response.message_code,
        description: response.description,
        observations: response.observations,
    }
}
