//! # Data Model
//!
//! Domain records and Authority wire envelopes for the relay core.

pub mod batch;
pub mod contingency;
pub mod document;
pub mod transmit_result;

pub use batch::{
    BatchItemResult, BatchRequest, BatchResponse, ConsultBatchResponse, ContingencyNotice,
    ContingencyNoticeItem, ContingencyNoticeResponse, SubmitKind, SubmitRequest, SubmitResponse,
};
pub use contingency::{
    BatchResolutionUpdate, ContingencyDocument, ContingencyType, NewContingencyDocument,
};
pub use document::{DocumentStatus, DteDocument, DteType};
pub use transmit_result::TransmitResult;
