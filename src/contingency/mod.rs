//! # Contingency
//!
//! Fallback mode for documents the Authority could not take: durable
//! storage, grouped batch replay, and resolution write-back.

pub mod batch_transmitter;
pub mod orchestrator;
pub mod repository;
pub mod store;

pub use batch_transmitter::{
    BatchSubmission, BatchTransmitOutcome, BatchTransmitter, BatchVerification,
};
pub use orchestrator::{ContingencyOrchestrator, ContingencyOutcome, RetransmissionSummary};
pub use repository::{ContingencyRepository, DocumentRepository, IssuerAccount, IssuerResolver};
pub use store::ContingencyStore;
