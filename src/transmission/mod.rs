//! # Transmission
//!
//! Immediate delivery path to the Authority: signing boundary, protocol
//! processors, wire transport, token management, failure classification, and
//! the bounded-retry single-document transmitter.

pub mod authority;
pub mod error_classifier;
pub mod processor;
pub mod signer;
pub mod transmitter;

pub use authority::{
    AuthorityClient, AuthorityCredentials, AuthorityTokenProvider, CachingTokenProvider,
    HttpAuthorityClient,
};
pub use error_classifier::{
    ClassifierConfig, ContingencyClassifier, ContingencyResult, RetryPolicy,
};
pub use processor::{processor_for, DocumentProcessor, InvalidationProcessor, SubmitProcessor};
pub use signer::Signer;
pub use transmitter::DocumentTransmitter;
