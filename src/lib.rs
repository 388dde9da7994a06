//! # DTE Relay
//!
//! Reliable delivery core for legally-binding electronic tax documents
//! (DTE). Issuing systems hand finished documents to this crate; it signs
//! and transmits them to the tax Authority, absorbs the Authority's
//! unreliability, and guarantees that every document eventually reaches a
//! terminal state: stamped, rejected, or invalidated.
//!
//! ## Architecture
//!
//! - **transmission**: immediate single-document path. Sign, send, bounded
//!   retries, one idempotent status check on ambiguous answers. Also home to
//!   the error classifier that decides what counts as retryable and which
//!   legal contingency category a failure maps to.
//! - **contingency**: fallback mode. Documents the Authority could not take
//!   are stored durably, declared through a contingency notice, and replayed
//!   later in size-bounded batches whose resolution is polled asynchronously.
//! - **resilience**: circuit breaker shared by the replay path, so a dead
//!   Authority is probed instead of hammered.
//! - **scheduler**: periodic single-instance job driving the replay flow.
//!
//! Persistence and issuer account lookup stay behind the traits in
//! [`contingency::repository`]; signing stays behind [`transmission::Signer`].
//! The crate owns delivery semantics, nothing else.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use dte_relay::config::RelayConfig;
//! use dte_relay::transmission::{CachingTokenProvider, HttpAuthorityClient};
//!
//! # fn main() -> dte_relay::error::Result<()> {
//! let config = RelayConfig::from_env()?;
//! config.validate()?;
//! let client = Arc::new(HttpAuthorityClient::new(&config.authority)?);
//! let tokens = Arc::new(CachingTokenProvider::new(
//!     client.clone(),
//!     config.authority.token_ttl(),
//! ));
//! # let _ = tokens;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod contingency;
pub mod error;
pub mod logging;
pub mod models;
pub mod resilience;
pub mod scheduler;
pub mod transmission;
pub mod utils;

#[doc(hidden)]
pub mod test_helpers;

pub use config::RelayConfig;
pub use contingency::{ContingencyOrchestrator, ContingencyStore};
pub use error::{RelayError, Result};
pub use models::{DteDocument, DteType, TransmitResult};
pub use resilience::CircuitBreaker;
pub use scheduler::RetransmissionJob;
pub use transmission::{ContingencyClassifier, DocumentTransmitter};
