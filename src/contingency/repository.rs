//! # Persistence Boundaries
//!
//! Repository and issuer-lookup traits consumed by the contingency layer.
//! Mapping to an actual schema lives outside this crate; these contracts are
//! what the core needs and nothing more.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{BatchResolutionUpdate, ContingencyDocument, DteDocument, NewContingencyDocument};
use crate::transmission::AuthorityCredentials;

/// Owns `ContingencyDocument` persistence. Rows are never hard-deleted:
/// resolution is recorded and the terminal state lands on the parent
/// document.
#[async_trait]
pub trait ContingencyRepository: Send + Sync {
    /// Insert a new contingency row.
    async fn create(&self, row: NewContingencyDocument) -> Result<ContingencyDocument>;

    /// Look up the row for a document's generation code, if any.
    async fn find_by_generation_code(
        &self,
        generation_code: &str,
    ) -> Result<Option<ContingencyDocument>>;

    /// Fetch up to `limit` rows still awaiting replay, oldest first.
    async fn get_pending(&self, limit: u32) -> Result<Vec<ContingencyDocument>>;

    /// Claim a set of rows for a batch: assigns the internal batch id (first
    /// assignment wins; the id is immutable once set) and records the
    /// Authority batch code.
    async fn assign_batch(&self, update: &BatchResolutionUpdate) -> Result<()>;

    /// Record the Authority's resolution of one document: appends the
    /// response observations and takes the row out of the pending set.
    async fn record_resolution(
        &self,
        generation_code: &str,
        observations: &[String],
    ) -> Result<()>;

    /// Creation time of the oldest pending row for one issuer system; start
    /// of the outage window declared in the contingency notice.
    async fn first_contingency_timestamp(
        &self,
        issuer_tax_id: &str,
    ) -> Result<Option<DateTime<Utc>>>;
}

/// Owns the parent document's authoritative status. Written only through the
/// orchestrator and batch transmitter.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Persist a document in pending state. Idempotent on generation code:
    /// storing the same document twice must not duplicate it.
    async fn store_pending(&self, document: &DteDocument) -> Result<()>;

    /// Fetch the stored payload for replay.
    async fn find_by_generation_code(&self, generation_code: &str) -> Result<Option<DteDocument>>;

    /// The Authority accepted the document.
    async fn mark_received(
        &self,
        generation_code: &str,
        reception_stamp: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<()>;

    /// The Authority terminally rejected the document.
    async fn mark_rejected(&self, generation_code: &str, description: Option<&str>) -> Result<()>;

    /// An invalidation event for this document was accepted.
    async fn mark_invalidated(&self, generation_code: &str, reception_stamp: &str) -> Result<()>;
}

/// Authority account material for one issuer system.
#[derive(Debug, Clone)]
pub struct IssuerAccount {
    pub tax_id: String,
    /// Caller-side token identifying the issuer session; cache key for
    /// Authority tokens.
    pub caller_token: String,
    pub credentials: AuthorityCredentials,
}

/// Resolves issuer account material during replay, when no request-time
/// session is available.
#[async_trait]
pub trait IssuerResolver: Send + Sync {
    async fn resolve(&self, issuer_tax_id: &str) -> Result<IssuerAccount>;
}
