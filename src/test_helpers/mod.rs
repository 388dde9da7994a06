//! # Test Helpers
//!
//! In-memory repositories and scripted collaborator mocks shared by unit and
//! integration tests. Not for production use.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::constants::authority_status;
use crate::contingency::repository::{
    ContingencyRepository, DocumentRepository, IssuerAccount, IssuerResolver,
};
use crate::error::{RelayError, Result};
use crate::models::{
    BatchRequest, BatchResolutionUpdate, BatchResponse, ConsultBatchResponse, ContingencyDocument,
    ContingencyNotice, ContingencyNoticeResponse, ContingencyType, DocumentStatus, DteDocument,
    DteType, NewContingencyDocument, SubmitRequest, SubmitResponse,
};
use crate::transmission::{AuthorityClient, AuthorityCredentials, AuthorityTokenProvider, Signer};
use crate::utils::Clock;

// ---------------------------------------------------------------------------
// Response builders
// ---------------------------------------------------------------------------

/// An accepted single-document answer carrying the given stamp.
pub fn accepted_response(stamp: &str) -> SubmitResponse {
    SubmitResponse {
        status: authority_status::PROCESADO.to_string(),
        generation_code: None,
        reception_stamp: Some(stamp.to_string()),
        processed_at: Some(Utc::now()),
        message_code: Some("001".to_string()),
        description: Some("RECIBIDO".to_string()),
        observations: vec![],
    }
}

/// A non-terminal single-document answer.
pub fn unresolved_response(status: &str) -> SubmitResponse {
    SubmitResponse {
        status: status.to_string(),
        generation_code: None,
        reception_stamp: None,
        processed_at: None,
        message_code: None,
        description: None,
        observations: vec![],
    }
}

/// A batch acknowledgement with the given Authority batch code.
pub fn batch_ack(batch_code: &str) -> BatchResponse {
    BatchResponse {
        status: authority_status::RECIBIDO.to_string(),
        send_id: None,
        batch_code: Some(batch_code.to_string()),
        processed_at: Some(Utc::now()),
        message_code: None,
        description: None,
    }
}

/// A bare contingency row for grouping/unit tests that bypass repositories.
pub fn contingency_row(
    generation_code: &str,
    issuer_tax_id: &str,
    dte_type: DteType,
    contingency_type: ContingencyType,
) -> ContingencyDocument {
    ContingencyDocument {
        id: Uuid::new_v4(),
        branch_id: "branch-01".to_string(),
        issuer_tax_id: issuer_tax_id.to_string(),
        generation_code: generation_code.to_string(),
        dte_type,
        contingency_type,
        reason: "seeded".to_string(),
        batch_id: None,
        mh_batch_id: None,
        observations: vec![],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Seed `count` pending invoices (payload + contingency row) through the
/// in-memory repositories. Generation codes are `{prefix}-0000` onward.
pub async fn seeded_contingency(
    contingency_repo: &Arc<InMemoryContingencyRepository>,
    document_repo: &Arc<InMemoryDocumentRepository>,
    prefix: &str,
    count: usize,
) -> Vec<ContingencyDocument> {
    let mut rows = Vec::with_capacity(count);
    for i in 0..count {
        let generation_code = format!("{prefix}-{i:04}");
        let document = DteDocument::new(
            DteType::Invoice,
            generation_code.clone(),
            "0614-010101-001-2",
            "branch-01",
            serde_json::json!({"seq": i}),
            Utc::now() - ChronoDuration::minutes((count - i) as i64),
        );
        document_repo.store_pending(&document).await.unwrap();
        let row = contingency_repo
            .create(NewContingencyDocument {
                branch_id: document.branch_id.clone(),
                issuer_tax_id: document.issuer_tax_id.clone(),
                generation_code,
                dte_type: document.dte_type,
                contingency_type: ContingencyType::NoDisponibilidadMh,
                reason: "authority unavailable".to_string(),
            })
            .await
            .unwrap();
        rows.push(row);
    }
    rows
}

// ---------------------------------------------------------------------------
// Collaborator mocks
// ---------------------------------------------------------------------------

/// Deterministic signer; optionally fails every call.
#[derive(Debug, Default)]
pub struct StaticSigner {
    failure: Option<String>,
}

impl StaticSigner {
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
        }
    }
}

#[async_trait]
impl Signer for StaticSigner {
    async fn sign(&self, payload: &[u8], tax_id: &str) -> Result<String> {
        if let Some(reason) = &self.failure {
            return Err(RelayError::Signing {
                tax_id: tax_id.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(format!("jws:{tax_id}:{}", payload.len()))
    }
}

/// Token provider that always hands out the same token.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl AuthorityTokenProvider for StaticTokenProvider {
    async fn get_or_create_token(&self, _: &str, _: &AuthorityCredentials) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// Controllable clock: `sleep` records the request and advances virtual
/// time without actually waiting.
pub struct MockClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn sleep_count(&self) -> usize {
        self.sleeps.lock().len()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        let mut now = self.now.lock();
        *now += ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::zero());
    }
}

/// Scripted Authority client. Each endpoint pops from its own response
/// queue; sensible defaults apply when a queue is empty so long flows do not
/// need every call scripted. Calls are counted and notice/batch submissions
/// recorded in arrival order for sequencing assertions.
pub struct ScriptedAuthorityClient {
    send_document: Mutex<VecDeque<Result<SubmitResponse>>>,
    check_status: Mutex<VecDeque<Result<SubmitResponse>>>,
    send_batch: Mutex<VecDeque<Result<BatchResponse>>>,
    consult_batch: Mutex<VecDeque<Result<ConsultBatchResponse>>>,
    notice: Mutex<VecDeque<Result<ContingencyNoticeResponse>>>,
    counts: Mutex<HashMap<&'static str, usize>>,
    events: Mutex<Vec<String>>,
}

impl ScriptedAuthorityClient {
    pub fn new() -> Self {
        Self {
            send_document: Mutex::new(VecDeque::new()),
            check_status: Mutex::new(VecDeque::new()),
            send_batch: Mutex::new(VecDeque::new()),
            consult_batch: Mutex::new(VecDeque::new()),
            notice: Mutex::new(VecDeque::new()),
            counts: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn script_send_document(&self, response: Result<SubmitResponse>) {
        self.send_document.lock().push_back(response);
    }

    pub fn script_check_status(&self, response: Result<SubmitResponse>) {
        self.check_status.lock().push_back(response);
    }

    pub fn script_send_batch(&self, response: Result<BatchResponse>) {
        self.send_batch.lock().push_back(response);
    }

    pub fn script_consult_batch(&self, response: Result<ConsultBatchResponse>) {
        self.consult_batch.lock().push_back(response);
    }

    pub fn script_contingency_notice(&self, response: Result<ContingencyNoticeResponse>) {
        self.notice.lock().push_back(response);
    }

    pub fn send_document_calls(&self) -> usize {
        self.count_of("send_document")
    }

    pub fn check_status_calls(&self) -> usize {
        self.count_of("check_status")
    }

    pub fn send_batch_calls(&self) -> usize {
        self.count_of("send_batch")
    }

    pub fn consult_batch_calls(&self) -> usize {
        self.count_of("consult_batch")
    }

    pub fn notice_calls(&self) -> usize {
        self.count_of("notice")
    }

    /// Notice and batch submissions in arrival order, as
    /// `notice:{tax_id}` / `batch:{tax_id}` entries.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn count_of(&self, name: &'static str) -> usize {
        self.counts.lock().get(name).copied().unwrap_or(0)
    }

    fn record(&self, name: &'static str) {
        *self.counts.lock().entry(name).or_insert(0) += 1;
    }
}

impl Default for ScriptedAuthorityClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthorityClient for ScriptedAuthorityClient {
    async fn authenticate(&self, credentials: &AuthorityCredentials) -> Result<String> {
        self.record("authenticate");
        Ok(format!("token-{}", credentials.user))
    }

    async fn send_document(&self, _: &str, _: &SubmitRequest) -> Result<SubmitResponse> {
        self.record("send_document");
        self.send_document
            .lock()
            .pop_front()
            .unwrap_or_else(|| {
                Err(RelayError::Validation {
                    field: "test".to_string(),
                    reason: "no scripted send_document response".to_string(),
                })
            })
    }

    async fn check_status(&self, _: &str, _: &str) -> Result<SubmitResponse> {
        self.record("check_status");
        self.check_status
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(unresolved_response("NO_ENCONTRADO")))
    }

    async fn send_batch(&self, _: &str, request: &BatchRequest) -> Result<BatchResponse> {
        self.record("send_batch");
        self.events
            .lock()
            .push(format!("batch:{}", request.issuer_tax_id));
        let n = self.send_batch_calls();
        self.send_batch
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(batch_ack(&format!("LOTE-AUTO-{n}"))))
    }

    async fn consult_batch(&self, _: &str, _: &str) -> Result<ConsultBatchResponse> {
        self.record("consult_batch");
        self.consult_batch.lock().pop_front().unwrap_or_else(|| {
            Ok(ConsultBatchResponse {
                status: Some(authority_status::EN_PROCESO.to_string()),
                processed: vec![],
                rejected: vec![],
            })
        })
    }

    async fn send_contingency_notice(
        &self,
        _: &str,
        notice: &ContingencyNotice,
    ) -> Result<ContingencyNoticeResponse> {
        self.record("notice");
        self.events
            .lock()
            .push(format!("notice:{}", notice.issuer_tax_id));
        self.notice.lock().pop_front().unwrap_or_else(|| {
            Ok(ContingencyNoticeResponse {
                status: authority_status::RECIBIDO.to_string(),
                processed_at: Some(Utc::now()),
                message: None,
                reception_stamp: Some("SELLO-NOTICE".to_string()),
            })
        })
    }
}

/// Issuer lookup with optional per-system failures.
pub struct StaticIssuerResolver {
    fail_for: Mutex<HashSet<String>>,
}

impl StaticIssuerResolver {
    pub fn new() -> Self {
        Self {
            fail_for: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_for(&self, issuer_tax_id: &str) {
        self.fail_for.lock().insert(issuer_tax_id.to_string());
    }
}

impl Default for StaticIssuerResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IssuerResolver for StaticIssuerResolver {
    async fn resolve(&self, issuer_tax_id: &str) -> Result<IssuerAccount> {
        if self.fail_for.lock().contains(issuer_tax_id) {
            return Err(RelayError::Repository {
                operation: "resolve_issuer".to_string(),
                reason: format!("unknown issuer {issuer_tax_id}"),
            });
        }
        Ok(IssuerAccount {
            tax_id: issuer_tax_id.to_string(),
            caller_token: format!("caller-{issuer_tax_id}"),
            credentials: AuthorityCredentials {
                user: issuer_tax_id.to_string(),
                password: "secret".to_string(),
            },
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory repositories
// ---------------------------------------------------------------------------

/// In-memory `ContingencyRepository`. Rows whose resolution has been
/// recorded leave the pending set but are never deleted.
pub struct InMemoryContingencyRepository {
    rows: Mutex<Vec<ContingencyDocument>>,
    resolved: Mutex<HashSet<String>>,
}

impl InMemoryContingencyRepository {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            resolved: Mutex::new(HashSet::new()),
        }
    }

    pub fn pending_count(&self) -> usize {
        let resolved = self.resolved.lock();
        self.rows
            .lock()
            .iter()
            .filter(|row| !resolved.contains(&row.generation_code))
            .count()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().len()
    }
}

impl Default for InMemoryContingencyRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContingencyRepository for InMemoryContingencyRepository {
    async fn create(&self, row: NewContingencyDocument) -> Result<ContingencyDocument> {
        let now = Utc::now();
        let created = ContingencyDocument {
            id: Uuid::new_v4(),
            branch_id: row.branch_id,
            issuer_tax_id: row.issuer_tax_id,
            generation_code: row.generation_code,
            dte_type: row.dte_type,
            contingency_type: row.contingency_type,
            reason: row.reason,
            batch_id: None,
            mh_batch_id: None,
            observations: vec![],
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().push(created.clone());
        Ok(created)
    }

    async fn find_by_generation_code(
        &self,
        generation_code: &str,
    ) -> Result<Option<ContingencyDocument>> {
        Ok(self
            .rows
            .lock()
            .iter()
            .find(|row| row.generation_code == generation_code)
            .cloned())
    }

    async fn get_pending(&self, limit: u32) -> Result<Vec<ContingencyDocument>> {
        let resolved = self.resolved.lock();
        let mut pending: Vec<ContingencyDocument> = self
            .rows
            .lock()
            .iter()
            .filter(|row| !resolved.contains(&row.generation_code))
            .cloned()
            .collect();
        pending.sort_by_key(|row| row.created_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn assign_batch(&self, update: &BatchResolutionUpdate) -> Result<()> {
        let mut rows = self.rows.lock();
        for row in rows.iter_mut() {
            if update.ids.contains(&row.id) {
                // First assignment wins; the internal batch id is immutable.
                if row.batch_id.is_none() {
                    row.batch_id = Some(update.batch_id);
                }
                row.mh_batch_id = update.mh_batch_id.clone();
                row.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn record_resolution(
        &self,
        generation_code: &str,
        observations: &[String],
    ) -> Result<()> {
        let mut rows = self.rows.lock();
        if let Some(row) = rows
            .iter_mut()
            .find(|row| row.generation_code == generation_code)
        {
            row.observations.extend(observations.iter().cloned());
            row.updated_at = Utc::now();
        }
        self.resolved.lock().insert(generation_code.to_string());
        Ok(())
    }

    async fn first_contingency_timestamp(
        &self,
        issuer_tax_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let resolved = self.resolved.lock();
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|row| {
                row.issuer_tax_id == issuer_tax_id && !resolved.contains(&row.generation_code)
            })
            .map(|row| row.created_at)
            .min())
    }
}

struct StoredDocument {
    document: DteDocument,
    status: DocumentStatus,
    reception_stamp: Option<String>,
    rejection_description: Option<String>,
}

/// In-memory `DocumentRepository`.
pub struct InMemoryDocumentRepository {
    documents: Mutex<HashMap<String, StoredDocument>>,
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
        }
    }

    pub fn contains(&self, generation_code: &str) -> bool {
        self.documents.lock().contains_key(generation_code)
    }

    pub fn status_of(&self, generation_code: &str) -> Option<DocumentStatus> {
        self.documents
            .lock()
            .get(generation_code)
            .map(|stored| stored.status)
    }

    pub fn stamp_of(&self, generation_code: &str) -> Option<String> {
        self.documents
            .lock()
            .get(generation_code)
            .and_then(|stored| stored.reception_stamp.clone())
    }

    pub fn rejection_of(&self, generation_code: &str) -> Option<String> {
        self.documents
            .lock()
            .get(generation_code)
            .and_then(|stored| stored.rejection_description.clone())
    }

    fn update(
        &self,
        generation_code: &str,
        apply: impl FnOnce(&mut StoredDocument),
    ) -> Result<()> {
        let mut documents = self.documents.lock();
        match documents.get_mut(generation_code) {
            Some(stored) => {
                apply(stored);
                Ok(())
            }
            None => Err(RelayError::Repository {
                operation: "update_document".to_string(),
                reason: format!("document {generation_code} not found"),
            }),
        }
    }
}

impl Default for InMemoryDocumentRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn store_pending(&self, document: &DteDocument) -> Result<()> {
        self.documents
            .lock()
            .entry(document.generation_code.clone())
            .or_insert_with(|| StoredDocument {
                document: document.clone(),
                status: DocumentStatus::Pending,
                reception_stamp: None,
                rejection_description: None,
            });
        Ok(())
    }

    async fn find_by_generation_code(&self, generation_code: &str) -> Result<Option<DteDocument>> {
        Ok(self
            .documents
            .lock()
            .get(generation_code)
            .map(|stored| stored.document.clone()))
    }

    async fn mark_received(
        &self,
        generation_code: &str,
        reception_stamp: &str,
        _processed_at: DateTime<Utc>,
    ) -> Result<()> {
        self.update(generation_code, |stored| {
            stored.status = DocumentStatus::Received;
            stored.reception_stamp = Some(reception_stamp.to_string());
        })
    }

    async fn mark_rejected(&self, generation_code: &str, description: Option<&str>) -> Result<()> {
        self.update(generation_code, |stored| {
            stored.status = DocumentStatus::Rejected;
            stored.rejection_description = description.map(str::to_string);
        })
    }

    async fn mark_invalidated(&self, generation_code: &str, reception_stamp: &str) -> Result<()> {
        self.update(generation_code, |stored| {
            stored.status = DocumentStatus::Invalidated;
            stored.reception_stamp = Some(reception_stamp.to_string());
        })
    }
}
