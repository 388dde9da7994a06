//! # Batch Transmitter
//!
//! Replays previously-stored contingency documents: signs and groups them
//! into size-bounded batches, submits each batch through the circuit
//! breaker, and polls the Authority for the batch's asynchronous resolution,
//! fanning per-document outcomes back into stored state.
//!
//! Token acquisition and submission retries both reuse the error
//! classifier's retryable/non-retryable verdict.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BatchConfig;
use crate::constants::wire_version;
use crate::contingency::repository::{ContingencyRepository, DocumentRepository};
use crate::error::{RelayError, Result};
use crate::models::{
    BatchRequest, BatchResolutionUpdate, ContingencyDocument, DteType,
};
use crate::resilience::CircuitBreaker;
use crate::transmission::{
    AuthorityClient, AuthorityCredentials, AuthorityTokenProvider, ContingencyClassifier, Signer,
};
use crate::utils::Clock;

/// One acknowledged batch: correlation ids plus the contingency rows it
/// carries, keyed by generation code for resolution fan-out.
#[derive(Debug, Clone)]
pub struct BatchSubmission {
    pub batch_id: Uuid,
    pub mh_batch_id: String,
    pub documents: HashMap<String, ContingencyDocument>,
}

/// Result of one `transmit_batch` call. Submissions acknowledged before a
/// failure are preserved so the caller can still verify them.
#[derive(Debug, Default)]
pub struct BatchTransmitOutcome {
    pub submissions: Vec<BatchSubmission>,
    /// First terminal failure, if the run did not complete. Documents in
    /// unsubmitted chunks stay pending.
    pub error: Option<RelayError>,
}

/// Final disposition of one verification poll loop. Every document passed in
/// ends in exactly one of the three lists.
#[derive(Debug, Default)]
pub struct BatchVerification {
    pub received: Vec<String>,
    pub rejected: Vec<String>,
    pub still_pending: Vec<String>,
}

pub struct BatchTransmitter {
    signer: Arc<dyn Signer>,
    client: Arc<dyn AuthorityClient>,
    token_provider: Arc<dyn AuthorityTokenProvider>,
    breaker: Arc<CircuitBreaker>,
    contingency_repo: Arc<dyn ContingencyRepository>,
    document_repo: Arc<dyn DocumentRepository>,
    classifier: ContingencyClassifier,
    clock: Arc<dyn Clock>,
    ambient: String,
    config: BatchConfig,
}

impl BatchTransmitter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        signer: Arc<dyn Signer>,
        client: Arc<dyn AuthorityClient>,
        token_provider: Arc<dyn AuthorityTokenProvider>,
        breaker: Arc<CircuitBreaker>,
        contingency_repo: Arc<dyn ContingencyRepository>,
        document_repo: Arc<dyn DocumentRepository>,
        classifier: ContingencyClassifier,
        clock: Arc<dyn Clock>,
        ambient: impl Into<String>,
        config: BatchConfig,
    ) -> Self {
        Self {
            signer,
            client,
            token_provider,
            breaker,
            contingency_repo,
            document_repo,
            classifier,
            clock,
            ambient: ambient.into(),
            config,
        }
    }

    /// Acquire an Authority token, retrying per the classifier's verdict on
    /// each failure.
    pub async fn acquire_token(
        &self,
        caller_token: &str,
        credentials: &AuthorityCredentials,
    ) -> Result<String> {
        let mut attempt = 1u32;
        loop {
            match self
                .token_provider
                .get_or_create_token(caller_token, credentials)
                .await
            {
                Ok(token) => return Ok(token),
                Err(error) => {
                    let classification = self.classifier.classify(&error);
                    if !classification.is_retryable() || attempt >= self.config.token_max_attempts {
                        return Err(error);
                    }
                    warn!(
                        issuer = %credentials.user,
                        attempt,
                        error = %error,
                        "Token acquisition failed, retrying"
                    );
                    self.clock.sleep(self.config.token_retry_delay()).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Sign and submit one system/type group of contingency rows, chunked
    /// into batches of at most the configured size. Each acknowledged batch
    /// claims its rows (internal batch id, Authority batch code) before the
    /// next chunk is sent.
    pub async fn transmit_batch(
        &self,
        issuer_tax_id: &str,
        dte_type: DteType,
        rows: &[ContingencyDocument],
        caller_token: &str,
        credentials: &AuthorityCredentials,
    ) -> Result<BatchTransmitOutcome> {
        let token = self.acquire_token(caller_token, credentials).await?;
        let mut outcome = BatchTransmitOutcome::default();

        info!(
            issuer = %issuer_tax_id,
            dte_type = %dte_type,
            documents = rows.len(),
            batch_size = self.config.max_batch_size,
            "📦 Starting batch transmission"
        );

        for chunk in rows.chunks(self.config.max_batch_size) {
            let (signed, included) = match self.sign_chunk(chunk).await {
                Ok(pair) => pair,
                Err(error) => {
                    outcome.error = Some(error);
                    return Ok(outcome);
                }
            };
            if included.is_empty() {
                continue;
            }

            match self
                .submit_chunk(issuer_tax_id, &token, signed, &included)
                .await
            {
                Ok(submission) => outcome.submissions.push(submission),
                Err(error) => {
                    // Remaining chunks would hit the same condition; stop
                    // here and leave them pending for the next run.
                    outcome.error = Some(error);
                    return Ok(outcome);
                }
            }
        }

        Ok(outcome)
    }

    /// Poll the Authority for a batch's resolution until every document is
    /// reported or the deadline elapses. Processed documents are marked
    /// received (or invalidated, for invalidation events), rejected
    /// documents are marked rejected; anything unreported stays pending for
    /// the next scheduled run.
    pub async fn verify_contingency_batch_status(
        &self,
        batch_id: Uuid,
        mh_batch_id: &str,
        token: &str,
        documents: &HashMap<String, ContingencyDocument>,
    ) -> Result<BatchVerification> {
        let mut verification = BatchVerification::default();
        let mut resolved: HashSet<String> = HashSet::new();

        let interval = self.config.poll_interval();
        let polls = (self.config.poll_deadline().as_secs() / interval.as_secs().max(1)).max(1);

        for poll in 1..=polls {
            self.clock.sleep(interval).await;

            match self.client.consult_batch(token, mh_batch_id).await {
                Ok(response) => {
                    for item in &response.processed {
                        if let Some(row) = documents.get(&item.generation_code) {
                            if resolved.insert(item.generation_code.clone()) {
                                self.apply_acceptance(row, item.reception_stamp.as_deref())
                                    .await?;
                                self.contingency_repo
                                    .record_resolution(&item.generation_code, &item.observations)
                                    .await?;
                                verification.received.push(item.generation_code.clone());
                            }
                        }
                    }
                    for item in &response.rejected {
                        if documents.contains_key(&item.generation_code)
                            && resolved.insert(item.generation_code.clone())
                        {
                            self.document_repo
                                .mark_rejected(&item.generation_code, item.description.as_deref())
                                .await?;
                            self.contingency_repo
                                .record_resolution(&item.generation_code, &item.observations)
                                .await?;
                            verification.rejected.push(item.generation_code.clone());
                        }
                    }

                    if resolved.len() == documents.len() {
                        info!(
                            batch_id = %batch_id,
                            mh_batch_id = %mh_batch_id,
                            received = verification.received.len(),
                            rejected = verification.rejected.len(),
                            polls = poll,
                            "✅ Batch fully resolved"
                        );
                        return Ok(verification);
                    }
                    debug!(
                        batch_id = %batch_id,
                        resolved = resolved.len(),
                        total = documents.len(),
                        poll,
                        "Batch partially resolved, polling again"
                    );
                }
                Err(error) => {
                    let classification = self.classifier.classify(&error);
                    if !classification.is_retryable() {
                        warn!(
                            batch_id = %batch_id,
                            error = %error,
                            "Batch consultation failed terminally, leaving documents pending"
                        );
                        break;
                    }
                    warn!(batch_id = %batch_id, error = %error, "Batch consultation failed, will poll again");
                }
            }
        }

        verification.still_pending = documents
            .keys()
            .filter(|code| !resolved.contains(*code))
            .cloned()
            .collect();
        info!(
            batch_id = %batch_id,
            mh_batch_id = %mh_batch_id,
            received = verification.received.len(),
            rejected = verification.rejected.len(),
            still_pending = verification.still_pending.len(),
            "⏳ Batch verification window closed, unreported documents stay pending"
        );
        Ok(verification)
    }

    async fn sign_chunk<'a>(
        &self,
        chunk: &'a [ContingencyDocument],
    ) -> Result<(Vec<String>, Vec<&'a ContingencyDocument>)> {
        let mut signed = Vec::with_capacity(chunk.len());
        let mut included = Vec::with_capacity(chunk.len());
        for row in chunk {
            let document = match self
                .document_repo
                .find_by_generation_code(&row.generation_code)
                .await?
            {
                Some(document) => document,
                None => {
                    warn!(
                        generation_code = %row.generation_code,
                        "Contingency row has no stored payload, skipping"
                    );
                    continue;
                }
            };
            let payload = document.serialize_payload();
            signed.push(self.signer.sign(&payload, &document.issuer_tax_id).await?);
            included.push(row);
        }
        Ok((signed, included))
    }

    async fn submit_chunk(
        &self,
        issuer_tax_id: &str,
        token: &str,
        signed: Vec<String>,
        included: &[&ContingencyDocument],
    ) -> Result<BatchSubmission> {
        let batch_id = Uuid::new_v4();
        let request = BatchRequest {
            version: wire_version::BATCH,
            ambient: self.ambient.clone(),
            send_id: batch_id,
            issuer_tax_id: issuer_tax_id.to_string(),
            documents: signed,
        };

        let mut attempt = 1u32;
        loop {
            if !self.breaker.allow_request() {
                return Err(RelayError::CircuitOpen {
                    component: self.breaker.name().to_string(),
                });
            }

            match self.client.send_batch(token, &request).await {
                Ok(ack) => {
                    self.breaker.record_success();
                    let mh_batch_id = match ack.batch_code {
                        Some(code) => code,
                        None => {
                            return Err(RelayError::AuthorityUnresolved {
                                status: ack.status,
                            })
                        }
                    };

                    self.contingency_repo
                        .assign_batch(&BatchResolutionUpdate {
                            ids: included.iter().map(|row| row.id).collect(),
                            batch_id,
                            mh_batch_id: Some(mh_batch_id.clone()),
                            observations: vec![],
                        })
                        .await?;

                    info!(
                        batch_id = %batch_id,
                        mh_batch_id = %mh_batch_id,
                        documents = included.len(),
                        "📨 Batch acknowledged by Authority"
                    );
                    return Ok(BatchSubmission {
                        batch_id,
                        mh_batch_id,
                        documents: included
                            .iter()
                            .map(|row| (row.generation_code.clone(), (*row).clone()))
                            .collect(),
                    });
                }
                Err(error) => {
                    // A business rejection is the Authority answering; only
                    // infrastructure failures count against the breaker.
                    if !error.is_business_answer() {
                        self.breaker.record_failure();
                    }
                    let classification = self.classifier.classify(&error);
                    if !classification.is_retryable()
                        || attempt >= classification.retry_policy.max_attempts
                    {
                        return Err(error);
                    }
                    let delay = classification.retry_policy.delay_for_attempt(attempt);
                    warn!(
                        batch_id = %batch_id,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %error,
                        "Batch submission failed, retrying"
                    );
                    self.clock.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn apply_acceptance(
        &self,
        row: &ContingencyDocument,
        reception_stamp: Option<&str>,
    ) -> Result<()> {
        let stamp = reception_stamp.unwrap_or_default();
        if row.dte_type == DteType::Invalidation {
            self.document_repo
                .mark_invalidated(&row.generation_code, stamp)
                .await
        } else {
            self.document_repo
                .mark_received(&row.generation_code, stamp, self.clock.now())
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchConfig;
    use crate::error::NetworkErrorKind;
    use crate::models::{BatchItemResult, ConsultBatchResponse, DocumentStatus};
    use crate::resilience::{CircuitBreakerConfig, CircuitState};
    use crate::test_helpers::{
        batch_ack, seeded_contingency, InMemoryContingencyRepository, InMemoryDocumentRepository,
        MockClock, ScriptedAuthorityClient, StaticSigner, StaticTokenProvider,
    };
    use std::time::Duration;

    fn credentials() -> AuthorityCredentials {
        AuthorityCredentials {
            user: "0614-010101-001-2".to_string(),
            password: "secret".to_string(),
        }
    }

    struct Fixture {
        client: Arc<ScriptedAuthorityClient>,
        breaker: Arc<CircuitBreaker>,
        contingency_repo: Arc<InMemoryContingencyRepository>,
        document_repo: Arc<InMemoryDocumentRepository>,
        clock: Arc<MockClock>,
        transmitter: BatchTransmitter,
    }

    fn fixture(config: BatchConfig) -> Fixture {
        let client = Arc::new(ScriptedAuthorityClient::new());
        let breaker = Arc::new(CircuitBreaker::new(
            "authority",
            CircuitBreakerConfig {
                failure_threshold: 3,
                cooldown: Duration::from_secs(300),
            },
        ));
        let contingency_repo = Arc::new(InMemoryContingencyRepository::new());
        let document_repo = Arc::new(InMemoryDocumentRepository::new());
        let clock = Arc::new(MockClock::new());
        let transmitter = BatchTransmitter::new(
            Arc::new(StaticSigner::default()),
            client.clone(),
            Arc::new(StaticTokenProvider::new("authority-token")),
            breaker.clone(),
            contingency_repo.clone(),
            document_repo.clone(),
            ContingencyClassifier::new(),
            clock.clone(),
            "00",
            config,
        );
        Fixture {
            client,
            breaker,
            contingency_repo,
            document_repo,
            clock,
            transmitter,
        }
    }

    #[tokio::test]
    async fn chunks_large_pending_set_into_sequential_batches() {
        let fx = fixture(BatchConfig {
            max_batch_size: 100,
            ..BatchConfig::default()
        });
        let rows = seeded_contingency(&fx.contingency_repo, &fx.document_repo, "gen", 250).await;
        for n in 0..3 {
            fx.client.script_send_batch(Ok(batch_ack(&format!("LOTE-{n}"))));
        }

        let outcome = fx
            .transmitter
            .transmit_batch(
                "0614-010101-001-2",
                DteType::Invoice,
                &rows,
                "caller",
                &credentials(),
            )
            .await
            .unwrap();

        assert!(outcome.error.is_none());
        assert_eq!(outcome.submissions.len(), 3);
        assert_eq!(outcome.submissions[0].documents.len(), 100);
        assert_eq!(outcome.submissions[2].documents.len(), 50);
        assert_eq!(fx.client.send_batch_calls(), 3);

        // Every submitted row now carries its batch correlation ids.
        let row = fx
            .contingency_repo
            .find_by_generation_code("gen-0000")
            .await
            .unwrap()
            .unwrap();
        assert!(row.batch_id.is_some());
        assert_eq!(row.mh_batch_id.as_deref(), Some("LOTE-0"));
    }

    #[tokio::test]
    async fn open_breaker_rejects_submission_without_io() {
        let fx = fixture(BatchConfig::default());
        let rows = seeded_contingency(&fx.contingency_repo, &fx.document_repo, "gen", 2).await;
        for _ in 0..3 {
            fx.breaker.record_failure();
        }
        assert_eq!(fx.breaker.state(), CircuitState::Open);

        let outcome = fx
            .transmitter
            .transmit_batch(
                "0614-010101-001-2",
                DteType::Invoice,
                &rows,
                "caller",
                &credentials(),
            )
            .await
            .unwrap();

        assert!(matches!(
            outcome.error,
            Some(RelayError::CircuitOpen { .. })
        ));
        assert!(outcome.submissions.is_empty());
        assert_eq!(fx.client.send_batch_calls(), 0);
    }

    #[tokio::test]
    async fn repeated_submission_failures_open_the_breaker() {
        let fx = fixture(BatchConfig::default());
        let rows = seeded_contingency(&fx.contingency_repo, &fx.document_repo, "gen", 1).await;
        for _ in 0..3 {
            fx.client.script_send_batch(Err(RelayError::Network {
                kind: NetworkErrorKind::Timeout,
                message: "timeout".to_string(),
            }));
        }

        let outcome = fx
            .transmitter
            .transmit_batch(
                "0614-010101-001-2",
                DteType::Invoice,
                &rows,
                "caller",
                &credentials(),
            )
            .await
            .unwrap();

        assert!(outcome.error.is_some());
        assert_eq!(fx.breaker.state(), CircuitState::Open);
        assert_eq!(fx.breaker.failure_count(), 3);
    }

    #[tokio::test]
    async fn verification_fans_results_out_to_documents() {
        let fx = fixture(BatchConfig::default());
        let rows = seeded_contingency(&fx.contingency_repo, &fx.document_repo, "gen", 3).await;
        let documents: HashMap<String, ContingencyDocument> = rows
            .iter()
            .map(|row| (row.generation_code.clone(), row.clone()))
            .collect();

        fx.client.script_consult_batch(Ok(ConsultBatchResponse {
            status: Some("PROCESADO".to_string()),
            processed: vec![
                BatchItemResult {
                    status: "PROCESADO".to_string(),
                    generation_code: "gen-0000".to_string(),
                    reception_stamp: Some("SELLO-0".to_string()),
                    message_code: None,
                    description: None,
                    observations: vec![],
                },
                BatchItemResult {
                    status: "PROCESADO".to_string(),
                    generation_code: "gen-0001".to_string(),
                    reception_stamp: Some("SELLO-1".to_string()),
                    message_code: None,
                    description: None,
                    observations: vec![],
                },
            ],
            rejected: vec![BatchItemResult {
                status: "RECHAZADO".to_string(),
                generation_code: "gen-0002".to_string(),
                reception_stamp: None,
                message_code: Some("004".to_string()),
                description: Some("contenido inválido".to_string()),
                observations: vec!["observación".to_string()],
            }],
        }));

        let verification = fx
            .transmitter
            .verify_contingency_batch_status(Uuid::new_v4(), "LOTE-1", "token", &documents)
            .await
            .unwrap();

        assert_eq!(verification.received.len(), 2);
        assert_eq!(verification.rejected, vec!["gen-0002".to_string()]);
        assert!(verification.still_pending.is_empty());
        assert_eq!(
            fx.document_repo.status_of("gen-0000"),
            Some(DocumentStatus::Received)
        );
        assert_eq!(
            fx.document_repo.status_of("gen-0002"),
            Some(DocumentStatus::Rejected)
        );
        // Resolved rows leave the pending set.
        assert_eq!(fx.contingency_repo.pending_count(), 0);
    }

    #[tokio::test]
    async fn unreported_documents_stay_pending_after_deadline() {
        let fx = fixture(BatchConfig {
            poll_interval_secs: 10,
            poll_deadline_secs: 30,
            ..BatchConfig::default()
        });
        let rows = seeded_contingency(&fx.contingency_repo, &fx.document_repo, "gen", 2).await;
        let documents: HashMap<String, ContingencyDocument> = rows
            .iter()
            .map(|row| (row.generation_code.clone(), row.clone()))
            .collect();
        // Authority keeps answering with an empty resolution.

        let verification = fx
            .transmitter
            .verify_contingency_batch_status(Uuid::new_v4(), "LOTE-1", "token", &documents)
            .await
            .unwrap();

        assert!(verification.received.is_empty());
        assert!(verification.rejected.is_empty());
        assert_eq!(verification.still_pending.len(), 2);
        // Three polls at a 10s interval within the 30s deadline.
        assert_eq!(fx.client.consult_batch_calls(), 3);
        assert_eq!(fx.clock.sleep_count(), 3);
        assert_eq!(fx.contingency_repo.pending_count(), 2);
    }

    #[tokio::test]
    async fn document_never_resolves_both_ways() {
        let fx = fixture(BatchConfig::default());
        let rows = seeded_contingency(&fx.contingency_repo, &fx.document_repo, "gen", 1).await;
        let documents: HashMap<String, ContingencyDocument> = rows
            .iter()
            .map(|row| (row.generation_code.clone(), row.clone()))
            .collect();

        // A contradictory answer listing the same document on both sides.
        fx.client.script_consult_batch(Ok(ConsultBatchResponse {
            status: Some("PROCESADO".to_string()),
            processed: vec![BatchItemResult {
                status: "PROCESADO".to_string(),
                generation_code: "gen-0000".to_string(),
                reception_stamp: Some("SELLO-0".to_string()),
                message_code: None,
                description: None,
                observations: vec![],
            }],
            rejected: vec![BatchItemResult {
                status: "RECHAZADO".to_string(),
                generation_code: "gen-0000".to_string(),
                reception_stamp: None,
                message_code: None,
                description: None,
                observations: vec![],
            }],
        }));

        let verification = fx
            .transmitter
            .verify_contingency_batch_status(Uuid::new_v4(), "LOTE-1", "token", &documents)
            .await
            .unwrap();

        assert_eq!(verification.received, vec!["gen-0000".to_string()]);
        assert!(verification.rejected.is_empty());
        assert_eq!(
            fx.document_repo.status_of("gen-0000"),
            Some(DocumentStatus::Received)
        );
    }

    #[tokio::test]
    async fn invalidation_rows_are_marked_invalidated() {
        let fx = fixture(BatchConfig::default());
        let rows = seeded_contingency(&fx.contingency_repo, &fx.document_repo, "inv", 1).await;
        let mut row = rows[0].clone();
        row.dte_type = DteType::Invalidation;
        let documents = HashMap::from([(row.generation_code.clone(), row)]);

        fx.client.script_consult_batch(Ok(ConsultBatchResponse {
            status: Some("PROCESADO".to_string()),
            processed: vec![BatchItemResult {
                status: "PROCESADO".to_string(),
                generation_code: "inv-0000".to_string(),
                reception_stamp: Some("SELLO-INV".to_string()),
                message_code: None,
                description: None,
                observations: vec![],
            }],
            rejected: vec![],
        }));

        let verification = fx
            .transmitter
            .verify_contingency_batch_status(Uuid::new_v4(), "LOTE-1", "token", &documents)
            .await
            .unwrap();

        assert_eq!(verification.received.len(), 1);
        assert_eq!(
            fx.document_repo.status_of("inv-0000"),
            Some(DocumentStatus::Invalidated)
        );
    }
}
