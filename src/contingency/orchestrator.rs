//! # Contingency Orchestrator
//!
//! Façade used by request handlers and the retransmission job. Decides when
//! a document enters contingency (classification happens here, nowhere
//! else), and drives the end-to-end replay flow: contingency notice per
//! originating system, then that system's batches, then resolution
//! write-back. A failure in one system/type group is logged and skipped so
//! one tenant's outage never blocks the others.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::constants::wire_version;
use crate::contingency::batch_transmitter::BatchTransmitter;
use crate::contingency::repository::{ContingencyRepository, IssuerResolver};
use crate::contingency::store::ContingencyStore;
use crate::error::{RelayError, Result};
use crate::models::{
    ContingencyDocument, ContingencyNotice, ContingencyNoticeItem, ContingencyType, DteDocument,
    DteType,
};
use crate::transmission::{AuthorityClient, ContingencyClassifier};
use crate::utils::Clock;

/// What happened to a document that failed immediate transmission.
#[derive(Debug, Clone)]
pub enum ContingencyOutcome {
    /// The failure was retryable; the document is durably stored and will be
    /// replayed. From the caller's perspective creation succeeded, in
    /// contingency mode.
    Stored {
        contingency_type: ContingencyType,
        reason: String,
    },
}

/// Counters reported by one replay run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetransmissionSummary {
    pub pending_fetched: usize,
    pub systems_processed: usize,
    pub systems_skipped: usize,
    pub batches_submitted: usize,
    pub documents_received: usize,
    pub documents_rejected: usize,
    pub documents_still_pending: usize,
}

pub struct ContingencyOrchestrator {
    store: ContingencyStore,
    batch_transmitter: BatchTransmitter,
    classifier: ContingencyClassifier,
    issuer_resolver: Arc<dyn IssuerResolver>,
    contingency_repo: Arc<dyn ContingencyRepository>,
    client: Arc<dyn AuthorityClient>,
    clock: Arc<dyn Clock>,
    ambient: String,
    max_pending_documents: u32,
}

impl ContingencyOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: ContingencyStore,
        batch_transmitter: BatchTransmitter,
        classifier: ContingencyClassifier,
        issuer_resolver: Arc<dyn IssuerResolver>,
        contingency_repo: Arc<dyn ContingencyRepository>,
        client: Arc<dyn AuthorityClient>,
        clock: Arc<dyn Clock>,
        ambient: impl Into<String>,
        max_pending_documents: u32,
    ) -> Self {
        Self {
            store,
            batch_transmitter,
            classifier,
            issuer_resolver,
            contingency_repo,
            client,
            clock,
            ambient: ambient.into(),
            max_pending_documents,
        }
    }

    /// Classify a failed transmission. Retryable conditions store the
    /// document for replay and report success-in-contingency; everything
    /// else is surfaced to the caller unchanged, and no contingency row is
    /// created.
    pub async fn handle_transmission_failure(
        &self,
        document: &DteDocument,
        failure: &RelayError,
    ) -> Result<ContingencyOutcome> {
        let classification = self.classifier.classify(failure);
        if !classification.is_retryable() {
            warn!(
                generation_code = %document.generation_code,
                error = %failure,
                "Non-retryable transmission failure, surfacing to caller"
            );
            return Err(failure.clone());
        }

        self.store
            .store_document_in_contingency(
                document,
                classification.contingency_type,
                &classification.reason,
            )
            .await?;

        Ok(ContingencyOutcome::Stored {
            contingency_type: classification.contingency_type,
            reason: classification.reason,
        })
    }

    /// Drain stored contingency documents. Groups pending rows by issuer
    /// system, then by document type within each system; sends one
    /// contingency notice per system covering all of its pending documents
    /// before any of that system's batches, and isolates per-group failures.
    pub async fn retransmit_pending_documents(&self) -> Result<RetransmissionSummary> {
        let pending = self
            .contingency_repo
            .get_pending(self.max_pending_documents)
            .await?;
        let mut summary = RetransmissionSummary {
            pending_fetched: pending.len(),
            ..RetransmissionSummary::default()
        };

        if pending.is_empty() {
            info!("No contingency documents pending, nothing to retransmit");
            return Ok(summary);
        }

        let grouped = group_by_system(pending);
        info!(
            pending = summary.pending_fetched,
            systems = grouped.len(),
            "🔁 Starting contingency retransmission"
        );

        for (issuer_tax_id, by_type) in grouped {
            match self.retransmit_system(&issuer_tax_id, by_type, &mut summary).await {
                Ok(()) => summary.systems_processed += 1,
                Err(err) => {
                    // One tenant's outage must not block the others.
                    error!(
                        issuer = %issuer_tax_id,
                        error = %err,
                        "Skipping system, its documents stay pending"
                    );
                    summary.systems_skipped += 1;
                }
            }
        }

        info!(
            systems_processed = summary.systems_processed,
            systems_skipped = summary.systems_skipped,
            batches = summary.batches_submitted,
            received = summary.documents_received,
            rejected = summary.documents_rejected,
            still_pending = summary.documents_still_pending,
            "🔁 Contingency retransmission finished"
        );
        Ok(summary)
    }

    async fn retransmit_system(
        &self,
        issuer_tax_id: &str,
        by_type: BTreeMap<DteType, Vec<ContingencyDocument>>,
        summary: &mut RetransmissionSummary,
    ) -> Result<()> {
        let account = self.issuer_resolver.resolve(issuer_tax_id).await?;
        let token = self
            .batch_transmitter
            .acquire_token(&account.caller_token, &account.credentials)
            .await?;

        // The Authority requires one notice per system, covering all of its
        // pending document types, before any batch is accepted.
        self.send_contingency_notice(issuer_tax_id, &by_type, &token)
            .await?;

        for (dte_type, rows) in by_type {
            let outcome = match self
                .batch_transmitter
                .transmit_batch(
                    issuer_tax_id,
                    dte_type,
                    &rows,
                    &account.caller_token,
                    &account.credentials,
                )
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(
                        issuer = %issuer_tax_id,
                        dte_type = %dte_type,
                        error = %err,
                        "Type group failed before submission, continuing with next group"
                    );
                    summary.documents_still_pending += rows.len();
                    continue;
                }
            };

            if let Some(err) = &outcome.error {
                // Rows in chunks that never made it out count as pending.
                let submitted: usize = outcome
                    .submissions
                    .iter()
                    .map(|submission| submission.documents.len())
                    .sum();
                summary.documents_still_pending += rows.len().saturating_sub(submitted);
                error!(
                    issuer = %issuer_tax_id,
                    dte_type = %dte_type,
                    submitted,
                    error = %err,
                    "Type group submission incomplete"
                );
            }

            for submission in outcome.submissions {
                summary.batches_submitted += 1;
                match self
                    .batch_transmitter
                    .verify_contingency_batch_status(
                        submission.batch_id,
                        &submission.mh_batch_id,
                        &token,
                        &submission.documents,
                    )
                    .await
                {
                    Ok(verification) => {
                        summary.documents_received += verification.received.len();
                        summary.documents_rejected += verification.rejected.len();
                        summary.documents_still_pending += verification.still_pending.len();
                    }
                    Err(err) => {
                        error!(
                            batch_id = %submission.batch_id,
                            error = %err,
                            "Batch verification failed, documents stay pending"
                        );
                        summary.documents_still_pending += submission.documents.len();
                    }
                }
            }
        }
        Ok(())
    }

    async fn send_contingency_notice(
        &self,
        issuer_tax_id: &str,
        by_type: &BTreeMap<DteType, Vec<ContingencyDocument>>,
        token: &str,
    ) -> Result<()> {
        let all_rows: Vec<&ContingencyDocument> = by_type.values().flatten().collect();

        // Outage window opens at the oldest pending row for this system.
        // When several independent outages are queued together the window
        // (and cause) reflect the first one.
        let window_start = match self
            .contingency_repo
            .first_contingency_timestamp(issuer_tax_id)
            .await?
        {
            Some(ts) => ts,
            None => all_rows
                .iter()
                .map(|row| row.created_at)
                .min()
                .unwrap_or_else(|| self.clock.now()),
        };
        let first_row = all_rows
            .iter()
            .min_by_key(|row| row.created_at)
            .ok_or_else(|| RelayError::Validation {
                field: "pending".to_string(),
                reason: "contingency notice requested for empty group".to_string(),
            })?;

        let notice = ContingencyNotice {
            version: wire_version::CONTINGENCY,
            ambient: self.ambient.clone(),
            issuer_tax_id: issuer_tax_id.to_string(),
            window_start,
            window_end: self.clock.now(),
            contingency_type: first_row.contingency_type.code(),
            reason: first_row.reason.clone(),
            affected_documents: all_rows
                .iter()
                .map(|row| ContingencyNoticeItem {
                    generation_code: row.generation_code.clone(),
                    dte_type_code: row.dte_type.code().to_string(),
                })
                .collect(),
        };

        let response = self.client.send_contingency_notice(token, &notice).await?;
        info!(
            issuer = %issuer_tax_id,
            documents = notice.affected_documents.len(),
            status = %response.status,
            "📣 Contingency notice accepted"
        );
        Ok(())
    }
}

/// Group pending rows by issuer system, then by document type. BTreeMaps
/// keep replay order deterministic across runs.
fn group_by_system(
    pending: Vec<ContingencyDocument>,
) -> BTreeMap<String, BTreeMap<DteType, Vec<ContingencyDocument>>> {
    let mut grouped: BTreeMap<String, BTreeMap<DteType, Vec<ContingencyDocument>>> =
        BTreeMap::new();
    for row in pending {
        grouped
            .entry(row.issuer_tax_id.clone())
            .or_default()
            .entry(row.dte_type)
            .or_default()
            .push(row);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContingencyType, DteType};
    use crate::test_helpers::contingency_row;

    #[test]
    fn grouping_is_by_system_then_type() {
        let pending = vec![
            contingency_row("g1", "nit-b", DteType::Invoice, ContingencyType::Otro),
            contingency_row("g2", "nit-a", DteType::CreditNote, ContingencyType::Otro),
            contingency_row("g3", "nit-a", DteType::Invoice, ContingencyType::Otro),
            contingency_row("g4", "nit-a", DteType::Invoice, ContingencyType::Otro),
        ];

        let grouped = group_by_system(pending);

        assert_eq!(grouped.len(), 2);
        let system_a = &grouped["nit-a"];
        assert_eq!(system_a.len(), 2);
        assert_eq!(system_a[&DteType::Invoice].len(), 2);
        assert_eq!(system_a[&DteType::CreditNote].len(), 1);
        assert_eq!(grouped["nit-b"][&DteType::Invoice].len(), 1);
    }
}
