//! # Contingency Store
//!
//! Persists a document that could not be delivered: the document itself in
//! pending state, plus a contingency row referencing it. Keyed on the
//! document's generation code so a repeated store attempt (e.g. a retried
//! request handler) cannot duplicate rows.

use std::sync::Arc;
use tracing::{debug, info};

use crate::contingency::repository::{ContingencyRepository, DocumentRepository};
use crate::error::Result;
use crate::models::{ContingencyDocument, ContingencyType, DteDocument, NewContingencyDocument};

pub struct ContingencyStore {
    contingency_repo: Arc<dyn ContingencyRepository>,
    document_repo: Arc<dyn DocumentRepository>,
}

impl ContingencyStore {
    pub fn new(
        contingency_repo: Arc<dyn ContingencyRepository>,
        document_repo: Arc<dyn DocumentRepository>,
    ) -> Self {
        Self {
            contingency_repo,
            document_repo,
        }
    }

    /// Store a document for later replay. Returns the existing row when the
    /// generation code is already in contingency.
    pub async fn store_document_in_contingency(
        &self,
        document: &DteDocument,
        contingency_type: ContingencyType,
        reason: &str,
    ) -> Result<ContingencyDocument> {
        if let Some(existing) = self
            .contingency_repo
            .find_by_generation_code(&document.generation_code)
            .await?
        {
            debug!(
                generation_code = %document.generation_code,
                "Document already in contingency, skipping duplicate store"
            );
            return Ok(existing);
        }

        self.document_repo.store_pending(document).await?;

        let row = self
            .contingency_repo
            .create(NewContingencyDocument {
                branch_id: document.branch_id.clone(),
                issuer_tax_id: document.issuer_tax_id.clone(),
                generation_code: document.generation_code.clone(),
                dte_type: document.dte_type,
                contingency_type,
                reason: reason.to_string(),
            })
            .await?;

        info!(
            generation_code = %document.generation_code,
            issuer = %document.issuer_tax_id,
            dte_type = %document.dte_type,
            contingency_type = %contingency_type,
            "📥 Document stored in contingency"
        );
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DteType;
    use crate::test_helpers::{InMemoryContingencyRepository, InMemoryDocumentRepository};
    use chrono::Utc;
    use serde_json::json;

    fn document(generation_code: &str) -> DteDocument {
        DteDocument::new(
            DteType::Invoice,
            generation_code,
            "0614-010101-001-2",
            "branch-01",
            json!({}),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn stores_document_and_contingency_row() {
        let contingency_repo = Arc::new(InMemoryContingencyRepository::new());
        let document_repo = Arc::new(InMemoryDocumentRepository::new());
        let store = ContingencyStore::new(contingency_repo.clone(), document_repo.clone());

        let row = store
            .store_document_in_contingency(
                &document("gen-1"),
                ContingencyType::NoDisponibilidadMh,
                "authority unavailable",
            )
            .await
            .unwrap();

        assert_eq!(row.generation_code, "gen-1");
        assert!(row.batch_id.is_none());
        assert!(document_repo.contains("gen-1"));
        assert_eq!(contingency_repo.pending_count(), 1);
    }

    #[tokio::test]
    async fn storing_twice_is_idempotent() {
        let contingency_repo = Arc::new(InMemoryContingencyRepository::new());
        let document_repo = Arc::new(InMemoryDocumentRepository::new());
        let store = ContingencyStore::new(contingency_repo.clone(), document_repo);

        let doc = document("gen-1");
        let first = store
            .store_document_in_contingency(&doc, ContingencyType::FallaInternet, "internet down")
            .await
            .unwrap();
        let second = store
            .store_document_in_contingency(&doc, ContingencyType::Otro, "different reason")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.contingency_type, ContingencyType::FallaInternet);
        assert_eq!(contingency_repo.pending_count(), 1);
    }
}
