//! End-to-end contingency flow: failed immediate transmission, durable
//! storage, grouped replay with notice-before-batch ordering, and resolution
//! fan-out back onto the stored documents.

mod support;

use dte_relay::contingency::ContingencyOutcome;
use dte_relay::error::{NetworkErrorKind, RelayError};
use dte_relay::models::{ContingencyType, DocumentStatus};
use support::{all_processed, invoice, stack};

fn authority_timeout() -> RelayError {
    RelayError::Network {
        kind: NetworkErrorKind::Timeout,
        message: "deadline exceeded".to_string(),
    }
}

#[tokio::test]
async fn retryable_failure_is_stored_and_replayed_to_terminal_state() {
    let fx = stack();
    let document = invoice("gen-e2e", "nit-a");

    let outcome = fx
        .orchestrator
        .handle_transmission_failure(&document, &authority_timeout())
        .await
        .unwrap();

    let ContingencyOutcome::Stored {
        contingency_type, ..
    } = outcome;
    assert_eq!(contingency_type, ContingencyType::NoDisponibilidadMh);
    assert_eq!(fx.contingency_repo.pending_count(), 1);
    assert_eq!(
        fx.document_repo.status_of("gen-e2e"),
        Some(DocumentStatus::Pending)
    );

    fx.client
        .script_consult_batch(Ok(all_processed(&[("gen-e2e", "SELLO-E2E")])));

    let summary = fx
        .orchestrator
        .retransmit_pending_documents()
        .await
        .unwrap();

    assert_eq!(summary.pending_fetched, 1);
    assert_eq!(summary.systems_processed, 1);
    assert_eq!(summary.batches_submitted, 1);
    assert_eq!(summary.documents_received, 1);
    assert_eq!(summary.documents_still_pending, 0);
    assert_eq!(
        fx.document_repo.status_of("gen-e2e"),
        Some(DocumentStatus::Received)
    );
    assert_eq!(fx.document_repo.stamp_of("gen-e2e").as_deref(), Some("SELLO-E2E"));
    assert_eq!(fx.contingency_repo.pending_count(), 0);
    assert_eq!(fx.client.notice_calls(), 1);
}

#[tokio::test]
async fn notice_precedes_every_system_batch() {
    let fx = stack();
    for (generation_code, issuer) in [("gen-a", "nit-a"), ("gen-b", "nit-b")] {
        fx.orchestrator
            .handle_transmission_failure(&invoice(generation_code, issuer), &authority_timeout())
            .await
            .unwrap();
    }
    // Systems replay in deterministic (sorted) order: nit-a first.
    fx.client
        .script_consult_batch(Ok(all_processed(&[("gen-a", "SELLO-A")])));
    fx.client
        .script_consult_batch(Ok(all_processed(&[("gen-b", "SELLO-B")])));

    let summary = fx
        .orchestrator
        .retransmit_pending_documents()
        .await
        .unwrap();

    assert_eq!(summary.systems_processed, 2);
    assert_eq!(summary.documents_received, 2);
    assert_eq!(
        fx.client.events(),
        vec![
            "notice:nit-a".to_string(),
            "batch:nit-a".to_string(),
            "notice:nit-b".to_string(),
            "batch:nit-b".to_string(),
        ]
    );
}

#[tokio::test]
async fn authority_5xx_is_stored_as_authority_unavailable() {
    let fx = stack();
    let failure = RelayError::Http {
        status: 503,
        message: "service unavailable".to_string(),
    };

    let outcome = fx
        .orchestrator
        .handle_transmission_failure(&invoice("gen-503", "nit-a"), &failure)
        .await
        .unwrap();

    let ContingencyOutcome::Stored {
        contingency_type, ..
    } = outcome;
    assert_eq!(contingency_type, ContingencyType::NoDisponibilidadMh);
    assert_eq!(fx.contingency_repo.pending_count(), 1);
}

#[tokio::test]
async fn validation_rejection_is_surfaced_not_stored() {
    let fx = stack();
    let rejection = RelayError::AuthorityRejection {
        status: "RECHAZADO".to_string(),
        message_code: Some("004".to_string()),
        description: "Error de validación en el resumen".to_string(),
    };

    let error = fx
        .orchestrator
        .handle_transmission_failure(&invoice("gen-bad", "nit-a"), &rejection)
        .await
        .unwrap_err();

    assert!(matches!(error, RelayError::AuthorityRejection { .. }));
    assert_eq!(fx.contingency_repo.pending_count(), 0);
    assert!(!fx.document_repo.contains("gen-bad"));
}

#[tokio::test]
async fn failed_notice_leaves_system_batches_unsent() {
    let fx = stack();
    for generation_code in ["gen-1", "gen-2"] {
        fx.orchestrator
            .handle_transmission_failure(&invoice(generation_code, "nit-a"), &authority_timeout())
            .await
            .unwrap();
    }
    fx.client.script_contingency_notice(Err(authority_timeout()));

    let summary = fx
        .orchestrator
        .retransmit_pending_documents()
        .await
        .unwrap();

    assert_eq!(summary.systems_skipped, 1);
    assert_eq!(summary.batches_submitted, 0);
    assert_eq!(fx.client.send_batch_calls(), 0);
    assert_eq!(fx.contingency_repo.pending_count(), 2);
}

#[tokio::test]
async fn one_system_failure_does_not_block_others() {
    let fx = stack();
    for (generation_code, issuer) in [("gen-a", "nit-a"), ("gen-b", "nit-b")] {
        fx.orchestrator
            .handle_transmission_failure(&invoice(generation_code, issuer), &authority_timeout())
            .await
            .unwrap();
    }
    fx.resolver.fail_for("nit-a");
    fx.client
        .script_consult_batch(Ok(all_processed(&[("gen-b", "SELLO-B")])));

    let summary = fx
        .orchestrator
        .retransmit_pending_documents()
        .await
        .unwrap();

    assert_eq!(summary.systems_processed, 1);
    assert_eq!(summary.systems_skipped, 1);
    assert_eq!(
        fx.document_repo.status_of("gen-b"),
        Some(DocumentStatus::Received)
    );
    assert_eq!(
        fx.document_repo.status_of("gen-a"),
        Some(DocumentStatus::Pending)
    );
    assert_eq!(fx.contingency_repo.pending_count(), 1);
}

#[tokio::test]
async fn documents_stay_pending_across_outages_until_accepted() {
    let fx = stack();
    fx.orchestrator
        .handle_transmission_failure(&invoice("gen-p", "nit-a"), &authority_timeout())
        .await
        .unwrap();

    // First run: the Authority is still down for batch submission.
    for _ in 0..3 {
        fx.client.script_send_batch(Err(authority_timeout()));
    }
    let first = fx
        .orchestrator
        .retransmit_pending_documents()
        .await
        .unwrap();
    assert_eq!(first.batches_submitted, 0);
    assert_eq!(first.documents_received, 0);
    // Unsubmitted documents are reported as still pending.
    assert_eq!(first.documents_still_pending, 1);
    assert_eq!(fx.contingency_repo.pending_count(), 1);
    assert_eq!(
        fx.document_repo.status_of("gen-p"),
        Some(DocumentStatus::Pending)
    );

    // Second run: the Authority is back.
    fx.client
        .script_consult_batch(Ok(all_processed(&[("gen-p", "SELLO-P")])));
    let second = fx
        .orchestrator
        .retransmit_pending_documents()
        .await
        .unwrap();
    assert_eq!(second.documents_received, 1);
    assert_eq!(fx.contingency_repo.pending_count(), 0);
    assert_eq!(
        fx.document_repo.status_of("gen-p"),
        Some(DocumentStatus::Received)
    );
}
