//! Shared fixture wiring the full contingency stack against in-memory
//! repositories and a scripted Authority.
#![allow(dead_code)]

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use dte_relay::config::BatchConfig;
use dte_relay::contingency::{BatchTransmitter, ContingencyOrchestrator, ContingencyStore};
use dte_relay::models::{BatchItemResult, ConsultBatchResponse, DteDocument, DteType};
use dte_relay::resilience::{CircuitBreaker, CircuitBreakerConfig};
use dte_relay::test_helpers::{
    InMemoryContingencyRepository, InMemoryDocumentRepository, MockClock, ScriptedAuthorityClient,
    StaticIssuerResolver, StaticSigner, StaticTokenProvider,
};
use dte_relay::transmission::ContingencyClassifier;
use dte_relay::utils::Clock;

pub struct Stack {
    pub client: Arc<ScriptedAuthorityClient>,
    pub contingency_repo: Arc<InMemoryContingencyRepository>,
    pub document_repo: Arc<InMemoryDocumentRepository>,
    pub resolver: Arc<StaticIssuerResolver>,
    pub orchestrator: Arc<ContingencyOrchestrator>,
}

pub fn stack() -> Stack {
    stack_with_clock(Arc::new(MockClock::new()))
}

pub fn stack_with_clock(clock: Arc<dyn Clock>) -> Stack {
    let client = Arc::new(ScriptedAuthorityClient::new());
    let contingency_repo = Arc::new(InMemoryContingencyRepository::new());
    let document_repo = Arc::new(InMemoryDocumentRepository::new());
    let resolver = Arc::new(StaticIssuerResolver::new());
    // Threshold above any single test's failure count so breaker behavior
    // stays out of the way unless a test opens it on purpose.
    let breaker = Arc::new(CircuitBreaker::new(
        "authority",
        CircuitBreakerConfig {
            failure_threshold: 5,
            cooldown: Duration::from_secs(300),
        },
    ));
    let batch_transmitter = BatchTransmitter::new(
        Arc::new(StaticSigner::default()),
        client.clone(),
        Arc::new(StaticTokenProvider::new("authority-token")),
        breaker,
        contingency_repo.clone(),
        document_repo.clone(),
        ContingencyClassifier::new(),
        clock.clone(),
        "00",
        BatchConfig::default(),
    );
    let store = ContingencyStore::new(contingency_repo.clone(), document_repo.clone());
    let orchestrator = Arc::new(ContingencyOrchestrator::new(
        store,
        batch_transmitter,
        ContingencyClassifier::new(),
        resolver.clone(),
        contingency_repo.clone(),
        client.clone(),
        clock,
        "00",
        500,
    ));
    Stack {
        client,
        contingency_repo,
        document_repo,
        resolver,
        orchestrator,
    }
}

pub fn invoice(generation_code: &str, issuer_tax_id: &str) -> DteDocument {
    DteDocument::new(
        DteType::Invoice,
        generation_code,
        issuer_tax_id,
        "branch-01",
        json!({"resumen": {"totalPagar": 113.0}}),
        Utc::now(),
    )
}

/// A consult answer marking every given document processed with a stamp.
pub fn all_processed(entries: &[(&str, &str)]) -> ConsultBatchResponse {
    ConsultBatchResponse {
        status: Some("PROCESADO".to_string()),
        processed: entries
            .iter()
            .map(|(generation_code, stamp)| BatchItemResult {
                status: "PROCESADO".to_string(),
                generation_code: generation_code.to_string(),
                reception_stamp: Some(stamp.to_string()),
                message_code: None,
                description: None,
                observations: vec![],
            })
            .collect(),
        rejected: vec![],
    }
}
