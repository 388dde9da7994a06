//! # Single-Document Transmitter
//!
//! Immediate delivery path for one document: sign, send, and on a
//! non-accepted answer check status once before a short bounded retry loop.
//! This path is meant to finish in seconds; the delay between attempts is
//! fixed, not exponential. No local state is written here - persistence on
//! failure is the caller's responsibility.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::TransmissionConfig;
use crate::error::{RelayError, Result};
use crate::models::{DteDocument, TransmitResult};
use crate::transmission::authority::{
    AuthorityClient, AuthorityCredentials, AuthorityTokenProvider,
};
use crate::transmission::processor::processor_for;
use crate::transmission::signer::Signer;
use crate::utils::Clock;

/// Transmits one document with bounded immediate retries.
pub struct DocumentTransmitter {
    signer: Arc<dyn Signer>,
    client: Arc<dyn AuthorityClient>,
    token_provider: Arc<dyn AuthorityTokenProvider>,
    clock: Arc<dyn Clock>,
    ambient: String,
    config: TransmissionConfig,
}

impl DocumentTransmitter {
    pub fn new(
        signer: Arc<dyn Signer>,
        client: Arc<dyn AuthorityClient>,
        token_provider: Arc<dyn AuthorityTokenProvider>,
        clock: Arc<dyn Clock>,
        ambient: impl Into<String>,
        config: TransmissionConfig,
    ) -> Self {
        Self {
            signer,
            client,
            token_provider,
            clock,
            ambient: ambient.into(),
            config,
        }
    }

    /// Sign and transmit a document, retrying transiently failed attempts a
    /// fixed number of times with a fixed delay.
    ///
    /// Signing failures and Authority business rejections are returned
    /// immediately: neither can be fixed by resending the same payload
    /// seconds later. Everything else exhausts the retry budget and returns
    /// the last failure for the caller to classify.
    pub async fn retry_transmission(
        &self,
        document: &DteDocument,
        auth_token: &str,
        credentials: &AuthorityCredentials,
    ) -> Result<TransmitResult> {
        // Signing failure is fatal, not retried.
        let payload = document.serialize_payload();
        let signed = self
            .signer
            .sign(&payload, &document.issuer_tax_id)
            .await?;

        let processor = processor_for(document.dte_type, &self.ambient);
        let request = processor.process_request(&signed, document);
        let token = self
            .token_provider
            .get_or_create_token(auth_token, credentials)
            .await?;

        let mut last_failure = match self.client.send_document(&token, &request).await {
            Ok(response) => {
                let result = processor.process_response(response);
                if result.is_accepted() {
                    info!(
                        generation_code = %document.generation_code,
                        dte_type = %document.dte_type,
                        "✅ Document accepted on first attempt"
                    );
                    return Ok(result);
                }
                // No transport error but not accepted either: one idempotent
                // status check, in case the Authority processed it
                // asynchronously.
                if let Some(resolved) = self.consult_once(&token, document).await? {
                    return Ok(resolved);
                }
                RelayError::AuthorityUnresolved {
                    status: result.status,
                }
            }
            Err(error @ RelayError::AuthorityRejection { .. }) => return Err(error),
            Err(error) => error,
        };

        for attempt in 1..=self.config.max_retries {
            self.clock.sleep(self.config.retry_delay()).await;
            debug!(
                generation_code = %document.generation_code,
                attempt,
                max_retries = self.config.max_retries,
                "Re-attempting transmission"
            );

            match self.client.send_document(&token, &request).await {
                Ok(response) => {
                    let result = processor.process_response(response);
                    if result.is_accepted() {
                        info!(
                            generation_code = %document.generation_code,
                            attempt,
                            "✅ Document accepted on immediate retry"
                        );
                        return Ok(result);
                    }
                    last_failure = RelayError::AuthorityUnresolved {
                        status: result.status,
                    };
                }
                Err(error @ RelayError::AuthorityRejection { .. }) => return Err(error),
                Err(error) => last_failure = error,
            }
        }

        warn!(
            generation_code = %document.generation_code,
            retries = self.config.max_retries,
            error = %last_failure,
            "Immediate transmission exhausted, handing back to caller"
        );
        Err(last_failure)
    }

    /// One status-check call. Safe to repeat; changes nothing on either
    /// side. Returns `Some` only when the Authority already accepted the
    /// document; a recorded rejection is surfaced as the business error it
    /// is.
    async fn consult_once(
        &self,
        token: &str,
        document: &DteDocument,
    ) -> Result<Option<TransmitResult>> {
        match self
            .client
            .check_status(token, &document.generation_code)
            .await
        {
            Ok(response) => {
                let result = TransmitResult {
                    status: response.status.clone(),
                    reception_stamp: response.reception_stamp,
                    processed_at: response.processed_at,
                    message_code: response.message_code,
                    description: response.description,
                    observations: response.observations,
                };
                if result.is_accepted() {
                    info!(
                        generation_code = %document.generation_code,
                        "Document was already processed asynchronously by the Authority"
                    );
                    return Ok(Some(result));
                }
                if result.is_rejected() {
                    return Err(RelayError::AuthorityRejection {
                        status: result.status,
                        message_code: result.message_code,
                        description: result.description.unwrap_or_default(),
                    });
                }
                Ok(None)
            }
            Err(error) => {
                // Best-effort read; an unreachable consult endpoint just
                // sends us into the retry loop.
                debug!(
                    generation_code = %document.generation_code,
                    error = %error,
                    "Status check failed, continuing with retries"
                );
                Ok(None)
            }
        }
    }
}
