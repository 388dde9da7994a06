//! # Authority Client
//!
//! Wire transport to the tax Authority's reception API plus bearer-token
//! management. The HTTP adapter distinguishes a business rejection (the
//! Authority answered and said no) from transport failures (we could not
//! reach it), which the classifier depends on.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::AuthorityConfig;
use crate::constants::{authority_status, endpoints};
use crate::error::{NetworkErrorKind, RelayError, Result};
use crate::models::{
    BatchRequest, BatchResponse, ConsultBatchResponse, ContingencyNotice,
    ContingencyNoticeResponse, SubmitKind, SubmitRequest, SubmitResponse,
};

/// API credentials for one issuer system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityCredentials {
    /// API user; the issuer's tax id.
    pub user: String,
    pub password: String,
}

/// Transport boundary to the Authority. Every method is a single blocking
/// call from the caller's perspective; retries live in the layers above.
#[async_trait]
pub trait AuthorityClient: Send + Sync {
    /// Exchange credentials for a bearer token.
    async fn authenticate(&self, credentials: &AuthorityCredentials) -> Result<String>;

    /// Submit one signed document (reception or invalidation per the
    /// request's kind). A `RECHAZADO` answer is raised as
    /// [`RelayError::AuthorityRejection`].
    async fn send_document(&self, token: &str, request: &SubmitRequest) -> Result<SubmitResponse>;

    /// Idempotent status consult for a document. Pure read: returns the
    /// Authority's recorded state without raising on rejection.
    async fn check_status(&self, token: &str, generation_code: &str) -> Result<SubmitResponse>;

    /// Submit a batch envelope. A `RECHAZADO` acknowledgement is raised as
    /// [`RelayError::AuthorityRejection`].
    async fn send_batch(&self, token: &str, request: &BatchRequest) -> Result<BatchResponse>;

    /// Poll the resolution of a previously acknowledged batch.
    async fn consult_batch(&self, token: &str, mh_batch_id: &str) -> Result<ConsultBatchResponse>;

    /// Declare a contingency window for one issuer system.
    async fn send_contingency_notice(
        &self,
        token: &str,
        notice: &ContingencyNotice,
    ) -> Result<ContingencyNoticeResponse>;
}

/// reqwest-backed Authority client.
pub struct HttpAuthorityClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthorityClient {
    pub fn new(config: &AuthorityConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RelayError::Configuration {
                source_name: "http_client".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B, R>(&self, path: &str, token: Option<&str>, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let mut request = self.http.post(self.url(path)).json(body);
        if let Some(token) = token {
            request = request.header("Authorization", token);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            return Err(RelayError::Http {
                status: status.as_u16(),
                message: truncate(&body, 512),
            });
        }

        serde_json::from_str(&body).map_err(|e| RelayError::Http {
            status: status.as_u16(),
            message: format!("unparseable Authority response: {e}"),
        })
    }
}

#[async_trait]
impl AuthorityClient for HttpAuthorityClient {
    async fn authenticate(&self, credentials: &AuthorityCredentials) -> Result<String> {
        #[derive(Serialize)]
        struct AuthRequest<'a> {
            user: &'a str,
            pwd: &'a str,
        }
        #[derive(Deserialize)]
        struct AuthBody {
            token: Option<String>,
        }
        #[derive(Deserialize)]
        struct AuthResponse {
            status: String,
            body: Option<AuthBody>,
        }

        let response: AuthResponse = self
            .post_json(
                endpoints::AUTH,
                None,
                &AuthRequest {
                    user: &credentials.user,
                    pwd: &credentials.password,
                },
            )
            .await?;

        match response.body.and_then(|b| b.token) {
            Some(token) if response.status == "OK" => Ok(token),
            _ => Err(RelayError::Authentication {
                reason: format!("Authority auth answered '{}'", response.status),
            }),
        }
    }

    async fn send_document(&self, token: &str, request: &SubmitRequest) -> Result<SubmitResponse> {
        let path = match request.kind {
            SubmitKind::Reception => endpoints::RECEPTION,
            SubmitKind::Invalidation => endpoints::INVALIDATION,
        };
        let response: SubmitResponse = self.post_json(path, Some(token), request).await?;
        if response.status == authority_status::RECHAZADO {
            return Err(RelayError::AuthorityRejection {
                status: response.status,
                message_code: response.message_code,
                description: response.description.unwrap_or_default(),
            });
        }
        Ok(response)
    }

    async fn check_status(&self, token: &str, generation_code: &str) -> Result<SubmitResponse> {
        #[derive(Serialize)]
        struct ConsultRequest<'a> {
            #[serde(rename = "tdte")]
            dte_type: &'a str,
            #[serde(rename = "codigoGeneracion")]
            generation_code: &'a str,
        }
        // tdte is informational on the consult endpoint; the generation code
        // alone identifies the document.
        self.post_json(
            endpoints::CONSULT,
            Some(token),
            &ConsultRequest {
                dte_type: "",
                generation_code,
            },
        )
        .await
    }

    async fn send_batch(&self, token: &str, request: &BatchRequest) -> Result<BatchResponse> {
        let response: BatchResponse = self
            .post_json(endpoints::BATCH_RECEPTION, Some(token), request)
            .await?;
        if response.status == authority_status::RECHAZADO {
            return Err(RelayError::AuthorityRejection {
                status: response.status,
                message_code: response.message_code,
                description: response.description.unwrap_or_default(),
            });
        }
        Ok(response)
    }

    async fn consult_batch(&self, token: &str, mh_batch_id: &str) -> Result<ConsultBatchResponse> {
        #[derive(Serialize)]
        struct ConsultBatchRequest<'a> {
            #[serde(rename = "codigoLote")]
            batch_code: &'a str,
        }
        self.post_json(
            endpoints::BATCH_CONSULT,
            Some(token),
            &ConsultBatchRequest {
                batch_code: mh_batch_id,
            },
        )
        .await
    }

    async fn send_contingency_notice(
        &self,
        token: &str,
        notice: &ContingencyNotice,
    ) -> Result<ContingencyNoticeResponse> {
        self.post_json(endpoints::CONTINGENCY_NOTICE, Some(token), notice)
            .await
    }
}

/// Map a reqwest failure onto the crate's network taxonomy, preserving
/// enough shape for the classifier.
fn map_transport_error(error: reqwest::Error) -> RelayError {
    let kind = if error.is_timeout() {
        NetworkErrorKind::Timeout
    } else if error.is_connect() {
        // reqwest folds refused/reset/unreachable into one connect error;
        // the message keeps the OS-level detail.
        NetworkErrorKind::ConnectionRefused
    } else if error.is_request() {
        NetworkErrorKind::DnsFailure
    } else {
        NetworkErrorKind::Other
    };
    RelayError::Network {
        kind,
        message: error.to_string(),
    }
}

/// Cap an Authority response body for error messages. The cut must land on
/// a char boundary: bodies carry accented Spanish text.
fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}

/// Token acquisition boundary. Implementations cache per caller token.
#[async_trait]
pub trait AuthorityTokenProvider: Send + Sync {
    async fn get_or_create_token(
        &self,
        caller_token: &str,
        credentials: &AuthorityCredentials,
    ) -> Result<String>;
}

struct CachedToken {
    token: String,
    fetched_at: Instant,
}

/// TTL cache over [`AuthorityClient::authenticate`], keyed by caller token.
/// Refresh is a critical section per key so concurrent cache misses trigger
/// a single re-authentication instead of a thundering herd.
pub struct CachingTokenProvider {
    client: Arc<dyn AuthorityClient>,
    ttl: Duration,
    cache: DashMap<String, CachedToken>,
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CachingTokenProvider {
    pub fn new(client: Arc<dyn AuthorityClient>, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            cache: DashMap::new(),
            refresh_locks: DashMap::new(),
        }
    }

    fn fresh_token(&self, key: &str) -> Option<String> {
        self.cache
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.token.clone())
    }
}

#[async_trait]
impl AuthorityTokenProvider for CachingTokenProvider {
    async fn get_or_create_token(
        &self,
        caller_token: &str,
        credentials: &AuthorityCredentials,
    ) -> Result<String> {
        if let Some(token) = self.fresh_token(caller_token) {
            return Ok(token);
        }

        let lock = self
            .refresh_locks
            .entry(caller_token.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited on the lock.
        if let Some(token) = self.fresh_token(caller_token) {
            debug!(issuer = %credentials.user, "Authority token refreshed by concurrent caller");
            return Ok(token);
        }

        let token = self.client.authenticate(credentials).await?;
        info!(issuer = %credentials.user, "🔑 Authority token acquired");
        self.cache.insert(
            caller_token.to_string(),
            CachedToken {
                token: token.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingClient {
        auth_calls: AtomicU32,
    }

    #[async_trait]
    impl AuthorityClient for CountingClient {
        async fn authenticate(&self, credentials: &AuthorityCredentials) -> Result<String> {
            let n = self.auth_calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("token-{}-{n}", credentials.user))
        }

        async fn send_document(&self, _: &str, _: &SubmitRequest) -> Result<SubmitResponse> {
            unimplemented!("not exercised")
        }

        async fn check_status(&self, _: &str, _: &str) -> Result<SubmitResponse> {
            unimplemented!("not exercised")
        }

        async fn send_batch(&self, _: &str, _: &BatchRequest) -> Result<BatchResponse> {
            unimplemented!("not exercised")
        }

        async fn consult_batch(&self, _: &str, _: &str) -> Result<ConsultBatchResponse> {
            unimplemented!("not exercised")
        }

        async fn send_contingency_notice(
            &self,
            _: &str,
            _: &ContingencyNotice,
        ) -> Result<ContingencyNoticeResponse> {
            unimplemented!("not exercised")
        }
    }

    fn credentials() -> AuthorityCredentials {
        AuthorityCredentials {
            user: "0614-010101-001-2".to_string(),
            password: "secret".to_string(),
        }
    }

    #[test]
    fn truncate_never_cuts_inside_a_multibyte_char() {
        // "é" is two bytes and straddles the 512-byte cutoff here.
        let body = format!("{}énvío inválido", "x".repeat(511));
        let cut = truncate(&body, 512);
        assert_eq!(cut, format!("{}...", "x".repeat(511)));

        let short = "respuesta breve";
        assert_eq!(truncate(short, 512), short);
    }

    #[tokio::test]
    async fn caches_token_within_ttl() {
        let client = Arc::new(CountingClient {
            auth_calls: AtomicU32::new(0),
        });
        let provider = CachingTokenProvider::new(client.clone(), Duration::from_secs(60));

        let first = provider
            .get_or_create_token("caller-a", &credentials())
            .await
            .unwrap();
        let second = provider
            .get_or_create_token("caller-a", &credentials())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(client.auth_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_token_triggers_single_reauthentication() {
        let client = Arc::new(CountingClient {
            auth_calls: AtomicU32::new(0),
        });
        let provider = CachingTokenProvider::new(client.clone(), Duration::from_millis(10));

        provider
            .get_or_create_token("caller-a", &credentials())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        provider
            .get_or_create_token("caller-a", &credentials())
            .await
            .unwrap();

        assert_eq!(client.auth_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn distinct_callers_get_distinct_cache_entries() {
        let client = Arc::new(CountingClient {
            auth_calls: AtomicU32::new(0),
        });
        let provider = CachingTokenProvider::new(client.clone(), Duration::from_secs(60));

        provider
            .get_or_create_token("caller-a", &credentials())
            .await
            .unwrap();
        provider
            .get_or_create_token("caller-b", &credentials())
            .await
            .unwrap();

        assert_eq!(client.auth_calls.load(Ordering::SeqCst), 2);
    }
}
