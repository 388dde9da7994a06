//! Signing boundary. The actual signer (key management, JWS construction)
//! lives outside this crate; re-signing an unchanged payload must be safe to
//! repeat on retry.

use async_trait::async_trait;

use crate::error::Result;

/// Produces the signed (JWS compact) form of a document payload for the
/// given issuer.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, payload: &[u8], tax_id: &str) -> Result<String>;
}
