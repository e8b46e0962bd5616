//! Publish token verification.

use crate::db::Database;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Verdict on a publish token
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenStatus {
    /// Token is known and not expired
    Valid {
        /// User the token was issued to
        username: String,
    },
    /// Token is known but past its expiry
    Expired,
    /// Token is not known
    Unknown,
}

/// Trait for checking publish tokens
///
/// Token issuance lives outside this crate. The default implementation,
/// [`DatabaseTokenVerifier`], reads the `tokens` table; embedders that issue
/// tokens elsewhere provide their own implementation through
/// [`Publisher::with_token_verifier`](crate::Publisher::with_token_verifier).
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Classify `token`
    ///
    /// # Errors
    ///
    /// Returns an error only when the backing store cannot be queried; an
    /// unknown token is `Ok(TokenStatus::Unknown)`.
    async fn verify(&self, token: &str) -> Result<TokenStatus>;
}

/// Token verifier backed by the publisher's own database
pub struct DatabaseTokenVerifier {
    db: Arc<Database>,
}

impl DatabaseTokenVerifier {
    /// Create a verifier reading from `db`
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenVerifier for DatabaseTokenVerifier {
    async fn verify(&self, token: &str) -> Result<TokenStatus> {
        let Some(record) = self.db.get_token(token).await? else {
            return Ok(TokenStatus::Unknown);
        };

        if record.expires_at <= chrono::Utc::now().timestamp() {
            return Ok(TokenStatus::Expired);
        }

        Ok(TokenStatus::Valid {
            username: record.username,
        })
    }
}
