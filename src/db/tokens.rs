//! Publish token storage.

use crate::error::DatabaseError;
use crate::{Error, Result};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::time::Duration;

use super::{Database, TokenRecord};

const TOKEN_LENGTH: usize = 32;

impl Database {
    /// Issue a token for `username`, valid for `ttl`
    ///
    /// Returns the opaque token value that clients send in the publish body.
    pub async fn insert_token(&self, username: &str, ttl: Duration) -> Result<String> {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();
        let now = chrono::Utc::now().timestamp();

        sqlx::query("INSERT INTO tokens (id, username, created_at, expires_at) VALUES (?, ?, ?, ?)")
            .bind(&token)
            .bind(username)
            .bind(now)
            .bind(now + ttl.as_secs() as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert token: {}",
                    e
                )))
            })?;

        Ok(token)
    }

    /// Get a token by value
    pub async fn get_token(&self, token: &str) -> Result<Option<TokenRecord>> {
        let row = sqlx::query_as::<_, TokenRecord>(
            "SELECT id, username, created_at, expires_at FROM tokens WHERE id = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get token: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Delete every token whose expiry has passed
    pub async fn purge_expired_tokens(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tokens WHERE expires_at <= ?")
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to purge expired tokens: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected())
    }
}
