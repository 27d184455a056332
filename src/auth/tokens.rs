use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use data_encoding::BASE32_NOPAD;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use crate::models::token::{hash_plaintext, validate_token_plaintext};
use crate::models::{Scope, Token};
use crate::store::{StoreError, TokenStore};
use crate::utils::clock::Clock;
use crate::utils::deadline::Deadline;
use crate::validator::{ValidationErrors, Validator};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("could not generate token: {0}")]
    Generation(String),
    #[error("malformed token")]
    Malformed(ValidationErrors),
    #[error("token not found")]
    NotFound,
    #[error("token expired")]
    Expired,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Builds a token without persisting it. The plaintext is 16 bytes from the
/// OS random source, base-32 encoded without padding.
pub fn generate_token(
    user_id: i64,
    ttl: Duration,
    scope: Scope,
    now: DateTime<Utc>,
) -> Result<Token, TokenError> {
    let mut secret = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut secret)
        .map_err(|e| TokenError::Generation(e.to_string()))?;
    let ttl = TimeDelta::from_std(ttl).map_err(|e| TokenError::Generation(e.to_string()))?;

    let expiry = now
        .checked_add_signed(ttl)
        .ok_or_else(|| TokenError::Generation("token expiry out of range".to_string()))?;

    let plaintext = BASE32_NOPAD.encode(&secret);
    Ok(Token {
        hash: hash_plaintext(&plaintext),
        plaintext,
        user_id,
        expiry,
        scope,
    })
}

/// Issues, resolves and revokes scoped bearer tokens.
///
/// Only SHA-256 digests reach the store. Lookups are keyed by `(hash, scope)`, so a
/// token minted for one purpose never satisfies another.
pub struct TokenAuthority<S: ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: ?Sized> Clone for TokenAuthority<S> {
    fn clone(&self) -> Self {
        TokenAuthority {
            store: self.store.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: TokenStore + ?Sized> TokenAuthority<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        TokenAuthority { store, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn issue(
        &self,
        deadline: Deadline,
        user_id: i64,
        ttl: Duration,
        scope: Scope,
    ) -> Result<Token, TokenError> {
        let token = generate_token(user_id, ttl, scope, self.clock.now())?;
        self.store.insert_token(deadline, &token.record()).await?;
        debug!(user_id, scope = scope.as_str(), expiry = %token.expiry, "Issued token.");
        Ok(token)
    }

    /// Resolves a presented plaintext to the user it was issued for.
    pub async fn authenticate(
        &self,
        deadline: Deadline,
        plaintext: &str,
        scope: Scope,
    ) -> Result<i64, TokenError> {
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, plaintext);
        v.finish().map_err(TokenError::Malformed)?;

        let record = self
            .store
            .get_token(deadline, &hash_plaintext(plaintext), scope)
            .await?
            .ok_or(TokenError::NotFound)?;

        if record.expiry <= self.clock.now() {
            return Err(TokenError::Expired);
        }
        Ok(record.user_id)
    }

    pub async fn revoke_all(
        &self,
        deadline: Deadline,
        user_id: i64,
        scope: Scope,
    ) -> Result<(), TokenError> {
        self.store
            .delete_tokens_for_user(deadline, user_id, scope)
            .await?;
        Ok(())
    }
}
