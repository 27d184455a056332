use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::memory_store::MemoryStore;
use super::mongodb_store::MongoDBStore;
use super::postgres_store::PostgresStore;
use crate::config::StoreBackend;
use crate::models::{Filters, Metadata, Movie, Permissions, Scope, TokenRecord, User};
use crate::utils::deadline::Deadline;

/// Storage failures, already translated out of the driver's error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("edit conflict: the record was changed or removed by another writer")]
    EditConflict,
    #[error("a user with this email address already exists")]
    DuplicateEmail,
    #[error("storage operation timed out")]
    Timeout,
    #[error("internal storage error: {0}")]
    Internal(String),
}

/// Movie records with version-checked updates.
#[async_trait]
pub trait MovieStore: Send + Sync {
    /// Assigns `id`, `created_at` and `version = 1` and returns the stored movie.
    async fn insert_movie(&self, deadline: Deadline, movie: &Movie) -> Result<Movie, StoreError>;

    async fn get_movie(&self, deadline: Deadline, id: i64) -> Result<Movie, StoreError>;

    /// Writes `movie` only if the stored version still equals `movie.version`.
    /// Returns the new version. `EditConflict` when no row matched.
    async fn update_movie(&self, deadline: Deadline, movie: &Movie) -> Result<i32, StoreError>;

    async fn delete_movie(&self, deadline: Deadline, id: i64) -> Result<(), StoreError>;

    /// Title search AND genre containment, ordered and paged by `filters`.
    async fn list_movies(
        &self,
        deadline: Deadline,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, deadline: Deadline, user: &User) -> Result<User, StoreError>;

    async fn get_user(&self, deadline: Deadline, id: i64) -> Result<User, StoreError>;

    /// Case-insensitive on the email address.
    async fn get_user_by_email(&self, deadline: Deadline, email: &str)
        -> Result<User, StoreError>;

    /// Same version rule as movies. Returns the new version.
    async fn update_user(&self, deadline: Deadline, user: &User) -> Result<i32, StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_token(&self, deadline: Deadline, token: &TokenRecord)
        -> Result<(), StoreError>;

    /// Looks a token up by its hash. Expiry is the caller's concern.
    async fn get_token(
        &self,
        deadline: Deadline,
        hash: &[u8],
        scope: Scope,
    ) -> Result<Option<TokenRecord>, StoreError>;

    async fn delete_tokens_for_user(
        &self,
        deadline: Deadline,
        user_id: i64,
        scope: Scope,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn get_permissions_for_user(
        &self,
        deadline: Deadline,
        user_id: i64,
    ) -> Result<Permissions, StoreError>;

    /// Grants `codes`. Codes outside the catalog are ignored.
    async fn add_permissions_for_user(
        &self,
        deadline: Deadline,
        user_id: i64,
        codes: &[&str],
    ) -> Result<(), StoreError>;
}

/// Everything the service persists, behind one backend.
#[async_trait]
pub trait Store: MovieStore + UserStore + TokenStore + PermissionStore {
    fn name(&self) -> &str;

    /// Creates tables, indexes and seed rows the backend needs.
    async fn migrate(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Creates a concrete store implementation based on the configured backend.
pub async fn create_store(config: &StoreBackend) -> Result<Arc<dyn Store>, StoreError> {
    let store: Arc<dyn Store> = match config {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::MongoDB(mongo_config) => Arc::new(MongoDBStore::new(mongo_config).await?),
        StoreBackend::Postgres(pg_config) => Arc::new(PostgresStore::connect(pg_config).await?),
    };
    info!(backend = store.name(), "Store created.");
    Ok(store)
}
