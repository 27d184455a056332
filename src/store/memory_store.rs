use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::base::{MovieStore, PermissionStore, Store, StoreError, TokenStore, UserStore};
use super::search_terms;
use crate::models::filters::SortDirection;
use crate::models::permission::is_known_permission;
use crate::models::{Filters, Metadata, Movie, Permissions, Scope, TokenRecord, User};
use crate::utils::deadline::Deadline;

#[derive(Debug, Default)]
struct InnerState {
    next_movie_id: i64,
    next_user_id: i64,
    movies: Vec<Movie>,
    users: Vec<User>,
    tokens: Vec<TokenRecord>,
    permissions: HashMap<i64, Vec<String>>,
}

/// Process-local backend. Every compare-and-swap happens under one mutex.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<InnerState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, InnerState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Internal("memory store lock poisoned".to_string()))
    }
}

fn title_matches(title: &str, terms: &[String]) -> bool {
    if terms.is_empty() {
        return true;
    }
    let words = search_terms(title);
    terms.iter().all(|t| words.contains(t))
}

fn genres_match(genres: &[String], wanted: &[String]) -> bool {
    wanted.iter().all(|w| genres.contains(w))
}

fn compare_by(column: &str, a: &Movie, b: &Movie) -> Ordering {
    match column {
        "title" => a.title.cmp(&b.title),
        "year" => a.year.cmp(&b.year),
        "runtime" => a.runtime.cmp(&b.runtime),
        _ => a.id.cmp(&b.id),
    }
}

#[async_trait]
impl MovieStore for MemoryStore {
    async fn insert_movie(&self, deadline: Deadline, movie: &Movie) -> Result<Movie, StoreError> {
        deadline.check()?;
        let mut state = self.lock()?;
        state.next_movie_id += 1;

        let mut stored = movie.clone();
        stored.id = state.next_movie_id;
        stored.created_at = Utc::now();
        stored.version = 1;
        state.movies.push(stored.clone());

        debug!(movie_id = stored.id, "Inserted movie.");
        Ok(stored)
    }

    async fn get_movie(&self, deadline: Deadline, id: i64) -> Result<Movie, StoreError> {
        deadline.check()?;
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        let state = self.lock()?;
        state
            .movies
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_movie(&self, deadline: Deadline, movie: &Movie) -> Result<i32, StoreError> {
        deadline.check()?;
        let mut state = self.lock()?;
        let stored = state
            .movies
            .iter_mut()
            .find(|m| m.id == movie.id && m.version == movie.version)
            .ok_or(StoreError::EditConflict)?;

        stored.title = movie.title.clone();
        stored.year = movie.year;
        stored.runtime = movie.runtime;
        stored.genres = movie.genres.clone();
        stored.version += 1;
        Ok(stored.version)
    }

    async fn delete_movie(&self, deadline: Deadline, id: i64) -> Result<(), StoreError> {
        deadline.check()?;
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        let mut state = self.lock()?;
        let before = state.movies.len();
        state.movies.retain(|m| m.id != id);
        if state.movies.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_movies(
        &self,
        deadline: Deadline,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), StoreError> {
        deadline.check()?;
        let column = filters
            .sort_column()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let direction = filters.sort_direction();
        let terms = search_terms(title);

        let state = self.lock()?;
        let mut matching: Vec<&Movie> = state
            .movies
            .iter()
            .filter(|m| title_matches(&m.title, &terms) && genres_match(&m.genres, genres))
            .collect();

        matching.sort_by(|a, b| {
            let primary = match direction {
                SortDirection::Ascending => compare_by(column, a, b),
                SortDirection::Descending => compare_by(column, b, a),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filters.offset().max(0) as usize)
            .take(filters.limit().max(0) as usize)
            .cloned()
            .collect();

        Ok((
            page,
            Metadata::calculate(total, filters.page, filters.page_size),
        ))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, deadline: Deadline, user: &User) -> Result<User, StoreError> {
        deadline.check()?;
        let mut state = self.lock()?;
        if state
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::DuplicateEmail);
        }
        state.next_user_id += 1;

        let mut stored = user.clone();
        stored.id = state.next_user_id;
        stored.created_at = Utc::now();
        stored.version = 1;
        state.users.push(stored.clone());
        Ok(stored)
    }

    async fn get_user(&self, deadline: Deadline, id: i64) -> Result<User, StoreError> {
        deadline.check()?;
        let state = self.lock()?;
        state
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_user_by_email(
        &self,
        deadline: Deadline,
        email: &str,
    ) -> Result<User, StoreError> {
        deadline.check()?;
        let state = self.lock()?;
        state
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_user(&self, deadline: Deadline, user: &User) -> Result<i32, StoreError> {
        deadline.check()?;
        let mut state = self.lock()?;
        if state
            .users
            .iter()
            .any(|u| u.id != user.id && u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::DuplicateEmail);
        }
        let stored = state
            .users
            .iter_mut()
            .find(|u| u.id == user.id && u.version == user.version)
            .ok_or(StoreError::EditConflict)?;

        stored.name = user.name.clone();
        stored.email = user.email.clone();
        stored.password = user.password.clone();
        stored.activated = user.activated;
        stored.version += 1;
        Ok(stored.version)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_token(
        &self,
        deadline: Deadline,
        token: &TokenRecord,
    ) -> Result<(), StoreError> {
        deadline.check()?;
        let mut state = self.lock()?;
        if state.tokens.iter().any(|t| t.hash == token.hash) {
            return Err(StoreError::Internal("duplicate token hash".to_string()));
        }
        state.tokens.push(token.clone());
        Ok(())
    }

    async fn get_token(
        &self,
        deadline: Deadline,
        hash: &[u8],
        scope: Scope,
    ) -> Result<Option<TokenRecord>, StoreError> {
        deadline.check()?;
        let state = self.lock()?;
        Ok(state
            .tokens
            .iter()
            .find(|t| t.hash == hash && t.scope == scope)
            .cloned())
    }

    async fn delete_tokens_for_user(
        &self,
        deadline: Deadline,
        user_id: i64,
        scope: Scope,
    ) -> Result<(), StoreError> {
        deadline.check()?;
        let mut state = self.lock()?;
        state
            .tokens
            .retain(|t| !(t.user_id == user_id && t.scope == scope));
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn get_permissions_for_user(
        &self,
        deadline: Deadline,
        user_id: i64,
    ) -> Result<Permissions, StoreError> {
        deadline.check()?;
        let state = self.lock()?;
        Ok(state
            .permissions
            .get(&user_id)
            .cloned()
            .map(Permissions::new)
            .unwrap_or_default())
    }

    async fn add_permissions_for_user(
        &self,
        deadline: Deadline,
        user_id: i64,
        codes: &[&str],
    ) -> Result<(), StoreError> {
        deadline.check()?;
        let mut state = self.lock()?;
        let granted = state.permissions.entry(user_id).or_default();
        for code in codes.iter().filter(|c| is_known_permission(c)) {
            if !granted.iter().any(|g| g == code) {
                granted.push(code.to_string());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }
}
