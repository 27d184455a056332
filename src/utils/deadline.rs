use std::future::Future;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};

use crate::store::StoreError;

/// Absolute point in time by which a storage call must finish.
///
/// Handlers create one per storage call and pass it down explicitly; there is no
/// ambient request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Deadline(Instant::now() + timeout)
    }

    pub fn at(instant: Instant) -> Self {
        Deadline(instant)
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }

    /// Fails fast with `Timeout` once the deadline has passed.
    pub fn check(&self) -> Result<(), StoreError> {
        if self.is_expired() {
            return Err(StoreError::Timeout);
        }
        Ok(())
    }

    /// Runs `fut` until the deadline. Elapsed deadlines become `StoreError::Timeout`.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match timeout_at(self.0, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }
}
