pub mod base;
pub mod memory_store;
pub mod mongodb_store;
pub mod postgres_store;

// Re-export the primary Store items so code outside can do
// "use crate::store::{Store, create_store};"
pub use base::{
    create_store, MovieStore, PermissionStore, Store, StoreError, TokenStore, UserStore,
};
pub use memory_store::MemoryStore;

/// Lowercased alphanumeric words of `text`, the unit of title search.
pub fn search_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}
