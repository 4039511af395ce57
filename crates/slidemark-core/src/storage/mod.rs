//! Persistence collaborators and save scheduling.

mod memory;
mod scheduler;

#[cfg(not(target_arch = "wasm32"))]
mod file;

pub use memory::{MemoryStore, MemoryStyleStore};
pub use scheduler::{
    Backoff, DEFAULT_INITIAL_RETRY_MS, DEFAULT_MAX_RETRY_MS, FollowUp, RetryAction, SaveRequest,
    SaveScheduler, SaveState,
};

#[cfg(not(target_arch = "wasm32"))]
pub use file::{FileStore, FileStyleStore};

use crate::annotation::{Annotation, AnnotationId};
use crate::style::StyleGroup;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Persistence errors.
///
/// The save scheduler treats every variant the same way: the write failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Request rejected with status {0}")]
    Rejected(u16),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Storage error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed future for async operations (compatible with WASM).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Remote element store holding annotations.
///
/// Note: On native platforms, implementations must be Send + Sync.
/// On WASM, these bounds are relaxed since it's single-threaded.
#[cfg(not(target_arch = "wasm32"))]
pub trait AnnotationStore: Send + Sync {
    /// Create an annotation that the store has not seen yet.
    fn create(&self, annotation: &Annotation) -> BoxFuture<'_, StoreResult<()>>;

    /// Overwrite an existing annotation.
    fn update(&self, annotation: &Annotation) -> BoxFuture<'_, StoreResult<()>>;

    /// Fetch an annotation.
    fn fetch(&self, id: AnnotationId) -> BoxFuture<'_, StoreResult<Annotation>>;

    /// Delete an annotation.
    fn destroy(&self, id: AnnotationId) -> BoxFuture<'_, StoreResult<()>>;
}

/// Remote element store holding annotations (WASM version without Send + Sync).
#[cfg(target_arch = "wasm32")]
pub trait AnnotationStore {
    fn create(&self, annotation: &Annotation) -> BoxFuture<'_, StoreResult<()>>;
    fn update(&self, annotation: &Annotation) -> BoxFuture<'_, StoreResult<()>>;
    fn fetch(&self, id: AnnotationId) -> BoxFuture<'_, StoreResult<Annotation>>;
    fn destroy(&self, id: AnnotationId) -> BoxFuture<'_, StoreResult<()>>;
}

/// Per-user persistence of style groups.
#[cfg(not(target_arch = "wasm32"))]
pub trait StyleStore: Send + Sync {
    /// All style groups of a user, in stored order.
    fn fetch_all(&self, user: &str) -> BoxFuture<'_, StoreResult<Vec<StyleGroup>>>;

    /// Append a new style group.
    fn add(&self, user: &str, group: &StyleGroup) -> BoxFuture<'_, StoreResult<()>>;

    /// Update one style group.
    fn save(&self, user: &str, group: &StyleGroup) -> BoxFuture<'_, StoreResult<()>>;

    /// Delete one style group.
    fn destroy(&self, user: &str, id: &str) -> BoxFuture<'_, StoreResult<()>>;
}

/// Per-user persistence of style groups (WASM version without Send + Sync).
#[cfg(target_arch = "wasm32")]
pub trait StyleStore {
    fn fetch_all(&self, user: &str) -> BoxFuture<'_, StoreResult<Vec<StyleGroup>>>;
    fn add(&self, user: &str, group: &StyleGroup) -> BoxFuture<'_, StoreResult<()>>;
    fn save(&self, user: &str, group: &StyleGroup) -> BoxFuture<'_, StoreResult<()>>;
    fn destroy(&self, user: &str, id: &str) -> BoxFuture<'_, StoreResult<()>>;
}
