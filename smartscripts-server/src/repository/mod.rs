//! Repository abstraction for review persistence.
//!
//! This module defines the `ReviewRepository` trait that abstracts
//! storage of review records and their audit events. Implementations
//! provide different backends (in-memory, SQLite).

mod memory;
mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use smartscripts_core::{ReviewEvent, ReviewEventType, ReviewRecord, SubmissionId};

/// Errors surfaced by a repository backend.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The backend failed to perform an operation.
    #[error("storage error during {operation}: {message}")]
    Storage { operation: String, message: String },

    /// Stored data could not be decoded.
    #[error("corrupted data: {what}")]
    Corruption { what: String },
}

impl RepositoryError {
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        RepositoryError::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        RepositoryError::Corruption { what: what.into() }
    }
}

/// Repository trait for persisting reviews.
///
/// The `ReviewStore` uses this trait to stay independent of the storage
/// backend. Writes have upsert semantics; there is no delete.
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Get the review for a submission, returning None if not found.
    async fn get(&self, id: &SubmissionId) -> Result<Option<ReviewRecord>, RepositoryError>;

    /// Store the review for a submission (upsert semantics) and append
    /// `events` to its audit trail. Nothing is written if any part fails.
    async fn put_with_events(
        &self,
        id: &SubmissionId,
        record: ReviewRecord,
        events: Vec<ReviewEventType>,
        recorded_at: i64,
    ) -> Result<(), RepositoryError>;

    /// Get all reviews, ordered by submission ID.
    async fn list(&self) -> Result<Vec<(SubmissionId, ReviewRecord)>, RepositoryError>;

    /// Get up to `limit` events for a submission, newest first.
    async fn get_events(
        &self,
        id: &SubmissionId,
        limit: usize,
    ) -> Result<Vec<ReviewEvent>, RepositoryError>;
}
