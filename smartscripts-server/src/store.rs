//! Review store.
//!
//! Owns the create-or-update cycle for reviews and writes the audit trail.
//! Built once at startup and shared with the handlers through `AppState`.

use std::sync::Arc;

use smartscripts_core::{
    apply_update, FeedbackUpdate, ReviewEvent, ReviewEventType, ReviewLookup, ReviewRecord,
    ReviewSummary, SubmissionId,
};
use tokio::sync::Mutex;
use tracing::info;

use crate::repository::{InMemoryRepository, RepositoryError, ReviewRepository};

/// Maximum number of audit events returned for one submission.
pub const MAX_HISTORY_EVENTS: usize = 100;

/// Thread-safe store for submission reviews.
pub struct ReviewStore {
    repository: Arc<dyn ReviewRepository>,
    /// Held across lookup, merge and write so concurrent updates are
    /// applied one after the other.
    upsert_lock: Mutex<()>,
}

impl Default for ReviewStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReviewStore {
    /// Create a store backed by memory only.
    pub fn new() -> Self {
        Self::with_repository(Arc::new(InMemoryRepository::new()))
    }

    pub fn with_repository(repository: Arc<dyn ReviewRepository>) -> Self {
        Self {
            repository,
            upsert_lock: Mutex::new(()),
        }
    }

    /// Get the review for a submission.
    pub async fn get(&self, id: &SubmissionId) -> Result<Option<ReviewRecord>, RepositoryError> {
        self.repository.get(id).await
    }

    pub async fn lookup(&self, id: &SubmissionId) -> Result<ReviewLookup, RepositoryError> {
        Ok(self.repository.get(id).await?.into())
    }

    /// Create the review if absent, apply the update, and return the full record.
    pub async fn upsert(
        &self,
        id: &SubmissionId,
        update: &FeedbackUpdate,
    ) -> Result<ReviewRecord, RepositoryError> {
        let _guard = self.upsert_lock.lock().await;

        let lookup = self.lookup(id).await?;
        let events = update_events(&lookup, update);
        let record = apply_update(lookup, update);

        let recorded_at = chrono::Utc::now().timestamp();
        self.repository
            .put_with_events(id, record.clone(), events, recorded_at)
            .await?;

        info!(
            "Updated review for submission {} (fields: {:?})",
            id,
            update
                .set_fields()
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
        );

        Ok(record)
    }

    /// Summaries of every review, ordered by submission ID.
    pub async fn summaries(&self) -> Result<Vec<ReviewSummary>, RepositoryError> {
        Ok(self
            .repository
            .list()
            .await?
            .into_iter()
            .map(|(id, record)| ReviewSummary::new(id, &record))
            .collect())
    }

    /// Audit trail for a submission, newest first.
    pub async fn history(
        &self,
        id: &SubmissionId,
        limit: usize,
    ) -> Result<Vec<ReviewEvent>, RepositoryError> {
        self.repository
            .get_events(id, limit.min(MAX_HISTORY_EVENTS))
            .await
    }
}

/// Events describing what applying `update` to `lookup` will do.
fn update_events(lookup: &ReviewLookup, update: &FeedbackUpdate) -> Vec<ReviewEventType> {
    let mut events = Vec::new();

    if lookup.is_absent() {
        events.push(ReviewEventType::Created);
    }

    let fields = update.set_fields();
    if !fields.is_empty() {
        events.push(ReviewEventType::FeedbackUpdated { fields });
    }

    if let Some(current) = &update.overrides {
        let previous = match lookup {
            ReviewLookup::Found(record) => record.overrides.clone(),
            ReviewLookup::Absent => Default::default(),
        };
        events.push(ReviewEventType::OverridesReplaced {
            previous,
            current: current.clone(),
        });
    }

    events
}
