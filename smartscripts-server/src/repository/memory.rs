//! In-memory implementation of `ReviewRepository`.
//!
//! All reviews are held in memory and lost on restart. Each submission keeps
//! at most `MAX_HISTORY_EVENTS` audit events; older ones are dropped on write.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use smartscripts_core::{ReviewEvent, ReviewEventType, ReviewRecord, SubmissionId};
use tokio::sync::RwLock;

use super::{RepositoryError, ReviewRepository};
use crate::store::MAX_HISTORY_EVENTS;

/// In-memory review repository.
///
/// Reviews live in a `BTreeMap` so listing comes out in submission order.
/// Events are kept per submission in insertion order.
pub struct InMemoryRepository {
    reviews: RwLock<BTreeMap<SubmissionId, ReviewRecord>>,
    events: RwLock<EventLog>,
}

struct EventLog {
    next_id: i64,
    by_submission: HashMap<SubmissionId, Vec<ReviewEvent>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            reviews: RwLock::new(BTreeMap::new()),
            events: RwLock::new(EventLog {
                next_id: 1,
                by_submission: HashMap::new(),
            }),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReviewRepository for InMemoryRepository {
    async fn get(&self, id: &SubmissionId) -> Result<Option<ReviewRecord>, RepositoryError> {
        let reviews = self.reviews.read().await;
        Ok(reviews.get(id).cloned())
    }

    async fn put_with_events(
        &self,
        id: &SubmissionId,
        record: ReviewRecord,
        events: Vec<ReviewEventType>,
        recorded_at: i64,
    ) -> Result<(), RepositoryError> {
        // Lock order: reviews, then events.
        let mut reviews = self.reviews.write().await;
        let mut log = self.events.write().await;

        reviews.insert(id.clone(), record);

        if events.is_empty() {
            return Ok(());
        }

        let EventLog {
            next_id,
            by_submission,
        } = &mut *log;
        let trail = by_submission.entry(id.clone()).or_default();
        for event_type in events {
            trail.push(ReviewEvent {
                id: *next_id,
                submission_id: id.clone(),
                event_type,
                recorded_at,
            });
            *next_id += 1;
        }
        if trail.len() > MAX_HISTORY_EVENTS {
            let excess = trail.len() - MAX_HISTORY_EVENTS;
            trail.drain(..excess);
        }

        Ok(())
    }

    async fn list(&self) -> Result<Vec<(SubmissionId, ReviewRecord)>, RepositoryError> {
        let reviews = self.reviews.read().await;
        Ok(reviews
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect())
    }

    async fn get_events(
        &self,
        id: &SubmissionId,
        limit: usize,
    ) -> Result<Vec<ReviewEvent>, RepositoryError> {
        let log = self.events.read().await;
        let mut events = log.by_submission.get(id).cloned().unwrap_or_default();
        // Same order as the SQLite backend: recorded_at DESC, id DESC
        events.sort_by(|a, b| (b.recorded_at, b.id).cmp(&(a.recorded_at, a.id)));
        events.truncate(limit);
        Ok(events)
    }
}
