//! Wire types shared by the review service and its clients.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::review::{Overrides, ReviewField, ReviewRecord, SubmissionId};

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    pub fn review_not_found(submission_id: &SubmissionId) -> Self {
        Self::new(format!(
            "Review not found for submissionId {}",
            submission_id
        ))
    }
}

/// One row of the review list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub submission_id: SubmissionId,
    pub student_name: String,
    pub total_score: Number,
    pub max_score: Number,
    pub percentage: Number,
    pub comment_count: usize,
    pub override_count: usize,
}

impl ReviewSummary {
    pub fn new(submission_id: SubmissionId, record: &ReviewRecord) -> Self {
        Self {
            submission_id,
            student_name: record.student_name.clone(),
            total_score: record.total_score.clone(),
            max_score: record.max_score.clone(),
            percentage: record.percentage.clone(),
            comment_count: record.comments.len(),
            override_count: record.overrides.len(),
        }
    }
}

/// API response for `GET /reviews`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewListResponse {
    pub version: String,
    pub reviews: Vec<ReviewSummary>,
}

/// Something that happened to a review, kept for the audit trail.
///
/// Adjacently tagged on the wire:
/// ```json
/// { "type": "OverridesReplaced", "data": { "previous": {}, "current": { "q2": 3 } } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ReviewEventType {
    /// The first update for a submission created its review.
    Created,

    /// An update set one or more fields.
    FeedbackUpdated { fields: Vec<ReviewField> },

    /// A teacher replaced the score overrides.
    OverridesReplaced {
        previous: Overrides,
        current: Overrides,
    },
}

impl ReviewEventType {
    pub fn variant_name(&self) -> &'static str {
        match self {
            ReviewEventType::Created => "Created",
            ReviewEventType::FeedbackUpdated { .. } => "FeedbackUpdated",
            ReviewEventType::OverridesReplaced { .. } => "OverridesReplaced",
        }
    }
}

/// A logged review event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEvent {
    pub id: i64,
    pub submission_id: SubmissionId,
    pub event_type: ReviewEventType,
    /// Unix seconds.
    pub recorded_at: i64,
}

/// API response for `GET /reviews/:submissionId/history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewHistoryResponse {
    pub submission_id: SubmissionId,
    pub events: Vec<ReviewEvent>,
}

/// Describe how an override set changed, question by question.
///
/// Returns `(question, previous, current)` for every question whose score
/// differs, in question order.
pub fn override_changes<'a>(
    previous: &'a Overrides,
    current: &'a Overrides,
) -> Vec<(&'a str, Option<&'a Value>, Option<&'a Value>)> {
    let questions: BTreeSet<&str> = previous
        .keys()
        .chain(current.keys())
        .map(String::as_str)
        .collect();

    questions
        .into_iter()
        .filter_map(|question| {
            let before = previous.get(question);
            let after = current.get(question);
            (before != after).then_some((question, before, after))
        })
        .collect()
}
