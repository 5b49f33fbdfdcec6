//! Review records and the feedback update that teachers post against them.
//!
//! A review is created implicitly by the first update for a submission and
//! mutated in place afterwards. The update is parsed leniently: a field with
//! the wrong JSON shape is skipped rather than rejected, and every field that
//! is taken replaces the stored value wholesale. Comment and override values
//! are stored exactly as posted.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Caller-supplied identifier for one student's submission.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub String);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubmissionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SubmissionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Teacher-supplied replacement scores, keyed by question identifier.
///
/// Scores are whatever JSON the client posted, usually numbers but sometimes
/// strings from a form field. Integers stay integers on the wire.
pub type Overrides = BTreeMap<String, Value>;

fn zero() -> Number {
    Number::from(0)
}

/// Feedback, score and override state for one submission.
///
/// `percentage` is whatever the grading engine supplied; nothing here keeps
/// it consistent with `total_score / max_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    #[serde(default)]
    pub student_name: String,
    #[serde(default = "zero")]
    pub total_score: Number,
    #[serde(default = "zero")]
    pub max_score: Number,
    #[serde(default = "zero")]
    pub percentage: Number,
    /// Per-question grading results. Opaque to the review service.
    #[serde(default)]
    pub questions: Vec<Value>,
    #[serde(default)]
    pub feedback: String,
    /// Usually strings.
    #[serde(default)]
    pub comments: Vec<Value>,
    #[serde(default)]
    pub overrides: Overrides,
}

impl Default for ReviewRecord {
    fn default() -> Self {
        Self {
            student_name: String::new(),
            total_score: zero(),
            max_score: zero(),
            percentage: zero(),
            questions: Vec::new(),
            feedback: String::new(),
            comments: Vec::new(),
            overrides: Overrides::new(),
        }
    }
}

/// The fields of a review that a feedback update is allowed to set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReviewField {
    Feedback,
    Comments,
    Overrides,
}

impl ReviewField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewField::Feedback => "feedback",
            ReviewField::Comments => "comments",
            ReviewField::Overrides => "overrides",
        }
    }
}

impl fmt::Display for ReviewField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A partial update to a review. `None` means "leave the stored value alone".
///
/// Serializes with absent fields omitted, which is the body shape the
/// feedback endpoint accepts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedbackUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Overrides>,
}

impl FeedbackUpdate {
    /// Extract the settable fields from a JSON body.
    ///
    /// - `feedback` is taken only if it is a string.
    /// - `comments` is taken only if it is an array.
    /// - `overrides` is taken only if it is an object.
    ///
    /// Array elements and override values are kept as they are.
    ///
    /// Anything else in the body, including a body that is not an object,
    /// is ignored.
    pub fn from_json(body: &Value) -> Self {
        let Some(fields) = body.as_object() else {
            return Self::default();
        };

        Self {
            feedback: fields
                .get("feedback")
                .and_then(Value::as_str)
                .map(str::to_owned),
            comments: fields.get("comments").and_then(Value::as_array).cloned(),
            overrides: fields
                .get("overrides")
                .and_then(Value::as_object)
                .map(|scores| {
                    scores
                        .iter()
                        .map(|(question, score)| (question.clone(), score.clone()))
                        .collect()
                }),
        }
    }

    /// Parse a raw request body. Empty or unparseable bodies give an empty update.
    pub fn from_slice(body: &[u8]) -> Self {
        serde_json::from_slice::<Value>(body)
            .map(|value| Self::from_json(&value))
            .unwrap_or_default()
    }

    /// Which fields this update sets, in declaration order.
    pub fn set_fields(&self) -> Vec<ReviewField> {
        let mut fields = Vec::new();
        if self.feedback.is_some() {
            fields.push(ReviewField::Feedback);
        }
        if self.comments.is_some() {
            fields.push(ReviewField::Comments);
        }
        if self.overrides.is_some() {
            fields.push(ReviewField::Overrides);
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.feedback.is_none() && self.comments.is_none() && self.overrides.is_none()
    }
}

/// Result of looking a submission up before applying an update.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewLookup {
    Found(ReviewRecord),
    Absent,
}

impl ReviewLookup {
    pub fn is_absent(&self) -> bool {
        matches!(self, ReviewLookup::Absent)
    }
}

impl From<Option<ReviewRecord>> for ReviewLookup {
    fn from(record: Option<ReviewRecord>) -> Self {
        match record {
            Some(record) => ReviewLookup::Found(record),
            None => ReviewLookup::Absent,
        }
    }
}

/// Apply an update to the looked-up review and return the resulting record.
///
/// An absent review starts from [`ReviewRecord::default`]. Fields present in
/// the update replace the stored ones; comments are not appended and
/// overrides are not merged key by key.
pub fn apply_update(lookup: ReviewLookup, update: &FeedbackUpdate) -> ReviewRecord {
    let mut record = match lookup {
        ReviewLookup::Found(record) => record,
        ReviewLookup::Absent => ReviewRecord::default(),
    };

    if let Some(feedback) = &update.feedback {
        record.feedback = feedback.clone();
    }
    if let Some(comments) = &update.comments {
        record.comments = comments.clone();
    }
    if let Some(overrides) = &update.overrides {
        record.overrides = overrides.clone();
    }

    record
}
