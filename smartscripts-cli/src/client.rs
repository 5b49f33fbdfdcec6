use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};
use smartscripts_core::{
    ErrorResponse, FeedbackUpdate, ReviewHistoryResponse, ReviewListResponse, ReviewRecord,
};

/// HTTP client for the review service.
#[derive(Clone)]
pub struct ReviewClient {
    client: Client,
    base_url: String,
}

impl ReviewClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn review_url(&self, submission_id: &str) -> String {
        format!(
            "{}/reviews/{}",
            self.base_url,
            urlencoding::encode(submission_id)
        )
    }

    /// Fetch a review. Returns `Ok(None)` when the service has no review
    /// for the submission.
    pub async fn get_review(&self, submission_id: &str) -> Result<Option<ReviewRecord>> {
        let response = self
            .client
            .get(self.review_url(submission_id))
            .send()
            .await
            .context("Failed to reach review service")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let record = response
            .json::<ReviewRecord>()
            .await
            .context("Failed to parse review")?;
        Ok(Some(record))
    }

    pub async fn post_feedback(
        &self,
        submission_id: &str,
        update: &FeedbackUpdate,
    ) -> Result<ReviewRecord> {
        let response = self
            .client
            .post(format!("{}/feedback", self.review_url(submission_id)))
            .json(update)
            .send()
            .await
            .context("Failed to reach review service")?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .json::<ReviewRecord>()
            .await
            .context("Failed to parse updated review")
    }

    pub async fn list_reviews(&self) -> Result<ReviewListResponse> {
        let response = self
            .client
            .get(format!("{}/reviews", self.base_url))
            .send()
            .await
            .context("Failed to reach review service")?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .json::<ReviewListResponse>()
            .await
            .context("Failed to parse review list")
    }

    pub async fn history(
        &self,
        submission_id: &str,
        limit: Option<usize>,
    ) -> Result<ReviewHistoryResponse> {
        let mut request = self
            .client
            .get(format!("{}/history", self.review_url(submission_id)));
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }

        let response = request
            .send()
            .await
            .context("Failed to reach review service")?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .json::<ReviewHistoryResponse>()
            .await
            .context("Failed to parse review history")
    }
}

/// Turn a non-success response into an error, preferring the service's
/// `{error}` message over the raw body.
async fn error_from_response(response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(body) => anyhow!("{} ({})", body.error, status),
        Err(_) => anyhow!("Review service returned {}: {}", status, text),
    }
}
