use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::SeriesKey;

/// Undecoded response body for one request window.
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub series_key: SeriesKey,
    pub body: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("bad response ({status}): {message}")]
    BadResponse { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,
}

/// Fetch-and-parse collaborator for one upstream source.
#[async_trait]
pub trait SeriesFetcher: Send + Sync {
    /// Fetch the inclusive date range `[start, end]` for `key`.
    async fn fetch(
        &self,
        key: &SeriesKey,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawPayload, FetchError>;
}

/// Shared response handling for the JSON clients.
pub(crate) async fn read_json(resp: reqwest::Response) -> Result<serde_json::Value, FetchError> {
    let status = resp.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimited);
    }
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(FetchError::BadResponse {
            status: status.as_u16(),
            message: message.chars().take(200).collect(),
        });
    }
    resp.json()
        .await
        .map_err(|e| FetchError::Parse(e.to_string()))
}
