use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use crate::external::series_fetcher::{read_json, FetchError, RawPayload, SeriesFetcher};
use crate::models::SeriesKey;

/// Day-ahead prices from the energy-charts `price` endpoint.
pub struct EnergyChartsClient {
    client: reqwest::Client,
    base_url: String,
}

impl EnergyChartsClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/price", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SeriesFetcher for EnergyChartsClient {
    async fn fetch(
        &self,
        key: &SeriesKey,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawPayload, FetchError> {
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();
        debug!("GET {} bzn={} {}..{}", self.endpoint(), key.zone_id, start, end);

        let resp = self
            .client
            .get(self.endpoint())
            .query(&[
                ("bzn", key.zone_id.as_str()),
                ("start", start.as_str()),
                ("end", end.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(RawPayload {
            series_key: key.clone(),
            body: read_json(resp).await?,
        })
    }
}
