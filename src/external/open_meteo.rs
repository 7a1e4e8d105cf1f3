use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use crate::external::payload::OPEN_METEO_FIELDS;
use crate::external::series_fetcher::{read_json, FetchError, RawPayload, SeriesFetcher};
use crate::models::SeriesKey;

/// Hourly observations from the Open-Meteo archive API.
pub struct OpenMeteoClient {
    client: reqwest::Client,
    api_url: String,
    latitude: f64,
    longitude: f64,
}

impl OpenMeteoClient {
    pub fn new(api_url: impl Into<String>, latitude: f64, longitude: f64) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            latitude,
            longitude,
        })
    }

    fn hourly_param() -> String {
        OPEN_METEO_FIELDS
            .iter()
            .map(|(upstream, _)| *upstream)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[async_trait]
impl SeriesFetcher for OpenMeteoClient {
    async fn fetch(
        &self,
        key: &SeriesKey,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawPayload, FetchError> {
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();
        debug!("GET {} {} {}..{}", self.api_url, key, start, end);

        let resp = self
            .client
            .get(&self.api_url)
            .query(&[
                ("latitude", self.latitude.to_string()),
                ("longitude", self.longitude.to_string()),
                ("start_date", start),
                ("end_date", end),
                ("hourly", Self::hourly_param()),
                ("timezone", "GMT".to_string()),
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
