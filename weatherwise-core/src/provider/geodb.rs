use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    config::SearchConfig,
    error::HttpError,
    http::{HttpClient, HttpRequest},
    model::{CitySuggestion, Query},
};

/// GeoDB Cities (RapidAPI) name-prefix search.
#[derive(Debug, Clone)]
pub struct GeoDbProvider {
    http: Arc<dyn HttpClient>,
    base_url: String,
    api_key: String,
    min_population: u64,
    limit: u32,
}

impl GeoDbProvider {
    pub fn new(
        http: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        search: &SearchConfig,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            min_population: search.min_population,
            limit: search.result_limit,
        }
    }

    fn request(&self, query: &Query, cancel: CancellationToken) -> HttpRequest {
        HttpRequest::get(format!("{}/cities", self.base_url))
            .query("minPopulation", self.min_population)
            .query("namePrefix", &query.text)
            .query("limit", self.limit)
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", &rapidapi_host(&self.base_url))
            .cancel_with(cancel)
    }

    pub async fn search(
        &self,
        query: &Query,
        cancel: CancellationToken,
    ) -> Result<Vec<CitySuggestion>, HttpError> {
        let payload = self.http.get_json(self.request(query, cancel)).await?;
        Ok(parse_cities(&payload))
    }
}

/// Host part of the base URL, as RapidAPI expects it in `X-RapidAPI-Host`.
fn rapidapi_host(base_url: &str) -> String {
    let without_scheme = base_url.split_once("://").map_or(base_url, |(_, rest)| rest);
    without_scheme.split('/').next().unwrap_or_default().to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeoCity {
    name: Option<String>,
    country_code: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl GeoCity {
    fn into_suggestion(self) -> Option<CitySuggestion> {
        let name = self.name.filter(|n| !n.trim().is_empty())?;
        let country = self.country_code.filter(|c| !c.trim().is_empty())?;
        Some(CitySuggestion {
            label: format!("{name}, {country}"),
            latitude: self.latitude?,
            longitude: self.longitude?,
        })
    }
}

/// Map a `{ data: [...] }` payload to suggestions. Records with missing or
/// mistyped fields are dropped.
pub fn parse_cities(payload: &Value) -> Vec<CitySuggestion> {
    let Some(records) = payload.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };

    records
        .iter()
        .filter_map(|record| serde_json::from_value::<GeoCity>(record.clone()).ok())
        .filter_map(GeoCity::into_suggestion)
        .collect()
}
