use std::sync::Arc;

use chrono::DateTime;
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    error::HttpError,
    http::{HttpClient, HttpRequest},
    model::{Coordinates, CurrentWeather, ForecastEntry},
};

/// OpenWeather 2.5 current-conditions and 5 day / 3 hour forecast.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    http: Arc<dyn HttpClient>,
    base_url: String,
    api_key: String,
    units: String,
}

impl OpenWeatherProvider {
    pub fn new(
        http: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        units: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            units: units.into(),
        }
    }

    fn request(&self, endpoint: &str, at: Coordinates) -> HttpRequest {
        HttpRequest::get(format!("{}/{endpoint}", self.base_url))
            .query("lat", at.latitude)
            .query("lon", at.longitude)
            .query("appid", &self.api_key)
            .query("units", &self.units)
    }

    pub async fn fetch_current(&self, at: Coordinates) -> Result<Value, HttpError> {
        self.http.get_json(self.request("weather", at)).await
    }

    pub async fn fetch_forecast(&self, at: Coordinates) -> Result<Value, HttpError> {
        self.http.get_json(self.request("forecast", at)).await
    }
}

/// Deserialize an optional field, treating a value of the wrong type as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Default, Deserialize)]
struct OwMain {
    #[serde(default, deserialize_with = "lenient")]
    temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    feels_like: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    #[serde(default, deserialize_with = "lenient")]
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OwWind {
    #[serde(default, deserialize_with = "lenient")]
    speed: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct OwCurrentResponse {
    #[serde(default, deserialize_with = "lenient")]
    dt: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    main: Option<OwMain>,
    #[serde(default, deserialize_with = "lenient")]
    weather: Option<Vec<OwWeather>>,
    #[serde(default, deserialize_with = "lenient")]
    wind: Option<OwWind>,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
    #[serde(default, deserialize_with = "lenient")]
    dt_txt: Option<String>,
}

impl OwForecastEntry {
    fn into_entry(self) -> Option<ForecastEntry> {
        let description = self.weather.into_iter().next()?.description?;
        let temperature = self.main.temp?;
        let (day_label, time_label) = split_dt_txt(self.dt_txt.as_deref(), self.dt)?;

        Some(ForecastEntry {
            timestamp_unix: self.dt,
            temperature,
            description,
            day_label,
            time_label,
        })
    }
}

/// `"2024-01-15 12:00:00"` → `("2024-01-15", "12:00")`, falling back to the
/// UTC rendering of `dt` when `dt_txt` is absent or malformed.
fn split_dt_txt(dt_txt: Option<&str>, dt: i64) -> Option<(String, String)> {
    if let Some((day, time)) = dt_txt.and_then(|txt| txt.split_once(' ')) {
        if let (10, Some(hh_mm)) = (day.len(), time.get(..5)) {
            return Some((day.to_string(), hh_mm.to_string()));
        }
    }

    let at = DateTime::from_timestamp(dt, 0)?;
    Some((at.format("%Y-%m-%d").to_string(), at.format("%H:%M").to_string()))
}

/// Build the current-weather record, tagging it with the selected city label.
/// Missing or mistyped fields come back as `None`.
pub fn parse_current(payload: &Value, city: &str) -> CurrentWeather {
    let parsed: OwCurrentResponse = serde_json::from_value(payload.clone()).unwrap_or_default();
    let main = parsed.main.unwrap_or_default();

    CurrentWeather {
        city: city.to_string(),
        timestamp_unix: parsed.dt,
        description: parsed.weather.into_iter().flatten().next().and_then(|w| w.description),
        temperature_c: main.temp,
        feels_like_c: main.feels_like,
        humidity_pct: main.humidity.filter(|h| (0.0..=100.0).contains(h)).map(|h| h.round() as u8),
        wind_speed_mps: parsed.wind.and_then(|w| w.speed),
        fields: payload.clone(),
    }
}

/// Extract forecast buckets from `{ list: [...] }`, dropping malformed ones.
pub fn parse_forecast(payload: &Value) -> Vec<ForecastEntry> {
    let Some(list) = payload.get("list").and_then(Value::as_array) else {
        return Vec::new();
    };

    list.iter()
        .filter_map(|raw| serde_json::from_value::<OwForecastEntry>(raw.clone()).ok())
        .filter_map(OwForecastEntry::into_entry)
        .collect()
}
