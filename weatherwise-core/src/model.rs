use std::fmt;

use serde::{Deserialize, Serialize};

/// A search query accepted for dispatch.
///
/// `sequence_id` is assigned when the query is dispatched and is used to
/// detect responses that were overtaken by a newer query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    pub sequence_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// One entry of the city dropdown: a display label plus the coordinates
/// handed to the weather orchestrator on selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitySuggestion {
    pub label: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl CitySuggestion {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

impl fmt::Display for CitySuggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Current conditions for the selected city.
///
/// Only a handful of fields are typed; the full provider object is kept in
/// `fields` for renderers that want more.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub city: String,
    pub timestamp_unix: Option<i64>,
    pub description: Option<String>,
    pub temperature_c: Option<f64>,
    pub feels_like_c: Option<f64>,
    pub humidity_pct: Option<u8>,
    pub wind_speed_mps: Option<f64>,
    pub fields: serde_json::Value,
}

/// A raw forecast bucket as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub timestamp_unix: i64,
    pub temperature: f64,
    pub description: String,
    /// Provider date, `YYYY-MM-DD`.
    pub day_label: String,
    /// Provider time of day, `HH:MM`.
    pub time_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodayForecastItem {
    pub time: String,
    pub temperature: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekForecastItem {
    pub day: String,
    pub min_temp: f64,
    pub max_temp: f64,
    pub description: String,
}

/// Everything the renderer needs once a city has been selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherViewModel {
    pub current: CurrentWeather,
    pub today_timeline: Vec<TodayForecastItem>,
    pub week_summary: Vec<WeekForecastItem>,
}

/// Snapshot handed to a renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub loading: bool,
    pub error: Option<String>,
    pub suggestions: Vec<CitySuggestion>,
    pub weather: Option<WeatherViewModel>,
}

impl ViewState {
    pub fn loading() -> Self {
        Self { loading: true, ..Self::default() }
    }

    pub fn with_suggestions(suggestions: Vec<CitySuggestion>) -> Self {
        Self { suggestions, ..Self::default() }
    }

    pub fn with_weather(weather: WeatherViewModel) -> Self {
        Self { weather: Some(weather), ..Self::default() }
    }

    pub fn with_error(message: impl Into<String>) -> Self {
        Self { error: Some(message.into()), ..Self::default() }
    }
}
