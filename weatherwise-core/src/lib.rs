//! Core library for `weatherwise`.
//!
//! This crate defines:
//! - The incremental city search controller (debounce, rate limit, cancellation)
//! - The concurrent weather fetch and the forecast views derived from it
//! - Providers for GeoDB Cities and OpenWeather behind a small HTTP seam
//! - Configuration & credentials handling
//!
//! It is used by `weatherwise-cli`, but has no terminal dependencies and can
//! back any other front end.

pub mod config;
pub mod error;
pub mod forecast;
pub mod http;
pub mod model;
pub mod provider;
pub mod rate_limit;
pub mod search;
pub mod weather;

#[cfg(test)]
mod testing;

pub use config::{Config, ProviderConfig, SearchConfig, WeatherConfig};
pub use error::{HttpError, SearchError, WeatherEndpoint, WeatherFetchError};
pub use http::{HttpClient, HttpRequest, ReqwestHttpClient};
pub use model::{
    CitySuggestion, Coordinates, CurrentWeather, ForecastEntry, Query, TodayForecastItem,
    ViewState, WeatherViewModel, WeekForecastItem,
};
pub use provider::{ProviderId, geodb::GeoDbProvider, openweather::OpenWeatherProvider};
pub use rate_limit::RateLimiter;
pub use search::{QueryPhase, SearchController, SearchOutcome};
pub use weather::WeatherOrchestrator;
