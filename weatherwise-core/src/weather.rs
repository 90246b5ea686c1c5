//! Concurrent current-conditions + forecast fetch for a selected city.

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::{
    error::{WeatherEndpoint, WeatherFetchError},
    forecast::{DAY_LABEL_FORMAT, DEFAULT_DESCRIPTION_PRIORITY, derive_today_timeline, derive_week_summary},
    model::{CitySuggestion, Coordinates, WeatherViewModel},
    provider::openweather::{OpenWeatherProvider, parse_current, parse_forecast},
};

#[derive(Debug, Clone)]
pub struct WeatherOrchestrator {
    provider: OpenWeatherProvider,
    priority: Vec<String>,
}

impl WeatherOrchestrator {
    pub fn new(provider: OpenWeatherProvider) -> Self {
        Self {
            provider,
            priority: DEFAULT_DESCRIPTION_PRIORITY.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the severity ranking used for the weekly headline description.
    pub fn with_priority(mut self, priority: Vec<String>) -> Self {
        self.priority = priority;
        self
    }

    pub async fn fetch_selection(
        &self,
        city: &CitySuggestion,
    ) -> Result<WeatherViewModel, WeatherFetchError> {
        self.fetch(city.coordinates(), &city.label).await
    }

    pub async fn fetch(
        &self,
        at: Coordinates,
        city: &str,
    ) -> Result<WeatherViewModel, WeatherFetchError> {
        self.fetch_at(at, city, Utc::now()).await
    }

    /// Fetch both datasets concurrently and derive the views relative to `now`.
    ///
    /// Either request failing fails the whole call; no partial view model is
    /// ever produced. Nothing is retried.
    #[instrument(skip(self, now), fields(lat = at.latitude, lon = at.longitude))]
    pub async fn fetch_at(
        &self,
        at: Coordinates,
        city: &str,
        now: DateTime<Utc>,
    ) -> Result<WeatherViewModel, WeatherFetchError> {
        if !at.is_valid() {
            return Err(WeatherFetchError::InvalidCoordinates {
                latitude: at.latitude,
                longitude: at.longitude,
            });
        }

        let (current, forecast) = tokio::try_join!(
            async {
                self.provider.fetch_current(at).await.map_err(|cause| {
                    WeatherFetchError::Upstream { endpoint: WeatherEndpoint::Current, cause }
                })
            },
            async {
                self.provider.fetch_forecast(at).await.map_err(|cause| {
                    WeatherFetchError::Upstream { endpoint: WeatherEndpoint::Forecast, cause }
                })
            },
        )?;

        let entries = parse_forecast(&forecast);
        let today = now.format(DAY_LABEL_FORMAT).to_string();

        let today_timeline = derive_today_timeline(&entries, &today, now.timestamp());
        let week_summary = derive_week_summary(&entries, self.priority.as_slice());

        debug!(
            buckets = entries.len(),
            today = today_timeline.len(),
            days = week_summary.len(),
            "Weather fetched"
        );

        Ok(WeatherViewModel {
            current: parse_current(&current, city),
            today_timeline,
            week_summary,
        })
    }
}
