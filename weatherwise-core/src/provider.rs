use crate::{
    Config,
    http::HttpClient,
    provider::{geodb::GeoDbProvider, openweather::OpenWeatherProvider},
};
use std::{convert::TryFrom, sync::Arc};

pub mod geodb;
pub mod openweather;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    GeoDb,
    OpenWeather,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::GeoDb => "geodb",
            ProviderId::OpenWeather => "openweather",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::GeoDb, ProviderId::OpenWeather]
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderId::GeoDb => "https://wft-geo-db.p.rapidapi.com/v1/geo",
            ProviderId::OpenWeather => "https://api.openweathermap.org/data/2.5",
        }
    }

    /// Environment variable that overrides the configured API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            ProviderId::GeoDb => "WEATHERWISE_GEODB_API_KEY",
            ProviderId::OpenWeather => "WEATHERWISE_OPENWEATHER_API_KEY",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "geodb" => Ok(ProviderId::GeoDb),
            "openweather" => Ok(ProviderId::OpenWeather),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: geodb, openweather."
            )),
        }
    }
}

fn required_api_key(id: ProviderId, config: &Config) -> anyhow::Result<String> {
    config.provider_api_key(id).map(str::to_owned).ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured for provider '{id}'.\n\
                 Hint: run `weatherwise configure {id}` or set {}.",
            id.env_var()
        )
    })
}

/// Construct the city-search provider from config.
pub fn geodb_from_config(
    config: &Config,
    http: Arc<dyn HttpClient>,
) -> anyhow::Result<GeoDbProvider> {
    let api_key = required_api_key(ProviderId::GeoDb, config)?;
    Ok(GeoDbProvider::new(
        http,
        config.provider_base_url(ProviderId::GeoDb),
        api_key,
        &config.search,
    ))
}

/// Construct the weather provider from config.
pub fn openweather_from_config(
    config: &Config,
    http: Arc<dyn HttpClient>,
) -> anyhow::Result<OpenWeatherProvider> {
    let api_key = required_api_key(ProviderId::OpenWeather, config)?;
    Ok(OpenWeatherProvider::new(
        http,
        config.provider_base_url(ProviderId::OpenWeather),
        api_key,
        config.weather.units.clone(),
    ))
}
