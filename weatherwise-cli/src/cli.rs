use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Select};
use tracing::{error, info, warn};
use weatherwise_core::{
    CitySuggestion, Config, Coordinates, HttpClient, ProviderId, ReqwestHttpClient,
    SearchController, ViewState, WeatherOrchestrator,
    provider::{geodb_from_config, openweather_from_config},
};

use crate::render::Renderer;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weatherwise", version, about = "City search and weather forecast")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Print view state as JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the API key for a provider.
    Configure {
        /// Provider short name: "geodb" or "openweather".
        provider: String,
    },

    /// List cities matching a name prefix.
    Search {
        /// At least two characters of a city name.
        query: String,
    },

    /// Search for a city, pick one and show its weather.
    Show {
        /// City name or prefix.
        place: String,

        /// Take the first suggestion instead of prompting.
        #[arg(long)]
        first: bool,
    },

    /// Show weather for explicit coordinates.
    At {
        #[arg(allow_hyphen_values = true)]
        latitude: f64,

        #[arg(allow_hyphen_values = true)]
        longitude: f64,

        /// Display name for the location.
        #[arg(long)]
        label: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let renderer = Renderer::new(self.json);

        match self.command {
            Command::Configure { provider } => configure(&provider),
            Command::Search { query } => {
                let config = Config::load()?;
                let search = search_controller(&config)?;

                let suggestions = run_search(&search, &query).await;
                renderer.render(&ViewState::with_suggestions(suggestions))
            }
            Command::Show { place, first } => {
                let config = Config::load()?;
                let search = search_controller(&config)?;
                let weather = weather_orchestrator(&config)?;

                let suggestions = run_search(&search, &place).await;
                let Some(city) = pick_city(suggestions, first)? else {
                    return renderer.render(&ViewState::default());
                };

                show_weather(&renderer, &weather, city.coordinates(), &city.label).await
            }
            Command::At { latitude, longitude, label } => {
                let config = Config::load()?;
                let weather = weather_orchestrator(&config)?;

                let label = label.unwrap_or_else(|| format!("{latitude:.4}, {longitude:.4}"));
                show_weather(&renderer, &weather, Coordinates::new(latitude, longitude), &label).await
            }
        }
    }
}

fn http_client() -> Arc<dyn HttpClient> {
    Arc::new(ReqwestHttpClient::new())
}

fn search_controller(config: &Config) -> anyhow::Result<SearchController> {
    let provider = geodb_from_config(config, http_client())?;
    Ok(SearchController::new(provider, config.search.clone()))
}

fn weather_orchestrator(config: &Config) -> anyhow::Result<WeatherOrchestrator> {
    Ok(WeatherOrchestrator::new(openweather_from_config(config, http_client())?))
}

fn configure(provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut config = Config::load()?;

    let api_key = Password::new(&format!("API key for {id}:"))
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    let api_key = api_key.trim();
    if api_key.is_empty() {
        anyhow::bail!("API key must not be empty");
    }

    config.upsert_provider_api_key(id, api_key.to_string());
    config.save()?;

    info!(provider = %id, "Provider configured");
    println!("Saved API key for {id} to {}", Config::config_file_path()?.display());
    Ok(())
}

/// Search failures are shown as "no results" rather than an error.
async fn run_search(search: &SearchController, query: &str) -> Vec<CitySuggestion> {
    match search.submit(query).await {
        Ok(suggestions) => suggestions,
        Err(err) => {
            warn!(error = %err, "City search failed");
            Vec::new()
        }
    }
}

fn pick_city(
    mut suggestions: Vec<CitySuggestion>,
    first: bool,
) -> anyhow::Result<Option<CitySuggestion>> {
    if suggestions.is_empty() {
        return Ok(None);
    }
    if first || suggestions.len() == 1 {
        return Ok(Some(suggestions.swap_remove(0)));
    }

    let city = Select::new("Select a city:", suggestions)
        .prompt()
        .context("Failed to read city selection")?;
    Ok(Some(city))
}

async fn show_weather(
    renderer: &Renderer,
    weather: &WeatherOrchestrator,
    at: Coordinates,
    label: &str,
) -> anyhow::Result<()> {
    renderer.render(&ViewState::loading())?;

    match weather.fetch(at, label).await {
        Ok(view) => renderer.render(&ViewState::with_weather(view)),
        Err(err) => {
            error!(error = %err, "Failed to fetch weather data");
            renderer.render(&ViewState::with_error("Something went wrong"))?;
            Err(err).context("Failed to fetch weather data")
        }
    }
}
