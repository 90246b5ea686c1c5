use std::fmt;

use chrono::{DateTime, NaiveDate};
use weatherwise_core::{CitySuggestion, ViewState, WeatherViewModel};

/// Text or JSON rendering of a [`ViewState`].
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    json: bool,
}

impl Renderer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn render(&self, state: &ViewState) -> anyhow::Result<()> {
        if self.json {
            // Loading is transient; JSON consumers only want the final state.
            if !state.loading {
                println!("{}", serde_json::to_string_pretty(state)?);
            }
            return Ok(());
        }

        if state.loading {
            eprintln!("Loading...");
        } else {
            println!("{}", format_state(state));
        }
        Ok(())
    }
}

pub fn format_state(state: &ViewState) -> String {
    if state.loading {
        return "Loading...".to_string();
    }
    if let Some(error) = &state.error {
        return format!("Error: {error}");
    }
    if let Some(weather) = &state.weather {
        return format_weather(weather);
    }
    if state.suggestions.is_empty() {
        return "No cities found".to_string();
    }
    format_suggestions(&state.suggestions)
}

fn format_suggestions(suggestions: &[CitySuggestion]) -> String {
    SuggestionList(suggestions).to_string().trim_end().to_string()
}

fn format_weather(view: &WeatherViewModel) -> String {
    WeatherReport(view).to_string().trim_end().to_string()
}

struct SuggestionList<'a>(&'a [CitySuggestion]);

impl fmt::Display for SuggestionList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, city) in self.0.iter().enumerate() {
            writeln!(
                f,
                "{:>2}. {:<32} ({:.4}, {:.4})",
                i + 1,
                city.label,
                city.latitude,
                city.longitude
            )?;
        }
        Ok(())
    }
}

struct WeatherReport<'a>(&'a WeatherViewModel);

impl fmt::Display for WeatherReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let view = self.0;
        let current = &view.current;

        writeln!(f, "{}", current.city)?;
        if let Some(observed) = current.timestamp_unix.and_then(|ts| DateTime::from_timestamp(ts, 0)) {
            writeln!(f, "  Observed:   {}", observed.format("%Y-%m-%d %H:%M UTC"))?;
        }
        writeln!(f, "  Conditions: {}", current.description.as_deref().unwrap_or("unknown"))?;
        match (current.temperature_c, current.feels_like_c) {
            (Some(temp), Some(feels)) => {
                writeln!(f, "  Temperature: {temp:.1} °C (feels like {feels:.1} °C)")?;
            }
            (Some(temp), None) => writeln!(f, "  Temperature: {temp:.1} °C")?,
            (None, _) => {}
        }
        if let Some(humidity) = current.humidity_pct {
            writeln!(f, "  Humidity:   {humidity}%")?;
        }
        if let Some(wind) = current.wind_speed_mps {
            writeln!(f, "  Wind:       {wind:.1} m/s")?;
        }

        if !view.today_timeline.is_empty() {
            writeln!(f, "\nToday")?;
            for item in &view.today_timeline {
                writeln!(f, "  {}  {:>6.1} °C  {}", item.time, item.temperature, item.description)?;
            }
        }

        if !view.week_summary.is_empty() {
            writeln!(f, "\nNext days")?;
            for day in &view.week_summary {
                writeln!(
                    f,
                    "  {:<10} {:>6.1} / {:>5.1} °C  {}",
                    weekday_name(&day.day),
                    day.min_temp,
                    day.max_temp,
                    day.description
                )?;
            }
        }

        Ok(())
    }
}

/// `2024-01-15` → `Monday`; unparseable labels are shown as-is.
fn weekday_name(day_label: &str) -> String {
    NaiveDate::parse_from_str(day_label, "%Y-%m-%d")
        .map(|d| d.format("%A").to_string())
        .unwrap_or_else(|_| day_label.to_string())
}
