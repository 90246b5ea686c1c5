//! Derived forecast views.
//!
//! Both functions are total: empty or partially malformed input yields a
//! shorter (possibly empty) output, never an error.

use std::collections::HashMap;

use crate::model::{ForecastEntry, TodayForecastItem, WeekForecastItem};

/// Format of provider day labels and of the `today` argument.
pub const DAY_LABEL_FORMAT: &str = "%Y-%m-%d";

/// Severity ranking used to pick a day's headline description, most severe
/// first. A description matches a keyword when it contains it.
pub const DEFAULT_DESCRIPTION_PRIORITY: &[&str] = &[
    "thunderstorm",
    "storm",
    "snow",
    "sleet",
    "rain",
    "drizzle",
    "fog",
    "mist",
    "haze",
    "smoke",
    "dust",
    "overcast",
    "clouds",
    "clear",
];

/// Remaining buckets of `today` at or after `now_epoch_seconds`, in provider order.
pub fn derive_today_timeline(
    entries: &[ForecastEntry],
    today: &str,
    now_epoch_seconds: i64,
) -> Vec<TodayForecastItem> {
    entries
        .iter()
        .filter(|e| e.day_label == today && e.timestamp_unix >= now_epoch_seconds)
        .map(|e| TodayForecastItem {
            time: e.time_label.clone(),
            temperature: e.temperature,
            description: e.description.clone(),
        })
        .collect()
}

/// One item per distinct day label, in first-seen order.
pub fn derive_week_summary<S: AsRef<str>>(
    entries: &[ForecastEntry],
    priority: &[S],
) -> Vec<WeekForecastItem> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut days: Vec<Vec<&ForecastEntry>> = Vec::new();

    for entry in entries {
        let slot = *index.entry(entry.day_label.as_str()).or_insert_with(|| {
            days.push(Vec::new());
            days.len() - 1
        });
        days[slot].push(entry);
    }

    days.into_iter().filter_map(|group| summarize_day(&group, priority)).collect()
}

fn summarize_day<S: AsRef<str>>(
    group: &[&ForecastEntry],
    priority: &[S],
) -> Option<WeekForecastItem> {
    let first = group.first()?;

    let (min_temp, max_temp) = group.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(lo, hi), e| (lo.min(e.temperature), hi.max(e.temperature)),
    );

    // Strict comparison keeps the earliest entry among equal ranks.
    let headline = group.iter().copied().skip(1).fold(*first, |best, e| {
        if severity_rank(&e.description, priority) < severity_rank(&best.description, priority) {
            e
        } else {
            best
        }
    });

    Some(WeekForecastItem {
        day: first.day_label.clone(),
        min_temp,
        max_temp,
        description: headline.description.clone(),
    })
}

/// Index of the first keyword contained in `description`; unmatched
/// descriptions rank after every keyword.
fn severity_rank<S: AsRef<str>>(description: &str, priority: &[S]) -> usize {
    let description = description.to_lowercase();
    priority
        .iter()
        .position(|keyword| description.contains(&keyword.as_ref().to_lowercase()))
        .unwrap_or(priority.len())
}
