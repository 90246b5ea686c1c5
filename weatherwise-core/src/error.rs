use std::fmt;

use thiserror::Error;

/// Failure of a single outbound HTTP call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HttpError {
    /// Connection, TLS or I/O failure before a status was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx response. `body` is truncated.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The body was not valid JSON.
    #[error("invalid JSON payload: {0}")]
    Decode(String),

    /// The caller's cancellation token fired before the call completed.
    #[error("request cancelled")]
    Cancelled,
}

impl HttpError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, HttpError::Status { status: 429, .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, HttpError::Cancelled)
    }
}

/// A city search failed for a reason other than cancellation, staleness or
/// upstream rate limiting.
#[derive(Debug, Error)]
#[error("city search failed: {cause}")]
pub struct SearchError {
    #[source]
    pub cause: HttpError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherEndpoint {
    Current,
    Forecast,
}

impl fmt::Display for WeatherEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeatherEndpoint::Current => f.write_str("current weather"),
            WeatherEndpoint::Forecast => f.write_str("forecast"),
        }
    }
}

#[derive(Debug, Error)]
pub enum WeatherFetchError {
    #[error(
        "invalid coordinates ({latitude}, {longitude}): latitude must be -90 to 90, longitude must be -180 to 180"
    )]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    #[error("{endpoint} request failed: {cause}")]
    Upstream {
        endpoint: WeatherEndpoint,
        #[source]
        cause: HttpError,
    },
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_only_for_429() {
        let limited = HttpError::Status { status: 429, body: String::new() };
        let failed = HttpError::Status { status: 500, body: String::new() };

        assert!(limited.is_rate_limited());
        assert!(!failed.is_rate_limited());
        assert!(!HttpError::Cancelled.is_rate_limited());
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let long = "é".repeat(300);
        let truncated = truncate_body(&long);

        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 203);
        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn weather_error_names_the_endpoint() {
        let err = WeatherFetchError::Upstream {
            endpoint: WeatherEndpoint::Forecast,
            cause: HttpError::Status { status: 500, body: "boom".into() },
        };
        assert_eq!(err.to_string(), "forecast request failed: HTTP 500: boom");
    }
}
