//! HTTP seam used by every provider.
//!
//! Providers describe requests as [`HttpRequest`] values and hand them to an
//! [`HttpClient`]. The production client is [`ReqwestHttpClient`]; tests swap
//! in scripted fakes.

use std::fmt::Debug;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{HttpError, truncate_body};

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub cancel: Option<CancellationToken>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            cancel: None,
        }
    }

    pub fn query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Value of the first query parameter called `name`.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync + Debug {
    /// Issue a GET and parse the body as JSON.
    ///
    /// Must return [`HttpError::Cancelled`] promptly once the request's
    /// cancellation token fires.
    async fn get_json(&self, request: HttpRequest) -> Result<Value, HttpError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    http: Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    async fn send(&self, request: HttpRequest) -> Result<Value, HttpError> {
        let mut builder = self.http.get(&request.url).query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!(url = %request.url, "Sending request");

        let res = builder.send().await.map_err(|e| HttpError::Transport(e.to_string()))?;

        let status = res.status();
        let body = res.text().await.map_err(|e| HttpError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(HttpError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| HttpError::Decode(e.to_string()))
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get_json(&self, request: HttpRequest) -> Result<Value, HttpError> {
        match request.cancel.clone() {
            // Dropping the send future aborts the underlying connection.
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(HttpError::Cancelled),
                res = self.send(request) => res,
            },
            None => self.send(request).await,
        }
    }
}
