//! Scripted [`HttpClient`] for unit tests.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::{Instant, sleep};

use crate::{
    error::HttpError,
    http::{HttpClient, HttpRequest},
};

pub(crate) struct Reply {
    pub delay: Duration,
    pub result: Result<Value, HttpError>,
    /// When false the fake keeps going after cancellation, like a client
    /// without abort support.
    pub honor_cancel: bool,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self { delay: Duration::from_millis(10), result: Ok(body), honor_cancel: true }
    }

    pub fn status(status: u16) -> Self {
        Self {
            delay: Duration::from_millis(10),
            result: Err(HttpError::Status { status, body: String::new() }),
            honor_cancel: true,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn ignoring_cancel(mut self) -> Self {
        self.honor_cancel = false;
        self
    }
}

type Responder = Box<dyn Fn(&HttpRequest) -> Reply + Send + Sync>;

pub(crate) struct FakeHttp {
    respond: Responder,
    requests: Mutex<Vec<(Instant, HttpRequest)>>,
}

impl FakeHttp {
    pub fn new(respond: impl Fn(&HttpRequest) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { respond: Box::new(respond), requests: Mutex::new(Vec::new()) })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn dispatch_times(&self) -> Vec<Instant> {
        self.requests.lock().iter().map(|(at, _)| *at).collect()
    }
}

impl fmt::Debug for FakeHttp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeHttp").field("requests", &self.requests.lock().len()).finish()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn get_json(&self, request: HttpRequest) -> Result<Value, HttpError> {
        self.requests.lock().push((Instant::now(), request.clone()));
        let reply = (self.respond)(&request);

        match request.cancel.filter(|_| reply.honor_cancel) {
            Some(token) => tokio::select! {
                () = token.cancelled() => return Err(HttpError::Cancelled),
                () = sleep(reply.delay) => {}
            },
            None => sleep(reply.delay).await,
        }

        reply.result
    }
}

pub(crate) fn london_payload() -> Value {
    serde_json::json!({
        "data": [
            { "id": 1, "name": "London", "countryCode": "GB", "latitude": 51.5072, "longitude": -0.1276 },
            { "id": 2, "name": "London", "countryCode": "CA", "latitude": 42.9836, "longitude": -81.2497 }
        ]
    })
}
