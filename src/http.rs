//! HTTP span transport.
//!
//! POSTs each encoded batch as a JSON array to the collector's span
//! endpoint, resolved from the configured base URL. The connectivity check
//! posts an empty batch, which collectors accept without side effects.

use crate::config::{ConfigError, HttpConfig};
use crate::sender::{SendError, Sender};
use crate::span::SpanBatch;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use std::sync::atomic::{AtomicBool, Ordering};

/// Delivers batches to an HTTP collector endpoint.
pub struct HttpSender {
    client: Client,
    endpoint: Url,
    closed: AtomicBool,
}

impl HttpSender {
    /// Builds the sender, validating the endpoint URL and timeouts.
    pub fn new(config: &HttpConfig) -> Result<Self, ConfigError> {
        let endpoint = config.endpoint_url()?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            closed: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(&self, body: Vec<u8>) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SendError::Timeout
                } else {
                    SendError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SendError::Transport(format!(
                "unexpected status {} from {}",
                status, self.endpoint
            )))
        }
    }
}

impl Sender for HttpSender {
    async fn send(&self, batch: SpanBatch) -> Result<(), SendError> {
        let body = batch.encode().map_err(|e| SendError::Encode(e.to_string()))?;
        self.post(body).await
    }

    async fn check(&self) -> Result<(), SendError> {
        // An empty span list is a valid message; delivering it proves
        // connectivity without recording anything.
        self.post(b"[]".to_vec()).await
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn name(&self) -> &str {
        "http"
    }
}
