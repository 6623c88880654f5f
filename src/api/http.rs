//! # Generic HTTP Collector
//!
//! Pushes batches as JSON tuple arrays to a middleware endpoint:
//! `POST <base>/data/<uuid>.json` with a body of
//! `{"uuid": "...", "tuples": [[millis, value], ...]}`.
//!
//! Response mapping: any 2xx acknowledges the whole batch; a 409 carrying a
//! `duplicate_timestamp_ms` JSON field becomes a per-reading conflict;
//! other 4xx responses are permanent; 5xx and transport errors are
//! retryable. The exact grammar of specific middleware products is out of
//! scope, this is the crate's own generic format.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use super::{Collector, SendError};
use crate::buffer::BatchEntry;
use crate::error::MeterLogError;
use crate::logging::log_debug;

pub struct HttpCollector {
    client: reqwest::Client,
    data_url: String,
    ping_url: String,
    token: Option<String>,
    uuid: String,
}

impl HttpCollector {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout_secs: u64,
        uuid: &str,
    ) -> Result<Self, MeterLogError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| MeterLogError::CollectorSetupError(e.to_string()))?;
        let base = base_url.trim_end_matches('/');
        Ok(HttpCollector {
            client,
            data_url: format!("{base}/data/{uuid}.json"),
            ping_url: format!("{base}/ping"),
            token,
            uuid: uuid.to_string(),
        })
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Maps a response to the ternary send outcome.
fn classify(status: StatusCode, body: &str) -> Result<(), SendError> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::CONFLICT {
        if let Ok(detail) = serde_json::from_str::<serde_json::Value>(body) {
            if let Some(ts) = detail
                .get("duplicate_timestamp_ms")
                .and_then(|v| v.as_i64())
            {
                return Err(SendError::Conflict { timestamp_ms: ts });
            }
        }
        return Err(SendError::Permanent(format!(
            "conflict without timestamp detail: {}",
            truncate(body)
        )));
    }
    if status.is_client_error() {
        return Err(SendError::Permanent(format!(
            "status {status}: {}",
            truncate(body)
        )));
    }
    Err(SendError::Retryable(format!(
        "status {status}: {}",
        truncate(body)
    )))
}

fn truncate(body: &str) -> &str {
    if body.len() <= 200 {
        return body;
    }
    let mut end = 200;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[async_trait]
impl Collector for HttpCollector {
    async fn register_device(&self) -> Result<(), SendError> {
        let request = self.with_auth(self.client.get(&self.ping_url));
        match request.send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() || status == StatusCode::NOT_FOUND {
                    // Older middlewares have no ping endpoint; reachability
                    // is all we need.
                    Ok(())
                } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    Err(SendError::Permanent(format!(
                        "authentication rejected: {status}"
                    )))
                } else {
                    Err(SendError::Retryable(format!("ping returned {status}")))
                }
            }
            Err(e) => Err(SendError::Retryable(format!("ping failed: {e}"))),
        }
    }

    async fn send(&self, batch: &[BatchEntry]) -> Result<(), SendError> {
        let tuples: Vec<(i64, f64)> = batch
            .iter()
            .map(|entry| (entry.reading.time.to_millis(), entry.reading.value))
            .collect();
        let body = json!({ "uuid": self.uuid, "tuples": tuples });

        let request = self.with_auth(self.client.post(&self.data_url)).json(&body);
        let resp = request
            .send()
            .await
            .map_err(|e| SendError::Retryable(format!("request failed: {e}")))?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        log_debug(&format!(
            "http collector: POST {} with {} tuples -> {status}",
            self.data_url,
            tuples.len()
        ));
        classify(status, &text)
    }

    fn backend(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success() {
        assert!(classify(StatusCode::OK, "").is_ok());
        assert!(classify(StatusCode::ACCEPTED, "ignored").is_ok());
    }

    #[test]
    fn test_classify_conflict_with_timestamp() {
        let result = classify(StatusCode::CONFLICT, r#"{"duplicate_timestamp_ms": 1500}"#);
        assert_eq!(result, Err(SendError::Conflict { timestamp_ms: 1500 }));
    }

    #[test]
    fn test_classify_conflict_without_timestamp_is_permanent() {
        let result = classify(StatusCode::CONFLICT, "duplicate");
        assert!(matches!(result, Err(SendError::Permanent(_))));
    }

    #[test]
    fn test_classify_client_error_is_permanent() {
        let result = classify(StatusCode::BAD_REQUEST, "malformed");
        assert!(matches!(result, Err(SendError::Permanent(_))));
    }

    #[test]
    fn test_classify_server_error_is_retryable() {
        let result = classify(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(matches!(result, Err(SendError::Retryable(_))));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let body = "ü".repeat(150);
        let cut = truncate(&body);
        assert!(cut.len() <= 200);
        assert!(body.starts_with(cut));
    }
}
