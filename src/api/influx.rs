//! # InfluxDB Collector
//!
//! Writes batches in the InfluxDB 1.x line protocol to
//! `POST <base>/write?db=<database>&precision=ms`, one point per reading
//! with the channel UUID as a tag. Registration pings `<base>/ping`.
//!
//! Influx has no duplicate concept (a second write to the same timestamp
//! overwrites the first), so this backend never reports a conflict: 2xx
//! acknowledges, other 4xx is permanent, 5xx and transport errors retry.

use std::time::Duration;

use async_trait::async_trait;

use super::{Collector, SendError};
use crate::buffer::BatchEntry;
use crate::error::MeterLogError;
use crate::logging::log_debug;

pub struct InfluxCollector {
    client: reqwest::Client,
    write_url: String,
    ping_url: String,
    measurement: String,
    username: Option<String>,
    password: Option<String>,
    uuid: String,
}

impl InfluxCollector {
    pub fn new(
        base_url: &str,
        database: &str,
        measurement: &str,
        username: Option<String>,
        password: Option<String>,
        uuid: &str,
    ) -> Result<Self, MeterLogError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MeterLogError::CollectorSetupError(e.to_string()))?;
        let base = base_url.trim_end_matches('/');
        Ok(InfluxCollector {
            client,
            write_url: format!("{base}/write?db={database}&precision=ms"),
            ping_url: format!("{base}/ping"),
            measurement: escape_ident(measurement),
            username,
            password,
            uuid: escape_ident(uuid),
        })
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }

    fn to_lines(&self, batch: &[BatchEntry]) -> String {
        let mut lines = String::new();
        for entry in batch {
            if !lines.is_empty() {
                lines.push('\n');
            }
            lines.push_str(&format!(
                "{},uuid={} value={} {}",
                self.measurement,
                self.uuid,
                entry.reading.value,
                entry.reading.time.to_millis()
            ));
        }
        lines
    }
}

/// Escapes the characters the line protocol treats specially in
/// measurement names and tag values.
fn escape_ident(s: &str) -> String {
    s.replace(' ', "\\ ").replace(',', "\\,").replace('=', "\\=")
}

#[async_trait]
impl Collector for InfluxCollector {
    async fn register_device(&self) -> Result<(), SendError> {
        match self.client.get(&self.ping_url).send().await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => Err(SendError::Retryable(format!(
                "ping returned {}",
                resp.status()
            ))),
            Err(e) => Err(SendError::Retryable(format!("ping failed: {e}"))),
        }
    }

    async fn send(&self, batch: &[BatchEntry]) -> Result<(), SendError> {
        let body = self.to_lines(batch);
        let request = self.with_auth(self.client.post(&self.write_url)).body(body);
        let resp = request
            .send()
            .await
            .map_err(|e| SendError::Retryable(format!("request failed: {e}")))?;
        let status = resp.status();
        log_debug(&format!(
            "influx collector: wrote {} points -> {status}",
            batch.len()
        ));
        if status.is_success() {
            Ok(())
        } else if status.is_client_error() {
            let text = resp.text().await.unwrap_or_default();
            Err(SendError::Permanent(format!("status {status}: {text}")))
        } else {
            Err(SendError::Retryable(format!("status {status}")))
        }
    }

    fn backend(&self) -> &'static str {
        "influx"
    }
}
