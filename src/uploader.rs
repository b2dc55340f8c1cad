//! ==============================================================================
//! uploader.rs - push one measurement to the remote telemetry endpoint
//! ==============================================================================
//!
//! purpose:
//!     sends min / max / amplitude / decibel to a ThingSpeak-style endpoint:
//!
//! ```text
//!         GET /update?api_key=KEY&field1=MIN&field2=MAX&field3=AMP&field4=DB
//!
//!     and classifies the answer. the endpoint replies with the new entry id
//!     on success and "0" when it refused the update.
//! ```
//!
//! guarantees:
//!     best effort, at most once per call. no retries here; the engine tries
//!     again when the upload interval elapses next.
//!
//! relationships:
//!     - used by: engine.rs (through the Uplink trait)
//!     - uses: reqwest (transport, tls, timeout)
//!
//! ==============================================================================

use crate::config::UploadConfig;
use crate::error::{MonitorError, Result};
use crate::sampler::Measurement;
use crate::telemetry::TelemetryConfig;
use reqwest::Url;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Endpoint accepted the update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub entry_id: i64,
}

/// Anything that can deliver a measurement upstream
pub trait Uplink: Send + Sync {
    fn upload(
        &self,
        target: &TelemetryConfig,
        measurement: &Measurement,
    ) -> impl Future<Output = Result<Confirmation>> + Send;
}

/// Build the update URL with api key and the four fields as query parameters
pub fn build_update_url(target: &TelemetryConfig, tls: bool, m: &Measurement) -> Result<Url> {
    let scheme = if tls { "https" } else { "http" };
    let mut url = Url::parse(&format!("{}://{}:{}/update", scheme, target.host, target.port))
        .map_err(|e| MonitorError::ConnectionFailed(format!("invalid endpoint {}: {}", target.host, e)))?;
    url.query_pairs_mut()
        .append_pair("api_key", &target.api_key)
        .append_pair("field1", &m.min_level.to_string())
        .append_pair("field2", &m.max_level.to_string())
        .append_pair("field3", &m.amplitude.to_string())
        .append_pair("field4", &m.decibel.to_string());
    Ok(url)
}

/// Leading integer of a line, 0 when there is none
fn leading_integer(line: &str) -> i64 {
    let line = line.trim_start();
    let (negative, rest) = match line.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, line.strip_prefix('+').unwrap_or(line)),
    };
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let digits = &rest[..end];
    if digits.is_empty() {
        return 0;
    }
    let value = digits.parse::<i64>().unwrap_or(i64::MAX);
    if negative { -value } else { value }
}

/// Classify the response body by its first line: a non-zero number
/// confirms, anything else ("0", empty, text) is a rejection.
pub fn classify_response(body: &str) -> Result<Confirmation> {
    let line = body.lines().next().unwrap_or("").trim_end_matches('\r');
    match leading_integer(line) {
        0 => Err(MonitorError::UploadRejected(format!("server responded with {:?}", line))),
        entry_id => Ok(Confirmation { entry_id }),
    }
}

// ==============================================================================
// http uplink
// ==============================================================================

pub struct HttpUplink {
    client: reqwest::Client,
    tls: bool,
}

impl HttpUplink {
    pub fn new(config: &UploadConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        Ok(Self { client, tls: config.tls })
    }
}

impl Uplink for HttpUplink {
    async fn upload(&self, target: &TelemetryConfig, measurement: &Measurement) -> Result<Confirmation> {
        let url = build_update_url(target, self.tls, measurement)?;
        info!(host = %target.host, port = target.port, "uploading reading");
        debug!(path = url.path(), fields = ?measurement, "request");

        let response = self
            .client
            .get(url)
            .header(reqwest::header::CONNECTION, "close")
            .send()
            .await
            .map_err(|e| {
                warn!(host = %target.host, error = %e, "connection failed");
                MonitorError::ConnectionFailed(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::UploadRejected(format!("HTTP {}", status)));
        }
        let body = response
            .text()
            .await
            .map_err(|e| MonitorError::ConnectionFailed(e.to_string()))?;

        let result = classify_response(&body);
        match &result {
            Ok(c) => info!(entry_id = c.entry_id, "server confirmed all data received"),
            Err(e) => warn!(error = %e, "upload not confirmed"),
        }
        result
    }
}
