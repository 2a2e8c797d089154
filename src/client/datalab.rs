//! Datalab conversion API client.
//!
//! ## Protocol
//!
//! ```text
//! POST {base}/api/v1/marker      multipart: file, output_format, mode
//!   ◀─ { success, error, request_id, request_check_url }
//! GET  {request_check_url}       every poll_interval_ms, up to max_polls
//!   ◀─ { status: "processing" | "complete", success, error, markdown, … }
//! ```
//!
//! Every request carries the key in the `X-Api-Key` header. The submit and
//! the polling together form one logical conversion; a failed conversion is
//! reported, not retried.

use super::{ConversionClient, ConvertedDocument};
use crate::config::TargetFormat;
use crate::credential::ApiKey;
use crate::error::{BatchError, ConversionError};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Default service endpoint.
pub const DEFAULT_BASE_URL: &str = "https://www.datalab.to";

const SUBMIT_PATH: &str = "/api/v1/marker";
const API_KEY_HEADER: &str = "X-Api-Key";
const STATUS_COMPLETE: &str = "complete";

/// Longest error body kept from a non-success HTTP response.
const MAX_ERROR_BODY: usize = 500;

/// Conversion quality/speed trade-off offered by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionMode {
    /// Fastest, least accurate.
    Fast,
    /// Default.
    #[default]
    Balanced,
    /// Slowest, best layout and table fidelity.
    Accurate,
}

impl ConversionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversionMode::Fast => "fast",
            ConversionMode::Balanced => "balanced",
            ConversionMode::Accurate => "accurate",
        }
    }
}

/// Settings for [`DatalabClient`].
#[derive(Clone)]
pub struct DatalabConfig {
    /// API key, resolved once at startup.
    pub api_key: ApiKey,

    /// Service base URL without trailing slash. Default: [`DEFAULT_BASE_URL`].
    pub base_url: String,

    /// Quality mode. Default: [`ConversionMode::Balanced`].
    pub mode: ConversionMode,

    /// Delay between status checks in milliseconds. Default: 1000.
    pub poll_interval_ms: u64,

    /// Status checks before giving up on a pending conversion. Default: 300.
    ///
    /// With the default interval this allows roughly five minutes per
    /// document, which covers books of several hundred pages.
    pub max_polls: u32,

    /// Timeout for each individual HTTP request in seconds. Default: 120.
    ///
    /// Bounds a single upload or status check. It does not bound the
    /// conversion as a whole; `max_polls` does.
    pub request_timeout_secs: u64,
}

impl fmt::Debug for DatalabConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatalabConfig")
            .field("api_key", &self.api_key)
            .field("base_url", &self.base_url)
            .field("mode", &self.mode)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_polls", &self.max_polls)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl DatalabConfig {
    /// Create a builder around an already-resolved key.
    pub fn builder(api_key: ApiKey) -> DatalabConfigBuilder {
        DatalabConfigBuilder {
            config: Self {
                api_key,
                base_url: DEFAULT_BASE_URL.to_string(),
                mode: ConversionMode::default(),
                poll_interval_ms: 1000,
                max_polls: 300,
                request_timeout_secs: 120,
            },
        }
    }
}

/// Builder for [`DatalabConfig`].
#[derive(Debug)]
pub struct DatalabConfigBuilder {
    config: DatalabConfig,
}

impl DatalabConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn mode(mut self, mode: ConversionMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn max_polls(mut self, n: u32) -> Self {
        self.config.max_polls = n.max(1);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DatalabConfig, BatchError> {
        let url = &self.config.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(BatchError::InvalidConfig(format!(
                "Base URL must be an HTTP/HTTPS URL, got '{url}'"
            )));
        }
        Ok(self.config)
    }
}

/// [`ConversionClient`] backed by the Datalab HTTP API.
#[derive(Debug, Clone)]
pub struct DatalabClient {
    http: reqwest::Client,
    config: DatalabConfig,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    success: Option<bool>,
    error: Option<String>,
    request_id: Option<String>,
    request_check_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: Option<String>,
    success: Option<bool>,
    error: Option<String>,
    markdown: Option<String>,
    html: Option<String>,
    json: Option<serde_json::Value>,
    page_count: Option<usize>,
}

impl StatusResponse {
    fn content(&self, target: TargetFormat) -> Option<String> {
        match target {
            TargetFormat::Markdown => self.markdown.clone(),
            TargetFormat::Html => self.html.clone(),
            TargetFormat::Json => match &self.json {
                None | Some(serde_json::Value::Null) => None,
                Some(value) => serde_json::to_string_pretty(value).ok(),
            },
        }
    }
}

impl DatalabClient {
    /// Build the client. The HTTP connection pool is shared by all tasks.
    pub fn new(config: DatalabConfig) -> Result<Self, BatchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BatchError::ClientInit(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &DatalabConfig {
        &self.config
    }

    async fn submit(&self, input: &Path, target: TargetFormat) -> Result<String, ConversionError> {
        let bytes = tokio::fs::read(input)
            .await
            .map_err(|e| ConversionError::ReadFailed {
                path: input.to_path_buf(),
                detail: e.to_string(),
            })?;
        let file_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        debug!("Uploading {} ({} bytes)", file_name, bytes.len());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime_for(input))
            .map_err(|e| ConversionError::Http(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("output_format", target.as_api_str())
            .text("mode", self.config.mode.as_str());

        let url = format!("{}{}", self.config.base_url, SUBMIT_PATH);
        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, self.config.api_key.expose())
            .multipart(form)
            .send()
            .await
            .map_err(|e| ConversionError::Http(e.to_string()))?;

        let body: SubmitResponse = parse_json(response).await?;
        if body.success == Some(false) {
            return Err(ConversionError::Rejected(
                body.error
                    .unwrap_or_else(|| "request not accepted".to_string()),
            ));
        }

        match (body.request_check_url, body.request_id) {
            (Some(check_url), _) if !check_url.is_empty() => Ok(check_url),
            (_, Some(id)) if !id.is_empty() => {
                Ok(format!("{}{}/{}", self.config.base_url, SUBMIT_PATH, id))
            }
            _ => Err(ConversionError::Rejected(
                "response carried neither a request id nor a check URL".to_string(),
            )),
        }
    }

    async fn poll(
        &self,
        check_url: &str,
        target: TargetFormat,
    ) -> Result<ConvertedDocument, ConversionError> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);

        for attempt in 1..=self.config.max_polls {
            let response = self
                .http
                .get(check_url)
                .header(API_KEY_HEADER, self.config.api_key.expose())
                .send()
                .await
                .map_err(|e| ConversionError::Http(e.to_string()))?;
            let status: StatusResponse = parse_json(response).await?;

            if status.status.as_deref() == Some(STATUS_COMPLETE) {
                debug!("{} complete after {} checks", check_url, attempt);
                if status.success == Some(false) {
                    return Err(ConversionError::Rejected(
                        status
                            .error
                            .unwrap_or_else(|| "conversion failed".to_string()),
                    ));
                }
                return match status.content(target) {
                    Some(content) if !content.trim().is_empty() => Ok(ConvertedDocument {
                        content,
                        page_count: status.page_count,
                    }),
                    _ => Err(ConversionError::EmptyContent {
                        format: target.as_api_str().to_string(),
                    }),
                };
            }

            if attempt < self.config.max_polls {
                sleep(interval).await;
            }
        }

        Err(ConversionError::PollExhausted {
            polls: self.config.max_polls,
        })
    }
}

#[async_trait]
impl ConversionClient for DatalabClient {
    fn name(&self) -> &str {
        "datalab"
    }

    async fn convert(
        &self,
        input: &Path,
        target: TargetFormat,
    ) -> Result<ConvertedDocument, ConversionError> {
        let check_url = self.submit(input, target).await?;
        self.poll(&check_url, target).await
    }
}

/// Map HTTP failures to [`ConversionError`] and decode a success body.
async fn parse_json<T: serde::de::DeserializeOwned>(
    response: Response,
) -> Result<T, ConversionError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = truncate(body.trim(), MAX_ERROR_BODY);
        return Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ConversionError::Auth {
                status: status.as_u16(),
                detail,
            },
            _ => ConversionError::Api {
                status: status.as_u16(),
                message: detail,
            },
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ConversionError::Http(format!("invalid response body: {e}")))
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// MIME type sent with the upload, by file extension.
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("epub") => "application/epub+zip",
        Some("html") | Some("htm") => "text/html",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ApiKey {
        ApiKey::new("test-key").unwrap()
    }

    #[test]
    fn config_defaults() {
        let c = DatalabConfig::builder(key()).build().unwrap();
        assert_eq!(c.base_url, DEFAULT_BASE_URL);
        assert_eq!(c.mode, ConversionMode::Balanced);
        assert_eq!(c.poll_interval_ms, 1000);
        assert_eq!(c.max_polls, 300);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let c = DatalabConfig::builder(key())
            .base_url("http://localhost:8080/")
            .build()
            .unwrap();
        assert_eq!(c.base_url, "http://localhost:8080");
    }

    #[test]
    fn non_http_base_url_is_rejected() {
        let err = DatalabConfig::builder(key()).base_url("ftp://x").build();
        assert!(matches!(err, Err(BatchError::InvalidConfig(_))));
    }

    #[test]
    fn debug_redacts_key() {
        let c = DatalabConfig::builder(key()).build().unwrap();
        assert!(!format!("{c:?}").contains("test-key"));
    }

    #[test]
    fn mime_by_extension() {
        assert_eq!(mime_for(Path::new("a.PDF")), "application/pdf");
        assert_eq!(mime_for(Path::new("a.epub")), "application/epub+zip");
        assert_eq!(mime_for(Path::new("a.htm")), "text/html");
        assert_eq!(mime_for(Path::new("a")), "application/octet-stream");
    }

    #[test]
    fn json_content_is_pretty_printed() {
        let status = StatusResponse {
            status: Some("complete".into()),
            success: Some(true),
            error: None,
            markdown: None,
            html: None,
            json: Some(serde_json::json!({"pages": 1})),
            page_count: Some(1),
        };
        let content = status.content(TargetFormat::Json).unwrap();
        assert!(content.contains("\"pages\": 1"));
        assert!(status.content(TargetFormat::Markdown).is_none());
    }
}
