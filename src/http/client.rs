//! Outbound HTTP sender

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use std::time::{Duration, Instant};

use super::message::HttpMessage;
use super::response::ResponseHeader;
use crate::app::ScannerConfig;
use crate::error::HttpError;

/// Sends a message's request and fills in its response
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send the request of `message` and attach the response to it
    async fn send(&self, message: &mut HttpMessage) -> Result<(), HttpError>;
}

/// Timeout and retry budget applied around a [`MessageSender`]
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Per-attempt timeout
    pub timeout: Duration,

    /// Extra attempts after the first one for transient failures
    pub max_retries: u32,

    /// Base delay between attempts (multiplied by the attempt number)
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ScannerConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.request_timeout),
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Send with a timeout per attempt and bounded retries on transient errors
pub async fn send_with_retry(
    sender: &dyn MessageSender,
    message: &mut HttpMessage,
    policy: RetryPolicy,
) -> Result<(), HttpError> {
    let mut attempt = 0u32;

    loop {
        let result = match tokio::time::timeout(policy.timeout, sender.send(message)).await {
            Ok(result) => result,
            Err(_) => Err(HttpError::Timeout(policy.timeout.as_millis() as u64)),
        };

        match result {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                tracing::debug!(
                    uri = %message.request.uri,
                    attempt,
                    error = %e,
                    "Retrying request"
                );
                tokio::time::sleep(policy.backoff * attempt).await;
            }
            Err(e) => {
                tracing::warn!(uri = %message.request.uri, attempts = attempt + 1, error = %e, "Request failed");
                return Err(e);
            }
        }
    }
}

/// reqwest-backed sender
pub struct HttpSender {
    /// Inner reqwest client
    client: reqwest::Client,

    /// Response bodies above this size are rejected
    max_response_size: usize,
}

impl HttpSender {
    /// Create a new sender from scanner settings
    pub fn new(config: &ScannerConfig) -> Result<Self, HttpError> {
        let redirect = if config.follow_redirects {
            reqwest::redirect::Policy::limited(config.max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .redirect(redirect)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| HttpError::RequestFailed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_response_size: config.max_response_size,
        })
    }
}

#[async_trait]
impl MessageSender for HttpSender {
    async fn send(&self, message: &mut HttpMessage) -> Result<(), HttpError> {
        let url = message.url()?;
        let method = reqwest::Method::from_bytes(message.request.method.as_bytes())
            .map_err(|_| HttpError::Malformed(format!("invalid method {}", message.request.method)))?;

        let mut builder = self.client.request(method, url);

        for (name, value) in &message.request.headers {
            // reqwest derives these from the URL and body
            if name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => builder = builder.header(name, value),
                _ => tracing::debug!(header = %name, "Dropping header that is not valid on the wire"),
            }
        }

        if !message.request_body.is_empty() {
            builder = builder.body(message.request_body.clone());
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        let mut header = ResponseHeader::new(status.as_u16(), status.canonical_reason().unwrap_or(""));
        header.version = format!("{:?}", response.version());
        header.headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).to_string()))
            .collect();

        let body = read_capped(response, self.max_response_size).await?;

        message.set_response(header, body);
        message.elapsed_ms = Some(start.elapsed().as_millis() as u64);

        tracing::trace!(
            uri = %message.request.uri,
            status = status.as_u16(),
            elapsed_ms = message.elapsed_ms,
            "Response received"
        );

        Ok(())
    }
}

/// Read a response body, giving up as soon as it is known to exceed `max`.
///
/// A declared Content-Length over the limit is rejected before any of the
/// body is read; otherwise chunks are accumulated until the limit is crossed.
async fn read_capped(mut response: reqwest::Response, max: usize) -> Result<Vec<u8>, HttpError> {
    if let Some(declared) = response.content_length() {
        let size = usize::try_from(declared).unwrap_or(usize::MAX);
        if size > max {
            return Err(HttpError::BodyTooLarge { size, max });
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(map_reqwest_error)? {
        let size = body.len() + chunk.len();
        if size > max {
            return Err(HttpError::BodyTooLarge { size, max });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn map_reqwest_error(e: reqwest::Error) -> HttpError {
    if e.is_timeout() {
        HttpError::Timeout(0)
    } else if e.is_connect() {
        HttpError::ConnectionError(e.to_string())
    } else if e.is_builder() {
        HttpError::InvalidUrl(e.to_string())
    } else {
        HttpError::RequestFailed(e.to_string())
    }
}
