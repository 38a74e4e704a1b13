//! Server-side fetching of arbitrary audio URLs on behalf of the browser.

use std::io::Write;

use base64::engine::general_purpose::STANDARD;
use base64::write::EncoderStringWriter;
use futures::StreamExt;
use log::debug;
use reqwest::{header, Client, StatusCode};
use thiserror::Error;

pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Only http/https allowed")]
    UnsupportedScheme,

    #[error("Upstream {0}")]
    Upstream(StatusCode),

    #[error("{0}")]
    Request(#[from] reqwest::Error),

    #[error("{0}")]
    Encode(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub base64: String,
    pub content_type: String,
    pub bytes: usize,
}

/// Accepts only `http://` and `https://` URLs, ignoring scheme case.
pub fn is_fetchable(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// `Referer` value for a target: its origin followed by `/`.
pub fn referer_for(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let origin = parsed.origin();
    if !origin.is_tuple() {
        return None;
    }
    Some(format!("{}/", origin.ascii_serialization()))
}

/// Downloads `url` and returns its body as base64.
///
/// The body is consumed as a stream and fed through a streaming encoder, so
/// no single encode call sees more than one network chunk.
pub async fn fetch_as_base64(client: &Client, url: &str) -> Result<FetchedBody, ProxyError> {
    if !is_fetchable(url) {
        return Err(ProxyError::UnsupportedScheme);
    }

    let mut request = client.get(url).header(header::USER_AGENT, BROWSER_USER_AGENT);
    if let Some(referer) = referer_for(url) {
        request = request.header(header::REFERER, referer);
    }

    let response = request.send().await?;
    let status = response.status();
    debug!("Upstream status {} for {}", status, url);
    if !status.is_success() {
        return Err(ProxyError::Upstream(status));
    }

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let mut encoder = EncoderStringWriter::new(&STANDARD);
    let mut bytes = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        bytes += chunk.len();
        encoder.write_all(&chunk)?;
    }

    Ok(FetchedBody {
        base64: encoder.into_inner(),
        content_type,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_http_schemes_are_fetchable() {
        assert!(is_fetchable("https://example.com/a.mp3"));
        assert!(is_fetchable("HTTP://example.com/a.mp3"));
        assert!(!is_fetchable("ftp://host/file"));
        assert!(!is_fetchable("file:///etc/passwd"));
        assert!(!is_fetchable("http:/"));
    }

    #[test]
    fn referer_is_the_origin() {
        assert_eq!(
            referer_for("https://cdn.example.com:8443/path/a.mp3?x=1").as_deref(),
            Some("https://cdn.example.com:8443/")
        );
        assert_eq!(referer_for("https://example.com/a").as_deref(), Some("https://example.com/"));
        assert_eq!(referer_for("nonsense"), None);
    }

    #[tokio::test]
    async fn rejects_other_schemes_without_a_request() {
        let client = Client::new();
        let result = fetch_as_base64(&client, "ftp://host/file").await;
        assert!(matches!(result, Err(ProxyError::UnsupportedScheme)));
    }
}
