//! HTTP client for a running player server: the manifest and the two proxy
//! endpoints.

use catalog::manifest::{Manifest, MANIFEST_FILE};
use log::debug;
use reqwest::{header, Client, StatusCode};
use serde_json::json;
use thiserror::Error;

use crate::api::{DeleteResponse, FetchResponse};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{context}: {status} {body}")]
    Status {
        context: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct PlayerClient {
    http: Client,
    base_url: String,
}

impl PlayerClient {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub async fn manifest(&self) -> Result<Manifest, ClientError> {
        let url = format!("{}/{}", self.base_url, MANIFEST_FILE);
        debug!("Loading manifest from {}", url);
        let response = self
            .http
            .get(&url)
            .header(header::CACHE_CONTROL, "no-store")
            .send()
            .await?;
        let response = check_status(response, "Failed to load manifest").await?;
        Ok(Manifest::from_json(&response.text().await?)?)
    }

    /// Asks the server to download `url` and hand it back as base64.
    pub async fn fetch_via_proxy(&self, url: &str) -> Result<FetchResponse, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/fetch", self.base_url))
            .json(&json!({ "url": url }))
            .send()
            .await?;
        let response = check_status(response, "Proxy fetch failed").await?;
        Ok(response.json().await?)
    }

    pub async fn delete_remote(&self, file_path: &str, raw_url: &str) -> Result<DeleteResponse, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/delete", self.base_url))
            .json(&json!({ "filePath": file_path, "rawUrl": raw_url }))
            .send()
            .await?;
        let response = check_status(response, "Delete failed").await?;
        Ok(response.json().await?)
    }
}

async fn check_status(
    response: reqwest::Response,
    context: &'static str,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status { context, status, body })
}
