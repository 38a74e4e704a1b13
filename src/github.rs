//! Client for the GitHub Contents API, the remote file store behind the
//! player. Files are read for their SHA, written as base64 and deleted with
//! the SHA as a precondition, so a stale SHA makes GitHub reject the write.

use log::debug;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const RAW_CONTENT_HOST: &str = "raw.githubusercontent.com";

const USER_AGENT: &str = concat!("web-music-player/", env!("CARGO_PKG_VERSION"));
const GITHUB_ACCEPT: &str = "application/vnd.github+json";

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{status} {body}")]
    Status { status: StatusCode, body: String },

    #[error("repository must be given as owner/repo, got {0:?}")]
    InvalidRepository(String),
}

/// `owner/repo` plus the branch every operation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl Repository {
    pub fn parse(full_name: &str, branch: &str) -> Result<Self, GithubError> {
        let mut parts = full_name.trim().split('/');
        match (parts.next(), parts.next()) {
            (Some(owner), Some(repo)) if !owner.is_empty() && !repo.is_empty() => Ok(Self {
                owner: owner.to_string(),
                repo: repo.to_string(),
                branch: branch.to_string(),
            }),
            _ => Err(GithubError::InvalidRepository(full_name.to_string())),
        }
    }

    /// Direct download URL for a repository path.
    pub fn raw_url(&self, path: &str) -> String {
        format!(
            "https://{}/{}/{}/{}/{}",
            RAW_CONTENT_HOST,
            self.owner,
            self.repo,
            self.branch,
            encode_path(path)
        )
    }
}

/// Metadata returned for a single file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileMeta {
    pub path: Option<String>,
    pub sha: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLookup {
    Found { sha: Option<String> },
    NotFound,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, Deserialize)]
pub struct DirEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub download_url: Option<String>,
}

impl DirEntry {
    pub fn is_file(&self) -> bool {
        self.kind == "file"
    }
}

#[derive(Serialize)]
struct PutFileRequest<'a> {
    message: &'a str,
    content: &'a str,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Serialize)]
struct DeleteFileRequest<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

pub struct GithubClient {
    client: Client,
    api_url: String,
    token: String,
    repository: Repository,
}

impl GithubClient {
    pub fn new(client: Client, api_url: &str, token: &str, repository: Repository) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            repository,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn raw_url(&self, path: &str) -> String {
        self.repository.raw_url(path)
    }

    fn contents_url(&self, path: &str) -> String {
        let path = encode_path(path.trim_matches('/'));
        let base = format!(
            "{}/repos/{}/{}/contents",
            self.api_url, self.repository.owner, self.repository.repo
        );
        if path.is_empty() {
            base
        } else {
            format!("{}/{}", base, path)
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header(header::ACCEPT, GITHUB_ACCEPT)
            .header(header::USER_AGENT, USER_AGENT)
    }

    /// Looks up a file on the configured branch. A 404 is not an error.
    pub async fn get_file(&self, path: &str) -> Result<FileLookup, GithubError> {
        let url = self.contents_url(path);
        debug!("GitHub metadata lookup: {}", url);

        let response = self
            .authorized(self.client.get(&url))
            .query(&[("ref", self.repository.branch.as_str())])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(FileLookup::NotFound);
        }
        let response = check_status(response).await?;
        let meta: FileMeta = response.json().await?;
        Ok(FileLookup::Found { sha: meta.sha })
    }

    /// Creates or replaces a file with already base64-encoded content.
    pub async fn put_file(
        &self,
        path: &str,
        content_base64: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<(), GithubError> {
        let url = self.contents_url(path);
        debug!("GitHub upload: {} ({} base64 bytes)", url, content_base64.len());

        let response = self
            .authorized(self.client.put(&url))
            .json(&PutFileRequest {
                message,
                content: content_base64,
                branch: &self.repository.branch,
                sha,
            })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Deletes a file. `sha` must match the current blob or GitHub refuses.
    pub async fn delete_file(&self, path: &str, sha: &str, message: &str) -> Result<(), GithubError> {
        let url = self.contents_url(path);
        debug!("GitHub delete: {}", url);

        let response = self
            .authorized(self.client.delete(&url))
            .json(&DeleteFileRequest {
                message,
                sha,
                branch: &self.repository.branch,
            })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    pub async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, GithubError> {
        let url = self.contents_url(path);
        debug!("GitHub listing: {}", url);

        let response = self
            .authorized(self.client.get(&url))
            .query(&[("ref", self.repository.branch.as_str())])
            .send()
            .await?;
        let response = check_status(response).await?;

        // A file path answers with an object instead of an array.
        let value: serde_json::Value = response.json().await?;
        Ok(catalog::store::list_from_value(value).unwrap_or_default())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GithubError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GithubError::Status { status, body })
}

/// Percent-encodes every segment of a repository path, keeping the slashes.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Extracts the repository path from a raw content URL
/// (`https://raw.githubusercontent.com/<owner>/<repo>/<branch>/<path...>`).
pub fn path_from_raw_url(raw_url: &str) -> Option<String> {
    let url = url::Url::parse(raw_url).ok()?;
    if url.host_str() != Some(RAW_CONTENT_HOST) {
        return None;
    }
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    if segments.len() < 4 {
        return None;
    }
    let joined = segments[3..].join("/");
    urlencoding::decode(&joined).ok().map(|path| path.into_owned())
}
