use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use log::{info, warn};
use reqwest::{redirect, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::error::ApiError;
use crate::github::{path_from_raw_url, FileLookup, GithubClient, GithubError, Repository};
use crate::proxy::{self, ProxyError};

/// Only files below this prefix may be deleted through the API.
pub const MUSIC_PREFIX: &str = "public/music/";

const CORS_METHODS: &str = "POST, OPTIONS";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub http: Client,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .redirect(redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }
}

#[derive(Deserialize)]
pub struct FetchRequest {
    pub url: Option<Value>,
}

#[derive(Serialize, Deserialize)]
pub struct FetchResponse {
    pub base64: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
}

#[derive(Deserialize)]
pub struct DeleteRequest {
    #[serde(rename = "filePath")]
    pub file_path: Option<String>,
    #[serde(rename = "rawUrl")]
    pub raw_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct DeleteResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn create_router(state: AppState) -> Router {
    let public_dir = state.config.public_dir.clone();
    Router::new()
        .route("/api/fetch", post(fetch_url).options(preflight))
        .route("/api/delete", post(delete_file).options(preflight))
        // Manifest, music and covers
        .fallback_service(ServeDir::new(public_dir))
        .with_state(state)
}

// OPTIONS /api/* - CORS preflight for cross-origin POST
async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, CORS_METHODS),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "content-type"),
        ],
    )
}

// POST /api/fetch - Download a URL server-side and return it as base64
async fn fetch_url(
    State(state): State<AppState>,
    payload: Result<Json<FetchRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let url = match request.url {
        Some(Value::String(url)) if !url.is_empty() => url,
        _ => return Err(ApiError::BadRequest("Missing url".to_string())),
    };
    info!("[api/fetch] {}", url);

    let fetched = proxy::fetch_as_base64(&state.http, &url).await.map_err(|e| match e {
        ProxyError::UnsupportedScheme => ApiError::BadRequest(e.to_string()),
        ProxyError::Upstream(status) => ApiError::Upstream {
            status,
            message: e.to_string(),
        },
        ProxyError::Request(_) | ProxyError::Encode(_) => ApiError::Internal(e.to_string()),
    })?;
    info!(
        "[api/fetch] {} bytes, content type {}",
        fetched.bytes, fetched.content_type
    );

    Ok((
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, CORS_METHODS),
        ],
        Json(FetchResponse {
            base64: fetched.base64,
            content_type: fetched.content_type,
        }),
    ))
}

// POST /api/delete - Remove a music file from the repository
async fn delete_file(
    State(state): State<AppState>,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let config = &state.config;
    let (repo, token) = config
        .repository_credentials()
        .ok_or_else(|| ApiError::Config("GIT_REPO/GIT_TOKEN missing".to_string()))?;

    let path = resolve_repo_path(request.file_path.as_deref(), request.raw_url.as_deref())
        .ok_or_else(|| ApiError::BadRequest("Missing filePath or rawUrl".to_string()))?;
    if !path.starts_with(MUSIC_PREFIX) || !is_plain_repo_path(&path) {
        warn!("[api/delete] refusing to delete {}", path);
        return Err(ApiError::BadRequest("Refusing to delete outside public/music".to_string()));
    }

    let repository =
        Repository::parse(repo, &config.git_branch).map_err(|e| ApiError::Config(e.to_string()))?;
    let github = GithubClient::new(state.http.clone(), &config.github_api_url, token, repository);

    let sha = match github.get_file(&path).await {
        Ok(FileLookup::NotFound) => {
            info!("[api/delete] {} already absent", path);
            return Ok(Json(DeleteResponse {
                ok: true,
                skipped: true,
                message: Some("File not found".to_string()),
            }));
        }
        Ok(FileLookup::Found { sha }) => sha,
        Err(e) => return Err(github_error("Meta fetch failed", e)),
    };
    let sha = sha
        .filter(|sha| !sha.is_empty())
        .ok_or_else(|| ApiError::Internal("File SHA not found".to_string()))?;

    github
        .delete_file(&path, &sha, &format!("Delete music: {}", path))
        .await
        .map_err(|e| github_error("Delete failed", e))?;

    info!("[api/delete] deleted {}", path);
    Ok(Json(DeleteResponse {
        ok: true,
        skipped: false,
        message: None,
    }))
}

/// Repository path for a delete request: `filePath` without leading slashes,
/// or the path inside a raw content URL.
pub fn resolve_repo_path(file_path: Option<&str>, raw_url: Option<&str>) -> Option<String> {
    let from_file_path = file_path.unwrap_or("").trim_start_matches('/');
    if !from_file_path.is_empty() {
        return Some(from_file_path.to_string());
    }
    raw_url
        .and_then(path_from_raw_url)
        .filter(|path| !path.is_empty())
}

/// True when every segment is a real name: no empty, `.` or `..` segments
/// and no backslashes, so the path cannot climb out of its prefix.
pub fn is_plain_repo_path(path: &str) -> bool {
    !path.contains('\\')
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

fn github_error(context: &str, error: GithubError) -> ApiError {
    match error {
        GithubError::Status { status, body } => ApiError::Upstream {
            status,
            message: format!("{}: {} {}", context, status.as_u16(), body),
        },
        other => ApiError::Internal(format!("{}: {}", context, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_path_wins_over_raw_url() {
        let path = resolve_repo_path(
            Some("///public/music/a.mp3"),
            Some("https://raw.githubusercontent.com/o/r/main/public/music/b.mp3"),
        );
        assert_eq!(path.as_deref(), Some("public/music/a.mp3"));
    }

    #[test]
    fn falls_back_to_raw_url() {
        let path = resolve_repo_path(
            Some(""),
            Some("https://raw.githubusercontent.com/o/r/main/public/music/b%20c.mp3"),
        );
        assert_eq!(path.as_deref(), Some("public/music/b c.mp3"));
    }

    #[test]
    fn dot_segments_are_not_plain() {
        assert!(is_plain_repo_path("public/music/a b.mp3"));
        assert!(is_plain_repo_path("public/music/sub/..a.mp3"));
        assert!(!is_plain_repo_path("public/music/../../secrets/config.json"));
        assert!(!is_plain_repo_path("public/music/./a.mp3"));
        assert!(!is_plain_repo_path("public/music//a.mp3"));
        assert!(!is_plain_repo_path("public/music/"));
        assert!(!is_plain_repo_path("public/music/..\\secrets"));
    }

    #[test]
    fn nothing_to_resolve() {
        assert_eq!(resolve_repo_path(None, None), None);
        assert_eq!(resolve_repo_path(Some("/"), Some("https://example.com/a.mp3")), None);
    }
}
