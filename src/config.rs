use std::env;
use std::path::PathBuf;

use log::LevelFilter;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

#[derive(Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub public_dir: PathBuf,
    pub git_repo: Option<String>,
    pub git_token: Option<String>,
    pub git_branch: String,
    pub github_api_url: String,
    pub admin_password: Option<String>,
    pub player_url: String,
    pub data_dir: PathBuf,
    pub log_level: LevelFilter,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_host: env::var("API_HOST").unwrap_or(defaults.api_host),
            api_port: env::var("API_PORT")
                .ok()
                .and_then(|port| port.parse().ok())
                .unwrap_or(defaults.api_port),
            public_dir: env::var("PUBLIC_DIR").map(PathBuf::from).unwrap_or(defaults.public_dir),
            git_repo: non_empty_var("GIT_REPO"),
            git_token: non_empty_var("GIT_TOKEN"),
            git_branch: non_empty_var("GIT_BRANCH").unwrap_or(defaults.git_branch),
            github_api_url: non_empty_var("GITHUB_API_URL").unwrap_or(defaults.github_api_url),
            admin_password: non_empty_var("ADMIN_PASSWORD"),
            player_url: non_empty_var("PLAYER_URL").unwrap_or(defaults.player_url),
            data_dir: env::var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            log_level: env::var("LOG_LEVEL")
                .ok()
                .and_then(|level| level.parse().ok())
                .unwrap_or(defaults.log_level),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    /// Repository identifier and token, when both are configured.
    pub fn repository_credentials(&self) -> Option<(&str, &str)> {
        match (&self.git_repo, &self.git_token) {
            (Some(repo), Some(token)) => Some((repo.as_str(), token.as_str())),
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_host: "0.0.0.0".to_string(),
            api_port: 4000,
            public_dir: PathBuf::from("public"),
            git_repo: None,
            git_token: None,
            git_branch: "main".to_string(),
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            admin_password: None,
            player_url: "http://127.0.0.1:4000".to_string(),
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("web-music-player"),
            log_level: LevelFilter::Info,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
