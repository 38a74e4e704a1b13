//! The player's library session.
//!
//! Holds the active catalog built from the manifest and the two persisted
//! slots, and implements the user operations that change them: adding a
//! song, importing a repository or a remote playlist API, deleting a song
//! and resetting back to the manifest.

use catalog::cover::{CoverAllocator, RoundRobinCovers};
use catalog::filter::{clamp_selection, filter_tracks};
use catalog::reconcile::reconcile;
use catalog::store::{StoreError, TrackStore};
use catalog::title::{
    display_name, extension_of_segment, file_stem_for_title, is_audio_file, normalize_song_title,
    title_from_file_name, DEFAULT_AUDIO_EXTENSION,
};
use catalog::track::{text_value, PartialTrack, Track};
use log::{debug, info, warn};
use reqwest::{header, Client};
use thiserror::Error;

use crate::api::MUSIC_PREFIX;
use crate::client::{ClientError, PlayerClient};
use crate::github::{GithubClient, GithubError, Repository};

pub const DEFAULT_IMPORT_PATH: &str = "public/music";
pub const DEFAULT_BRANCH: &str = "main";

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Admin password is not configured")]
    PasswordNotConfigured,

    #[error("Wrong password")]
    WrongPassword,

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Github(#[from] GithubError),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub struct AddSong {
    pub url: String,
    pub title: String,
    pub mv_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The audio was committed to the repository and is played from there.
    Uploaded { raw_url: String },
    /// The external URL is played directly. `reason` explains a failed upload.
    Linked { reason: Option<String> },
}

pub struct ImportRepo {
    pub repo: String,
    pub token: String,
    pub branch: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// The repository no longer had the file.
    pub skipped: bool,
}

struct ApiPlaylistItem {
    url: Option<String>,
    title: Option<String>,
    name: Option<String>,
    filename: Option<String>,
}

impl ApiPlaylistItem {
    /// Reads each field on its own so one odd field does not cost the item.
    fn from_value(item: &serde_json::Value) -> Self {
        let field = |name: &str| item.get(name).and_then(text_value);
        Self {
            url: field("url"),
            title: field("title"),
            name: field("name"),
            filename: field("filename"),
        }
    }
}

pub struct Library<S: TrackStore> {
    store: S,
    player: PlayerClient,
    uploader: Option<GithubClient>,
    github_api_url: String,
    admin_password: Option<String>,
    covers: Box<dyn CoverAllocator + Send + Sync>,
    base: Vec<Track>,
    tracks: Vec<Track>,
    query: String,
    current: usize,
}

impl<S: TrackStore> Library<S> {
    pub fn new(store: S, player: PlayerClient, github_api_url: &str) -> Self {
        Self {
            store,
            player,
            uploader: None,
            github_api_url: github_api_url.to_string(),
            admin_password: None,
            covers: Box::new(RoundRobinCovers::default()),
            base: Vec::new(),
            tracks: Vec::new(),
            query: String::new(),
            current: 0,
        }
    }

    /// Repository that new songs are committed to.
    pub fn with_uploader(mut self, uploader: GithubClient) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_admin_password(mut self, password: Option<String>) -> Self {
        self.admin_password = password;
        self
    }

    pub fn with_covers(mut self, covers: impl CoverAllocator + Send + Sync + 'static) -> Self {
        self.covers = Box::new(covers);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Fetches the manifest and rebuilds the catalog.
    pub async fn load(&mut self) -> Result<(), LibraryError> {
        let manifest = self.player.manifest().await?;
        self.base = manifest.tracks;
        self.refresh()
    }

    /// Rebuilds the catalog from the last manifest and the stored slots.
    pub fn refresh(&mut self) -> Result<(), LibraryError> {
        let override_tracks = self.store.get_override();
        let extra = self.store.get_extra();
        let result = reconcile(&self.base, Some(override_tracks.as_slice()), &extra, self.covers.as_ref());

        if result.write_back_extra {
            self.store.set_extra(&result.patched_extra)?;
        } else {
            debug!("Extra list changed size during reconciliation, not writing back");
        }
        self.tracks = result.tracks;
        self.current = clamp_selection(self.current, self.filtered().len());
        Ok(())
    }

    pub fn filtered(&self) -> Vec<&Track> {
        filter_tracks(&self.tracks, &self.query)
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
        self.current = clamp_selection(self.current, self.filtered().len());
    }

    /// Selects an entry of the filtered list.
    pub fn select(&mut self, index: usize) -> Option<&Track> {
        let len = self.filtered().len();
        self.current = clamp_selection(index, len);
        self.filtered().get(self.current).copied()
    }

    /// Adds a song from an external URL. The audio is committed to the
    /// repository when an uploader is configured; otherwise, or when that
    /// fails, the external URL is kept.
    pub async fn add_song(&mut self, request: AddSong) -> Result<AddOutcome, LibraryError> {
        if request.url.trim().is_empty() || request.title.trim().is_empty() {
            return Err(LibraryError::InvalidInput("Song URL and title are required".to_string()));
        }
        let title = normalize_song_title(&request.title);
        let file_name = derive_file_name(&title, &request.url, chrono::Utc::now().timestamp_millis());
        let mv_url = request.mv_url.filter(|mv| !mv.trim().is_empty());

        let mut reason = None;
        if self.uploader.is_some() {
            match self.upload_song(&request.url, &file_name).await {
                Ok(raw_url) => {
                    info!("Uploaded {} as {}", title, raw_url);
                    self.remember_added(Track {
                        title,
                        url: raw_url.clone(),
                        cover: None,
                        mv_url,
                    })?;
                    return Ok(AddOutcome::Uploaded { raw_url });
                }
                Err(e) => {
                    warn!("Upload of {} failed, linking the external URL: {}", title, e);
                    reason = Some(e.to_string());
                }
            }
        }

        self.remember_added(Track {
            title,
            url: request.url,
            cover: None,
            mv_url,
        })?;
        Ok(AddOutcome::Linked { reason })
    }

    async fn upload_song(&self, url: &str, file_name: &str) -> Result<String, LibraryError> {
        let uploader = self
            .uploader
            .as_ref()
            .ok_or_else(|| LibraryError::InvalidInput("No repository configured".to_string()))?;
        let fetched = self.player.fetch_via_proxy(url).await?;
        debug!("Fetched {} ({})", url, fetched.content_type);

        let path = format!("{}{}", MUSIC_PREFIX, file_name);
        uploader
            .put_file(&path, &fetched.base64, &format!("Add music: {}", file_name), None)
            .await?;
        Ok(uploader.raw_url(&path))
    }

    fn remember_added(&mut self, track: Track) -> Result<(), LibraryError> {
        let key = track.key();
        match self.tracks.iter_mut().find(|existing| existing.key() == key) {
            Some(existing) => {
                existing.enrich_from(track.mv_url.as_ref(), None);
            }
            None => self.tracks.push(track.clone()),
        }
        self.persist_add(&[track])?;
        self.set_query("");
        Ok(())
    }

    /// Records additions in the extra slot. An existing record for the same
    /// title gets its missing url and cover filled and takes a new `mvUrl`.
    fn persist_add(&mut self, items: &[Track]) -> Result<(), LibraryError> {
        let mut extra = self.store.get_extra();
        for item in items.iter().filter(|item| !item.title.is_empty()) {
            let key = item.key();
            match extra.iter_mut().find(|record| record.title.is_some() && record.key() == key) {
                Some(record) => {
                    if record.url.as_deref().map_or(true, str::is_empty) && item.is_playable() {
                        record.url = Some(item.url.clone());
                    }
                    if record.cover.as_deref().map_or(true, str::is_empty) && item.cover.is_some() {
                        record.cover = item.cover.clone();
                    }
                    if item.mv_url.is_some() {
                        record.mv_url = item.mv_url.clone();
                    }
                }
                None => extra.push(PartialTrack::from(item.clone())),
            }
        }
        self.store.set_extra(&extra)?;
        Ok(())
    }

    /// Replaces the catalog with the audio files of a repository directory.
    /// Returns how many tracks were imported; zero leaves everything as is.
    pub async fn import_repo(&mut self, request: ImportRepo) -> Result<usize, LibraryError> {
        if request.repo.trim().is_empty() || request.token.trim().is_empty() {
            return Err(LibraryError::InvalidInput("Repository and token are required".to_string()));
        }
        let branch = request
            .branch
            .filter(|branch| !branch.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
        let repository = Repository::parse(&request.repo, &branch)?;
        let path = request.path.unwrap_or_else(|| DEFAULT_IMPORT_PATH.to_string());
        let path = path.trim_matches('/');

        let github = GithubClient::new(self.player.http().clone(), &self.github_api_url, &request.token, repository);
        let entries = github.list_dir(path).await?;
        let audio: Vec<_> = entries
            .iter()
            .filter(|entry| entry.is_file() && is_audio_file(&entry.name))
            .collect();
        if audio.is_empty() {
            info!("No audio files under {}", if path.is_empty() { "." } else { path });
            return Ok(0);
        }

        let imported: Vec<Track> = audio
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let repo_path = if path.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{}/{}", path, entry.name)
                };
                Track {
                    title: title_from_file_name(&entry.name),
                    url: github.raw_url(&repo_path),
                    cover: self.covers.cover_for(i),
                    mv_url: None,
                }
            })
            .collect();

        self.replace_with_override(imported)
    }

    /// Replaces the catalog with a remote player's playlist served at
    /// `<base>/api/music/list` as `{ total, data: [...] }`.
    pub async fn import_api(&mut self, base_url: &str) -> Result<usize, LibraryError> {
        let base = base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(LibraryError::InvalidInput("API URL is required".to_string()));
        }
        let url = format!("{}/api/music/list", base);
        let items = fetch_playlist(self.player.http(), &url).await?;

        let imported: Vec<Track> = items
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| {
                let url = item.url.filter(|url| !url.is_empty())?;
                let title = [item.title, item.name]
                    .into_iter()
                    .flatten()
                    .find(|title| !title.is_empty())
                    .or_else(|| item.filename.map(|name| title_from_file_name(&name)))
                    .filter(|title| !title.is_empty())
                    .unwrap_or_else(|| format!("Track {}", i + 1));
                Some(Track {
                    title,
                    url,
                    cover: self.covers.cover_for(i),
                    mv_url: None,
                })
            })
            .collect();

        if imported.is_empty() {
            return Err(LibraryError::InvalidResponse("API returned no usable tracks".to_string()));
        }
        self.replace_with_override(imported)
    }

    fn replace_with_override(&mut self, imported: Vec<Track>) -> Result<usize, LibraryError> {
        self.store.set_override(&imported)?;
        let count = imported.len();
        self.tracks = imported;
        self.set_query("");
        info!("Imported {} tracks", count);
        Ok(count)
    }

    /// Deletes a song behind the admin password. The song disappears from the
    /// catalog and both slots right away; if the repository delete fails the
    /// catalog is reloaded and the error returned.
    pub async fn delete_song(&mut self, url: &str, password: &str) -> Result<DeleteOutcome, LibraryError> {
        self.check_password(password)?;

        if let Some(track) = self.tracks.iter().find(|t| t.url == url) {
            info!("Deleting {}", display_name(&track.title));
        }
        self.tracks.retain(|t| t.url != url);
        self.persist_remove_by_url(url)?;
        self.current = clamp_selection(self.current, self.filtered().len());

        let file_path = repo_path_for_url(url);
        match self.player.delete_remote(&file_path, url).await {
            Ok(response) => Ok(DeleteOutcome {
                skipped: response.skipped,
            }),
            Err(e) => {
                warn!("Delete failed, restoring catalog: {}", e);
                if let Err(reload) = self.load().await {
                    warn!("Reload after failed delete also failed: {}", reload);
                }
                Err(e.into())
            }
        }
    }

    fn check_password(&self, password: &str) -> Result<(), LibraryError> {
        if password.trim().is_empty() {
            return Err(LibraryError::InvalidInput("Password is required".to_string()));
        }
        match self.admin_password.as_deref() {
            None => Err(LibraryError::PasswordNotConfigured),
            Some(expected) if expected == password => Ok(()),
            Some(_) => Err(LibraryError::WrongPassword),
        }
    }

    fn persist_remove_by_url(&mut self, url: &str) -> Result<(), LibraryError> {
        let mut extra = self.store.get_extra();
        extra.retain(|record| record.url.as_deref() != Some(url));
        self.store.set_extra(&extra)?;

        let mut override_tracks = self.store.get_override();
        override_tracks.retain(|track| track.url != url);
        self.store.set_override(&override_tracks)?;
        Ok(())
    }

    /// Drops every user change and reloads the manifest.
    pub async fn reset(&mut self) -> Result<(), LibraryError> {
        self.store.clear()?;
        self.query.clear();
        self.load().await?;
        self.current = 0;
        Ok(())
    }
}

async fn fetch_playlist(http: &Client, url: &str) -> Result<Vec<ApiPlaylistItem>, LibraryError> {
    let response = http
        .get(url)
        .header(header::ACCEPT, "application/json")
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(LibraryError::InvalidResponse(format!("HTTP {}", status.as_u16())));
    }

    // Some servers send JSON with the wrong content type, so parse the text.
    let body = response.text().await?;
    let value: serde_json::Value = serde_json::from_str(&body)
        .map_err(|_| LibraryError::InvalidResponse("non-JSON response".to_string()))?;
    let data = value
        .get("data")
        .and_then(|data| data.as_array())
        .ok_or_else(|| LibraryError::InvalidResponse("expected { total, data: [...] }".to_string()))?;

    Ok(data.iter().map(ApiPlaylistItem::from_value).collect())
}

/// File name for an uploaded song: the title made path-safe plus the
/// extension found in the source URL.
pub fn derive_file_name(title: &str, source_url: &str, now_millis: i64) -> String {
    let extension = url_extension(source_url).unwrap_or_else(|| DEFAULT_AUDIO_EXTENSION.to_string());
    let stem = file_stem_for_title(title);
    if stem.is_empty() {
        format!("audio-{}{}", now_millis, extension)
    } else {
        format!("{}{}", stem, extension)
    }
}

fn url_extension(source_url: &str) -> Option<String> {
    let path = match url::Url::parse(source_url) {
        Ok(url) => url.path().to_string(),
        Err(_) => source_url
            .split('#')
            .next()
            .and_then(|s| s.split('?').next())
            .unwrap_or("")
            .to_string(),
    };
    let last = path.split('/').filter(|s| !s.is_empty()).last()?;
    extension_of_segment(last).map(str::to_string)
}

/// Repository path of a track served from this site, empty otherwise.
pub fn repo_path_for_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("/public/music/") {
        format!("public/music/{}", rest)
    } else if let Some(rest) = url.strip_prefix("/music/") {
        format!("public/music/{}", rest)
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_uses_title_and_url_extension() {
        assert_eq!(
            derive_file_name("Song - Artist", "https://cdn.example.com/x/track.flac?sig=1", 0),
            "Song-Artist.flac"
        );
        assert_eq!(derive_file_name("Song", "https://cdn.example.com/stream", 0), "Song.mp3");
        assert_eq!(derive_file_name("???", "https://cdn.example.com/a.ogg", 42), "audio-42.ogg");
        assert_eq!(derive_file_name("Song", "relative/path/a.m4a?x#y", 0), "Song.m4a");
    }

    #[test]
    fn local_urls_map_to_repository_paths() {
        assert_eq!(repo_path_for_url("/music/a.mp3"), "public/music/a.mp3");
        assert_eq!(repo_path_for_url("/public/music/sub/a.mp3"), "public/music/sub/a.mp3");
        assert_eq!(repo_path_for_url("https://example.com/a.mp3"), "");
    }
}
