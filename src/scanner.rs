use std::path::{Path, PathBuf};

use async_recursion::async_recursion;
use catalog::cover::{COVERS_URL_PREFIX, DEFAULT_COVER_POOL};
use catalog::manifest::{Manifest, MANIFEST_FILE};
use catalog::title::{is_audio_file, title_from_file_name};
use catalog::track::Track;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::info;

const COVER_EXTENSIONS: [&str; 6] = [".png", ".jpg", ".jpeg", ".webp", ".gif", ".svg"];

pub struct ScanConfig {
    pub public_dir: PathBuf,
    pub progress: Option<MultiProgress>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            public_dir: PathBuf::from("public"),
            progress: None,
        }
    }
}

pub struct ScanResult {
    pub files_scanned: u64,
    pub tracks_written: usize,
    pub manifest_path: PathBuf,
}

/// Scans `<public>/music` and writes `<public>/manifest.json`.
pub async fn generate_manifest(config: ScanConfig) -> std::io::Result<ScanResult> {
    let music_dir = config.public_dir.join("music");
    let covers_dir = config.public_dir.join("covers");
    tokio::fs::create_dir_all(&music_dir).await?;

    info!("Scanning music directory: {}", music_dir.display());

    let total_files = count_files(&music_dir)?;
    let progress = match &config.progress {
        Some(multi) => {
            let bar = multi.add(ProgressBar::new(total_files));
            if let Ok(style) = ProgressStyle::with_template("[{percent}%] {pos}/{len} {wide_bar} ({eta})") {
                bar.set_style(style);
            }
            bar
        }
        None => ProgressBar::hidden(),
    };

    let mut files = Vec::new();
    scan_dir(&music_dir, &mut files, &progress).await?;
    progress.finish_and_clear();
    files.sort();

    let covers = ordered_covers(&covers_dir).await?;
    let tracks: Vec<Track> = files
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let relative = path.strip_prefix(&music_dir).unwrap_or(path);
            let url = format!("/music/{}", to_url_path(relative));
            let cover = if covers.is_empty() {
                None
            } else {
                Some(format!("{}{}", COVERS_URL_PREFIX, covers[index % covers.len()]))
            };
            Track {
                title: title_from_file_name(file_name),
                url,
                cover,
                mv_url: None,
            }
        })
        .collect();

    let manifest = Manifest::new(tracks);
    let manifest_path = config.public_dir.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(&manifest)?;
    tokio::fs::write(&manifest_path, json).await?;

    info!(
        "Manifest generated: {} tracks -> {}",
        manifest.tracks.len(),
        manifest_path.display()
    );

    Ok(ScanResult {
        files_scanned: total_files,
        tracks_written: manifest.tracks.len(),
        manifest_path,
    })
}

pub fn count_files(path: &Path) -> std::io::Result<u64> {
    let mut count = 0;
    for entry in path.read_dir()? {
        let path = entry?.path();
        if path.is_dir() {
            count += count_files(&path)?;
        } else {
            count += 1;
        }
    }
    Ok(count)
}

#[async_recursion]
async fn scan_dir(path: &Path, files: &mut Vec<PathBuf>, progress: &ProgressBar) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            scan_dir(&path, files, progress).await?;
            continue;
        }
        let is_audio = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(is_audio_file);
        if is_audio {
            files.push(path);
        }
        progress.inc(1);
    }
    Ok(())
}

/// Cover file names: the bundled pool order first, then the rest by name.
async fn ordered_covers(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut found = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            let lower = name.to_lowercase();
            if COVER_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
                found.push(name.to_string());
            }
        }
    }

    let mut ordered: Vec<String> = DEFAULT_COVER_POOL
        .iter()
        .filter_map(|preferred| found.iter().find(|name| name.to_lowercase() == *preferred).cloned())
        .collect();
    let mut rest: Vec<String> = found.into_iter().filter(|name| !ordered.contains(name)).collect();
    rest.sort();
    ordered.extend(rest);
    Ok(ordered)
}

fn to_url_path(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[tokio::test]
    async fn writes_sorted_manifest_with_covers() {
        let dir = tempfile::tempdir().unwrap();
        let public = dir.path();
        touch(&public.join("music/b_side-Band.mp3"));
        touch(&public.join("music/album/A Song - Singer.FLAC"));
        touch(&public.join("music/notes.txt"));
        touch(&public.join("covers/zz.jpg"));
        touch(&public.join("covers/b.png"));
        touch(&public.join("covers/a.png"));

        let result = generate_manifest(ScanConfig {
            public_dir: public.to_path_buf(),
            progress: None,
        })
        .await
        .unwrap();

        assert_eq!(result.files_scanned, 3);
        assert_eq!(result.tracks_written, 2);

        let raw = std::fs::read_to_string(public.join("manifest.json")).unwrap();
        let manifest = Manifest::from_json(&raw).unwrap();
        assert!(manifest.generated_at.is_some());
        assert_eq!(
            manifest.tracks,
            vec![
                Track::new("A Song - Singer", "/music/album/A Song - Singer.FLAC").with_cover("/covers/a.png"),
                Track::new("b side - Band", "/music/b_side-Band.mp3").with_cover("/covers/b.png"),
            ]
        );
    }

    #[tokio::test]
    async fn creates_music_dir_and_omits_covers_when_none_exist() {
        let dir = tempfile::tempdir().unwrap();
        let result = generate_manifest(ScanConfig {
            public_dir: dir.path().to_path_buf(),
            progress: None,
        })
        .await
        .unwrap();

        assert_eq!(result.tracks_written, 0);
        assert!(dir.path().join("music").is_dir());
        let raw = std::fs::read_to_string(dir.path().join("manifest.json")).unwrap();
        assert!(raw.contains("\"tracks\": []"));
    }

    #[tokio::test]
    async fn covers_fall_back_to_alphabetical_order() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("covers/zeta.webp"));
        touch(&dir.path().join("covers/alpha.gif"));
        touch(&dir.path().join("covers/c.png"));
        touch(&dir.path().join("covers/readme.md"));

        let covers = ordered_covers(&dir.path().join("covers")).await.unwrap();
        assert_eq!(covers, vec!["c.png", "alpha.gif", "zeta.webp"]);
    }
}
