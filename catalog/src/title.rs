//! Title handling shared by the manifest generator, the importers and the
//! add-song flow.
//!
//! The catalog joins its three sources on [`title_key`]: titles are compared
//! after trimming and collapsing every whitespace run to a single space, so
//! `"Song  -  Artist "` and `"Song - Artist"` refer to the same track.

use std::sync::LazyLock;

use regex::Regex;

static EXTENSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.[^.]+$").expect("extension regex"));
static DASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*-\s*").expect("dash regex"));
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").expect("spaces regex"));
static SONG_ARTIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)(?:\s{2,}|\s-\s)(.+)$").expect("song/artist regex"));
static SINGLE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^\s-].*?)\s([^\s].*?)$").expect("single space regex"));
static ILLEGAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|]+"#).expect("illegal chars regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").expect("dashes regex"));
static EDGE_DOTS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[.-]+|[.-]+$").expect("edge regex"));
static URL_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.[a-zA-Z0-9]{2,5}$").expect("url extension regex"));

pub const DEFAULT_AUDIO_EXTENSION: &str = ".mp3";

pub const AUDIO_EXTENSIONS: [&str; 8] = [".mp3", ".flac", ".wav", ".aac", ".m4a", ".ogg", ".opus", ".webm"];

/// The de-duplication key for a title.
pub fn title_key(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_audio_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    AUDIO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Builds a display title from an audio file name:
/// `"Song-Artist_live.mp3"` becomes `"Song - Artist live"`.
pub fn title_from_file_name(file_name: &str) -> String {
    let base = EXTENSION.replace(file_name, "");
    let title = DASH.replace_all(&base, " - ");
    let title = title.replace('_', " ");
    SPACES.replace_all(&title, " ").trim().to_string()
}

/// Splits `"song - artist"` or `"song   artist"` into its two halves.
pub fn split_title(title: &str) -> Option<(String, String)> {
    let captures = SONG_ARTIST.captures(title)?;
    Some((captures[1].trim().to_string(), captures[2].trim().to_string()))
}

pub fn display_name(title: &str) -> String {
    match split_title(title) {
        Some((song, artist)) => format!("{} - {}", song, artist),
        None => title.to_string(),
    }
}

/// Normalises a user-entered title to `"song - artist"`. A single space is
/// only treated as the separator when nothing more specific matches.
pub fn normalize_song_title(raw: &str) -> String {
    let raw = raw.trim();
    if let Some((song, artist)) = split_title(raw) {
        return format!("{} - {}", song, artist);
    }
    if let Some(captures) = SINGLE_SPACE.captures(raw) {
        return format!("{} - {}", captures[1].trim(), captures[2].trim());
    }
    raw.to_string()
}

/// Turns a title into a file-system and URL friendly stem. May be empty.
pub fn file_stem_for_title(title: &str) -> String {
    let stem = ILLEGAL_CHARS.replace_all(title.trim(), "");
    let stem = WHITESPACE.replace_all(&stem, "-");
    let stem = DASHES.replace_all(&stem, "-");
    EDGE_DOTS.replace_all(&stem, "").to_string()
}

/// Extension (with the dot) found at the end of a URL path segment.
pub fn extension_of_segment(segment: &str) -> Option<&str> {
    URL_EXTENSION.find(segment).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_collapses_whitespace() {
        assert_eq!(title_key("  Song  -\tArtist "), "Song - Artist");
        assert_eq!(title_key(""), "");
    }

    #[test]
    fn title_from_file_name_matches_manifest_rules() {
        assert_eq!(title_from_file_name("Song-Artist.mp3"), "Song - Artist");
        assert_eq!(title_from_file_name("my_song  -  band.flac"), "my song - band");
        assert_eq!(title_from_file_name("noext"), "noext");
    }

    #[test]
    fn splits_on_dash_or_wide_gap() {
        assert_eq!(split_title("Song - Artist"), Some(("Song".into(), "Artist".into())));
        assert_eq!(split_title("Song   Artist&Other"), Some(("Song".into(), "Artist&Other".into())));
        assert_eq!(split_title("Single"), None);
        assert_eq!(display_name("Song   Artist"), "Song - Artist");
    }

    #[test]
    fn normalizes_user_titles() {
        assert_eq!(normalize_song_title(" Song   Artist "), "Song - Artist");
        assert_eq!(normalize_song_title("Song - Artist"), "Song - Artist");
        assert_eq!(normalize_song_title("Song Artist"), "Song - Artist");
        assert_eq!(normalize_song_title("Song"), "Song");
    }

    #[test]
    fn file_stem_strips_illegal_characters() {
        assert_eq!(file_stem_for_title("Song - Artist"), "Song-Artist");
        assert_eq!(file_stem_for_title("a/b:c*d?"), "abcd");
        assert_eq!(file_stem_for_title("..-hidden-.."), "hidden");
        assert_eq!(file_stem_for_title("???"), "");
    }

    #[test]
    fn audio_extension_check_ignores_case() {
        assert!(is_audio_file("Track.MP3"));
        assert!(is_audio_file("a.opus"));
        assert!(!is_audio_file("cover.png"));
    }

    #[test]
    fn segment_extension() {
        assert_eq!(extension_of_segment("song.flac"), Some(".flac"));
        assert_eq!(extension_of_segment("song"), None);
        assert_eq!(extension_of_segment("song.toolongext"), None);
    }
}
