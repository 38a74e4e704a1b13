use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::title::title_key;

/// A playable catalog entry.
///
/// `title` doubles as the de-duplication key (see [`title_key`]), `url` is
/// whatever the player can stream: a static `/music/...` path, a raw GitHub
/// content URL or an arbitrary external link.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: String,
    #[serde(default, deserialize_with = "lenient_option", skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(
        default,
        rename = "mvUrl",
        deserialize_with = "lenient_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub mv_url: Option<String>,
}

impl Track {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            cover: None,
            mv_url: None,
        }
    }

    pub fn with_cover(mut self, cover: impl Into<String>) -> Self {
        self.cover = Some(cover.into());
        self
    }

    pub fn with_mv_url(mut self, mv_url: impl Into<String>) -> Self {
        self.mv_url = Some(mv_url.into());
        self
    }

    pub fn key(&self) -> String {
        title_key(&self.title)
    }

    pub fn is_playable(&self) -> bool {
        !self.url.is_empty()
    }

    /// Fills `mvUrl` and `cover` from the given values where this track has none.
    /// Returns whether anything changed.
    pub fn enrich_from(&mut self, mv_url: Option<&String>, cover: Option<&String>) -> bool {
        let mut changed = false;
        if is_blank(&self.mv_url) {
            if let Some(value) = mv_url.filter(|v| !v.is_empty()) {
                self.mv_url = Some(value.clone());
                changed = true;
            }
        }
        if is_blank(&self.cover) {
            if let Some(value) = cover.filter(|v| !v.is_empty()) {
                self.cover = Some(value.clone());
                changed = true;
            }
        }
        changed
    }
}

/// A persisted record from the extra list. Every field may be missing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialTrack {
    #[serde(default, deserialize_with = "lenient_option", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_option", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_option", skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(
        default,
        rename = "mvUrl",
        deserialize_with = "lenient_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub mv_url: Option<String>,
}

impl PartialTrack {
    pub fn key(&self) -> String {
        title_key(self.title.as_deref().unwrap_or(""))
    }

    pub fn has_url(&self) -> bool {
        !is_blank(&self.url)
    }

    /// Converts into a catalog track, or `None` when there is nothing to play.
    pub fn to_track(&self) -> Option<Track> {
        if !self.has_url() {
            return None;
        }
        Some(Track {
            title: self.title.clone().unwrap_or_default(),
            url: self.url.clone().unwrap_or_default(),
            cover: self.cover.clone().filter(|c| !c.is_empty()),
            mv_url: self.mv_url.clone().filter(|m| !m.is_empty()),
        })
    }
}

impl From<Track> for PartialTrack {
    fn from(track: Track) -> Self {
        Self {
            title: Some(track.title),
            url: Some(track.url),
            cover: track.cover,
            mv_url: track.mv_url,
        }
    }
}

/// Reads a text field written by hand or by other clients: numbers become
/// their decimal text, anything else that is not a string is absent.
pub fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn lenient_option<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(text_value(&Value::deserialize(deserializer)?))
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(lenient_option(deserializer)?.unwrap_or_default())
}

pub(crate) fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}
