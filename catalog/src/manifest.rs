use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::list_from_value;
use crate::track::Track;

pub const MANIFEST_FILE: &str = "manifest.json";

/// The generated base manifest served as `/manifest.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "generatedAt", default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl Manifest {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self {
            generated_at: Some(Utc::now()),
            tracks,
        }
    }

    /// Parses a manifest, tolerating a missing or malformed `tracks` array.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let mut value: serde_json::Value = serde_json::from_str(raw)?;
        let generated_at = value
            .get_mut("generatedAt")
            .map(serde_json::Value::take)
            .and_then(|v| serde_json::from_value(v).ok());
        let tracks = value
            .get_mut("tracks")
            .map(serde_json::Value::take)
            .and_then(list_from_value)
            .unwrap_or_default();
        Ok(Self { generated_at, tracks })
    }
}
