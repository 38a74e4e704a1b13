//! Persisted client state: the override slot and the extra slot.
//!
//! Slots hold JSON arrays. Anything unreadable (missing slot, broken JSON,
//! non-object elements) reads as an empty list or is skipped.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::track::{PartialTrack, Track};

pub const OVERRIDE_SLOT: &str = "overrideTracks";
pub const EXTRA_SLOT: &str = "extraTracks";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// String-keyed storage with typed accessors for the two track lists.
pub trait TrackStore {
    fn read_slot(&self, slot: &str) -> Result<Option<String>, StoreError>;
    fn write_slot(&mut self, slot: &str, value: &str) -> Result<(), StoreError>;
    fn remove_slot(&mut self, slot: &str) -> Result<(), StoreError>;

    fn get_override(&self) -> Vec<Track> {
        read_list(self, OVERRIDE_SLOT)
    }

    fn set_override(&mut self, tracks: &[Track]) -> Result<(), StoreError> {
        write_list(self, OVERRIDE_SLOT, tracks)
    }

    fn get_extra(&self) -> Vec<PartialTrack> {
        read_list(self, EXTRA_SLOT)
    }

    fn set_extra(&mut self, records: &[PartialTrack]) -> Result<(), StoreError> {
        write_list(self, EXTRA_SLOT, records)
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.remove_slot(OVERRIDE_SLOT)?;
        self.remove_slot(EXTRA_SLOT)
    }
}

fn read_list<S, T>(store: &S, slot: &str) -> Vec<T>
where
    S: TrackStore + ?Sized,
    T: DeserializeOwned,
{
    let raw = match store.read_slot(slot) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!("Could not read slot {}: {}", slot, e);
            return Vec::new();
        }
    };
    parse_list(&raw).unwrap_or_else(|| {
        debug!("Slot {} does not hold a JSON array, treating as empty", slot);
        Vec::new()
    })
}

fn write_list<S, T>(store: &mut S, slot: &str, items: &[T]) -> Result<(), StoreError>
where
    S: TrackStore + ?Sized,
    T: Serialize,
{
    let json = serde_json::to_string(items)?;
    store.write_slot(slot, &json)
}

/// Parses a JSON array, skipping elements that are not valid records.
/// Returns `None` when `raw` is not a JSON array at all.
pub fn parse_list<T: DeserializeOwned>(raw: &str) -> Option<Vec<T>> {
    list_from_value(serde_json::from_str(raw).ok()?)
}

pub fn list_from_value<T: DeserializeOwned>(value: serde_json::Value) -> Option<Vec<T>> {
    let serde_json::Value::Array(values) = value else {
        return None;
    };
    Some(
        values
            .into_iter()
            .filter(serde_json::Value::is_object)
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect(),
    )
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    slots: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrackStore for MemoryStore {
    fn read_slot(&self, slot: &str) -> Result<Option<String>, StoreError> {
        Ok(self.slots.get(slot).cloned())
    }

    fn write_slot(&mut self, slot: &str, value: &str) -> Result<(), StoreError> {
        self.slots.insert(slot.to_string(), value.to_string());
        Ok(())
    }

    fn remove_slot(&mut self, slot: &str) -> Result<(), StoreError> {
        self.slots.remove(slot);
        Ok(())
    }
}

/// One `<slot>.json` file per slot inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slot))
    }
}

impl TrackStore for FileStore {
    fn read_slot(&self, slot: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.slot_path(slot)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_slot(&mut self, slot: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.slot_path(slot), value)?;
        Ok(())
    }

    fn remove_slot(&mut self, slot: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.slot_path(slot)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_json_reads_as_empty() {
        let mut store = MemoryStore::new();
        store.write_slot(OVERRIDE_SLOT, "{not json").unwrap();
        store.write_slot(EXTRA_SLOT, r#"{"title": "object, not array"}"#).unwrap();

        assert!(store.get_override().is_empty());
        assert!(store.get_extra().is_empty());
    }

    #[test]
    fn non_object_elements_are_skipped() {
        let mut store = MemoryStore::new();
        store
            .write_slot(EXTRA_SLOT, r#"[null, 3, {"title": "A", "url": "/a.mp3"}, "x"]"#)
            .unwrap();

        let extra = store.get_extra();
        assert_eq!(extra.len(), 1);
        assert_eq!(extra[0].title.as_deref(), Some("A"));
    }

    #[test]
    fn round_trips_through_memory() {
        let mut store = MemoryStore::new();
        let tracks = vec![Track::new("A", "/a.mp3").with_cover("/covers/a.png")];
        store.set_override(&tracks).unwrap();
        assert_eq!(store.get_override(), tracks);

        store.clear().unwrap();
        assert!(store.get_override().is_empty());
    }

    #[test]
    fn file_store_keeps_one_file_per_slot() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().join("state"));

        assert!(store.get_extra().is_empty());

        let extra = vec![PartialTrack {
            title: Some("A".into()),
            mv_url: Some("https://v/a".into()),
            ..Default::default()
        }];
        store.set_extra(&extra).unwrap();

        let raw = fs::read_to_string(dir.path().join("state").join("extraTracks.json")).unwrap();
        assert_eq!(raw, r#"[{"title":"A","mvUrl":"https://v/a"}]"#);
        assert_eq!(FileStore::new(dir.path().join("state")).get_extra(), extra);

        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.get_extra().is_empty());
    }
}
