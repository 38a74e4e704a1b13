use crate::track::Track;

/// Case-insensitive substring match on the title. A blank query matches
/// every track.
pub fn matches(track: &Track, query: &str) -> bool {
    let query = query.trim();
    if query.is_empty() {
        return true;
    }
    track.title.to_lowercase().contains(&query.to_lowercase())
}

pub fn filter_tracks<'a>(tracks: &'a [Track], query: &str) -> Vec<&'a Track> {
    tracks.iter().filter(|track| matches(track, query)).collect()
}

/// Keeps the active index inside the filtered list, falling back to the
/// first entry.
pub fn clamp_selection(index: usize, len: usize) -> usize {
    if index >= len {
        0
    } else {
        index
    }
}
