//! Catalog reconciliation.
//!
//! Three sources feed the visible catalog:
//!
//! * the generated base manifest,
//! * the override list, a full replacement written by the importers,
//! * the extra list, incremental additions and enrichments written by
//!   add-song.
//!
//! A non-empty override list wins over the base manifest. Extra records
//! always enrich tracks with the same title key and, without an override,
//! append tracks the base manifest does not know about. Tracks without a
//! `url` never reach the catalog. Enrichment only fills `mvUrl` and `cover`
//! when they are empty.

use std::collections::HashMap;

use log::debug;

use crate::cover::{CoverAllocator, CoverCursor};
use crate::track::{PartialTrack, Track};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub tracks: Vec<Track>,
    /// The extra list with covers filled in for url-bearing records.
    pub patched_extra: Vec<PartialTrack>,
    /// Whether `patched_extra` may be written back to the extra slot.
    ///
    /// Only set when the pass dropped no records. This guards against
    /// shrinking the slot under another writer; it is not a transaction.
    pub write_back_extra: bool,
}

pub fn reconcile(
    base: &[Track],
    override_tracks: Option<&[Track]>,
    extra: &[PartialTrack],
    covers: &dyn CoverAllocator,
) -> Reconciled {
    match override_tracks {
        Some(list) if !list.is_empty() => Reconciled {
            tracks: reconcile_override(list, extra, covers),
            patched_extra: extra.to_vec(),
            write_back_extra: false,
        },
        _ => {
            let tracks = merge_base_and_extra(base, extra, covers);
            let patched_extra = patch_extra_covers(extra, covers);
            let write_back_extra = patched_extra.len() == extra.len();
            Reconciled {
                tracks,
                patched_extra,
                write_back_extra,
            }
        }
    }
}

fn reconcile_override(
    override_tracks: &[Track],
    extra: &[PartialTrack],
    covers: &dyn CoverAllocator,
) -> Vec<Track> {
    // Later extra records with the same key replace earlier ones.
    let extra_by_key: HashMap<String, &PartialTrack> =
        extra.iter().map(|record| (record.key(), record)).collect();

    let mut cursor = CoverCursor::new(covers);
    let mut catalog = Catalog::default();
    for track in override_tracks.iter().filter(|t| t.is_playable()) {
        let mut track = track.clone();
        cursor.fill(&mut track.cover);
        catalog.insert_or_enrich(track);
    }

    for track in catalog.tracks.iter_mut() {
        if let Some(record) = extra_by_key.get(&track.key()) {
            track.enrich_from(record.mv_url.as_ref(), record.cover.as_ref());
        }
    }

    debug!(
        "Reconciled {} override tracks into {} catalog entries",
        override_tracks.len(),
        catalog.tracks.len()
    );
    catalog.tracks
}

fn merge_base_and_extra(
    base: &[Track],
    extra: &[PartialTrack],
    covers: &dyn CoverAllocator,
) -> Vec<Track> {
    let mut cursor = CoverCursor::new(covers);
    let mut catalog = Catalog::default();

    for track in base.iter().filter(|t| t.is_playable()) {
        if catalog.contains(&track.key()) {
            continue;
        }
        let mut track = track.clone();
        cursor.fill(&mut track.cover);
        catalog.push(track);
    }

    // A url-less record may still enrich a known title but never becomes a
    // track. A missing title keys as "".
    for record in extra {
        if let Some(index) = catalog.position(&record.key()) {
            catalog.tracks[index].enrich_from(record.mv_url.as_ref(), record.cover.as_ref());
            continue;
        }
        if let Some(mut track) = record.to_track() {
            cursor.fill(&mut track.cover);
            catalog.push(track);
        }
    }

    debug!(
        "Merged {} base and {} extra records into {} catalog entries",
        base.len(),
        extra.len(),
        catalog.tracks.len()
    );
    catalog.tracks
}

fn patch_extra_covers(extra: &[PartialTrack], covers: &dyn CoverAllocator) -> Vec<PartialTrack> {
    let mut cursor = CoverCursor::new(covers);
    extra
        .iter()
        .filter(|record| record.has_url())
        .map(|record| {
            let mut record = record.clone();
            cursor.fill(&mut record.cover);
            record
        })
        .collect()
}

/// Ordered tracks plus a title-key index.
#[derive(Default)]
struct Catalog {
    tracks: Vec<Track>,
    index: HashMap<String, usize>,
}

impl Catalog {
    fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    fn push(&mut self, track: Track) {
        self.index.insert(track.key(), self.tracks.len());
        self.tracks.push(track);
    }

    fn insert_or_enrich(&mut self, track: Track) {
        match self.position(&track.key()) {
            Some(index) => {
                self.tracks[index].enrich_from(track.mv_url.as_ref(), track.cover.as_ref());
            }
            None => self.push(track),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::cover::RoundRobinCovers;

    fn extra(title: &str, url: Option<&str>) -> PartialTrack {
        PartialTrack {
            title: Some(title.to_string()),
            url: url.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn base_track_is_enriched_by_extra_mv_url() {
        let base = vec![Track::new("A", "/music/a.mp3")];
        let extras = vec![PartialTrack {
            url: Some("/music/a.mp3".into()),
            mv_url: Some("https://v/a".into()),
            ..extra("A", None)
        }];

        let result = reconcile(&base, None, &extras, &RoundRobinCovers::default());

        assert_eq!(
            result.tracks,
            vec![Track::new("A", "/music/a.mp3")
                .with_mv_url("https://v/a")
                .with_cover("/covers/a.png")]
        );
    }

    #[test]
    fn url_less_extra_enriches_but_is_never_appended() {
        let base = vec![Track::new("A", "/music/a.mp3")];
        let extras = vec![
            PartialTrack {
                mv_url: Some("https://v/a".into()),
                ..extra("A", None)
            },
            extra("Ghost", None),
        ];

        let result = reconcile(&base, Some(&[] as &[Track]), &extras, &RoundRobinCovers::default());

        assert_eq!(
            result.tracks,
            vec![Track::new("A", "/music/a.mp3")
                .with_cover("/covers/a.png")
                .with_mv_url("https://v/a")]
        );
        assert!(result.patched_extra.is_empty());
        assert!(!result.write_back_extra);
    }

    #[test]
    fn untitled_extras_share_the_empty_title() {
        let base = vec![Track::new("", "/base.mp3")];
        let extras = vec![
            PartialTrack {
                mv_url: Some("https://v/x".into()),
                url: Some("/x.mp3".into()),
                ..Default::default()
            },
            PartialTrack {
                url: Some("/y.mp3".into()),
                ..Default::default()
            },
        ];

        let merged = reconcile(&base, None, &extras, &RoundRobinCovers::default());
        assert_eq!(
            merged.tracks,
            vec![Track::new("", "/base.mp3")
                .with_cover("/covers/a.png")
                .with_mv_url("https://v/x")]
        );

        let only_extras = reconcile(&[], None, &extras, &RoundRobinCovers::default());
        assert_eq!(only_extras.tracks.len(), 1);
        assert_eq!(only_extras.tracks[0].url, "/x.mp3");

        let override_tracks = vec![Track::new("", "/o.mp3")];
        let overridden = reconcile(&[], Some(override_tracks.as_slice()), &extras[..1], &RoundRobinCovers::default());
        assert_eq!(overridden.tracks[0].mv_url.as_deref(), Some("https://v/x"));
    }

    #[test]
    fn override_replaces_base() {
        let base = vec![Track::new("A", "/music/a.mp3"), Track::new("C", "/music/c.mp3")];
        let override_tracks = vec![Track::new("B", "/music/b.mp3")];

        let result = reconcile(&base, Some(override_tracks.as_slice()), &[], &RoundRobinCovers::default());

        assert_eq!(
            result.tracks,
            vec![Track::new("B", "/music/b.mp3").with_cover("/covers/a.png")]
        );
    }

    #[test]
    fn override_is_enriched_by_matching_extra_title() {
        let override_tracks = vec![
            Track::new("Song - Band", "/o/1.mp3").with_cover("/covers/z.png"),
            Track::new("Other", "/o/2.mp3"),
        ];
        let extras = vec![PartialTrack {
            mv_url: Some("https://v/1".into()),
            cover: Some("/covers/extra.png".into()),
            ..extra("Song  -  Band ", Some("/x/1.mp3"))
        }];

        let result = reconcile(&[], Some(override_tracks.as_slice()), &extras, &RoundRobinCovers::default());

        assert_eq!(result.tracks.len(), 2);
        assert_eq!(result.tracks[0].mv_url.as_deref(), Some("https://v/1"));
        assert_eq!(result.tracks[0].cover.as_deref(), Some("/covers/z.png"));
        assert_eq!(result.tracks[1].cover.as_deref(), Some("/covers/a.png"));
        assert!(!result.write_back_extra);
    }

    #[test]
    fn cover_counter_is_shared_between_base_and_extra() {
        let base = vec![
            Track::new("A", "/a.mp3"),
            Track::new("B", "/b.mp3").with_cover("/covers/own.png"),
        ];
        let extras = vec![extra("C", Some("/c.mp3"))];

        let result = reconcile(&base, None, &extras, &RoundRobinCovers::default());

        let covers: Vec<_> = result.tracks.iter().map(|t| t.cover.clone().unwrap()).collect();
        assert_eq!(covers, vec!["/covers/a.png", "/covers/own.png", "/covers/b.png"]);
    }

    #[test]
    fn extra_covers_are_patched_with_independent_counter() {
        let base = vec![Track::new("A", "/a.mp3")];
        let extras = vec![extra("A", Some("/a.mp3")), extra("N", Some("/n.mp3"))];

        let result = reconcile(&base, None, &extras, &RoundRobinCovers::default());

        assert!(result.write_back_extra);
        assert_eq!(result.patched_extra[0].cover.as_deref(), Some("/covers/a.png"));
        assert_eq!(result.patched_extra[1].cover.as_deref(), Some("/covers/b.png"));
        // the catalog counter already used a.png for the base track
        assert_eq!(result.tracks[1].cover.as_deref(), Some("/covers/b.png"));
    }

    #[test]
    fn extra_write_back_skipped_when_records_are_dropped() {
        let extras = vec![extra("A", Some("/a.mp3")), extra("B", None)];
        let result = reconcile(&[], None, &extras, &RoundRobinCovers::default());
        assert_eq!(result.patched_extra.len(), 1);
        assert!(!result.write_back_extra);
    }

    #[test]
    fn url_less_tracks_are_excluded_everywhere() {
        let base = vec![Track::new("A", ""), Track::new("B", "/b.mp3")];
        let merged = reconcile(&base, None, &[extra("C", None)], &RoundRobinCovers::default());
        assert_eq!(merged.tracks.len(), 1);

        let override_tracks = vec![Track::new("X", ""), Track::new("Y", "/y.mp3")];
        let overridden = reconcile(&[], Some(override_tracks.as_slice()), &[], &RoundRobinCovers::default());
        assert_eq!(overridden.tracks, vec![Track::new("Y", "/y.mp3").with_cover("/covers/a.png")]);
    }

    #[test]
    fn titles_are_unique_and_first_seen_wins() {
        let base = vec![
            Track::new("Dup", "/first.mp3"),
            Track::new(" Dup ", "/second.mp3").with_mv_url("https://v/2"),
        ];
        let extras = vec![extra("Dup", Some("/third.mp3")), extra("New", Some("/n.mp3"))];

        let result = reconcile(&base, None, &extras, &RoundRobinCovers::default());

        let keys: HashSet<_> = result.tracks.iter().map(Track::key).collect();
        assert_eq!(keys.len(), result.tracks.len());
        assert_eq!(result.tracks[0].url, "/first.mp3");
        assert_eq!(result.tracks[0].mv_url, None);
    }

    #[test]
    fn override_duplicates_collapse_to_first() {
        let override_tracks = vec![
            Track::new("A", "/1.mp3"),
            Track::new("A", "/2.mp3").with_mv_url("https://v/a"),
        ];
        let result = reconcile(&[], Some(override_tracks.as_slice()), &[], &RoundRobinCovers::default());
        assert_eq!(result.tracks.len(), 1);
        assert_eq!(result.tracks[0].url, "/1.mp3");
        assert_eq!(result.tracks[0].mv_url.as_deref(), Some("https://v/a"));
    }

    #[test]
    fn reconciling_the_output_again_is_a_no_op() {
        let base = vec![
            Track::new("A", "/a.mp3"),
            Track::new("B", "/b.mp3").with_cover("/covers/q.png"),
            Track::new("A", "/a2.mp3"),
        ];
        let extras = vec![
            extra("C", Some("/c.mp3")),
            PartialTrack {
                mv_url: Some("https://v/b".into()),
                ..extra("B", Some("/b.mp3"))
            },
        ];
        let covers = RoundRobinCovers::default();

        let first = reconcile(&base, None, &extras, &covers);
        let second = reconcile(&first.tracks, None, &[], &covers);

        assert_eq!(first.tracks, second.tracks);
    }

    #[test]
    fn cover_assignment_is_deterministic() {
        let base: Vec<Track> = (0..30).map(|i| Track::new(format!("T{}", i), format!("/{}.mp3", i))).collect();
        let covers = RoundRobinCovers::default();

        let first = reconcile(&base, None, &[], &covers);
        let second = reconcile(&base, None, &[], &covers);

        assert_eq!(first, second);
        assert_eq!(first.tracks[20].cover.as_deref(), Some("/covers/a.png"));
    }

    #[test]
    fn enrichment_never_clobbers_existing_fields() {
        let base = vec![Track::new("A", "/a.mp3")
            .with_cover("/covers/mine.png")
            .with_mv_url("https://v/mine")];
        let extras = vec![PartialTrack {
            cover: Some("/covers/other.png".into()),
            mv_url: Some("https://v/other".into()),
            ..extra("A", Some("/a.mp3"))
        }];

        let result = reconcile(&base, None, &extras, &RoundRobinCovers::default());

        assert_eq!(result.tracks[0].cover.as_deref(), Some("/covers/mine.png"));
        assert_eq!(result.tracks[0].mv_url.as_deref(), Some("https://v/mine"));
    }

    #[test]
    fn injected_allocator_is_used() {
        let base = vec![Track::new("A", "/a.mp3"), Track::new("B", "/b.mp3")];
        let fixed = |i: usize| Some(format!("/test/{}", i));

        let result = reconcile(&base, None, &[], &fixed);

        assert_eq!(result.tracks[1].cover.as_deref(), Some("/test/1"));
    }
}
