//! Track metadata model.
//!
//! A [`Track`] is one playable item. The catalog owns the canonical
//! handles; playlists and the working set share them by `Arc`. Identity
//! is the uri alone, so two handles compare equal iff they point at the
//! same media location.

use std::sync::{Arc, RwLock, RwLockReadGuard};

/// Embedded cover art, kept as raw encoded bytes. Decoding and scaling
/// happen outside this crate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Artwork {
    /// No embedded image; consumers substitute their own placeholder.
    Placeholder,
    Embedded(Vec<u8>),
}

impl Artwork {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Artwork::Placeholder)
    }

    /// Encoded bytes, empty for the placeholder.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Artwork::Placeholder => &[],
            Artwork::Embedded(data) => data,
        }
    }
}

impl Default for Artwork {
    fn default() -> Self {
        Artwork::Placeholder
    }
}

/// Mutable metadata fields of a track.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackMeta {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub album_artist: String,
    pub artwork: Artwork,
    pub rating: i32,
    pub track_count: i32,
    pub track_number: i32,
    pub year: i32,
    pub duration_ms: i32,
    pub play_count: u32,
}

/// One playable item's metadata, keyed by uri.
#[derive(Debug)]
pub struct Track {
    uri: String,
    meta: RwLock<TrackMeta>,
}

pub type TrackHandle = Arc<Track>;

impl Track {
    pub fn new(uri: impl Into<String>, meta: TrackMeta) -> TrackHandle {
        Arc::new(Self {
            uri: uri.into(),
            meta: RwLock::new(meta),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn meta(&self) -> RwLockReadGuard<'_, TrackMeta> {
        self.meta.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the current metadata.
    pub fn meta_clone(&self) -> TrackMeta {
        self.meta().clone()
    }

    /// Apply a mutation to the metadata. Returns true when the fields
    /// actually changed, so callers know the cached record went stale.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut TrackMeta),
    {
        let mut meta = self.meta.write().unwrap_or_else(|e| e.into_inner());
        let before = meta.clone();
        f(&mut meta);
        *meta != before
    }

    pub fn bump_play_count(&self) {
        let mut meta = self.meta.write().unwrap_or_else(|e| e.into_inner());
        meta.play_count += 1;
    }

    pub fn play_count(&self) -> u32 {
        self.meta().play_count
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}

impl Eq for Track {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_uri_only() {
        let a = Track::new("file:///a.mp3", TrackMeta::default());
        let b = Track::new(
            "file:///a.mp3",
            TrackMeta {
                title: "different".into(),
                ..TrackMeta::default()
            },
        );
        let c = Track::new("file:///c.mp3", TrackMeta::default());
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn update_reports_whether_fields_changed() {
        let t = Track::new("file:///a.mp3", TrackMeta::default());
        assert!(t.update(|m| m.title = "New".into()));
        assert!(!t.update(|m| m.title = "New".into()));
    }

    #[test]
    fn play_count_bumps_independently() {
        let t = Track::new("file:///a.mp3", TrackMeta::default());
        t.bump_play_count();
        t.bump_play_count();
        assert_eq!(t.play_count(), 2);
    }
}
