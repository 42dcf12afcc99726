//! Canonical track set and derived groupings.
//!
//! The catalog owns one [`TrackHandle`] per uri; every other structure
//! (queue, playlists, working set) shares those handles. Groupings are
//! name entries with a membership predicate; member lists are recomputed
//! on every read, so a metadata edit is reflected immediately and no
//! group ever holds a stale copy.
//!
//! One mutex serializes all catalog state. Group creation happens inside
//! the same critical section as the track insert, so two concurrent adds
//! of the same new album cannot create the group twice.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log::warn;

use crate::error::Result;
use crate::playlist::{self, PlaylistHandle, PLAYLIST_EXTENSION};
use crate::track::TrackHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Album,
    Artist,
    Genre,
}

/// One named grouping entry. Albums additionally carry the album artist,
/// since two artists may release same-named albums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    kind: GroupKind,
    name: String,
    album_artist: String,
}

impl Group {
    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Album artist for album groups, empty otherwise.
    pub fn album_artist(&self) -> &str {
        &self.album_artist
    }

    fn covers(&self, track: &TrackHandle) -> bool {
        let meta = track.meta();
        match self.kind {
            GroupKind::Album => meta.album == self.name && meta.album_artist == self.album_artist,
            GroupKind::Artist => meta.artist == self.name,
            GroupKind::Genre => meta.genre == self.name,
        }
    }
}

pub struct Catalog {
    inner: Mutex<CatalogInner>,
}

struct CatalogInner {
    /// Insertion-ordered canonical handles.
    tracks: Vec<TrackHandle>,
    by_uri: HashMap<String, TrackHandle>,
    albums: Vec<Group>,
    artists: Vec<Group>,
    genres: Vec<Group>,
    playlists: Vec<PlaylistHandle>,
    /// Tracks added from a scan that the cache file does not know yet.
    pending_cache: Vec<TrackHandle>,
}

impl Catalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(CatalogInner {
                tracks: Vec::new(),
                by_uri: HashMap::new(),
                albums: Vec::new(),
                artists: Vec::new(),
                genres: Vec::new(),
                playlists: Vec::new(),
                pending_cache: Vec::new(),
            }),
        })
    }

    /// Insert a track, creating any missing groups. Adding a uri that is
    /// already present is a merge no-op returning the existing handle.
    /// `needs_cache` marks the track for the next batched cache flush.
    pub fn add(&self, track: TrackHandle, needs_cache: bool) -> TrackHandle {
        let mut inner = self.lock();
        if let Some(existing) = inner.by_uri.get(track.uri()) {
            return existing.clone();
        }

        {
            let meta = track.meta();
            ensure_group(&mut inner.albums, GroupKind::Album, &meta.album, &meta.album_artist);
            ensure_group(&mut inner.artists, GroupKind::Artist, &meta.artist, "");
            ensure_group(&mut inner.genres, GroupKind::Genre, &meta.genre, "");
        }

        inner.by_uri.insert(track.uri().to_string(), track.clone());
        inner.tracks.push(track.clone());
        if needs_cache {
            inner.pending_cache.push(track.clone());
        }
        track
    }

    pub fn get(&self, uri: &str) -> Option<TrackHandle> {
        self.lock().by_uri.get(uri).cloned()
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.lock().by_uri.contains_key(uri)
    }

    pub fn len(&self) -> usize {
        self.lock().tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tracks.is_empty()
    }

    /// Snapshot of all tracks in insertion order.
    pub fn tracks(&self) -> Vec<TrackHandle> {
        self.lock().tracks.clone()
    }

    /// Drop a track from the set. Empty groups are left in place; they
    /// simply report no members.
    pub fn remove(&self, uri: &str) -> Option<TrackHandle> {
        let mut inner = self.lock();
        let removed = inner.by_uri.remove(uri)?;
        inner.tracks.retain(|t| t.uri() != uri);
        inner.pending_cache.retain(|t| t.uri() != uri);
        Some(removed)
    }

    pub fn albums(&self) -> Vec<Group> {
        self.lock().albums.clone()
    }

    pub fn artists(&self) -> Vec<Group> {
        self.lock().artists.clone()
    }

    pub fn genres(&self) -> Vec<Group> {
        self.lock().genres.clone()
    }

    /// Members of `group` in its sort order: albums by track number,
    /// artists and genres by title, case-insensitive.
    pub fn members(&self, group: &Group) -> Vec<TrackHandle> {
        let mut members: Vec<TrackHandle> = self
            .lock()
            .tracks
            .iter()
            .filter(|t| group.covers(t))
            .cloned()
            .collect();
        match group.kind {
            GroupKind::Album => members.sort_by_key(|t| t.meta().track_number),
            GroupKind::Artist | GroupKind::Genre => {
                members.sort_by_key(|t| t.meta().title.to_lowercase());
            }
        }
        members
    }

    /// Up to `n` member artworks that are not the placeholder, in group
    /// order.
    pub fn representative_images(&self, group: &Group, n: usize) -> Vec<Vec<u8>> {
        self.members(group)
            .iter()
            .filter_map(|t| {
                let meta = t.meta();
                (!meta.artwork.is_placeholder()).then(|| meta.artwork.bytes().to_vec())
            })
            .take(n)
            .collect()
    }

    /// Register a playlist, deduplicating by name case-insensitively.
    /// Returns false when a playlist of that name is already loaded.
    pub fn register_playlist(&self, handle: PlaylistHandle) -> bool {
        let name = playlist::read(&handle).name().to_string();
        let mut inner = self.lock();
        if inner
            .playlists
            .iter()
            .any(|p| playlist::read(p).name().eq_ignore_ascii_case(&name))
        {
            return false;
        }
        inner.playlists.push(handle);
        true
    }

    pub fn playlists(&self) -> Vec<PlaylistHandle> {
        self.lock().playlists.clone()
    }

    pub fn playlist_by_name(&self, name: &str) -> Option<PlaylistHandle> {
        self.lock()
            .playlists
            .iter()
            .find(|p| playlist::read(p).name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Load every `*.rpl` under `dir` whose name is not already
    /// registered. Songs resolve against this catalog; a file that fails
    /// to parse is logged and skipped. Returns how many playlists were
    /// added.
    pub fn load_playlists(&self, dir: &Path) -> Result<usize> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case(PLAYLIST_EXTENSION))
            })
            .collect();
        paths.sort();

        let mut loaded = self.playlists();
        let before = loaded.len();
        for path in paths {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            if loaded
                .iter()
                .any(|p| playlist::read(p).name().eq_ignore_ascii_case(&stem))
            {
                continue;
            }
            if let Err(e) = playlist::load(&path, &|uri| self.get(uri), &mut loaded) {
                warn!("failed to load playlist {path:?}: {e}");
            }
        }

        let mut added = 0;
        let mut inner = self.lock();
        for handle in loaded.into_iter().skip(before) {
            let name = playlist::read(&handle).name().to_string();
            if !inner
                .playlists
                .iter()
                .any(|p| playlist::read(p).name().eq_ignore_ascii_case(&name))
            {
                inner.playlists.push(handle);
                added += 1;
            }
        }
        Ok(added)
    }

    /// Unregister the playlist named `name`, unlink it from every other
    /// loaded playlist and delete its file under `dir`. Returns false
    /// when no such playlist is loaded.
    pub fn remove_playlist(&self, name: &str, dir: &Path) -> Result<bool> {
        let Some(target) = self.playlist_by_name(name) else {
            return Ok(false);
        };

        for other in self.playlists() {
            if Arc::ptr_eq(&other, &target) {
                continue;
            }
            let stale: Vec<_> = playlist::read(&other)
                .iter()
                .filter_map(|(id, item)| match item {
                    crate::playlist::MediaItem::PlaylistRef(child)
                        if Arc::ptr_eq(child, &target) =>
                    {
                        Some(id)
                    }
                    _ => None,
                })
                .collect();
            let mut guard = playlist::write(&other);
            for id in stale {
                let _ = guard.remove(id);
            }
        }

        self.lock().playlists.retain(|p| !Arc::ptr_eq(p, &target));

        let file = dir.join(format!(
            "{}.{PLAYLIST_EXTENSION}",
            playlist::read(&target).name()
        ));
        match fs::remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(true)
    }

    /// Drain the tracks waiting for a batched cache write.
    pub fn take_pending_cache(&self) -> Vec<TrackHandle> {
        std::mem::take(&mut self.lock().pending_cache)
    }

    /// Discard the pending batch without caching, used before a rebuild
    /// that re-caches everything anyway.
    pub fn forget_pending_cache(&self) {
        self.lock().pending_cache.clear();
    }

    pub fn pending_cache_len(&self) -> usize {
        self.lock().pending_cache.len()
    }

    fn lock(&self) -> MutexGuard<'_, CatalogInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn ensure_group(groups: &mut Vec<Group>, kind: GroupKind, name: &str, album_artist: &str) {
    let exists = groups
        .iter()
        .any(|g| g.name == name && g.album_artist == album_artist);
    if !exists {
        groups.push(Group {
            kind,
            name: name.to_string(),
            album_artist: album_artist.to_string(),
        });
    }
}
