//! Engine context object.
//!
//! One [`MediaEngine`] is constructed at startup and handed to every
//! consumer; there are no global singletons. Construction validates the
//! media root and is the only place a hard failure can come from. Every
//! later I/O problem is logged and survived.

#[cfg(test)]
mod tests;

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{info, warn};

use crate::catalog::Catalog;
use crate::config::Settings;
use crate::error::{EngineError, Result};
use crate::playlist::{self, MediaItem, Playlist};
use crate::player::PlaybackEngine;
use crate::scan::{self, ScanHandle, TagReader};
use crate::sources::{DecoderFactory, WorkingSet};
use crate::store::{CacheStore, CACHE_FILE_NAME};

/// Directory under the media root holding saved playlists.
pub const PLAYLISTS_DIR_NAME: &str = "Playlists";

pub struct MediaEngine {
    settings: Settings,
    playlists_dir: PathBuf,
    store: Arc<CacheStore>,
    catalog: Arc<Catalog>,
    working_set: Arc<WorkingSet>,
    player: Mutex<PlaybackEngine>,
}

impl MediaEngine {
    /// Build the engine. An unreadable media root is the only hard
    /// failure; everything else starts empty and fills in later.
    pub fn new(settings: Settings, decoder_factory: Arc<dyn DecoderFactory>) -> Result<Arc<Self>> {
        settings
            .validate()
            .map_err(::config::ConfigError::Message)?;

        let root = &settings.library.media_dir;
        if !root.is_dir() {
            return Err(EngineError::MediaRoot {
                path: root.clone(),
                reason: "not an existing directory".to_string(),
            });
        }
        if let Err(e) = fs::read_dir(root) {
            return Err(EngineError::MediaRoot {
                path: root.clone(),
                reason: e.to_string(),
            });
        }

        let playlists_dir = root.join(PLAYLISTS_DIR_NAME);
        fs::create_dir_all(&playlists_dir)?;

        let store = Arc::new(CacheStore::open(
            root.join(CACHE_FILE_NAME),
            settings.cache.enabled,
            settings.cache.embed_images,
        )?);
        let working_set = WorkingSet::new(decoder_factory, settings.playback.max_loaded_sources);
        let player = PlaybackEngine::new(
            Playlist::new_handle("queue"),
            working_set.clone(),
            settings.playback.loop_mode.into(),
        );

        info!("media engine up, root {}", root.display());
        Ok(Arc::new(Self {
            settings,
            playlists_dir,
            store,
            catalog: Catalog::new(),
            working_set,
            player: Mutex::new(player),
        }))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn working_set(&self) -> &Arc<WorkingSet> {
        &self.working_set
    }

    pub fn player(&self) -> MutexGuard<'_, PlaybackEngine> {
        self.player.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn playlists_dir(&self) -> &PathBuf {
        &self.playlists_dir
    }

    /// Start a background import of the media root.
    pub fn spawn_import(&self, reader: Arc<dyn TagReader>) -> ScanHandle {
        scan::spawn_import(
            self.store.clone(),
            self.catalog.clone(),
            reader,
            self.settings.library.clone(),
        )
    }

    /// Load saved playlists from the playlists directory, resolving
    /// songs against the catalog. Usually called once the import is done.
    pub fn load_playlists(&self) -> Result<usize> {
        self.catalog.load_playlists(&self.playlists_dir)
    }

    /// Save the playlist named `name` to the playlists directory.
    pub fn save_playlist(&self, name: &str) -> Result<bool> {
        match self.catalog.playlist_by_name(name) {
            Some(handle) => {
                playlist::save(&handle, &self.playlists_dir)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove a track everywhere: queue, working set, catalog, cache,
    /// and optionally the file itself. Returns whether the catalog knew
    /// the uri.
    pub fn remove_track(&self, uri: &str, delete_file: bool) -> Result<bool> {
        {
            let mut player = self.player();
            if player
                .current_song()
                .is_some_and(|t| t.uri() == uri)
            {
                player.stop();
            }
            let queue = player.queue().clone();
            let stale: Vec<_> = playlist::read(&queue)
                .iter()
                .filter_map(|(id, item)| match item {
                    MediaItem::Song(t) if t.uri() == uri => Some(id),
                    _ => None,
                })
                .collect();
            let mut guard = playlist::write(&queue);
            for id in stale {
                let _ = guard.remove(id);
            }
        }

        self.working_set.remove(uri);
        let known = self.catalog.remove(uri).is_some();
        self.store.remove(uri)?;

        if delete_file {
            match fs::remove_file(uri) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(known)
    }

    /// Flush everything that would otherwise be lost: dirty playlists
    /// and the pending cache batch. Individual save failures are logged
    /// and do not abort the rest.
    pub fn shutdown(&self) {
        self.player().stop();
        self.working_set.clear();

        for handle in self.catalog.playlists() {
            if playlist::read(&handle).is_dirty() {
                if let Err(e) = playlist::save(&handle, &self.playlists_dir) {
                    warn!(
                        "failed to save playlist {:?}: {e}",
                        playlist::read(&handle).name()
                    );
                }
            }
        }

        let pending = self.catalog.take_pending_cache();
        if !pending.is_empty() {
            if let Err(e) = self.store.cache_all(&pending) {
                warn!("failed to flush {} pending cache records: {e}", pending.len());
            }
        }
        info!("media engine shut down");
    }
}
