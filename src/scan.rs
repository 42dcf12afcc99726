//! Background library import.
//!
//! An import first replays the cache file into the catalog, then walks
//! the media directory for files the cache does not know, reading their
//! tags through the host-supplied [`TagReader`]. Progress flows to the
//! caller as [`ScanEvent`]s over a bounded channel; cancellation is
//! cooperative and checked between files, so an interrupted import
//! leaves the catalog and the cache consistent, just incomplete.
//!
//! Tag extraction failures skip the file; it is never added to the
//! catalog. When the cache was found corrupt, the pending batch is
//! discarded and the whole file is rebuilt from the catalog instead.


use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::catalog::Catalog;
use crate::config::LibrarySettings;
use crate::error::{EngineError, Result};
use crate::store::CacheStore;
use crate::track::{Track, TrackMeta};

/// Extracts tag metadata from one audio file. Implemented by the host;
/// an error skips the file.
pub trait TagReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<TrackMeta>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Progress { processed: usize, total: usize },
    Message(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanSummary {
    /// Tracks replayed from the cache file.
    pub loaded_from_cache: usize,
    /// Tracks newly imported from disk.
    pub imported: usize,
    pub cancelled: bool,
}

/// Control surface of a running import.
pub struct ScanHandle {
    cancel: Arc<AtomicBool>,
    events: Receiver<ScanEvent>,
    worker: JoinHandle<Result<ScanSummary>>,
}

impl ScanHandle {
    /// Ask the worker to stop after the file it is on.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn events(&self) -> &Receiver<ScanEvent> {
        &self.events
    }

    /// Wait for the worker and return its summary.
    pub fn join(self) -> Result<ScanSummary> {
        match self.worker.join() {
            Ok(result) => result,
            Err(_) => Err(EngineError::ScanPanicked),
        }
    }
}

/// Start a background import of `settings.media_dir`.
pub fn spawn_import(
    store: Arc<CacheStore>,
    catalog: Arc<Catalog>,
    reader: Arc<dyn TagReader>,
    settings: LibrarySettings,
) -> ScanHandle {
    let cancel = Arc::new(AtomicBool::new(false));
    let (tx, rx) = sync_channel(64);
    let flag = cancel.clone();
    let worker =
        thread::spawn(move || run_import(&store, &catalog, reader.as_ref(), &settings, &tx, &flag));
    ScanHandle {
        cancel,
        events: rx,
        worker,
    }
}

fn run_import(
    store: &CacheStore,
    catalog: &Catalog,
    reader: &dyn TagReader,
    settings: &LibrarySettings,
    tx: &SyncSender<ScanEvent>,
    cancel: &AtomicBool,
) -> Result<ScanSummary> {
    let mut summary = ScanSummary::default();

    let files = collect_audio_files(settings);
    let total = files.len();
    send(
        tx,
        ScanEvent::Message(format!(
            "scanning {} ({total} files)",
            settings.media_dir.display()
        )),
    );

    let cached = store.retrieve_all(total, |processed, total| {
        send(tx, ScanEvent::Progress { processed, total });
    })?;
    summary.loaded_from_cache = cached.len();
    for track in cached {
        catalog.add(track, false);
    }

    for (i, path) in files.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            summary.cancelled = true;
            send(tx, ScanEvent::Message("import cancelled".to_string()));
            return Ok(summary);
        }
        let uri = path.to_string_lossy().into_owned();
        if !catalog.contains(&uri) {
            match reader.read(path) {
                Ok(meta) => {
                    catalog.add(Track::new(uri, meta), true);
                    summary.imported += 1;
                }
                Err(e) => warn!("skipping {}: {e}", path.display()),
            }
        } else {
            debug!("already known: {uri}");
        }
        send(
            tx,
            ScanEvent::Progress {
                processed: i + 1,
                total,
            },
        );
    }

    if store.needs_rebuild() {
        send(tx, ScanEvent::Message("rebuilding cache file".to_string()));
        catalog.forget_pending_cache();
        store.rebuild_from(&catalog.tracks())?;
    } else {
        let pending = catalog.take_pending_cache();
        if !pending.is_empty() {
            debug!("caching {} new tracks", pending.len());
            store.cache_all(&pending)?;
        }
    }
    send(tx, ScanEvent::Message("import finished".to_string()));
    Ok(summary)
}

/// Candidate audio files under the media root, in a stable order.
pub fn collect_audio_files(settings: &LibrarySettings) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(&settings.media_dir).follow_links(settings.follow_links);
    if !settings.recursive {
        walker = walker.max_depth(1);
    } else if let Some(depth) = settings.max_depth {
        walker = walker.max_depth(depth);
    }

    let include_hidden = settings.include_hidden;
    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_entry(|e| include_hidden || e.depth() == 0 || !is_hidden(e))
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                warn!("scan: {e}");
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_audio_file(e.path(), &settings.extensions))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

fn is_audio_file(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
}

fn send(tx: &SyncSender<ScanEvent>, event: ScanEvent) {
    // The receiver may be gone; progress is best-effort.
    let _ = tx.send(event);
}
