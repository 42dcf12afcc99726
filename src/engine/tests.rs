use std::path::Path;
use std::sync::Arc;

use super::*;
use crate::config::Settings;
use crate::error::EngineError;
use crate::scan::TagReader;
use crate::sources::testing::StubFactory;
use crate::track::{Track, TrackHandle, TrackMeta};

struct NameReader;

impl TagReader for NameReader {
    fn read(&self, path: &Path) -> crate::error::Result<TrackMeta> {
        Ok(TrackMeta {
            title: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ..TrackMeta::default()
        })
    }
}

fn settings_for(dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.library.media_dir = dir.to_path_buf();
    settings
}

fn engine_at(dir: &Path) -> Arc<MediaEngine> {
    MediaEngine::new(settings_for(dir), StubFactory::new()).unwrap()
}

fn song(uri: &str) -> TrackHandle {
    Track::new(uri.to_string(), TrackMeta::default())
}

#[test]
fn a_missing_media_root_is_a_hard_failure() {
    let result = MediaEngine::new(
        settings_for(Path::new("/no/such/media/root")),
        StubFactory::new(),
    );
    assert!(matches!(result, Err(EngineError::MediaRoot { .. })));
}

#[test]
fn construction_creates_the_playlists_directory() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    assert!(dir.path().join(PLAYLISTS_DIR_NAME).is_dir());
    assert!(dir.path().join("media.cache").is_file());
    assert_eq!(engine.playlists_dir(), &dir.path().join(PLAYLISTS_DIR_NAME));
}

#[test]
fn import_then_load_playlists_resolves_saved_songs() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.mp3"), b"x").unwrap();
    let engine = engine_at(dir.path());
    let uri = dir.path().join("a.mp3").to_string_lossy().into_owned();
    std::fs::write(
        dir.path().join(PLAYLISTS_DIR_NAME).join("mix.rpl"),
        format!("s:{uri}\n"),
    )
    .unwrap();

    engine.spawn_import(Arc::new(NameReader)).join().unwrap();
    assert_eq!(engine.catalog().len(), 1);
    assert_eq!(engine.store().record_count(), 1);

    assert_eq!(engine.load_playlists().unwrap(), 1);
    let mix = engine.catalog().playlist_by_name("mix").unwrap();
    assert_eq!(crate::playlist::read(&mix).size(), 1);
}

#[test]
fn remove_track_cascades_through_queue_catalog_cache_and_file() {
    let dir = tempfile::tempdir().unwrap();
    let media = dir.path().join("gone.mp3");
    std::fs::write(&media, b"x").unwrap();
    let uri = media.to_string_lossy().into_owned();

    let engine = engine_at(dir.path());
    let track = engine.catalog().add(song(&uri), false);
    engine.store().cache(&track).unwrap();
    engine.player().enqueue_track(track.clone());
    engine.player().play().unwrap();
    assert!(engine.working_set().contains(&uri));

    assert!(engine.remove_track(&uri, true).unwrap());

    assert_eq!(engine.player().status(), crate::player::PlaybackState::Stopped);
    assert!(crate::playlist::read(engine.player().queue()).is_empty());
    assert!(!engine.working_set().contains(&uri));
    assert!(!engine.catalog().contains(&uri));
    assert!(!engine.store().contains(&uri));
    assert!(!media.exists());

    // Unknown uris cascade harmlessly.
    assert!(!engine.remove_track(&uri, true).unwrap());
}

#[test]
fn shutdown_saves_dirty_playlists_and_flushes_the_pending_batch() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    let track = engine.catalog().add(song("/a.mp3"), true);
    let favs = crate::playlist::Playlist::new_handle("favs");
    crate::playlist::write(&favs).push_song(track);
    assert!(engine.catalog().register_playlist(favs));

    engine.shutdown();

    assert!(dir
        .path()
        .join(PLAYLISTS_DIR_NAME)
        .join("favs.rpl")
        .is_file());
    assert_eq!(engine.store().record_count(), 1);
    assert_eq!(engine.catalog().pending_cache_len(), 0);
}

#[test]
fn save_playlist_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());
    engine
        .catalog()
        .register_playlist(crate::playlist::Playlist::new_handle("mix"));

    assert!(engine.save_playlist("MIX").unwrap());
    assert!(!engine.save_playlist("nope").unwrap());
    assert!(dir.path().join(PLAYLISTS_DIR_NAME).join("mix.rpl").is_file());
}

#[test]
fn a_disabled_cache_still_imports_into_the_catalog() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.mp3"), b"x").unwrap();
    let mut settings = settings_for(dir.path());
    settings.cache.enabled = false;
    let engine = MediaEngine::new(settings, StubFactory::new()).unwrap();

    let summary = engine.spawn_import(Arc::new(NameReader)).join().unwrap();
    assert_eq!(summary.imported, 1);
    assert_eq!(engine.catalog().len(), 1);
    assert!(!dir.path().join("media.cache").exists());
}
