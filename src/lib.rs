//! rondo is an embeddable media library engine: a persistent binary
//! track cache, a catalog with album/artist/genre groupings, nested
//! playlists, a bounded decoder working set and a playback queue.
//!
//! Audio decoding and tag extraction stay on the host side, plugged in
//! through the [`sources::DecoderFactory`] and [`scan::TagReader`]
//! traits. The host constructs one [`engine::MediaEngine`] from loaded
//! [`config::Settings`] and drives everything through it.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod player;
pub mod playlist;
pub mod scan;
pub mod sources;
pub mod store;
pub mod track;

pub use catalog::{Catalog, Group, GroupKind};
pub use config::Settings;
pub use engine::MediaEngine;
pub use error::{EngineError, Result};
pub use playlist::{AddMode, MediaItem, NodeId, Playlist, PlaylistHandle};
pub use player::{LoopMode, PlayToken, PlaybackEngine, PlaybackState};
pub use scan::{ScanEvent, ScanHandle, ScanSummary, TagReader};
pub use sources::{Decoder, DecoderFactory, DecoderState, WorkingSet};
pub use store::CacheStore;
pub use track::{Artwork, Track, TrackHandle, TrackMeta};
