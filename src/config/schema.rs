use std::path::PathBuf;

use serde::Deserialize;

/// Top-level engine settings loaded from `config.toml`.
///
/// File format: TOML
/// Default path (Linux/XDG): `$XDG_CONFIG_HOME/rondo/config.toml` or `~/.config/rondo/config.toml`
///
/// Precedence (highest wins):
/// 1) Environment variables (prefix `RONDO__`, `__` as nested separator)
/// 2) Config file (if present)
/// 3) Struct defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheSettings,
    pub library: LibrarySettings,
    pub playback: PlaybackSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            library: LibrarySettings::default(),
            playback: PlaybackSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Whether the on-disk track cache is used at all. When false every
    /// store operation degrades to a no-op and tracks are re-imported on
    /// each startup.
    pub enabled: bool,
    /// Whether cover art bytes are embedded in cache records. When false
    /// records are written with a zero-length image field.
    pub embed_images: bool,
    /// Maximum dimension (pixels) the host should scale cover art to
    /// before handing it to the engine. The engine itself never decodes
    /// images; this value is only surfaced to collaborators.
    pub max_image_dim: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            embed_images: true,
            max_image_dim: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// Root directory of the media library. The cache file and the
    /// `Playlists` directory live underneath it.
    pub media_dir: PathBuf,
    /// File extensions to treat as audio (case-insensitive, without dot).
    pub extensions: Vec<String>,
    /// Whether to follow symlinks during scanning.
    pub follow_links: bool,
    /// Whether to include hidden files/directories (dotfiles).
    pub include_hidden: bool,
    /// Whether to recurse into subdirectories.
    pub recursive: bool,
    /// Optional cap on directory recursion depth.
    pub max_depth: Option<usize>,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            media_dir: PathBuf::from("Music"),
            extensions: vec!["mp3".into(), "flac".into(), "wav".into(), "ogg".into()],
            follow_links: true,
            include_hidden: false,
            recursive: true,
            max_depth: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Default loop mode.
    pub loop_mode: LoopModeSetting,
    /// Cap on the number of tracks with a live decoder attached.
    pub max_loaded_sources: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            loop_mode: LoopModeSetting::None,
            max_loaded_sources: 20,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopModeSetting {
    #[serde(alias = "off", alias = "no-loop", alias = "no_loop")]
    None,
    #[serde(alias = "loop-all", alias = "loop_all")]
    All,
    #[serde(alias = "one", alias = "repeat-one", alias = "loop_one")]
    Single,
}
