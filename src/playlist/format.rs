//! Text persistence of playlists.
//!
//! One file per playlist, `<name>.rpl`, UTF-8, one directive per line:
//!
//! ```text
//! s:<uri>     a song, resolved against the catalog by uri
//! p:<name>    a nested playlist, resolved by name or loaded from
//!             <name>.rpl next to this file
//! ```
//!
//! Unknown directives and unresolvable uris are logged and skipped so one
//! bad line never loses the rest of the playlist.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::warn;

use super::{add_playlist, read, write, AddMode, MediaItem, Playlist, PlaylistHandle};
use crate::error::Result;
use crate::track::TrackHandle;

pub const PLAYLIST_EXTENSION: &str = "rpl";

/// Write `handle` to `<dir>/<name>.rpl` and clear its dirty flag.
pub fn save(handle: &PlaylistHandle, dir: &Path) -> Result<()> {
    let mut body = String::new();
    {
        let playlist = read(handle);
        for (_, item) in playlist.iter() {
            match item {
                MediaItem::Song(track) => {
                    body.push_str("s:");
                    body.push_str(track.uri());
                }
                MediaItem::PlaylistRef(child) => {
                    body.push_str("p:");
                    body.push_str(read(child).name());
                }
            }
            body.push('\n');
        }
    }
    let path = dir.join(format!("{}.{PLAYLIST_EXTENSION}", read(handle).name()));
    fs::write(path, body)?;
    write(handle).mark_clean();
    Ok(())
}

/// Load the playlist stored at `path`. Songs are resolved through
/// `resolve_track`; nested playlists first against `loaded` (by name,
/// case-insensitive), then by loading `<name>.rpl` from the same
/// directory. The new handle is pushed into `loaded` before its lines are
/// parsed, so mutually-referencing files terminate and a self-reference
/// degrades into the usual cycle rejection.
pub fn load<R>(path: &Path, resolve_track: &R, loaded: &mut Vec<PlaylistHandle>) -> Result<PlaylistHandle>
where
    R: Fn(&str) -> Option<TrackHandle>,
{
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let text = fs::read_to_string(path)?;

    let handle = Playlist::new_handle(name);
    loaded.push(handle.clone());

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some(("s", uri)) => match resolve_track(uri) {
                Some(track) => {
                    write(&handle).push_song(track);
                }
                None => warn!(
                    "playlist {:?}: unknown uri {uri}, skipping",
                    read(&handle).name()
                ),
            },
            Some(("p", child_name)) => {
                match resolve_child(path, child_name, resolve_track, loaded) {
                    Some(child) => {
                        let index = read(&handle).len();
                        if let Err(e) = add_playlist(&handle, index, &child, AddMode::Reference) {
                            warn!(
                                "playlist {:?}: cannot nest {child_name}: {e}",
                                read(&handle).name()
                            );
                        }
                    }
                    None => warn!(
                        "playlist {:?}: unresolvable nested playlist {child_name}, skipping",
                        read(&handle).name()
                    ),
                }
            }
            _ => warn!(
                "playlist {:?}: unknown directive {line:?}, skipping",
                read(&handle).name()
            ),
        }
    }

    write(&handle).mark_clean();
    Ok(handle)
}

fn resolve_child<R>(
    origin: &Path,
    name: &str,
    resolve_track: &R,
    loaded: &mut Vec<PlaylistHandle>,
) -> Option<PlaylistHandle>
where
    R: Fn(&str) -> Option<TrackHandle>,
{
    if let Some(found) = loaded
        .iter()
        .find(|p| read(p).name().eq_ignore_ascii_case(name))
    {
        return Some(Arc::clone(found));
    }
    let sibling = origin
        .parent()?
        .join(format!("{name}.{PLAYLIST_EXTENSION}"));
    if !sibling.is_file() {
        return None;
    }
    match load(&sibling, resolve_track, loaded) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("failed to load nested playlist {sibling:?}: {e}");
            None
        }
    }
}
