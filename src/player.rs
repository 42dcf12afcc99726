//! Playback queue and transport state machine.
//!
//! The queue is an ordinary playlist; "current" is a node in it plus,
//! when that node is a nested playlist, a flat song cursor inside it.
//! Navigation walks sibling nodes, descending into non-empty nested
//! playlists song by song before moving on.
//!
//! End-of-media is reported by the host decoder observer through
//! [`PlaybackEngine::end_of_media_reached`] with the [`PlayToken`] that
//! was live when the song started. Every new start and every user
//! navigation issues a fresh token, so a late or duplicated end signal
//! for an already-left song is ignored instead of double-advancing.


use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use rand::RngExt;

use crate::config::LoopModeSetting;
use crate::error::Result;
use crate::playlist::{self, AddMode, MediaItem, NodeId, PlaylistHandle};
use crate::sources::{lock_resource, WorkingSet};
use crate::track::TrackHandle;

/// Elapsed time beyond which `previous()` restarts the current song
/// instead of navigating backward.
const RESTART_THRESHOLD: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    None,
    All,
    Single,
}

impl From<LoopModeSetting> for LoopMode {
    fn from(s: LoopModeSetting) -> Self {
        match s {
            LoopModeSetting::None => LoopMode::None,
            LoopModeSetting::All => LoopMode::All,
            LoopModeSetting::Single => LoopMode::Single,
        }
    }
}

/// Opaque generation stamp for end-of-media reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayToken(u64);

#[derive(Debug, Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

#[derive(Clone)]
struct Current {
    node: NodeId,
    /// Flat song index inside the node when it is a playlist ref.
    cursor: Option<usize>,
}

pub struct PlaybackEngine {
    queue: PlaylistHandle,
    working_set: Arc<WorkingSet>,
    state: PlaybackState,
    loop_mode: LoopMode,
    current: Option<Current>,
    token: u64,
    token_consumed: bool,
}

impl PlaybackEngine {
    pub fn new(queue: PlaylistHandle, working_set: Arc<WorkingSet>, loop_mode: LoopMode) -> Self {
        Self {
            queue,
            working_set,
            state: PlaybackState::Stopped,
            loop_mode,
            current: None,
            token: 0,
            token_consumed: false,
        }
    }

    pub fn status(&self) -> PlaybackState {
        self.state
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
    }

    pub fn queue(&self) -> &PlaylistHandle {
        &self.queue
    }

    pub fn current_node(&self) -> Option<NodeId> {
        self.current.as_ref().map(|c| c.node)
    }

    pub fn current_song(&self) -> Option<TrackHandle> {
        let current = self.current.as_ref()?;
        self.song_at(current)
    }

    /// Token identifying the most recent start; an end-of-media report
    /// must quote it to take effect.
    pub fn current_token(&self) -> PlayToken {
        PlayToken(self.token)
    }

    /// Start or resume. With no current node, starts at the first valid
    /// stop from the queue head.
    pub fn play(&mut self) -> Result<()> {
        match self.state {
            PlaybackState::Paused => {
                if let Some(track) = self.current_song() {
                    if let Some(resource) = self.working_set.resource(track.uri()) {
                        if let Some(decoder) = lock_resource(&resource).decoder_mut() {
                            decoder.play();
                        }
                    }
                }
                self.state = PlaybackState::Playing;
                Ok(())
            }
            PlaybackState::Playing => Ok(()),
            PlaybackState::Stopped => {
                if self.current.is_none() {
                    self.current = self.first_stop(Direction::Forward);
                }
                self.start_current()
            }
        }
    }

    /// Make `node` current and start it. An empty nested playlist is
    /// logged and ignored.
    pub fn play_node(&mut self, node: NodeId) -> Result<()> {
        let cursor = {
            let queue = playlist::read(&self.queue);
            match queue.item(node) {
                Some(MediaItem::Song(_)) => None,
                Some(MediaItem::PlaylistRef(child)) => {
                    if playlist::read(child).is_recursively_empty() {
                        warn!("refusing to play an empty nested playlist");
                        return Ok(());
                    }
                    Some(0)
                }
                None => {
                    warn!("play_node: stale node id, ignoring");
                    return Ok(());
                }
            }
        };
        self.current = Some(Current { node, cursor });
        self.start_current()
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        if let Some(track) = self.current_song() {
            if let Some(resource) = self.working_set.resource(track.uri()) {
                if let Some(decoder) = lock_resource(&resource).decoder_mut() {
                    decoder.pause();
                }
            }
        }
        self.state = PlaybackState::Paused;
    }

    /// Stop the decoder and forget the current position in the queue.
    pub fn stop(&mut self) {
        if let Some(track) = self.current_song() {
            if let Some(resource) = self.working_set.resource(track.uri()) {
                lock_resource(&resource).dispose();
            }
        }
        self.working_set.set_playing(None);
        self.current = None;
        self.state = PlaybackState::Stopped;
        self.bump_token();
    }

    pub fn next(&mut self) -> Result<()> {
        self.bump_token();
        self.navigate(Direction::Forward)
    }

    /// Navigate backward, unless more than three seconds of the current
    /// song have elapsed, in which case it restarts from the top.
    pub fn previous(&mut self) -> Result<()> {
        self.bump_token();
        if let Some(track) = self.current_song() {
            if let Some(resource) = self.working_set.resource(track.uri()) {
                let mut resource = lock_resource(&resource);
                if let Some(decoder) = resource.decoder_mut() {
                    if decoder.position() > RESTART_THRESHOLD {
                        decoder.seek(Duration::ZERO);
                        return Ok(());
                    }
                }
            }
        }
        self.navigate(Direction::Backward)
    }

    /// Jump to the `i`-th reachable song of the queue in flat order.
    pub fn jump_to(&mut self, mut i: usize) -> Result<()> {
        self.bump_token();
        let target = {
            let queue = playlist::read(&self.queue);
            let mut found = None;
            for (id, item) in queue.iter() {
                match item {
                    MediaItem::Song(_) => {
                        if i == 0 {
                            found = Some(Current {
                                node: id,
                                cursor: None,
                            });
                            break;
                        }
                        i -= 1;
                    }
                    MediaItem::PlaylistRef(child) => {
                        let sz = playlist::read(child).size();
                        if i < sz {
                            found = Some(Current {
                                node: id,
                                cursor: Some(i),
                            });
                            break;
                        }
                        i -= sz;
                    }
                }
            }
            found
        };
        match target {
            Some(current) => {
                self.current = Some(current);
                self.start_current()
            }
            None => {
                self.stop();
                Ok(())
            }
        }
    }

    /// Jump to a uniformly random song of the queue.
    pub fn shuffle_jump(&mut self) -> Result<()> {
        let size = playlist::read(&self.queue).size();
        if size == 0 {
            return Ok(());
        }
        let i = rand::rng().random_range(0..size);
        debug!("shuffle jump to flat index {i} of {size}");
        self.jump_to(i)
    }

    pub fn enqueue_track(&mut self, track: TrackHandle) -> NodeId {
        playlist::write(&self.queue).push_song(track)
    }

    pub fn enqueue_playlist(&mut self, child: &PlaylistHandle, mode: AddMode) -> Result<()> {
        playlist::push_playlist(&self.queue, child, mode)
    }

    pub fn clear_queue(&mut self) {
        self.stop();
        playlist::write(&self.queue).clear();
    }

    /// Decoder-driven end of the current song. Stale or repeated tokens
    /// are ignored; a live one either replays the song (loop single) or
    /// advances like `next()`.
    pub fn end_of_media_reached(&mut self, token: PlayToken) -> Result<()> {
        if token.0 != self.token || self.token_consumed {
            debug!("ignoring stale end-of-media report");
            return Ok(());
        }
        self.token_consumed = true;
        match self.loop_mode {
            LoopMode::Single => self.replay_current(),
            LoopMode::None | LoopMode::All => self.navigate(Direction::Forward),
        }
    }

    /// Walk siblings in `dir` from the current node; at the edge of the
    /// queue apply the loop mode.
    fn navigate(&mut self, dir: Direction) -> Result<()> {
        let Some(current) = self.current.clone() else {
            return match self.first_stop(dir) {
                Some(next) => {
                    self.current = Some(next);
                    self.start_current()
                }
                None => {
                    self.stop();
                    Ok(())
                }
            };
        };

        // Inside a nested playlist, move its cursor before leaving it.
        if let Some(cursor) = current.cursor {
            let more = {
                let queue = playlist::read(&self.queue);
                match queue.item(current.node) {
                    Some(MediaItem::PlaylistRef(child)) => {
                        let size = playlist::read(child).size();
                        match dir {
                            Direction::Forward => (cursor + 1 < size).then(|| cursor + 1),
                            Direction::Backward => cursor.checked_sub(1),
                        }
                    }
                    _ => None,
                }
            };
            if let Some(cursor) = more {
                self.current = Some(Current {
                    node: current.node,
                    cursor: Some(cursor),
                });
                return self.start_current();
            }
        }

        match self.stop_after(current.node, dir) {
            Some(next) => {
                self.current = Some(next);
                self.start_current()
            }
            None => self.edge_of_queue(dir),
        }
    }

    fn edge_of_queue(&mut self, dir: Direction) -> Result<()> {
        match self.loop_mode {
            LoopMode::None => {
                self.stop();
                Ok(())
            }
            LoopMode::All => match self.first_stop(dir) {
                Some(next) => {
                    self.current = Some(next);
                    self.start_current()
                }
                None => {
                    self.stop();
                    Ok(())
                }
            },
            LoopMode::Single => self.replay_current(),
        }
    }

    /// Reseek the current song to the start and count another play.
    fn replay_current(&mut self) -> Result<()> {
        let Some(track) = self.current_song() else {
            self.stop();
            return Ok(());
        };
        let resource = self.working_set.materialize(&track)?;
        {
            let mut resource = lock_resource(&resource);
            if let Some(decoder) = resource.decoder_mut() {
                decoder.seek(Duration::ZERO);
                decoder.play();
            }
        }
        track.bump_play_count();
        self.bump_token();
        self.state = PlaybackState::Playing;
        Ok(())
    }

    /// First valid stop scanning the whole queue in `dir`.
    fn first_stop(&self, dir: Direction) -> Option<Current> {
        let queue = playlist::read(&self.queue);
        let start = match dir {
            Direction::Forward => queue.head(),
            Direction::Backward => queue.tail(),
        }?;
        self.valid_stop(&queue, start, dir)
            .or_else(|| self.stop_after_locked(&queue, start, dir))
    }

    /// First valid stop strictly after `node` in `dir`.
    fn stop_after(&self, node: NodeId, dir: Direction) -> Option<Current> {
        let queue = playlist::read(&self.queue);
        self.stop_after_locked(&queue, node, dir)
    }

    fn stop_after_locked(
        &self,
        queue: &playlist::Playlist,
        mut node: NodeId,
        dir: Direction,
    ) -> Option<Current> {
        loop {
            node = match dir {
                Direction::Forward => queue.next_of(node)?,
                Direction::Backward => queue.prev_of(node)?,
            };
            if let Some(stop) = self.valid_stop(queue, node, dir) {
                return Some(stop);
            }
        }
    }

    /// A song is always a valid stop; a nested playlist only when it has
    /// at least one reachable song, entered at its first or last song
    /// depending on direction.
    fn valid_stop(
        &self,
        queue: &playlist::Playlist,
        node: NodeId,
        dir: Direction,
    ) -> Option<Current> {
        match queue.item(node)? {
            MediaItem::Song(_) => Some(Current { node, cursor: None }),
            MediaItem::PlaylistRef(child) => {
                let size = playlist::read(child).size();
                if size == 0 {
                    return None;
                }
                let cursor = match dir {
                    Direction::Forward => 0,
                    Direction::Backward => size - 1,
                };
                Some(Current {
                    node,
                    cursor: Some(cursor),
                })
            }
        }
    }

    fn song_at(&self, current: &Current) -> Option<TrackHandle> {
        let queue = playlist::read(&self.queue);
        match queue.item(current.node)? {
            MediaItem::Song(track) => Some(track.clone()),
            MediaItem::PlaylistRef(child) => playlist::read(child).get_song(current.cursor?),
        }
    }

    /// Materialize and start the current song, counting one play and
    /// issuing a fresh token.
    fn start_current(&mut self) -> Result<()> {
        let Some(track) = self.current_song() else {
            self.stop();
            return Ok(());
        };
        let resource = self.working_set.materialize(&track)?;
        self.working_set.set_playing(Some(track.uri()));
        {
            let mut resource = lock_resource(&resource);
            if let Some(decoder) = resource.decoder_mut() {
                decoder.play();
            }
        }
        track.bump_play_count();
        self.bump_token();
        self.state = PlaybackState::Playing;
        Ok(())
    }

    fn bump_token(&mut self) {
        self.token += 1;
        self.token_consumed = false;
    }
}
