//! Nested playlist tree.
//!
//! A playlist is an ordered list of [`MediaNode`]s, each holding either a
//! song or a reference to another playlist. Nodes live in a slab with a
//! free list and are addressed by stable [`NodeId`]s; order is kept by
//! doubly-linked prev/next pointers so removal and reordering never shift
//! other nodes' ids.
//!
//! Child playlists are shared by `Arc`, so a playlist edited in one place
//! is immediately visible through every parent that references it. Sizes
//! of nested playlists are recomputed on every read; there are no cached
//! recursive counters to go stale.
//!
//! Locking: methods on [`Playlist`] assume the caller holds the handle's
//! `RwLock`; nested reads take child locks internally. Reference-mode
//! insertion rejects cycles up front, which is also what keeps the nested
//! lock acquisition free of deadlocks.

mod format;


pub use format::{load, save, PLAYLIST_EXTENSION};

use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{EngineError, Result};
use crate::track::TrackHandle;

pub type PlaylistHandle = Arc<RwLock<Playlist>>;

/// Stable address of a node within its owning playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// What a node holds.
#[derive(Debug, Clone)]
pub enum MediaItem {
    Song(TrackHandle),
    PlaylistRef(PlaylistHandle),
}

impl MediaItem {
    pub fn is_song(&self) -> bool {
        matches!(self, MediaItem::Song(_))
    }
}

#[derive(Debug)]
struct MediaNode {
    item: MediaItem,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

/// How [`add_playlist`] inserts a child into a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMode {
    /// Shared link; later edits of the child show through the parent.
    Reference,
    /// Clone of the child's top-level node list at insertion time.
    Contents,
    /// Recursive expansion of the child to a flat run of songs.
    Flattened,
}

#[derive(Debug)]
pub struct Playlist {
    name: String,
    nodes: Vec<Option<MediaNode>>,
    free: Vec<usize>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    /// Direct node count (songs + refs), not recursive.
    len: usize,
    /// Direct song count, not recursive.
    num_songs: usize,
    dirty: bool,
}

pub(crate) fn read(handle: &PlaylistHandle) -> RwLockReadGuard<'_, Playlist> {
    handle.read().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn write(handle: &PlaylistHandle) -> RwLockWriteGuard<'_, Playlist> {
    handle.write().unwrap_or_else(|e| e.into_inner())
}

impl Playlist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            num_songs: 0,
            dirty: false,
        }
    }

    pub fn new_handle(name: impl Into<String>) -> PlaylistHandle {
        Arc::new(RwLock::new(Self::new(name)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.dirty = true;
    }

    /// Whether this playlist has unsaved edits.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Direct node count (a nested playlist counts as one).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when no song is reachable at any depth.
    pub fn is_recursively_empty(&self) -> bool {
        self.size() == 0
    }

    /// Recursive song count: direct songs plus the size of every nested
    /// playlist, recomputed on each call.
    pub fn size(&self) -> usize {
        let mut total = self.num_songs;
        for (_, item) in self.iter() {
            if let MediaItem::PlaylistRef(child) = item {
                total += read(child).size();
            }
        }
        total
    }

    /// Total duration of every reachable song, in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        let mut total = 0i64;
        for (_, item) in self.iter() {
            match item {
                MediaItem::Song(t) => total += i64::from(t.meta().duration_ms),
                MediaItem::PlaylistRef(child) => total += read(child).duration_ms(),
            }
        }
        total
    }

    /// The `i`-th reachable song in flat order, descending into nested
    /// playlists. Out of range returns `None`.
    pub fn get_song(&self, mut i: usize) -> Option<TrackHandle> {
        for (_, item) in self.iter() {
            match item {
                MediaItem::PlaylistRef(child) => {
                    let guard = read(child);
                    let sz = guard.size();
                    if i < sz {
                        return guard.get_song(i);
                    }
                    i -= sz;
                }
                MediaItem::Song(t) => {
                    if i == 0 {
                        return Some(t.clone());
                    }
                    i -= 1;
                }
            }
        }
        None
    }

    /// Whether `track` is reachable at any depth.
    pub fn contains_song(&self, track: &TrackHandle) -> bool {
        for (_, item) in self.iter() {
            match item {
                MediaItem::Song(t) if **t == **track => return true,
                MediaItem::PlaylistRef(child) if read(child).contains_song(track) => {
                    return true;
                }
                _ => {}
            }
        }
        false
    }

    /// Whether `other` is a direct child.
    pub fn contains_playlist(&self, other: &PlaylistHandle) -> bool {
        self.iter().any(|(_, item)| {
            matches!(item, MediaItem::PlaylistRef(child) if Arc::ptr_eq(child, other))
        })
    }

    /// Whether `other` is reachable at any depth.
    pub fn contains_playlist_recursive(&self, other: &PlaylistHandle) -> bool {
        for (_, item) in self.iter() {
            if let MediaItem::PlaylistRef(child) = item {
                if Arc::ptr_eq(child, other) || read(child).contains_playlist_recursive(other) {
                    return true;
                }
            }
        }
        false
    }

    /// All reachable songs in flat order.
    pub fn flatten(&self) -> Vec<TrackHandle> {
        let mut songs = Vec::new();
        for (_, item) in self.iter() {
            match item {
                MediaItem::Song(t) => songs.push(t.clone()),
                MediaItem::PlaylistRef(child) => songs.extend(read(child).flatten()),
            }
        }
        songs
    }

    pub fn head(&self) -> Option<NodeId> {
        self.head
    }

    pub fn tail(&self) -> Option<NodeId> {
        self.tail
    }

    pub fn item(&self, id: NodeId) -> Option<&MediaItem> {
        self.node(id).map(|n| &n.item)
    }

    pub fn next_of(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.next)
    }

    pub fn prev_of(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.prev)
    }

    /// Position of `id` among direct nodes, head first.
    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.iter().position(|(n, _)| n == id)
    }

    /// Direct nodes in order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cur: self.head,
        }
    }

    pub fn insert_song(&mut self, index: usize, track: TrackHandle) -> Result<NodeId> {
        let anchor = self.anchor_at(index)?;
        let id = self.alloc(MediaItem::Song(track));
        self.link_before(id, anchor);
        self.dirty = true;
        Ok(id)
    }

    pub fn push_song(&mut self, track: TrackHandle) -> NodeId {
        let id = self.alloc(MediaItem::Song(track));
        self.link_before(id, None);
        self.dirty = true;
        id
    }

    /// Remove one node, returning its item. Stale ids are an error.
    pub fn remove(&mut self, id: NodeId) -> Result<MediaItem> {
        if self.node(id).is_none() {
            return Err(EngineError::OutOfBounds {
                index: id.0,
                len: self.nodes.len(),
            });
        }
        self.unlink(id);
        self.dirty = true;
        match self.nodes[id.0].take() {
            Some(node) => {
                self.free.push(id.0);
                Ok(node.item)
            }
            None => Err(EngineError::OutOfBounds {
                index: id.0,
                len: self.nodes.len(),
            }),
        }
    }

    /// Relocate `ids` (kept in the given order) so they sit before the
    /// node currently at `index`, counted after the moved nodes are taken
    /// out; an `index` at or past the end appends.
    pub fn move_nodes(&mut self, ids: &[NodeId], index: usize) -> Result<()> {
        // A repeated id must not be unlinked twice, so keep first
        // occurrences only.
        let mut ids = ids.to_vec();
        let mut seen = HashSet::new();
        ids.retain(|id| seen.insert(*id));

        for &id in &ids {
            if self.node(id).is_none() {
                return Err(EngineError::OutOfBounds {
                    index: id.0,
                    len: self.nodes.len(),
                });
            }
        }
        for &id in &ids {
            self.unlink(id);
        }
        let anchor = if index >= self.len {
            None
        } else {
            self.node_at(index)
        };
        for &id in &ids {
            self.link_before(id, anchor);
        }
        self.dirty = true;
        Ok(())
    }

    /// Drop every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
        self.num_songs = 0;
        self.dirty = true;
    }

    pub(crate) fn insert_item(&mut self, index: usize, item: MediaItem) -> Result<NodeId> {
        let anchor = self.anchor_at(index)?;
        let id = self.alloc(item);
        self.link_before(id, anchor);
        self.dirty = true;
        Ok(id)
    }

    fn node(&self, id: NodeId) -> Option<&MediaNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut MediaNode> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    fn node_at(&self, index: usize) -> Option<NodeId> {
        self.iter().nth(index).map(|(id, _)| id)
    }

    /// Anchor node for an insertion at `index`: `None` appends, anything
    /// past `len` is out of bounds.
    fn anchor_at(&self, index: usize) -> Result<Option<NodeId>> {
        if index > self.len {
            return Err(EngineError::OutOfBounds {
                index,
                len: self.len,
            });
        }
        Ok(if index == self.len {
            None
        } else {
            self.node_at(index)
        })
    }

    fn alloc(&mut self, item: MediaItem) -> NodeId {
        let node = MediaNode {
            item,
            prev: None,
            next: None,
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    /// Splice `id` in before `anchor` (`None` = append at tail), fixing
    /// both neighbor pointers and the direct counters.
    fn link_before(&mut self, id: NodeId, anchor: Option<NodeId>) {
        let (prev, next) = match anchor {
            None => (self.tail, None),
            Some(a) => (self.node(a).and_then(|n| n.prev), Some(a)),
        };
        if let Some(n) = self.node_mut(id) {
            n.prev = prev;
            n.next = next;
        }
        match prev {
            Some(p) => {
                if let Some(n) = self.node_mut(p) {
                    n.next = Some(id);
                }
            }
            None => self.head = Some(id),
        }
        match next {
            Some(nx) => {
                if let Some(n) = self.node_mut(nx) {
                    n.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }
        self.len += 1;
        if self.node(id).is_some_and(|n| n.item.is_song()) {
            self.num_songs += 1;
        }
    }

    /// Detach `id` from the chain without freeing its slot.
    fn unlink(&mut self, id: NodeId) {
        let Some(node) = self.node(id) else {
            return;
        };
        let (prev, next) = (node.prev, node.next);
        let is_song = node.item.is_song();
        match prev {
            Some(p) => {
                if let Some(n) = self.node_mut(p) {
                    n.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(nx) => {
                if let Some(n) = self.node_mut(nx) {
                    n.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(n) = self.node_mut(id) {
            n.prev = None;
            n.next = None;
        }
        self.len -= 1;
        if is_song {
            self.num_songs -= 1;
        }
    }
}

pub struct Iter<'a> {
    list: &'a Playlist,
    cur: Option<NodeId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (NodeId, &'a MediaItem);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cur?;
        let node = self.list.node(id)?;
        self.cur = node.next;
        Some((id, &node.item))
    }
}

/// Insert `child` into `parent` at `index` according to `mode`.
///
/// Reference mode rejects self-insertion and any child that already
/// reaches `parent`, since a cycle would make every recursive walk
/// diverge. Contents and Flattened copy, so they cannot form cycles.
pub fn add_playlist(
    parent: &PlaylistHandle,
    index: usize,
    child: &PlaylistHandle,
    mode: AddMode,
) -> Result<()> {
    match mode {
        AddMode::Reference => {
            if Arc::ptr_eq(parent, child) || read(child).contains_playlist_recursive(parent) {
                return Err(EngineError::PlaylistCycle(read(child).name().to_string()));
            }
            write(parent).insert_item(index, MediaItem::PlaylistRef(child.clone()))?;
            Ok(())
        }
        AddMode::Contents => {
            let items: Vec<MediaItem> =
                read(child).iter().map(|(_, item)| item.clone()).collect();
            let mut parent = write(parent);
            for (k, item) in items.into_iter().enumerate() {
                parent.insert_item(index + k, item)?;
            }
            Ok(())
        }
        AddMode::Flattened => {
            let songs = read(child).flatten();
            let mut parent = write(parent);
            for (k, song) in songs.into_iter().enumerate() {
                parent.insert_item(index + k, MediaItem::Song(song))?;
            }
            Ok(())
        }
    }
}

/// [`add_playlist`] at the end of the parent.
pub fn push_playlist(parent: &PlaylistHandle, child: &PlaylistHandle, mode: AddMode) -> Result<()> {
    let index = read(parent).len();
    add_playlist(parent, index, child, mode)
}
