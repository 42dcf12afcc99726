//! Bounded working set of decodable resources.
//!
//! Decoding itself lives outside this crate behind the [`Decoder`] and
//! [`DecoderFactory`] traits; this module only decides which tracks keep
//! a live decoder attached. A [`Resource`] pairs a track with an optional
//! decoder binding; the [`WorkingSet`] keeps resources ordered oldest
//! first and evicts past its cap.
//!
//! Eviction never touches the currently-playing resource, anything the
//! host marked visible, or a resource whose decoder is still loading or
//! errored. A resource mid-materialization holds its own lock, so the
//! eviction pass skips it rather than disposing it halfway.

#[cfg(test)]
pub(crate) mod testing;


use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::debug;

use crate::error::Result;
use crate::track::TrackHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Loading,
    Ready,
    Playing,
    Paused,
    Error,
}

/// One live decoder binding, implemented by the host audio backend.
pub trait Decoder: Send {
    fn state(&self) -> DecoderState;
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn seek(&mut self, position: Duration);
    fn position(&self) -> Duration;
}

/// Opens decoders from track metadata alone; no tag re-extraction.
pub trait DecoderFactory: Send + Sync {
    fn open(&self, track: &TrackHandle) -> Result<Box<dyn Decoder>>;
}

/// A track plus its optional decoder binding.
pub struct Resource {
    track: TrackHandle,
    decoder: Option<Box<dyn Decoder>>,
}

pub type ResourceHandle = Arc<Mutex<Resource>>;

impl Resource {
    fn new(track: TrackHandle) -> ResourceHandle {
        Arc::new(Mutex::new(Self {
            track,
            decoder: None,
        }))
    }

    pub fn track(&self) -> &TrackHandle {
        &self.track
    }

    pub fn is_materialized(&self) -> bool {
        self.decoder.is_some()
    }

    pub fn decoder_state(&self) -> Option<DecoderState> {
        self.decoder.as_ref().map(|d| d.state())
    }

    pub fn decoder_mut(&mut self) -> Option<&mut (dyn Decoder + 'static)> {
        self.decoder.as_deref_mut()
    }

    /// Attach a decoder if none is attached. Idempotent.
    fn materialize(&mut self, factory: &dyn DecoderFactory) -> Result<()> {
        if self.decoder.is_none() {
            self.decoder = Some(factory.open(&self.track)?);
        }
        Ok(())
    }

    /// Stop and drop the decoder binding. Metadata stays. Idempotent.
    pub fn dispose(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.stop();
        }
    }
}

pub struct WorkingSet {
    factory: Arc<dyn DecoderFactory>,
    default_cap: usize,
    inner: Mutex<SetInner>,
}

struct SetInner {
    /// Oldest first; re-touching moves a resource to the end.
    resources: Vec<ResourceHandle>,
    cap: usize,
    playing: Option<String>,
    visible: HashSet<String>,
}

impl WorkingSet {
    pub fn new(factory: Arc<dyn DecoderFactory>, cap: usize) -> Arc<Self> {
        Arc::new(Self {
            factory,
            default_cap: cap,
            inner: Mutex::new(SetInner {
                resources: Vec::new(),
                cap,
                playing: None,
                visible: HashSet::new(),
            }),
        })
    }

    pub fn len(&self) -> usize {
        self.lock().resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().resources.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.lock().cap
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.find(uri).is_some()
    }

    pub fn resource(&self, uri: &str) -> Option<ResourceHandle> {
        self.find(uri)
    }

    /// Uris in set order, oldest first.
    pub fn uris(&self) -> Vec<String> {
        self.lock()
            .resources
            .iter()
            .map(|r| lock_resource(r).track().uri().to_string())
            .collect()
    }

    /// Insert `track` (or re-touch its existing resource, moving it to
    /// the newest position), attach a decoder, then evict down to cap.
    pub fn materialize(&self, track: &TrackHandle) -> Result<ResourceHandle> {
        let handle = {
            let mut inner = self.lock();
            match inner
                .resources
                .iter()
                .position(|r| lock_resource(r).track().uri() == track.uri())
            {
                Some(i) => {
                    let handle = inner.resources.remove(i);
                    inner.resources.push(handle.clone());
                    handle
                }
                None => {
                    let handle = Resource::new(track.clone());
                    inner.resources.push(handle.clone());
                    handle
                }
            }
        };

        // Attach outside the set lock; the resource's own lock shields it
        // from the eviction pass below.
        lock_resource(&handle).materialize(self.factory.as_ref())?;

        self.evict();
        Ok(handle)
    }

    /// Tell the set which uris the host currently shows. In a grouped
    /// view the cap widens to twice the visible count (never below the
    /// configured default).
    pub fn set_visible(&self, uris: &[String], grouped_view: bool) {
        {
            let mut inner = self.lock();
            inner.visible = uris.iter().cloned().collect();
            inner.cap = if grouped_view {
                self.default_cap.max(2 * uris.len())
            } else {
                self.default_cap
            };
        }
        self.evict();
    }

    /// Mark the currently-playing uri; it is never evicted.
    pub fn set_playing(&self, uri: Option<&str>) {
        self.lock().playing = uri.map(str::to_string);
    }

    /// Dispose and drop the resource for `uri`, if present.
    pub fn remove(&self, uri: &str) {
        let handle = {
            let mut inner = self.lock();
            let Some(i) = inner
                .resources
                .iter()
                .position(|r| lock_resource(r).track().uri() == uri)
            else {
                return;
            };
            if inner.playing.as_deref() == Some(uri) {
                inner.playing = None;
            }
            inner.resources.remove(i)
        };
        lock_resource(&handle).dispose();
    }

    /// Dispose every resource and empty the set.
    pub fn clear(&self) {
        let drained: Vec<_> = {
            let mut inner = self.lock();
            inner.playing = None;
            std::mem::take(&mut inner.resources)
        };
        for handle in drained {
            lock_resource(&handle).dispose();
        }
    }

    /// Dispose eviction candidates oldest-first until at or under cap.
    fn evict(&self) {
        let mut inner = self.lock();
        if inner.resources.len() <= inner.cap {
            return;
        }
        let mut i = 0;
        while inner.resources.len() > inner.cap && i < inner.resources.len() {
            if self.evictable(&inner, i) {
                let handle = inner.resources.remove(i);
                let mut resource = lock_resource(&handle);
                debug!("evicting {} from the working set", resource.track().uri());
                resource.dispose();
            } else {
                i += 1;
            }
        }
    }

    fn evictable(&self, inner: &SetInner, i: usize) -> bool {
        // A locked resource is being worked on right now; skip it.
        let Ok(resource) = inner.resources[i].try_lock() else {
            return false;
        };
        let uri = resource.track().uri();
        if inner.playing.as_deref() == Some(uri) || inner.visible.contains(uri) {
            return false;
        }
        matches!(
            resource.decoder_state(),
            None | Some(DecoderState::Ready) | Some(DecoderState::Paused)
        )
    }

    fn find(&self, uri: &str) -> Option<ResourceHandle> {
        self.lock()
            .resources
            .iter()
            .find(|r| lock_resource(r).track().uri() == uri)
            .cloned()
    }

    fn lock(&self) -> MutexGuard<'_, SetInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub(crate) fn lock_resource(handle: &ResourceHandle) -> MutexGuard<'_, Resource> {
    handle.lock().unwrap_or_else(|e| e.into_inner())
}
