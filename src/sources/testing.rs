//! Decoder stubs shared by the working-set, player and engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{Decoder, DecoderFactory, DecoderState};
use crate::error::{EngineError, Result};
use crate::track::TrackHandle;

#[derive(Debug)]
pub(crate) struct StubState {
    pub state: DecoderState,
    pub position: Duration,
    pub seeks: Vec<Duration>,
    pub stops: usize,
}

impl StubState {
    fn new(state: DecoderState) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self {
            state,
            position: Duration::ZERO,
            seeks: Vec::new(),
            stops: 0,
        }))
    }
}

pub(crate) struct StubDecoder {
    state: Arc<Mutex<StubState>>,
}

impl StubDecoder {
    fn lock(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap()
    }
}

impl Decoder for StubDecoder {
    fn state(&self) -> DecoderState {
        self.lock().state
    }

    fn play(&mut self) {
        self.lock().state = DecoderState::Playing;
    }

    fn pause(&mut self) {
        self.lock().state = DecoderState::Paused;
    }

    fn stop(&mut self) {
        let mut s = self.lock();
        s.state = DecoderState::Ready;
        s.stops += 1;
    }

    fn seek(&mut self, position: Duration) {
        let mut s = self.lock();
        s.position = position;
        s.seeks.push(position);
    }

    fn position(&self) -> Duration {
        self.lock().position
    }
}

/// Factory recording every open and handing out inspectable decoders.
pub(crate) struct StubFactory {
    initial_state: DecoderState,
    opened: Mutex<Vec<String>>,
    states: Mutex<HashMap<String, Arc<Mutex<StubState>>>>,
    failing: Mutex<HashSet<String>>,
}

impl StubFactory {
    pub(crate) fn new() -> Arc<Self> {
        Self::with_initial_state(DecoderState::Ready)
    }

    pub(crate) fn with_initial_state(state: DecoderState) -> Arc<Self> {
        Arc::new(Self {
            initial_state: state,
            opened: Mutex::new(Vec::new()),
            states: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
        })
    }

    pub(crate) fn fail_for(&self, uri: &str) {
        self.failing.lock().unwrap().insert(uri.to_string());
    }

    /// How many times a decoder was opened for `uri`.
    pub(crate) fn open_count(&self, uri: &str) -> usize {
        self.opened.lock().unwrap().iter().filter(|u| *u == uri).count()
    }

    /// Inspectable state of the most recent decoder for `uri`.
    pub(crate) fn state_of(&self, uri: &str) -> Option<Arc<Mutex<StubState>>> {
        self.states.lock().unwrap().get(uri).cloned()
    }
}

impl DecoderFactory for StubFactory {
    fn open(&self, track: &TrackHandle) -> Result<Box<dyn Decoder>> {
        if self.failing.lock().unwrap().contains(track.uri()) {
            return Err(EngineError::Decoder {
                uri: track.uri().to_string(),
                reason: "stub failure".to_string(),
            });
        }
        self.opened.lock().unwrap().push(track.uri().to_string());
        let state = StubState::new(self.initial_state);
        self.states
            .lock()
            .unwrap()
            .insert(track.uri().to_string(), state.clone());
        Ok(Box::new(StubDecoder { state }))
    }
}
