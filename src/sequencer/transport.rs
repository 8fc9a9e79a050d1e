// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::info;

use super::engine::Engine;
use super::pattern::{Pattern, PatternStore};
use super::tempo::Tempo;

/// The user-facing play/stop/tempo surface over an engine and a pattern.
pub struct Transport {
    engine: Arc<Engine>,
    pattern: PatternStore,
    tempo: Mutex<Tempo>,
    /// Publishes the step being played. None while stopped.
    steps: Arc<watch::Sender<Option<usize>>>,
}

impl Transport {
    pub fn new(engine: Arc<Engine>) -> Transport {
        let (steps, _) = watch::channel(None);
        Transport {
            engine,
            pattern: PatternStore::new(),
            tempo: Mutex::new(Tempo::default()),
            steps: Arc::new(steps),
        }
    }

    /// Starts playback of the current pattern at the current tempo. Does nothing
    /// while already playing.
    pub fn play(&self) {
        if self.engine.is_running() {
            return;
        }

        self.engine.set_tempo(*self.tempo.lock());
        let steps = self.steps.clone();
        self.engine.set_step_listener(Arc::new(move |step| {
            steps.send_replace(Some(step));
        }));
        self.engine.start(self.pattern.clone());
        info!(bpm = self.bpm(), "Playing");
    }

    /// Stops playback and clears the current step.
    pub fn stop(&self) {
        self.engine.stop();
        self.steps.send_replace(None);
    }

    /// Sets the tempo, clamped into range. A playing engine picks it up on the
    /// next step.
    pub fn set_bpm(&self, bpm: u32) -> Tempo {
        let tempo = Tempo::new(bpm);
        *self.tempo.lock() = tempo;
        if self.engine.is_running() {
            self.engine.set_tempo(tempo);
        }
        tempo
    }

    pub fn toggle(&self, track: usize, step: usize) -> Pattern {
        self.pattern.toggle(track, step)
    }

    pub fn reset(&self) -> Pattern {
        self.pattern.reset()
    }

    /// Loads external pattern data and a tempo, as when opening a saved beat.
    pub fn load(&self, data: &Value, bpm: f64) -> (Pattern, Tempo) {
        let (pattern, tempo) = self.pattern.load(data, bpm);
        self.set_bpm(tempo.bpm());
        (pattern, tempo)
    }

    /// Replaces the pattern with an already valid one.
    pub fn set_pattern(&self, pattern: Pattern) {
        self.pattern.set(pattern);
    }

    /// The step most recently played, or None while stopped.
    pub fn current_step(&self) -> Option<usize> {
        *self.steps.borrow()
    }

    /// Subscribes to step changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<usize>> {
        self.steps.subscribe()
    }

    pub fn is_playing(&self) -> bool {
        self.engine.is_running()
    }

    pub fn bpm(&self) -> u32 {
        self.tempo.lock().bpm()
    }

    pub fn tempo(&self) -> Tempo {
        *self.tempo.lock()
    }

    pub fn pattern(&self) -> Pattern {
        self.pattern.snapshot()
    }
}
