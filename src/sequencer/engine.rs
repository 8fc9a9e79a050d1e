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

//! The tick scheduling engine.
//!
//! One tick thread runs per playing period. Each tick is bound to a frame on the
//! output's audio clock: the first lands a fixed lookahead after the current
//! frame and each later one lands one step interval after the previous, at
//! whatever tempo is set while the thread waits for it. The thread wakes a lookahead before each tick frame, so wake-up jitter never
//! moves the audio.

use std::{
    fmt,
    sync::Arc,
    thread::{self, JoinHandle, ThreadId},
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, span, warn, Level};

use super::pattern::{Pattern, PatternStore};
use super::tempo::Tempo;
use super::tracks::STEPS_PER_BAR;
use crate::audio::{thread_priority, Output};
use crate::playsync::CancelHandle;
use crate::samples::SampleBank;

/// Receives the step that was just played, once per tick, on the tick thread.
pub type StepListener = Arc<dyn Fn(usize) + Send + Sync>;

/// The default distance between waking up and the audio a tick schedules.
pub const DEFAULT_LOOKAHEAD: Duration = Duration::from_millis(50);

/// Waits shorter than this are spun rather than slept.
const SPIN_THRESHOLD: Duration = Duration::from_millis(2);

/// The longest the tick thread sleeps before checking the clock again.
const MAX_SLEEP: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Running,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
        }
    }
}

/// Cursor and tick-frame bookkeeping, without any threads.
///
/// The frame of the next tick is always derived from the previous tick and the
/// interval passed in, so a tempo change made while waiting applies to the
/// very next tick.
#[derive(Clone, Debug)]
pub struct StepClock {
    cursor: usize,
    /// The exact frame of the tick just played, or None before the first.
    last_frame: Option<f64>,
    first_frame: f64,
}

impl StepClock {
    /// A clock whose first tick is step 0 at the given frame.
    pub fn new(first_frame: u64) -> StepClock {
        StepClock {
            cursor: 0,
            last_frame: None,
            first_frame: first_frame as f64,
        }
    }

    /// The step the next tick plays.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The frame the next tick lands on at the given step interval.
    pub fn next_frame(&self, step_frames: f64) -> u64 {
        self.next_exact(step_frames).round() as u64
    }

    /// Plays the next tick, returning its step and frame. The interval is kept
    /// fractional so the grid does not drift at tempos where a step is not a
    /// whole number of frames.
    pub fn tick(&mut self, step_frames: f64) -> (usize, u64) {
        let frame = self.next_exact(step_frames);
        let step = self.cursor;
        self.last_frame = Some(frame);
        self.cursor = (self.cursor + 1) % STEPS_PER_BAR;
        (step, frame.round() as u64)
    }

    /// Moves the next tick to the given frame, keeping the cursor.
    pub fn resync(&mut self, frame: u64) {
        self.last_frame = None;
        self.first_frame = frame as f64;
    }

    fn next_exact(&self, step_frames: f64) -> f64 {
        match self.last_frame {
            Some(frame) => frame + step_frames,
            None => self.first_frame,
        }
    }
}

/// State shared between the engine and its tick thread.
struct Shared {
    tempo: Mutex<Tempo>,
    /// The step most recently played. None while stopped.
    cursor: Mutex<Option<usize>>,
    listener: RwLock<Option<StepListener>>,
    /// The pattern cell the tick thread reads from.
    pattern: Mutex<PatternStore>,
}

struct Worker {
    cancel_handle: CancelHandle,
    thread: JoinHandle<()>,
    thread_id: ThreadId,
}

/// Plays the pattern on an output, one step per tick.
pub struct Engine {
    output: Arc<dyn Output>,
    bank: Arc<SampleBank>,
    lookahead: Duration,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl Engine {
    /// Creates a stopped engine that plays the bank's samples on the output.
    pub fn new(output: Arc<dyn Output>, bank: Arc<SampleBank>) -> Engine {
        Engine {
            output,
            bank,
            lookahead: DEFAULT_LOOKAHEAD,
            shared: Arc::new(Shared {
                tempo: Mutex::new(Tempo::default()),
                cursor: Mutex::new(None),
                listener: RwLock::new(None),
                pattern: Mutex::new(PatternStore::new()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Sets how far ahead of the audio the tick thread runs.
    pub fn with_lookahead(mut self, lookahead: Duration) -> Engine {
        self.lookahead = lookahead;
        self
    }

    pub fn state(&self) -> EngineState {
        if self.worker.lock().is_some() {
            EngineState::Running
        } else {
            EngineState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// The step most recently played, or None while stopped.
    pub fn cursor(&self) -> Option<usize> {
        *self.shared.cursor.lock()
    }

    pub fn tempo(&self) -> Tempo {
        *self.shared.tempo.lock()
    }

    /// Changes the tempo. While running, the tick being waited for moves to the
    /// new interval; the cursor is untouched.
    pub fn set_tempo(&self, tempo: Tempo) {
        *self.shared.tempo.lock() = tempo;
        debug!(bpm = tempo.bpm(), "Tempo set");
    }

    /// Registers the callback that receives each played step.
    pub fn set_step_listener(&self, listener: StepListener) {
        *self.shared.listener.write() = Some(listener);
    }

    /// Writes a new pattern into the cell the engine reads from. The next tick
    /// plays it.
    pub fn update_pattern(&self, pattern: Pattern) {
        self.shared.pattern.lock().set(pattern);
    }

    /// Starts playing the given pattern cell from step 0. Does nothing if the
    /// engine is already running.
    pub fn start(&self, pattern: PatternStore) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            debug!("Engine already running");
            return;
        }

        *self.shared.pattern.lock() = pattern;
        let cancel_handle = CancelHandle::new();
        let ticker = Ticker {
            output: self.output.clone(),
            bank: self.bank.clone(),
            shared: self.shared.clone(),
            cancel_handle: cancel_handle.clone(),
            lookahead_frames: (self.lookahead.as_secs_f64() * self.output.sample_rate() as f64)
                as u64,
        };

        let thread = match thread::Builder::new()
            .name("beatgrid-ticks".into())
            .spawn(move || ticker.run())
        {
            Ok(thread) => thread,
            Err(e) => {
                error!(err = %e, "Unable to start tick thread");
                return;
            }
        };

        info!(bpm = self.tempo().bpm(), output = %self.output, "Engine started");
        *worker = Some(Worker {
            cancel_handle,
            thread_id: thread.thread().id(),
            thread,
        });
    }

    /// Stops playback. Once this returns no further tick fires. Safe to call
    /// when stopped, and from within a step listener.
    pub fn stop(&self) {
        let worker = self.worker.lock().take();
        let Some(worker) = worker else {
            return;
        };

        worker.cancel_handle.cancel();
        if thread::current().id() == worker.thread_id {
            // Called from a tick: the loop checks the cancel handle before the
            // next one, so there is nothing to wait for.
            debug!("Engine stopped from within a tick");
        } else if worker.thread.join().is_err() {
            error!("Tick thread panicked");
        }

        *self.shared.cursor.lock() = None;
        info!("Engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the tick thread needs.
struct Ticker {
    output: Arc<dyn Output>,
    bank: Arc<SampleBank>,
    shared: Arc<Shared>,
    cancel_handle: CancelHandle,
    lookahead_frames: u64,
}

impl Ticker {
    fn run(self) {
        let span = span!(Level::INFO, "ticks");
        let _enter = span.enter();

        thread_priority::configure_timing_thread("beatgrid-ticks");

        let sample_rate = self.output.sample_rate();
        let mut clock = StepClock::new(self.output.current_frame() + self.lookahead_frames);

        loop {
            if !self.wait_for(&clock, sample_rate) {
                return;
            }

            let step_frames = self.step_frames(sample_rate);
            let now = self.output.current_frame();
            let due = clock.next_frame(step_frames);
            if now > due + self.lookahead_frames {
                warn!(
                    behind_frames = now - due,
                    "Tick thread fell behind the audio clock, resyncing"
                );
                clock.resync(now + self.lookahead_frames);
            }

            let (step, at_frame) = clock.tick(step_frames);
            self.tick(step, at_frame);
            if self.cancel_handle.is_cancelled() {
                return;
            }
        }
    }

    /// The current step length in frames. Read on every check so a tempo change
    /// moves the next tick.
    fn step_frames(&self, sample_rate: u32) -> f64 {
        self.shared.tempo.lock().step_frames(sample_rate)
    }

    /// Waits until the clock is within the lookahead of the next tick. Returns
    /// false if cancelled.
    fn wait_for(&self, clock: &StepClock, sample_rate: u32) -> bool {
        loop {
            if self.cancel_handle.is_cancelled() {
                return false;
            }

            let wake_frame = clock
                .next_frame(self.step_frames(sample_rate))
                .saturating_sub(self.lookahead_frames);
            let now = self.output.current_frame();
            if now >= wake_frame {
                return true;
            }

            let remaining =
                Duration::from_secs_f64((wake_frame - now) as f64 / sample_rate.max(1) as f64);
            if remaining > SPIN_THRESHOLD {
                if self
                    .cancel_handle
                    .wait_timeout((remaining - SPIN_THRESHOLD).min(MAX_SLEEP))
                {
                    return false;
                }
            } else {
                spin_sleep::sleep(remaining);
            }
        }
    }

    fn tick(&self, step: usize, at_frame: u64) {
        let pattern = self.shared.pattern.lock().snapshot();

        for track in pattern.active_tracks(step) {
            match self.bank.get(track) {
                Some(sample) => {
                    if let Err(e) = self.output.schedule(sample, at_frame) {
                        warn!(track, step, err = %e, "Unable to schedule sample");
                    }
                }
                None => debug!(track, step, "No sample loaded for track, skipping"),
            }
        }

        *self.shared.cursor.lock() = Some(step);

        let listener = self.shared.listener.read().clone();
        if let Some(listener) = listener {
            listener(step);
        }
    }
}
