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
//! The step sequencer: the drum track layout, the pattern grid, tempo, the tick
//! scheduling engine and the transport that drives it.
//!
//! Playback is driven off the audio output clock. The engine schedules each
//! step on a fixed frame grid derived from the tempo and triggers samples for
//! the active cells of whatever the pattern looks like at that tick.

pub mod engine;
pub mod pattern;
pub mod tempo;
pub mod tracks;
pub mod transport;

pub use engine::{Engine, EngineState, StepListener};
pub use pattern::{Pattern, PatternStore};
pub use tempo::Tempo;
pub use tracks::{
    track_index, TrackDescriptor, DRUM_TRACKS, STEPS_PER_BAR, STEPS_PER_BEAT, TRACK_COUNT,
};
pub use transport::Transport;
