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
use std::{fmt, time::Duration};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::tracks::STEPS_PER_BEAT;

/// The slowest allowed tempo.
pub const MIN_BPM: u32 = 60;

/// The fastest allowed tempo.
pub const MAX_BPM: u32 = 180;

/// The tempo a new session starts with.
pub const DEFAULT_BPM: u32 = 120;

/// Tempo in beats per minute, always within [MIN_BPM, MAX_BPM].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "u32")]
pub struct Tempo(u32);

impl Tempo {
    /// Creates a tempo, clamping the value into range.
    pub fn new(bpm: u32) -> Tempo {
        Tempo(bpm.clamp(MIN_BPM, MAX_BPM))
    }

    /// Creates a tempo from an untrusted float. Non-finite values fall back to the default.
    pub fn from_f64(bpm: f64) -> Tempo {
        if !bpm.is_finite() {
            return Tempo::default();
        }
        Tempo(bpm.round().clamp(MIN_BPM as f64, MAX_BPM as f64) as u32)
    }

    /// The tempo in beats per minute.
    pub fn bpm(&self) -> u32 {
        self.0
    }

    /// The time between two steps: 60 / bpm / steps-per-beat.
    pub fn step_interval(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.0 as f64 / STEPS_PER_BEAT as f64)
    }

    /// The number of output frames between two steps at the given sample rate.
    pub fn step_frames(&self, sample_rate: u32) -> f64 {
        self.step_interval().as_secs_f64() * sample_rate as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Tempo(DEFAULT_BPM)
    }
}

impl From<u32> for Tempo {
    fn from(bpm: u32) -> Self {
        Tempo::new(bpm)
    }
}

/// Stored tempos are untrusted: any number is rounded and clamped, anything
/// else falls back to the default.
impl<'de> Deserialize<'de> for Tempo {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let bpm = match &value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
        Ok(bpm.map(Tempo::from_f64).unwrap_or_default())
    }
}

impl From<Tempo> for u32 {
    fn from(tempo: Tempo) -> Self {
        tempo.0
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} BPM", self.0)
    }
}
