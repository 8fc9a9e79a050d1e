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
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use parking_lot::Mutex;
use tracing::debug;

use super::{AudioError, Output};
use crate::samples::LoadedSample;

/// The sample rate mock devices run at.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// A sample trigger recorded by the mock device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledTrigger {
    pub sample: String,
    pub at_frame: u64,
}

enum Clock {
    /// Frames follow wall time since the device was created.
    Wall(Instant),
    /// Frames only move when the test advances them.
    Manual(AtomicU64),
}

/// A mock device. Doesn't actually play anything, but keeps a clock and records
/// every sample scheduled on it.
pub struct Device {
    name: String,
    sample_rate: u32,
    clock: Clock,
    triggers: Mutex<Vec<ScheduledTrigger>>,
}

impl Device {
    /// Gets the given mock device, clocked from wall time.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            clock: Clock::Wall(Instant::now()),
            triggers: Mutex::new(Vec::new()),
        }
    }

    /// Gets a mock device whose clock only moves through [`Device::advance`].
    pub fn manual(name: &str, sample_rate: u32) -> Device {
        Device {
            name: name.to_string(),
            sample_rate,
            clock: Clock::Manual(AtomicU64::new(0)),
            triggers: Mutex::new(Vec::new()),
        }
    }

    /// Moves a manual clock forward. Has no effect on a wall clock.
    pub fn advance(&self, frames: u64) {
        if let Clock::Manual(frame) = &self.clock {
            frame.fetch_add(frames, Ordering::AcqRel);
        }
    }

    /// Returns everything scheduled so far.
    pub fn triggers(&self) -> Vec<ScheduledTrigger> {
        self.triggers.lock().clone()
    }

    /// Returns the frames at which the named sample was scheduled.
    pub fn trigger_frames(&self, sample: &str) -> Vec<u64> {
        self.triggers
            .lock()
            .iter()
            .filter(|trigger| trigger.sample == sample)
            .map(|trigger| trigger.at_frame)
            .collect()
    }

    pub fn clear_triggers(&self) {
        self.triggers.lock().clear();
    }
}

impl Output for Device {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        2
    }

    fn current_frame(&self) -> u64 {
        match &self.clock {
            Clock::Wall(start) => {
                (start.elapsed().as_secs_f64() * self.sample_rate as f64) as u64
            }
            Clock::Manual(frame) => frame.load(Ordering::Acquire),
        }
    }

    fn schedule(&self, sample: &LoadedSample, at_frame: u64) -> Result<(), AudioError> {
        debug!(
            device = self.name,
            sample = sample.name(),
            at_frame,
            "Scheduled sample (mock)"
        );
        self.triggers.lock().push(ScheduledTrigger {
            sample: sample.name().to_string(),
            at_frame,
        });
        Ok(())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
