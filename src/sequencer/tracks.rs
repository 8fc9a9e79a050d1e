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
use std::fmt;

/// Number of steps in one bar of the pattern.
pub const STEPS_PER_BAR: usize = 16;

/// Steps per quarter note. 16 steps cover four beats.
pub const STEPS_PER_BEAT: usize = 4;

/// Number of drum tracks (rows) in the pattern.
pub const TRACK_COUNT: usize = 5;

/// A static description of one row of the pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackDescriptor {
    /// The display name of the track.
    pub name: &'static str,
    /// The sound identifier. The sample file is `<sound>.wav`.
    pub sound: &'static str,
    /// The display color of the track.
    pub color: &'static str,
}

impl TrackDescriptor {
    /// Returns the file name of the sample for this track.
    pub fn sample_file(&self) -> String {
        format!("{}.wav", self.sound)
    }
}

impl fmt::Display for TrackDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.sound)
    }
}

/// The drum tracks, in row order.
pub const DRUM_TRACKS: [TrackDescriptor; TRACK_COUNT] = [
    TrackDescriptor {
        name: "Kick",
        sound: "kick",
        color: "red",
    },
    TrackDescriptor {
        name: "Snare",
        sound: "snare",
        color: "blue",
    },
    TrackDescriptor {
        name: "Open Hi-Hat",
        sound: "hihat-open",
        color: "purple",
    },
    TrackDescriptor {
        name: "Closed Hi-Hat",
        sound: "hihat-closed",
        color: "yellow",
    },
    TrackDescriptor {
        name: "Clap",
        sound: "clap",
        color: "green",
    },
];

/// Finds a track by its row index, sound or display name (case-insensitive).
pub fn track_index(name: &str) -> Option<usize> {
    let name = name.trim();
    if let Ok(index) = name.parse::<usize>() {
        return (index < TRACK_COUNT).then_some(index);
    }
    DRUM_TRACKS.iter().position(|track| {
        track.sound.eq_ignore_ascii_case(name) || track.name.eq_ignore_ascii_case(name)
    })
}
