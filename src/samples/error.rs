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
use std::{fmt, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::audio::AudioError;

/// Failure to load a single sample.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unable to open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to decode {}: {message}", path.display())]
    Decode { path: PathBuf, message: String },

    #[error("timed out loading {} after {timeout:?}", path.display())]
    Timeout { path: PathBuf, timeout: Duration },

    #[error("loader task for {} failed: {message}", path.display())]
    Task { path: PathBuf, message: String },
}

/// A sample that failed to load, together with the track it belongs to.
#[derive(Debug)]
pub struct SampleFailure {
    pub track: usize,
    pub sound: &'static str,
    pub error: LoadError,
}

impl fmt::Display for SampleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.sound, self.error)
    }
}

/// Errors that keep the audio side of the sequencer from starting.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("audio output failed to start: {0}")]
    Audio(#[from] AudioError),

    #[error("no samples could be loaded ({} failed)", .0.len())]
    NoSamples(Vec<SampleFailure>),
}
