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
use std::{fmt, sync::Arc};

use thiserror::Error;

use crate::samples::LoadedSample;

pub mod cpal;
pub mod mixer;
pub mod mock;
pub mod thread_priority;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no output device found with name {0}")]
    DeviceNotFound(String),

    #[error("no default output device is available")]
    NoDefaultDevice,

    #[error("audio host error: {0}")]
    Host(String),

    #[error("unable to start output stream: {0}")]
    Stream(String),

    #[error("unsupported output sample format {0}")]
    UnsupportedFormat(String),

    #[error("the output stream is no longer running")]
    Closed,
}

/// An audio output. The output owns the audio clock: a running count of the
/// frames it has rendered. Samples are scheduled against that clock so their
/// timing does not depend on when the scheduling thread happens to wake up.
pub trait Output: fmt::Display + Send + Sync {
    /// The output sample rate in frames per second.
    fn sample_rate(&self) -> u32;

    /// The number of output channels.
    fn channels(&self) -> u16;

    /// The number of frames rendered so far.
    fn current_frame(&self) -> u64;

    /// Schedules the sample to start playing at the given frame. A frame that has
    /// already passed plays as soon as possible.
    fn schedule(&self, sample: &LoadedSample, at_frame: u64) -> Result<(), AudioError>;
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::DeviceInfo>, AudioError> {
    cpal::Device::list()
}

/// Gets an output with the given name. No name opens the default output device;
/// a name starting with "mock" opens a mock output.
pub fn get_device(name: Option<&str>) -> Result<Arc<dyn Output>, AudioError> {
    if let Some(name) = name {
        if name.starts_with("mock") {
            return Ok(Arc::new(mock::Device::get(name)));
        }
    }

    Ok(Arc::new(cpal::Device::get(name)?))
}
