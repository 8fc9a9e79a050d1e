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

//! Drum sample loading.
//!
//! This module provides:
//! - Decoding of sample files into memory (for zero-latency triggering)
//! - Resampling to the output rate
//! - The per-track sample bank, loaded concurrently with a timeout

mod bank;
mod error;
mod loader;

pub use bank::{db_to_gain, SampleBank, DEFAULT_VOLUME_DB};
pub use error::{InitError, LoadError, SampleFailure};
pub use loader::{LoadedSample, SampleLoader};
