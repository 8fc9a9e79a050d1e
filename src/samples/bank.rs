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
use std::path::Path;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, span, warn, Instrument, Level};

use super::error::{InitError, LoadError, SampleFailure};
use super::loader::{LoadedSample, SampleLoader};
use crate::sequencer::TrackDescriptor;

/// The level every track plays at unless it is given its own.
pub const DEFAULT_VOLUME_DB: f32 = -5.0;

/// Converts a level in decibels to a linear gain.
pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// The decoded samples for every track, indexed by track.
#[derive(Debug, Default)]
pub struct SampleBank {
    samples: Vec<Option<LoadedSample>>,
    failures: Vec<SampleFailure>,
}

impl SampleBank {
    /// Loads `<dir>/<sound>.wav` for each track. Every sample is decoded on the
    /// blocking pool at the same time and each one must finish within `timeout`.
    ///
    /// A sample that fails to load only costs its own track. If nothing loads
    /// at all, the failures are returned as [`InitError::NoSamples`]. Loaded
    /// samples play at [`DEFAULT_VOLUME_DB`].
    pub async fn load(
        tracks: &[TrackDescriptor],
        dir: &Path,
        sample_rate: u32,
        timeout: Duration,
    ) -> Result<SampleBank, InitError> {
        Self::load_all(tracks, dir, sample_rate, timeout)
            .instrument(span!(Level::INFO, "load samples"))
            .await
    }

    async fn load_all(
        tracks: &[TrackDescriptor],
        dir: &Path,
        sample_rate: u32,
        timeout: Duration,
    ) -> Result<SampleBank, InitError> {
        let loader = SampleLoader::new(sample_rate);
        let deadline = Instant::now() + timeout;

        let handles: Vec<_> = tracks
            .iter()
            .map(|track| {
                let track = *track;
                let path = dir.join(track.sample_file());
                let task_path = path.clone();
                let handle = tokio::task::spawn_blocking(move || {
                    loader.load(track.sound, &task_path)
                });
                (track, path, handle)
            })
            .collect();

        let mut samples = Vec::with_capacity(handles.len());
        let mut failures = Vec::new();
        for (index, (track, path, handle)) in handles.into_iter().enumerate() {
            let result = match timeout_at(deadline, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(LoadError::Task {
                    path,
                    message: e.to_string(),
                }),
                Err(_) => Err(LoadError::Timeout { path, timeout }),
            };

            match result {
                Ok(sample) => {
                    samples.push(Some(sample.with_gain(db_to_gain(DEFAULT_VOLUME_DB))))
                }
                Err(error) => {
                    warn!(track = track.name, err = %error, "Unable to load sample");
                    failures.push(SampleFailure {
                        track: index,
                        sound: track.sound,
                        error,
                    });
                    samples.push(None);
                }
            }
        }

        let bank = SampleBank { samples, failures };
        if bank.loaded_count() == 0 {
            return Err(InitError::NoSamples(bank.failures));
        }

        info!(
            loaded = bank.loaded_count(),
            failed = bank.failures.len(),
            "Sample bank ready"
        );
        Ok(bank)
    }

    /// Builds a bank from samples that are already in memory.
    pub fn from_samples(samples: Vec<Option<LoadedSample>>) -> SampleBank {
        SampleBank {
            samples,
            failures: Vec::new(),
        }
    }

    /// Returns the sample for the given track, if it loaded.
    pub fn get(&self, track: usize) -> Option<&LoadedSample> {
        self.samples.get(track).and_then(Option::as_ref)
    }

    /// Sets the level a track plays at. Returns false if the track has no
    /// sample.
    pub fn set_volume(&mut self, track: usize, db: f32) -> bool {
        match self.samples.get_mut(track) {
            Some(Some(sample)) => {
                *sample = sample.clone().with_gain(db_to_gain(db));
                debug!(track, db, "Track volume set");
                true
            }
            _ => false,
        }
    }

    /// The samples that failed to load.
    pub fn failures(&self) -> &[SampleFailure] {
        &self.failures
    }

    pub fn loaded_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_some()).count()
    }
}
