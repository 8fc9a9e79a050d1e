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
// Core mixing logic that runs inside the output callback. Scheduled samples
// arrive over a channel so the callback never waits on a lock.
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use super::AudioError;
use crate::samples::LoadedSample;

/// A sample scheduled to start at an absolute output frame.
pub struct ScheduledVoice {
    sample: LoadedSample,
    start_frame: u64,
    /// Frames of the sample already rendered.
    position: usize,
}

impl ScheduledVoice {
    pub fn new(sample: LoadedSample, start_frame: u64) -> ScheduledVoice {
        ScheduledVoice {
            sample,
            start_frame,
            position: 0,
        }
    }

    fn is_finished(&self) -> bool {
        self.position >= self.sample.frames()
    }
}

/// The scheduling side of a mixer. Cheap to clone.
#[derive(Clone)]
pub struct MixerHandle {
    voices: Sender<ScheduledVoice>,
    frame: Arc<AtomicU64>,
}

impl MixerHandle {
    /// Hands a voice to the mixer.
    pub fn schedule(&self, sample: &LoadedSample, at_frame: u64) -> Result<(), AudioError> {
        match self
            .voices
            .try_send(ScheduledVoice::new(sample.clone(), at_frame))
        {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(AudioError::Stream("voice queue is full".into())),
            Err(TrySendError::Disconnected(_)) => Err(AudioError::Closed),
        }
    }

    /// The number of frames the mixer has rendered.
    pub fn current_frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }
}

/// Mixes scheduled voices into interleaved output buffers and advances the
/// audio clock.
pub struct Mixer {
    channels: u16,
    voices: Vec<ScheduledVoice>,
    incoming: Receiver<ScheduledVoice>,
    frame: Arc<AtomicU64>,
}

/// Maximum number of voices waiting to be picked up by the callback.
const VOICE_QUEUE_SIZE: usize = 1024;

impl Mixer {
    /// Creates a new mixer along with the handle used to schedule onto it.
    pub fn new(channels: u16) -> (Mixer, MixerHandle) {
        let (tx, rx) = crossbeam_channel::bounded(VOICE_QUEUE_SIZE);
        let frame = Arc::new(AtomicU64::new(0));
        (
            Mixer {
                channels: channels.max(1),
                voices: Vec::new(),
                incoming: rx,
                frame: frame.clone(),
            },
            MixerHandle { voices: tx, frame },
        )
    }

    /// Gets the number of output channels
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Gets the number of voices currently sounding or waiting to sound.
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Renders the next block of interleaved frames into `output`.
    pub fn process(&mut self, output: &mut [f32]) {
        while let Ok(voice) = self.incoming.try_recv() {
            self.voices.push(voice);
        }

        output.fill(0.0);

        let channels = self.channels as usize;
        let frames = output.len() / channels;
        let block_start = self.frame.load(Ordering::Acquire);

        for voice in self.voices.iter_mut() {
            // Late voices start at the top of the block.
            let offset = voice.start_frame.saturating_sub(block_start);
            if offset >= frames as u64 {
                continue;
            }

            let sample_channels = voice.sample.channel_count() as usize;
            let gain = voice.sample.gain();
            let data = voice.sample.data();
            for frame in offset as usize..frames {
                if voice.is_finished() {
                    break;
                }
                let source = &data[voice.position * sample_channels..][..sample_channels];
                let out = &mut output[frame * channels..][..channels];
                if sample_channels == 1 {
                    for value in out.iter_mut() {
                        *value += source[0] * gain;
                    }
                } else {
                    for (value, sample) in out.iter_mut().zip(source.iter()) {
                        *value += *sample * gain;
                    }
                }
                voice.position += 1;
            }
        }

        self.voices.retain(|voice| !voice.is_finished());

        for value in output.iter_mut() {
            *value = value.clamp(-1.0, 1.0);
        }

        self.frame
            .store(block_start + frames as u64, Ordering::Release);
    }
}
