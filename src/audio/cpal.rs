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
use std::{fmt, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, span, Level};

use super::mixer::{Mixer, MixerHandle};
use super::{AudioError, Output};
use crate::playsync::CancelHandle;
use crate::samples::LoadedSample;

/// A summary of an output device, as shown by the devices command.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

/// An open cpal output device. The stream runs the mixer in its callback, and
/// the mixer's frame count is the audio clock.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The name of the host the device belongs to.
    host: String,
    channels: u16,
    sample_rate: u32,
    mixer: MixerHandle,
    /// Stops the stream thread.
    cancel_handle: CancelHandle,
    /// Handle to the thread that owns the stream (keeps it alive).
    stream_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, Rate={}) ({})",
            self.name, self.channels, self.sample_rate, self.host
        )
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: Mixer,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if scratch.len() != data.len() {
                scratch.resize(data.len(), 0.0);
            }
            mixer.process(&mut scratch);
            for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(*src);
            }
        },
        |err| error!(err = err.to_string(), "Output stream error"),
        None,
    )
}

impl Device {
    /// Lists cpal output devices.
    pub fn list() -> Result<Vec<DeviceInfo>, AudioError> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|(info, _)| info)
            .collect())
    }

    fn list_cpal_devices() -> Result<Vec<(DeviceInfo, cpal::Device)>, AudioError> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout().map_err(|e| AudioError::Host(e.to_string()))?;
        let _shh_stderr = shh::stderr().map_err(|e| AudioError::Host(e.to_string()))?;

        let mut devices = Vec::new();
        for host_id in cpal::available_hosts() {
            let host = cpal::host_from_id(host_id).map_err(|e| AudioError::Host(e.to_string()))?;
            let host_devices = match host.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let max_channels = match device.supported_output_configs() {
                    Ok(configs) => configs.map(|config| config.channels()).max().unwrap_or(0),
                    Err(_) => continue,
                };
                if max_channels == 0 {
                    continue;
                }

                let name = match device.name() {
                    Ok(name) => name,
                    Err(_) => continue,
                };
                devices.push((
                    DeviceInfo {
                        name,
                        host: host_id.name().to_string(),
                        max_channels,
                    },
                    device,
                ));
            }
        }

        devices.sort_by_key(|(info, _)| info.name.to_string());
        Ok(devices)
    }

    /// Opens the named output device, or the default output device if no name is
    /// given, and starts its stream.
    pub fn get(name: Option<&str>) -> Result<Device, AudioError> {
        let (device, host) = match name {
            Some(name) => Device::list_cpal_devices()?
                .into_iter()
                .find(|(info, _)| info.name.trim() == name)
                .map(|(info, device)| (device, info.host))
                .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))?,
            None => {
                let host = cpal::default_host();
                let device = host
                    .default_output_device()
                    .ok_or(AudioError::NoDefaultDevice)?;
                (device, host.id().name().to_string())
            }
        };
        let name = device
            .name()
            .map_err(|e| AudioError::Host(e.to_string()))?;

        let supported = device
            .default_output_config()
            .map_err(|e| AudioError::Stream(e.to_string()))?;
        let sample_format = supported.sample_format();
        let config = supported.config();
        let channels = config.channels;
        let sample_rate = config.sample_rate.0;

        let (mixer, handle) = Mixer::new(channels);
        let cancel_handle = CancelHandle::new();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), AudioError>>(1);

        // cpal streams are not Send on every platform, so the stream lives and dies
        // on its own thread.
        let stream_thread = {
            let cancel_handle = cancel_handle.clone();
            thread::Builder::new()
                .name("beatgrid-output".into())
                .spawn(move || {
                    let span = span!(Level::INFO, "output stream");
                    let _enter = span.enter();

                    let stream = match sample_format {
                        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer),
                        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer),
                        cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, mixer),
                        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer),
                        other => {
                            let _ = ready_tx
                                .send(Err(AudioError::UnsupportedFormat(format!("{:?}", other))));
                            return;
                        }
                    };

                    let stream = match stream {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(AudioError::Stream(e.to_string())));
                            return;
                        }
                    };
                    if let Err(e) = stream.play() {
                        let _ = ready_tx.send(Err(AudioError::Stream(e.to_string())));
                        return;
                    }

                    info!("Output stream started");
                    let _ = ready_tx.send(Ok(()));

                    cancel_handle.wait();
                    drop(stream);
                    info!("Output stream stopped");
                })
                .map_err(|e| AudioError::Stream(e.to_string()))?
        };

        // A thread that exits without reporting has dropped the sender.
        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = stream_thread.join();
                return Err(e);
            }
            Err(_) => return Err(AudioError::Closed),
        }

        info!(
            device = name,
            host,
            channels,
            sample_rate,
            format = ?sample_format,
            "Opened output device"
        );

        Ok(Device {
            name,
            host,
            channels,
            sample_rate,
            mixer: handle,
            cancel_handle,
            stream_thread: Some(stream_thread),
        })
    }
}

impl Output for Device {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn current_frame(&self) -> u64 {
        self.mixer.current_frame()
    }

    fn schedule(&self, sample: &LoadedSample, at_frame: u64) -> Result<(), AudioError> {
        self.mixer.schedule(sample, at_frame)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.cancel_handle.cancel();
        if let Some(thread) = self.stream_thread.take() {
            if thread.join().is_err() {
                error!(device = self.name, "Output stream thread panicked");
            }
        }
    }
}
