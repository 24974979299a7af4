//! Audio input via cpal
//!
//! Opens a named (or the default) input device, down-mixes every callback
//! buffer to mono `f32` and hands it to a caller-supplied sink. The sink runs
//! on the audio thread and must stay short.

use crate::{CoreError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfig};
use tracing::{error, info, warn};

/// Names of the available input devices
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| CoreError::AudioDevice(e.to_string()))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

fn find_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();
    match name {
        Some(wanted) => {
            let mut devices = host
                .input_devices()
                .map_err(|e| CoreError::AudioDevice(e.to_string()))?;
            devices
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| CoreError::AudioDevice(format!("input device '{}' not found", wanted)))
        }
        None => host
            .default_input_device()
            .ok_or_else(|| CoreError::AudioDevice("no default input device".to_string())),
    }
}

/// Supported config at `sample_rate`, or the device default
fn pick_config(device: &Device, sample_rate: u32) -> Result<SupportedStreamConfig> {
    let wanted = SampleRate(sample_rate);
    if let Ok(configs) = device.supported_input_configs() {
        let mut matching: Vec<_> = configs
            .filter(|c| c.min_sample_rate() <= wanted && c.max_sample_rate() >= wanted)
            .collect();
        // prefer float samples, then fewer channels
        matching.sort_by_key(|c| (c.sample_format() != SampleFormat::F32, c.channels()));
        if let Some(range) = matching.into_iter().next() {
            return Ok(range.with_sample_rate(wanted));
        }
    }

    let fallback = device
        .default_input_config()
        .map_err(|e| CoreError::AudioDevice(e.to_string()))?;
    warn!(
        "{} Hz not supported by the input device, using {} Hz",
        sample_rate,
        fallback.sample_rate().0
    );
    Ok(fallback)
}

fn downmix<T: Copy>(data: &[T], channels: usize, convert: impl Fn(T) -> f32, out: &mut Vec<f32>) {
    out.clear();
    for frame in data.chunks_exact(channels) {
        let sum: f32 = frame.iter().map(|&s| convert(s)).sum();
        out.push(sum / channels as f32);
    }
}

/// An input device with its negotiated stream config, not yet started
pub struct InputDevice {
    device: Device,
    name: String,
    supported: SupportedStreamConfig,
}

impl InputDevice {
    /// Find `device` (or the default input) and negotiate a rate near `sample_rate`.
    ///
    /// The device may not support `sample_rate`; check [`Self::sample_rate`]
    /// before building anything that depends on it.
    pub fn open(device: Option<&str>, sample_rate: u32) -> Result<Self> {
        let device = find_device(device)?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let supported = pick_config(&device, sample_rate)?;
        Ok(Self {
            device,
            name,
            supported,
        })
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sample rate the stream will run at
    pub fn sample_rate(&self) -> u32 {
        self.supported.sample_rate().0
    }

    /// Build and start the stream.
    ///
    /// `sink` receives mono blocks of whatever size the backend delivers.
    pub fn start<F>(self, mut sink: F) -> Result<AudioCapture>
    where
        F: FnMut(&[f32]) + Send + 'static,
    {
        let Self {
            device,
            name: device_name,
            supported,
        } = self;
        let config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        let channels = config.channels.max(1) as usize;
        let err_fn = |err: cpal::StreamError| error!("Audio stream error: {}", err);
        let mut mono: Vec<f32> = Vec::new();

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    downmix(data, channels, |s| s, &mut mono);
                    sink(&mono);
                },
                err_fn,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    downmix(data, channels, |s| s as f32 / i16::MAX as f32, &mut mono);
                    sink(&mono);
                },
                err_fn,
                None,
            ),
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let half = u16::MAX as f32 / 2.0;
                    downmix(data, channels, |s| (s as f32 - half) / half, &mut mono);
                    sink(&mono);
                },
                err_fn,
                None,
            ),
            other => {
                return Err(CoreError::AudioStream(format!(
                    "unsupported sample format: {}",
                    other
                )))
            }
        }
        .map_err(|e| CoreError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CoreError::AudioStream(e.to_string()))?;

        info!(
            "Audio capture started on '{}': {} Hz, {} channel(s), {:?}",
            device_name,
            config.sample_rate.0,
            config.channels,
            supported.sample_format()
        );

        Ok(AudioCapture {
            stream,
            device_name,
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        })
    }
}

/// A running input stream
pub struct AudioCapture {
    stream: Stream,
    device_name: String,
    sample_rate: u32,
    channels: u16,
}

impl AudioCapture {
    /// Name of the opened device
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Actual stream sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channels before down-mix
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Stop and close the stream
    pub fn stop(self) {
        if let Err(e) = self.stream.pause() {
            warn!("Failed to pause audio stream on '{}': {}", self.device_name, e);
        }
        info!("Audio capture on '{}' stopped", self.device_name);
    }
}
