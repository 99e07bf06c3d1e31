//! Audio output using cpal
//!
//! Drives a [`MixerSink`] from the device's callback. The sink's clock only
//! advances when the callback pulls audio, so pausing the stream freezes
//! playback time.

use crate::audio::mixer_sink::MixerSink;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Audio device playing a software sink
pub struct AudioDevice {
    device: Device,
    device_name: String,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
}

impl AudioDevice {
    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open an output device.
    ///
    /// Falls back to the default device when `device_name` is not found.
    /// The stream format prefers `sample_rate`/`channels`; when the device
    /// cannot do that, its default configuration is used and callers should
    /// size the sink from [`AudioDevice::sample_rate`] and
    /// [`AudioDevice::channels`].
    pub fn open(device_name: Option<&str>, sample_rate: u32, channels: u16) -> Result<Self> {
        let host = cpal::default_host();

        let (device, device_name) = match device_name {
            Some(name) => {
                let mut devices = host.output_devices().map_err(|e| {
                    Error::AudioOutput(format!("Failed to enumerate devices: {}", e))
                })?;

                match devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                    Some(dev) => {
                        info!("Found requested audio device: {}", name);
                        (dev, name.to_string())
                    }
                    None => {
                        warn!(
                            "Requested device '{}' not found, falling back to default device",
                            name
                        );
                        let dev = host.default_output_device().ok_or_else(|| {
                            Error::AudioOutput(format!(
                                "Device '{}' not found and no default device available",
                                name
                            ))
                        })?;
                        let default_name = dev.name().unwrap_or_else(|_| "Unknown".to_string());
                        info!("Using default audio device as fallback: {}", default_name);
                        (dev, default_name)
                    }
                }
            }
            None => {
                let dev = host.default_output_device().ok_or_else(|| {
                    Error::AudioOutput("No default output device found".to_string())
                })?;
                let name = dev.name().unwrap_or_else(|_| "Unknown".to_string());
                info!("Using default audio device: {}", name);
                (dev, name)
            }
        };

        let (config, sample_format) = Self::best_config(&device, sample_rate, channels)?;

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}",
            config.sample_rate.0, config.channels, sample_format
        );

        Ok(Self {
            device,
            device_name,
            config,
            sample_format,
            stream: None,
        })
    }

    /// Requested rate and channel count if supported in f32 or i16,
    /// otherwise the device default.
    fn best_config(
        device: &Device,
        sample_rate: u32,
        channels: u16,
    ) -> Result<(StreamConfig, SampleFormat)> {
        let supported_configs = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

        let mut preferred = None;
        for config in supported_configs {
            let fits = config.channels() == channels
                && config.min_sample_rate().0 <= sample_rate
                && config.max_sample_rate().0 >= sample_rate;
            match config.sample_format() {
                SampleFormat::F32 if fits => {
                    preferred = Some(config);
                    break;
                }
                SampleFormat::I16 if fits && preferred.is_none() => preferred = Some(config),
                _ => {}
            }
        }

        if let Some(supported) = preferred {
            let sample_format = supported.sample_format();
            let config = supported
                .with_sample_rate(cpal::SampleRate(sample_rate))
                .config();
            return Ok((config, sample_format));
        }

        let supported = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;

        warn!(
            "Device does not support {} Hz / {} channels, using its default {} Hz / {} channels",
            sample_rate,
            channels,
            supported.sample_rate().0,
            supported.channels()
        );

        let sample_format = supported.sample_format();
        Ok((supported.config(), sample_format))
    }

    pub fn name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Start pulling audio from `sink`.
    ///
    /// The sink must render at the device's rate and channel count.
    pub fn start(&mut self, sink: Arc<MixerSink>) -> Result<()> {
        if sink.sample_rate() != self.sample_rate() || sink.channels() != self.channels() {
            return Err(Error::AudioOutput(format!(
                "Sink format {} Hz / {} ch does not match device {} Hz / {} ch",
                sink.sample_rate(),
                sink.channels(),
                self.sample_rate(),
                self.channels()
            )));
        }

        info!("Starting audio stream on {}", self.device_name);

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream_f32(sink)?,
            SampleFormat::I16 => self.build_stream_i16(sink)?,
            sample_format => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);

        info!("Audio stream started successfully");
        Ok(())
    }

    fn build_stream_f32(&self, sink: Arc<MixerSink>) -> Result<Stream> {
        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| sink.render(data),
                |err| error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    fn build_stream_i16(&self, sink: Arc<MixerSink>) -> Result<Stream> {
        let mut scratch: Vec<f32> = Vec::new();

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    sink.render(&mut scratch);
                    for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                        *out = (sample * i16::MAX as f32) as i16;
                    }
                },
                |err| error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    /// Suspend the stream; the sink clock stops with it
    pub fn pause(&self) -> Result<()> {
        match &self.stream {
            Some(stream) => {
                stream
                    .pause()
                    .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))?;
                info!("Audio stream paused");
                Ok(())
            }
            None => Err(Error::AudioOutput("Stream not started".to_string())),
        }
    }

    pub fn resume(&self) -> Result<()> {
        match &self.stream {
            Some(stream) => {
                stream
                    .play()
                    .map_err(|e| Error::AudioOutput(format!("Failed to resume stream: {}", e)))?;
                info!("Audio stream resumed");
                Ok(())
            }
            None => Err(Error::AudioOutput("Stream not started".to_string())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    /// Stop and release the stream
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            info!("Audio stream stopped");
        }
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.stop();
    }
}
