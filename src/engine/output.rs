//! Audio output using cpal
//!
//! Opens an f32 output stream whose callback drives
//! [`PlaybackEngine::render`]. The stream is created per play and dropped on
//! stop, so a new session never inherits an old stream.
//!
//! Once the engine reports [`CallbackFlow::Stop`] the callback only writes
//! silence; the control thread closes the stream after it sees the
//! session's finished notice (see [`Transport::reap`]).
//!
//! [`Transport::reap`]: crate::engine::Transport::reap

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleRate, Stream, StreamConfig};
use tracing::{debug, error, info, warn};

use crate::engine::playback::{CallbackFlow, PlaybackEngine};
use crate::engine::transport::OutputDevice;
use crate::error::{DuetError, Result};

/// cpal-backed [`OutputDevice`]
pub struct CpalOutput {
    device: Device,
    name: String,
    stream: Option<Stream>,
}

impl CpalOutput {
    /// List available output device names
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| DuetError::Device {
                reason: format!("Failed to enumerate devices: {}", e),
            })?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open a device by name, or the host default
    pub fn open(name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = match name {
            Some(wanted) => host
                .output_devices()
                .map_err(|e| DuetError::Device {
                    reason: format!("Failed to enumerate devices: {}", e),
                })?
                .find(|d| d.name().ok().as_deref() == Some(wanted))
                .ok_or_else(|| DuetError::Device {
                    reason: format!("Output device '{}' not found", wanted),
                })?,
            None => host.default_output_device().ok_or_else(|| DuetError::Device {
                reason: "No default output device found".to_string(),
            })?,
        };

        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!(device = %name, "Using audio device");

        Ok(Self {
            device,
            name,
            stream: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn build_stream(&self, engine: PlaybackEngine, config: &StreamConfig) -> Result<Stream> {
        let mut engine = engine;
        let mut drained = false;
        let error_session = engine.session().clone();

        self.device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if drained {
                        data.fill(0.0);
                    } else if engine.render(data) == CallbackFlow::Stop {
                        drained = true;
                    }
                },
                move |err| {
                    error!(error = %err, "Audio stream error");
                    error_session.set_playing(false);
                },
                None,
            )
            .map_err(|e| DuetError::Device {
                reason: format!("Failed to build output stream: {}", e),
            })
    }
}

impl OutputDevice for CpalOutput {
    fn start(&mut self, engine: PlaybackEngine, block_frames: u32) -> Result<()> {
        self.stop();

        let session = engine.session().clone();
        let channels = u16::try_from(session.channels()).map_err(|_| DuetError::Device {
            reason: format!("{} channels is more than a device supports", session.channels()),
        })?;
        let mut config = StreamConfig {
            channels,
            sample_rate: SampleRate(session.sample_rate()),
            buffer_size: BufferSize::Fixed(block_frames),
        };

        let stream = match self.build_stream(engine.clone(), &config) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, block_frames, "Fixed buffer size rejected, using device default");
                config.buffer_size = BufferSize::Default;
                self.build_stream(engine, &config)?
            }
        };

        stream.play().map_err(|e| DuetError::Device {
            reason: format!("Failed to start stream: {}", e),
        })?;

        debug!(
            device = %self.name,
            channels = config.channels,
            sample_rate = config.sample_rate.0,
            buffer_size = ?config.buffer_size,
            "Output stream started"
        );
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!(error = %e, "Failed to pause stream before closing");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.stream.is_some()
    }
}
