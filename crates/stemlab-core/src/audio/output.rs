//! CPAL output stream wrapping the engine
//!
//! The audio thread owns the [`RemixEngine`] exclusively inside the stream
//! callback; the control thread gets a [`CommandSender`] and the lock-free
//! atomics. Startup is fail-fast: no device, no stream, no silent fallback.
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  Control thread  │───push()───────────►│   Command queue     │
//! │  (UI, scheduler) │                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!         ▲                                           │ pop()
//!         │ Relaxed atomics                           ▼
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  PlayerAtomics   │◄────────────────────│  CPAL audio thread  │
//! │   (lock-free)    │     block writes    │  (owns RemixEngine) │
//! └──────────────────┘                     └─────────────────────┘
//! ```

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use super::config::{AudioConfig, BufferSize};
use super::error::{AudioError, AudioResult};
use crate::engine::{command_channel, CommandSender, PlayerAtomics, RemixEngine};
use crate::types::{StereoBuffer, MAX_BUFFER_SIZE};

/// A running audio system
///
/// Keeps the output stream alive; drop it to stop audio.
pub struct AudioSystem {
    _stream: Stream,
    /// Negotiated sample rate
    pub sample_rate: u32,
    /// Lock-free command sender for the control thread
    pub sender: CommandSender,
    /// Lock-free engine state for control-thread reads
    pub atomics: Arc<PlayerAtomics>,
}

impl AudioSystem {
    /// Audio-clock time in seconds (for the lookahead scheduler)
    pub fn clock_seconds(&self) -> f64 {
        self.atomics.clock_seconds(self.sample_rate)
    }
}

/// Start the audio system
///
/// Creates the engine at the device's negotiated sample rate, wires the
/// command queue, and starts the output stream.
pub fn start_audio(config: &AudioConfig) -> AudioResult<AudioSystem> {
    let host = cpal::default_host();

    let device = match &config.device {
        Some(name) => {
            let mut devices = host
                .output_devices()
                .map_err(|e| AudioError::NoDefaultDevice(e.to_string()))?;
            devices
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceNotFound(name.clone()))?
        }
        None => host.default_output_device().ok_or(AudioError::NoDevices)?,
    };

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let default_config = device
        .default_output_config()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?;

    if default_config.sample_format() != SampleFormat::F32 {
        return Err(AudioError::UnsupportedFormat(format!(
            "{:?}",
            default_config.sample_format()
        )));
    }

    let channels = default_config.channels().max(2);
    let sample_rate = config.sample_rate.unwrap_or(default_config.sample_rate().0);
    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: match config.buffer_size {
            BufferSize::Default => cpal::BufferSize::Default,
            BufferSize::Fixed(frames) => cpal::BufferSize::Fixed(frames),
        },
    };

    log::info!(
        "Audio config: {} channels, {}Hz, buffer {:?}",
        stream_config.channels,
        sample_rate,
        config.buffer_size
    );

    let mut engine = RemixEngine::new(sample_rate);
    let atomics = engine.atomics();
    let (command_tx, mut command_rx) = command_channel();

    let channel_count = channels as usize;
    let mut work = StereoBuffer::silence(MAX_BUFFER_SIZE);

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                // Commands apply at block boundaries only
                engine.apply_commands(&mut command_rx);

                let frames = (data.len() / channel_count).min(MAX_BUFFER_SIZE);
                work.set_len_from_capacity(frames);
                engine.process(&mut work);

                for (i, frame) in data.chunks_mut(channel_count).enumerate() {
                    if i < frames {
                        let sample = work[i];
                        frame[0] = sample.left;
                        if frame.len() > 1 {
                            frame[1] = sample.right;
                        }
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    } else {
                        for ch in frame.iter_mut() {
                            *ch = 0.0;
                        }
                    }
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    log::info!("Audio stream started");

    Ok(AudioSystem {
        _stream: stream,
        sample_rate,
        sender: CommandSender::new(command_tx),
        atomics,
    })
}
