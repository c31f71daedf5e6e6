use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};

use super::source::{Frame, SampleSource};
use crate::error::PlaybackError;
use crate::fft::FftStreamer;

/// Live output stream fed by an `FftStreamer`. Audio stops when this is
/// dropped.
pub struct Playback {
    _stream: cpal::Stream,
    finished: Arc<AtomicBool>,
    channels: u16,
}

impl Playback {
    /// Opens the default output device at the source's sample rate and
    /// starts pulling from `streamer` on the audio callback thread.
    pub fn start<S>(mut streamer: FftStreamer<S>) -> Result<Self, PlaybackError>
    where
        S: SampleSource + 'static,
    {
        let format = streamer.format();
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(PlaybackError::NoDevice)?;
        let config = pick_config(&device, format.sample_rate)?;
        let channels = config.channels;

        log::info!(
            "Audio output: {} @ {}Hz, {} channel(s)",
            device.name().unwrap_or_else(|_| "unknown device".to_string()),
            config.sample_rate.0,
            channels
        );

        let finished = Arc::new(AtomicBool::new(false));
        let done = Arc::clone(&finished);
        let mut scratch: Vec<Frame> = Vec::new();

        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels as usize;
                scratch.resize(frames, [0.0; 2]);

                let written = if done.load(Ordering::Relaxed) {
                    0
                } else {
                    let (n, more) = streamer.stream(&mut scratch);
                    if !more {
                        done.store(true, Ordering::Relaxed);
                        match streamer.err() {
                            Some(e) => log::debug!("Playback stopped early: {}", e),
                            None => log::debug!(
                                "Playback reached the end, {} windows skipped for analysis",
                                streamer.dropped_windows()
                            ),
                        }
                    }
                    n
                };
                scratch[written..].fill([0.0; 2]);
                channels_to_device(&scratch, data, channels as usize);
            },
            |err| log::error!("Audio output stream error: {}", err),
            None,
        )?;
        stream.play()?;

        Ok(Self {
            _stream: stream,
            finished,
            channels,
        })
    }

    /// Whether the source has been played to the end.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

/// Chooses an f32 output config at `sample_rate`, preferring stereo.
fn pick_config(device: &cpal::Device, sample_rate: u32) -> Result<StreamConfig, PlaybackError> {
    let mut best: Option<StreamConfig> = None;
    for range in device.supported_output_configs()? {
        if range.sample_format() != SampleFormat::F32
            || range.min_sample_rate().0 > sample_rate
            || range.max_sample_rate().0 < sample_rate
        {
            continue;
        }
        let config = StreamConfig {
            channels: range.channels(),
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        if config.channels == 2 {
            return Ok(config);
        }
        if best.is_none() {
            best = Some(config);
        }
    }
    best.ok_or(PlaybackError::Config { sample_rate })
}

/// Writes stereo frames into an interleaved device buffer with `channels`
/// channels. Mono devices get the average of both sides; extra channels
/// beyond the first two are silent.
pub fn channels_to_device(frames: &[Frame], out: &mut [f32], channels: usize) {
    if channels == 0 {
        return;
    }
    for (frame, slot) in frames.iter().zip(out.chunks_exact_mut(channels)) {
        match channels {
            1 => slot[0] = (frame[0] + frame[1]) * 0.5,
            _ => {
                slot[0] = frame[0];
                slot[1] = frame[1];
                slot[2..].fill(0.0);
            }
        }
    }
}
