use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, SendTimeoutError, Sender};

use super::spectrum::Spectrum;
use super::worker::spawn_worker;
use crate::audio::source::{AudioFormat, Frame, SampleSource};
use crate::error::{ConfigError, PipelineError, SourceError, StreamerError};

/// Tuning for one playback session's analysis pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamerConfig {
    /// Frames per analysis window.
    pub window_size: usize,
    /// Internal playback buffer length, in windows. Each underlying pull
    /// refills the whole buffer.
    pub buffer_windows: usize,
    /// Capacity of the analysis input and output queues.
    pub queue_capacity: usize,
    /// Longest the playback path waits for room on the analysis input queue
    /// before the chunk is skipped for analysis.
    pub enqueue_timeout: Duration,
    /// Zero-pad a final short window up to `window_size` before the FFT.
    pub zero_pad_final: bool,
    /// Hold each spectrum back until playback has consumed another window.
    pub sync_to_playback: bool,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            window_size: 1470,
            buffer_windows: 2,
            queue_capacity: 10,
            enqueue_timeout: Duration::from_millis(2),
            zero_pad_final: true,
            sync_to_playback: true,
        }
    }
}

impl StreamerConfig {
    #[cfg(test)]
    pub fn with_window_size(window_size: usize) -> Self {
        Self {
            window_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.buffer_windows == 0 {
            return Err(ConfigError::ZeroBufferWindows);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}

/// State visible to both halves of the streamer.
#[derive(Default)]
struct Shared {
    dropped: AtomicU64,
    error: OnceLock<SourceError>,
}

/// Producer half: a pass-through sample stream for the playback path that
/// copies every refill of its internal buffer into the analysis pipeline.
///
/// `stream` is meant to be driven from a single audio callback thread.
pub struct FftStreamer<S> {
    source: S,
    window_size: usize,
    buffer: Vec<Frame>,
    filled: usize,
    cursor: usize,
    exhausted: bool,
    input: Option<Sender<Vec<Frame>>>,
    ticks: Option<Sender<()>>,
    since_tick: usize,
    enqueue_timeout: Duration,
    shared: Arc<Shared>,
}

/// Consumer half: hands out computed spectra in window order.
pub struct SpectrumReader {
    spectra: Receiver<Spectrum>,
    ticks: Option<Receiver<()>>,
    /// Set when a tick was taken but its spectrum has not been handed out.
    tick_pending: AtomicBool,
    format: AudioFormat,
    window_size: usize,
    shared: Arc<Shared>,
}

impl<S: SampleSource> FftStreamer<S> {
    /// Starts the analysis worker and returns the playback and consumer
    /// halves of the session.
    pub fn new(source: S, config: StreamerConfig) -> Result<(Self, SpectrumReader), StreamerError> {
        config.validate()?;

        let format = source.format();
        let (input_tx, input_rx) = bounded(config.queue_capacity);
        let (output_tx, output_rx) = bounded(config.queue_capacity);
        spawn_worker(input_rx, output_tx, config.window_size, config.zero_pad_final)?;

        let (ticks_tx, ticks_rx) = if config.sync_to_playback {
            let (tx, rx) = bounded(config.queue_capacity * config.buffer_windows);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        log::debug!(
            "FFT streamer: window={} frames ({:.1}ms), buffer={} windows, queue={}",
            config.window_size,
            format.duration_of(config.window_size as u64).as_secs_f64() * 1000.0,
            config.buffer_windows,
            config.queue_capacity
        );

        let shared = Arc::new(Shared::default());
        let streamer = Self {
            source,
            window_size: config.window_size,
            buffer: vec![[0.0; 2]; config.window_size * config.buffer_windows],
            filled: 0,
            cursor: 0,
            exhausted: false,
            input: Some(input_tx),
            ticks: ticks_tx,
            since_tick: 0,
            enqueue_timeout: config.enqueue_timeout,
            shared: Arc::clone(&shared),
        };
        let reader = SpectrumReader {
            spectra: output_rx,
            ticks: ticks_rx,
            tick_pending: AtomicBool::new(false),
            format,
            window_size: config.window_size,
            shared,
        };
        Ok((streamer, reader))
    }

    /// Fills `dest` with the next frames of the underlying source.
    ///
    /// Returns how many frames were written and whether more will follow.
    /// A short count with `true` means the source produced nothing this
    /// time but is not finished.
    pub fn stream(&mut self, dest: &mut [Frame]) -> (usize, bool) {
        let mut written = 0;
        while written < dest.len() {
            if self.cursor < self.filled {
                let n = (self.filled - self.cursor).min(dest.len() - written);
                dest[written..written + n]
                    .copy_from_slice(&self.buffer[self.cursor..self.cursor + n]);
                self.cursor += n;
                written += n;
                continue;
            }
            if self.exhausted || !self.refill() {
                break;
            }
        }

        self.note_played(written);

        let more = !(self.exhausted && self.cursor >= self.filled);
        if !more {
            // Playback reached the end; let the reader flush what is left.
            self.ticks = None;
        }
        (written, more)
    }

    /// The source's terminal error, once it has stopped with one.
    pub fn err(&self) -> Option<SourceError> {
        self.shared.error.get().cloned()
    }

    pub fn dropped_windows(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn format(&self) -> AudioFormat {
        self.source.format()
    }

    /// Pulls once into the internal buffer and forwards the new frames for
    /// analysis. Returns `false` if the pull yielded nothing but the source
    /// is still live.
    fn refill(&mut self) -> bool {
        let (got, more) = self.source.pull(&mut self.buffer);
        let got = got.min(self.buffer.len());
        self.cursor = 0;
        self.filled = got;

        if got > 0 {
            self.forward(self.buffer[..got].to_vec());
        }
        if !more {
            self.finish();
        } else if got == 0 {
            log::debug!("Sample source returned an empty pull");
        }
        got > 0 || !more
    }

    fn forward(&mut self, chunk: Vec<Frame>) {
        let Some(input) = self.input.as_ref() else {
            return;
        };
        match input.send_timeout(chunk, self.enqueue_timeout) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 {
                    log::warn!("Analysis queue full, skipping windows to keep audio flowing");
                } else {
                    log::debug!("Skipped analysis of chunk ({} dropped so far)", dropped);
                }
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                log::error!("FFT worker exited before its input was closed");
                self.input = None;
            }
        }
    }

    fn finish(&mut self) {
        self.exhausted = true;
        if let Some(err) = self.source.last_error() {
            log::error!("Sample source ended with error: {}", err);
            let _ = self.shared.error.set(err);
        }
        if self.input.take().is_some() {
            log::debug!("Sample source exhausted, analysis input closed");
        }
    }

    fn note_played(&mut self, frames: usize) {
        let Some(ticks) = self.ticks.as_ref() else {
            return;
        };
        self.since_tick += frames;
        while self.since_tick >= self.window_size {
            self.since_tick -= self.window_size;
            let _ = ticks.try_send(());
        }
    }
}

impl SpectrumReader {
    /// Waits for the next spectrum.
    ///
    /// `Ok(None)` means the pipeline has drained and closed. Returns an error
    /// if `deadline` passes or `cancel` yields a message or disconnects
    /// first. Nothing is consumed from the spectrum queue on error, and a
    /// playback tick taken before the error is kept for the next call.
    pub fn next_window<T>(
        &self,
        deadline: Instant,
        cancel: &Receiver<T>,
    ) -> Result<Option<Spectrum>, PipelineError> {
        if let Some(ticks) = self.ticks.as_ref() {
            if !self.tick_pending.load(Ordering::Relaxed) {
                select! {
                    // A closed tick queue means playback finished, so every
                    // remaining spectrum is due.
                    recv(ticks) -> _ => self.tick_pending.store(true, Ordering::Relaxed),
                    recv(cancel) -> _ => return Err(PipelineError::Cancelled),
                    default(deadline.saturating_duration_since(Instant::now())) => {
                        return Err(PipelineError::DeadlineExceeded);
                    }
                }
            }
        }

        select! {
            recv(self.spectra) -> msg => {
                self.tick_pending.store(false, Ordering::Relaxed);
                Ok(msg.ok())
            }
            recv(cancel) -> _ => Err(PipelineError::Cancelled),
            default(deadline.saturating_duration_since(Instant::now())) => {
                Err(PipelineError::DeadlineExceeded)
            }
        }
    }

    pub fn err(&self) -> Option<SourceError> {
        self.shared.error.get().cloned()
    }

    pub fn dropped_windows(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Wall-clock length of one analysis window.
    pub fn window_duration(&self) -> Duration {
        self.format.duration_of(self.window_size as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::MemorySource;
    use crossbeam_channel::never;

    fn tagged(len: usize, tag: f32) -> Vec<Frame> {
        (0..len).map(|i| [tag, i as f32 / len as f32]).collect()
    }

    fn drain_playback<S: SampleSource>(streamer: &mut FftStreamer<S>, chunk: usize) -> Vec<Frame> {
        let mut out = Vec::new();
        let mut buf = vec![[0.0f32; 2]; chunk];
        loop {
            let (n, more) = streamer.stream(&mut buf);
            out.extend_from_slice(&buf[..n]);
            if !more {
                return out;
            }
        }
    }

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(2)
    }

    #[test]
    fn three_pulls_give_three_spectra_then_end() {
        let chunks = vec![tagged(1024, 0.1), tagged(1024, 0.2), tagged(512, 0.3)];
        let expected: Vec<Frame> = chunks.concat();
        let source = MemorySource::new(AudioFormat::default(), chunks);
        let (mut streamer, reader) =
            FftStreamer::new(source, StreamerConfig::with_window_size(1024)).unwrap();

        let played = drain_playback(&mut streamer, 300);
        assert_eq!(played, expected);

        let mut seen = Vec::new();
        for _ in 0..3 {
            let spectrum = reader.next_window(soon(), &never::<()>()).unwrap().unwrap();
            seen.push((spectrum.index, spectrum.len(), spectrum.frames));
        }
        assert_eq!(seen, vec![(0, 1024, 1024), (1, 1024, 1024), (2, 1024, 512)]);

        assert_eq!(reader.next_window(soon(), &never::<()>()), Ok(None));
        assert!(reader.err().is_none());
        assert_eq!(reader.dropped_windows(), 0);
    }

    #[test]
    fn short_final_window_unpadded_when_disabled() {
        let source = MemorySource::new(AudioFormat::default(), vec![tagged(64, 0.5), tagged(20, 0.5)]);
        let config = StreamerConfig {
            zero_pad_final: false,
            ..StreamerConfig::with_window_size(64)
        };
        let (mut streamer, reader) = FftStreamer::new(source, config).unwrap();
        drain_playback(&mut streamer, 64);

        let first = reader.next_window(soon(), &never::<()>()).unwrap().unwrap();
        let last = reader.next_window(soon(), &never::<()>()).unwrap().unwrap();
        assert_eq!(first.len(), 64);
        assert_eq!(last.len(), 20);
    }

    #[test]
    fn playback_passes_samples_through_unmodified() {
        let frames: Vec<Frame> = (0..5000).map(|i| [i as f32, -(i as f32)]).collect();
        let source = MemorySource::from_frames(AudioFormat::default(), frames.clone(), 333);
        let (mut streamer, _reader) =
            FftStreamer::new(source, StreamerConfig::with_window_size(256)).unwrap();

        assert_eq!(drain_playback(&mut streamer, 1000), frames);
    }

    #[test]
    fn dest_larger_than_buffer_pulls_repeatedly() {
        let source = MemorySource::new(AudioFormat::default(), vec![tagged(8, 1.0); 6]);
        let config = StreamerConfig {
            buffer_windows: 1,
            ..StreamerConfig::with_window_size(8)
        };
        let (mut streamer, _reader) = FftStreamer::new(source, config).unwrap();

        let mut buf = vec![[0.0f32; 2]; 20];
        assert_eq!(streamer.stream(&mut buf), (20, true));
        assert_eq!(streamer.stream(&mut buf), (20, true));
        assert_eq!(streamer.stream(&mut buf), (8, false));
    }

    #[test]
    fn stream_after_end_stays_finished() {
        let source = MemorySource::new(AudioFormat::default(), vec![tagged(16, 1.0)]);
        let (mut streamer, reader) =
            FftStreamer::new(source, StreamerConfig::with_window_size(16)).unwrap();
        drain_playback(&mut streamer, 16);

        let mut buf = vec![[0.0f32; 2]; 16];
        assert_eq!(streamer.stream(&mut buf), (0, false));
        assert_eq!(streamer.stream(&mut buf), (0, false));

        assert!(reader.next_window(soon(), &never::<()>()).unwrap().is_some());
        assert_eq!(reader.next_window(soon(), &never::<()>()), Ok(None));
    }

    #[test]
    fn source_error_is_surfaced_on_both_halves() {
        let err = SourceError::Decode("truncated frame".into());
        let source = MemorySource::new(AudioFormat::default(), vec![tagged(32, 1.0)])
            .failing_with(err.clone());
        let (mut streamer, reader) =
            FftStreamer::new(source, StreamerConfig::with_window_size(32)).unwrap();

        assert!(streamer.err().is_none());
        drain_playback(&mut streamer, 32);
        assert_eq!(streamer.err(), Some(err.clone()));
        assert_eq!(reader.err(), Some(err));
    }

    #[test]
    fn deadline_bounds_wait_when_nothing_arrives() {
        let source = MemorySource::new(AudioFormat::default(), vec![tagged(32, 1.0)]);
        let (_streamer, reader) =
            FftStreamer::new(source, StreamerConfig::with_window_size(32)).unwrap();

        let start = Instant::now();
        let result = reader.next_window(start + Duration::from_millis(50), &never::<()>());
        let waited = start.elapsed();

        assert_eq!(result, Err(PipelineError::DeadlineExceeded));
        assert!(waited >= Duration::from_millis(50));
        assert!(waited < Duration::from_millis(500));
    }

    #[test]
    fn deadline_applies_without_playback_sync() {
        let source = MemorySource::new(AudioFormat::default(), vec![tagged(32, 1.0)]);
        let config = StreamerConfig {
            sync_to_playback: false,
            ..StreamerConfig::with_window_size(32)
        };
        let (_streamer, reader) = FftStreamer::new(source, config).unwrap();

        let result = reader.next_window(Instant::now() + Duration::from_millis(20), &never::<()>());
        assert_eq!(result, Err(PipelineError::DeadlineExceeded));
    }

    #[test]
    fn cancel_returns_promptly() {
        let source = MemorySource::new(AudioFormat::default(), vec![tagged(32, 1.0)]);
        let (_streamer, reader) =
            FftStreamer::new(source, StreamerConfig::with_window_size(32)).unwrap();

        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        cancel_tx.send(()).unwrap();

        let start = Instant::now();
        let result = reader.next_window(start + Duration::from_secs(10), &cancel_rx);
        assert_eq!(result, Err(PipelineError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn spectra_wait_for_playback_progress() {
        let source = MemorySource::new(AudioFormat::default(), vec![tagged(64, 1.0), tagged(64, 1.0)]);
        let config = StreamerConfig {
            buffer_windows: 1,
            ..StreamerConfig::with_window_size(64)
        };
        let (mut streamer, reader) = FftStreamer::new(source, config).unwrap();

        // First refill happens, but only half a window has been played.
        let mut buf = vec![[0.0f32; 2]; 32];
        streamer.stream(&mut buf);
        let early = reader.next_window(Instant::now() + Duration::from_millis(30), &never::<()>());
        assert_eq!(early, Err(PipelineError::DeadlineExceeded));

        streamer.stream(&mut buf);
        let due = reader.next_window(soon(), &never::<()>()).unwrap().unwrap();
        assert_eq!(due.index, 0);
    }

    #[test]
    fn tick_survives_a_missed_deadline() {
        let (spectra_tx, spectra) = bounded(4);
        let (ticks_tx, ticks) = bounded(4);
        let reader = SpectrumReader {
            spectra,
            ticks: Some(ticks),
            tick_pending: AtomicBool::new(false),
            format: AudioFormat::default(),
            window_size: 64,
            shared: Arc::default(),
        };

        // One window has played, but the worker has not caught up yet.
        ticks_tx.send(()).unwrap();
        let late = reader.next_window(Instant::now() + Duration::from_millis(20), &never::<()>());
        assert_eq!(late, Err(PipelineError::DeadlineExceeded));

        spectra_tx.send(Spectrum { index: 0, ..Default::default() }).unwrap();
        let due = reader.next_window(soon(), &never::<()>()).unwrap().unwrap();
        assert_eq!(due.index, 0);

        // The tick was spent on that spectrum.
        spectra_tx.send(Spectrum { index: 1, ..Default::default() }).unwrap();
        let early = reader.next_window(Instant::now() + Duration::from_millis(20), &never::<()>());
        assert_eq!(early, Err(PipelineError::DeadlineExceeded));
        drop(ticks_tx);
    }

    #[test]
    fn full_queue_drops_analysis_not_audio() {
        let chunks: Vec<Vec<Frame>> = (0..40).map(|i| tagged(4, i as f32)).collect();
        let expected = chunks.concat();
        let source = MemorySource::new(AudioFormat::default(), chunks);
        let config = StreamerConfig {
            window_size: 4,
            buffer_windows: 1,
            queue_capacity: 1,
            enqueue_timeout: Duration::ZERO,
            zero_pad_final: true,
            sync_to_playback: false,
        };
        let (mut streamer, reader) = FftStreamer::new(source, config).unwrap();

        // Nobody reads spectra while playing, so the pipeline backs up.
        assert_eq!(drain_playback(&mut streamer, 4), expected);
        assert!(streamer.dropped_windows() > 0);
        assert_eq!(reader.dropped_windows(), streamer.dropped_windows());

        let mut indices = Vec::new();
        while let Some(s) = reader.next_window(soon(), &never::<()>()).unwrap() {
            indices.push(s.index);
        }
        assert_eq!(indices.len() as u64 + streamer.dropped_windows(), 40);
        assert!(indices.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let source = MemorySource::new(AudioFormat::default(), vec![]);
        let err = FftStreamer::new(source, StreamerConfig::with_window_size(0))
            .err()
            .expect("zero window must fail");
        assert!(matches!(err, StreamerError::Config(ConfigError::ZeroWindow)));

        let bad = StreamerConfig {
            queue_capacity: 0,
            ..StreamerConfig::default()
        };
        assert_eq!(bad.validate(), Err(ConfigError::ZeroCapacity));
    }

    #[test]
    fn window_duration_follows_sample_rate() {
        let source = MemorySource::new(AudioFormat::new(48_000, 2, 2), vec![]);
        let (_streamer, reader) =
            FftStreamer::new(source, StreamerConfig::with_window_size(1600)).unwrap();
        let secs = reader.window_duration().as_secs_f64();
        assert!((secs - 1.0 / 30.0).abs() < 1e-6);
        assert_eq!(reader.window_size(), 1600);
    }
}
