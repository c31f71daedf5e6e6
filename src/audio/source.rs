#[cfg(test)]
use std::collections::VecDeque;
use std::time::Duration;

use crate::error::{ConfigError, SourceError};

/// One interleaved stereo sample pair, left then right.
pub type Frame = [f32; 2];

/// Stream metadata reported by a sample source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    /// Channel count of the underlying media. Frames are always stereo.
    pub channels: u16,
    /// Bytes per sample in the underlying media.
    pub precision: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16, precision: u16) -> Self {
        Self {
            sample_rate,
            channels,
            precision,
        }
    }

    /// Analysis window length that yields `fps` windows per second of audio.
    pub fn window_size_for_fps(&self, fps: u32) -> Result<usize, ConfigError> {
        if fps == 0 {
            return Err(ConfigError::InvalidFps(fps));
        }
        let size = (self.sample_rate / fps) as usize;
        if size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(size)
    }

    pub fn duration_of(&self, frames: u64) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::new(44_100, 2, 2)
    }
}

/// Pull-based producer of stereo frames.
///
/// `pull` writes up to `buf.len()` frames and returns how many were written
/// and whether more may follow. Once it returns `false` the source is drained
/// and `last_error` tells whether that was a clean end or a failure.
pub trait SampleSource: Send {
    fn pull(&mut self, buf: &mut [Frame]) -> (usize, bool);

    fn last_error(&self) -> Option<SourceError>;

    fn format(&self) -> AudioFormat;

    /// Total length in frames, when the container reports it.
    fn len_frames(&self) -> Option<u64> {
        None
    }
}

/// Source that replays a fixed list of chunks, one chunk per pull.
///
/// A chunk longer than the caller's buffer is split across pulls. After the
/// last chunk the source reports end-of-stream, optionally with an error.
#[cfg(test)]
pub struct MemorySource {
    format: AudioFormat,
    chunks: VecDeque<Vec<Frame>>,
    total: u64,
    fail_with: Option<SourceError>,
    drained: bool,
}

#[cfg(test)]
impl MemorySource {
    pub fn new(format: AudioFormat, chunks: Vec<Vec<Frame>>) -> Self {
        let total = chunks.iter().map(|c| c.len() as u64).sum();
        Self {
            format,
            chunks: chunks.into(),
            total,
            fail_with: None,
            drained: false,
        }
    }

    /// Splits `frames` into pulls of at most `chunk` frames.
    pub fn from_frames(format: AudioFormat, frames: Vec<Frame>, chunk: usize) -> Self {
        let chunks = frames.chunks(chunk.max(1)).map(|c| c.to_vec()).collect();
        Self::new(format, chunks)
    }

    /// Ends the stream with `err` instead of a clean end-of-stream.
    pub fn failing_with(mut self, err: SourceError) -> Self {
        self.fail_with = Some(err);
        self
    }
}

#[cfg(test)]
impl SampleSource for MemorySource {
    fn pull(&mut self, buf: &mut [Frame]) -> (usize, bool) {
        let Some(mut chunk) = self.chunks.pop_front() else {
            self.drained = true;
            return (0, false);
        };

        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk.split_off(n));
        }
        (n, true)
    }

    fn last_error(&self) -> Option<SourceError> {
        if self.drained {
            self.fail_with.clone()
        } else {
            None
        }
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn len_frames(&self) -> Option<u64> {
        Some(self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_size_follows_target_fps() {
        let format = AudioFormat::new(44_100, 2, 2);
        assert_eq!(format.window_size_for_fps(30).unwrap(), 1470);
        assert_eq!(format.window_size_for_fps(60).unwrap(), 735);
        assert_eq!(format.window_size_for_fps(0), Err(ConfigError::InvalidFps(0)));
    }

    #[test]
    fn window_size_rejects_fps_above_sample_rate() {
        let format = AudioFormat::new(100, 2, 2);
        assert_eq!(format.window_size_for_fps(200), Err(ConfigError::ZeroWindow));
    }

    #[test]
    fn memory_source_yields_chunks_then_ends() {
        let format = AudioFormat::default();
        let mut src = MemorySource::new(format, vec![vec![[1.0, 1.0]; 3], vec![[2.0, 2.0]; 2]]);
        let mut buf = [[0.0f32; 2]; 8];

        assert_eq!(src.pull(&mut buf), (3, true));
        assert_eq!(buf[0], [1.0, 1.0]);
        assert_eq!(src.pull(&mut buf), (2, true));
        assert_eq!(buf[1], [2.0, 2.0]);
        assert_eq!(src.pull(&mut buf), (0, false));
        assert!(src.last_error().is_none());
        assert_eq!(src.len_frames(), Some(5));
    }

    #[test]
    fn memory_source_splits_oversized_chunk() {
        let mut src = MemorySource::new(AudioFormat::default(), vec![vec![[0.5, 0.5]; 5]]);
        let mut buf = [[0.0f32; 2]; 4];
        assert_eq!(src.pull(&mut buf), (4, true));
        assert_eq!(src.pull(&mut buf), (1, true));
        assert_eq!(src.pull(&mut buf), (0, false));
    }

    #[test]
    fn memory_source_reports_error_only_after_drain() {
        let err = SourceError::Decode("bad frame".into());
        let mut src = MemorySource::new(AudioFormat::default(), vec![vec![[0.0, 0.0]; 1]])
            .failing_with(err.clone());
        let mut buf = [[0.0f32; 2]; 1];
        src.pull(&mut buf);
        assert!(src.last_error().is_none());
        assert_eq!(src.pull(&mut buf), (0, false));
        assert_eq!(src.last_error(), Some(err));
    }
}
