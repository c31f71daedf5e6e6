use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::source::{AudioFormat, Frame, SampleSource};
use crate::error::SourceError;

/// Streaming decoder over an audio file. Packets are decoded lazily as the
/// playback path pulls, so memory use stays at one packet regardless of the
/// track length.
pub struct FileSource {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    format: AudioFormat,
    n_frames: Option<u64>,
    sample_buf: Option<SampleBuffer<f32>>,
    pending: Vec<Frame>,
    pos: usize,
    done: bool,
    error: Option<SourceError>,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = std::fs::File::open(path)
            .map_err(|e| SourceError::Open(format!("{}: {}", path.display(), e)))?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| SourceError::Probe(e.to_string()))?;

        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(SourceError::NoTrack)?;

        let track_id = track.id;
        let params = &track.codec_params;
        let channels = params.channels.map_or(1, |c| c.count()) as u16;
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| SourceError::Unsupported("unknown sample rate".into()))?;
        let precision = params.bits_per_sample.map_or(2, |b| b.div_ceil(8) as u16);
        let n_frames = params.n_frames;

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| SourceError::Unsupported(e.to_string()))?;

        log::info!(
            "Opened {}: {}Hz, {} channel(s), {} byte(s)/sample",
            path.display(),
            sample_rate,
            channels,
            precision
        );

        Ok(Self {
            reader,
            decoder,
            track_id,
            format: AudioFormat::new(sample_rate, channels, precision),
            n_frames,
            sample_buf: None,
            pending: Vec::new(),
            pos: 0,
            done: false,
            error: None,
        })
    }

    /// Decodes the next packet of our track into `pending`. Returns `false`
    /// at end of stream.
    fn decode_next(&mut self) -> Result<bool, SourceError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(SymphoniaError::IoError(e)) => return Err(SourceError::Io(e.to_string())),
                Err(e) => return Err(SourceError::Decode(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(msg)) => {
                    log::debug!("Skipping corrupt packet: {}", msg);
                    continue;
                }
                Err(e) => return Err(SourceError::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            let needed = decoded.capacity() * channels;

            if self.sample_buf.as_ref().map_or(true, |b| b.capacity() < needed) {
                self.sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
            }
            let Some(sample_buf) = self.sample_buf.as_mut() else {
                continue;
            };
            sample_buf.copy_interleaved_ref(decoded);

            self.pending.clear();
            self.pos = 0;
            match channels {
                0 => {}
                1 => self
                    .pending
                    .extend(sample_buf.samples().iter().map(|&s| [s, s])),
                _ => self.pending.extend(
                    sample_buf
                        .samples()
                        .chunks_exact(channels)
                        .map(|frame| [frame[0], frame[1]]),
                ),
            }

            if !self.pending.is_empty() {
                return Ok(true);
            }
        }
    }
}

impl SampleSource for FileSource {
    fn pull(&mut self, buf: &mut [Frame]) -> (usize, bool) {
        let mut written = 0;
        while written < buf.len() {
            if self.pos < self.pending.len() {
                let n = (self.pending.len() - self.pos).min(buf.len() - written);
                buf[written..written + n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
                self.pos += n;
                written += n;
                continue;
            }
            if self.done {
                break;
            }
            match self.decode_next() {
                Ok(true) => {}
                Ok(false) => self.done = true,
                Err(e) => {
                    log::error!("Audio source failed: {}", e);
                    self.error = Some(e);
                    self.done = true;
                }
            }
        }

        let more = !(self.done && self.pos >= self.pending.len());
        (written, more)
    }

    fn last_error(&self) -> Option<SourceError> {
        self.error.clone()
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn len_frames(&self) -> Option<u64> {
        self.n_frames
    }
}
