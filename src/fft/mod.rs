//! Streaming FFT pipeline: re-chunks the playback stream into analysis
//! windows and transforms them on a background worker.

pub mod spectrum;
pub mod streamer;
pub mod worker;

pub use spectrum::Spectrum;
pub use streamer::{FftStreamer, SpectrumReader, StreamerConfig};
