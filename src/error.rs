use thiserror::Error;

/// Terminal failure of a sample source. Cloned out to both halves of the
/// streamer, so payloads are kept as strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("failed to open audio file: {0}")]
    Open(String),
    #[error("failed to probe audio format: {0}")]
    Probe(String),
    #[error("no decodable audio track found")]
    NoTrack,
    #[error("unsupported audio stream: {0}")]
    Unsupported(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("I/O error while reading audio: {0}")]
    Io(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// No spectrum became ready before the deadline. The analysis worker is
    /// stalled or playback stopped pulling samples.
    #[error("next FFT window not ready before deadline")]
    DeadlineExceeded,
    #[error("wait for next FFT window was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("FFT window size must be greater than zero")]
    ZeroWindow,
    #[error("analysis queue capacity must be greater than zero")]
    ZeroCapacity,
    #[error("playback buffer must hold at least one window")]
    ZeroBufferWindows,
    #[error("target fps must be a positive number, got {0}")]
    InvalidFps(u32),
    #[error("number of bars must be greater than zero")]
    ZeroBars,
}

#[derive(Debug, Error)]
pub enum StreamerError {
    #[error("invalid streamer config: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to spawn FFT worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum VisualizerError {
    #[error("terminal error: {0}")]
    Terminal(#[from] std::io::Error),
    #[error("visualizer still running when the session timed out")]
    Timeout,
    #[error("visualizer render thread exited without reporting")]
    Disconnected,
}

#[derive(Debug, Error)]
pub enum UpdateLoopError {
    #[error("spectrum pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("visualizer failed: {0}")]
    Visualizer(VisualizerError),
    #[error("failed to spawn visualizer waiter thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no audio output device found")]
    NoDevice,
    #[error("output device has no f32 output at {sample_rate}Hz")]
    Config { sample_rate: u32 },
    #[error("failed to build output stream: {0}")]
    Build(#[from] cpal::BuildStreamError),
    #[error("failed to start output stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[error("failed to query output device: {0}")]
    Device(#[from] cpal::SupportedStreamConfigsError),
}
