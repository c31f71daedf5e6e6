mod audio;
mod cli;
mod config;
mod error;
mod fft;
mod ui;
mod vis;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{after, never};

use audio::decode::FileSource;
use audio::playback::Playback;
use audio::source::SampleSource;
use cli::Cli;
use config::{Config, DisplaySection};
use error::{ConfigError, UpdateLoopError};
use fft::FftStreamer;
use ui::{LoopExit, UpdateLoop};
use vis::{
    hex_color, BarRenderer, HorizontalBars, TerminalOptions, TerminalVisualizer, VerticalBars,
    Visualizer, VisualizerKind,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let cfg = match config::discover(cli.config.clone()) {
        Some(path) => match config::load_config(&path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };
    cli.merge_config(&cfg);

    let input = &cli.input;
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    log::info!("barscope - terminal spectrum player");
    log::info!("Input: {}", input.display());
    log::info!("Visualizer: {:?} @ {}fps", cli.visualizer, cli.target_fps);

    // 1. Open the decoder and size the analysis window from the frame rate
    let source = FileSource::open(input)
        .with_context(|| format!("decode: cannot read {}", input.display()))?;
    let format = source.format();
    let song_duration = source.len_frames().map(|n| format.duration_of(n));
    let window_size = format
        .window_size_for_fps(cli.target_fps)
        .context("decode: cannot derive FFT window size")?;

    let (streamer, reader) = FftStreamer::new(source, cfg.stream.streamer_config(window_size))
        .context("decode: failed to start FFT pipeline")?;
    log::info!(
        "Format: {}Hz, {} channel(s), {} byte(s)/sample; window: {} frames",
        format.sample_rate,
        format.channels,
        format.precision,
        reader.window_size()
    );
    if let Some(duration) = song_duration {
        log::info!("Duration: {:.1}s", duration.as_secs_f64());
    }

    // 2. Start audio output; the streamer now lives in the device callback
    let playback = Playback::start(streamer).context("playback: failed to open audio output")?;

    // 3. Terminal display
    let renderer = build_renderer(&cli, &cfg.display).context("display: invalid bar layout")?;
    let options = TerminalOptions {
        show_fps: cli.show_fps,
        exit_on_end: !cli.keep_open,
        ..TerminalOptions::default()
    };
    let terminal = Arc::new(
        TerminalVisualizer::spawn(renderer, options).context("display: failed to start terminal")?,
    );

    // 4. Drive spectra to the display until one side finishes
    let session_cancel = match song_duration {
        Some(duration) => after(duration + Duration::from_secs(5)),
        None => never(),
    };
    let visualizer: Arc<dyn Visualizer> = terminal.clone();
    let update_loop = UpdateLoop::new(reader, visualizer, cfg.stream.update_loop_config());
    let outcome = update_loop.run(session_cancel);

    terminal.shutdown();
    if let Err(e) = terminal.wait_until_finished(&after(Duration::from_secs(1))) {
        log::warn!("Terminal did not shut down cleanly: {}", e);
    }
    log::debug!(
        "Playback {} on {} channel(s)",
        if playback.is_finished() { "completed" } else { "interrupted" },
        playback.channels()
    );
    drop(playback);

    let exit = match outcome {
        Err(UpdateLoopError::Visualizer(e)) => {
            return Err(anyhow::Error::new(e).context("display: terminal visualizer failed"));
        }
        other => other.context("update loop: spectrum display stalled")?,
    };
    if let Some(err) = update_loop.reader().err() {
        return Err(anyhow::Error::new(err).context("decode: audio stream ended with an error"));
    }

    let dropped = update_loop.reader().dropped_windows();
    if dropped > 0 {
        log::warn!("{} analysis windows were skipped to keep playback smooth", dropped);
    }
    match exit {
        LoopExit::EndOfStream => log::info!("Done! Played {}", input.display()),
        LoopExit::VisualizerFinished => log::info!("Stopped"),
    }
    Ok(())
}

fn build_renderer(cli: &Cli, display: &DisplaySection) -> Result<Box<dyn BarRenderer>, ConfigError> {
    match cli.visualizer {
        VisualizerKind::VerticalBars => {
            let bars = cli.bars.unwrap_or(64);
            if bars == 0 {
                return Err(ConfigError::ZeroBars);
            }
            let mut renderer = VerticalBars::new(bars, cli.height.unwrap_or(40));
            if let Some(color) = display.full_color.as_deref().and_then(parse_color) {
                renderer.full_color = color;
            }
            if let Some(color) = display.empty_color.as_deref().and_then(parse_color) {
                renderer.empty_color = color;
            }
            Ok(Box::new(renderer))
        }
        VisualizerKind::HorizontalBars => {
            let bars = cli.bars.unwrap_or(32);
            if bars == 0 {
                return Err(ConfigError::ZeroBars);
            }
            Ok(Box::new(HorizontalBars::new(bars, cli.height.unwrap_or(40))))
        }
    }
}

fn parse_color(hex: &str) -> Option<crossterm::style::Color> {
    let color = hex_color(hex);
    if color.is_none() {
        log::warn!("Ignoring invalid color {:?}, expected #rrggbb", hex);
    }
    color
}
