use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;
use crate::vis::VisualizerKind;

pub const DEFAULT_TARGET_FPS: u32 = 30;

#[derive(Parser, Debug)]
#[command(name = "barscope", about = "Plays an audio file with a live spectrum bar display")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Display refresh rate; also sets the FFT window length
    #[arg(short = 'f', long, default_value_t = DEFAULT_TARGET_FPS)]
    pub target_fps: u32,

    /// Bar layout
    #[arg(short, long, value_enum, default_value_t = VisualizerKind::VerticalBars)]
    pub visualizer: VisualizerKind,

    /// Show frame count and FPS below the bars
    #[arg(short, long)]
    pub show_fps: bool,

    /// Config file (defaults to ./barscope.toml, then the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of bars (default: 64 vertical, 32 horizontal)
    #[arg(long)]
    pub bars: Option<usize>,

    /// Bar height in rows for vertical bars, or row width for horizontal bars
    #[arg(long)]
    pub height: Option<usize>,

    /// Keep the display open after the track ends until a quit key is pressed
    #[arg(long)]
    pub keep_open: bool,
}

impl Cli {
    /// Fills in settings from `cfg` wherever the command line left the
    /// default in place.
    pub fn merge_config(&mut self, cfg: &Config) {
        if self.target_fps == DEFAULT_TARGET_FPS {
            self.target_fps = cfg.stream.target_fps;
        }
        if self.visualizer == VisualizerKind::default() {
            self.visualizer = cfg.display.visualizer;
        }
        if !self.show_fps {
            self.show_fps = cfg.display.show_fps;
        }
        if self.bars.is_none() {
            self.bars = cfg.display.bars;
        }
        if self.height.is_none() {
            self.height = cfg.display.height;
        }
        if !self.keep_open {
            self.keep_open = !cfg.display.exit_on_end;
        }
    }
}
