use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::fft::StreamerConfig;
use crate::ui::UpdateLoopConfig;
use crate::vis::VisualizerKind;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub display: DisplaySection,
}

#[derive(Debug, Deserialize)]
pub struct StreamSection {
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    #[serde(default = "default_buffer_windows")]
    pub buffer_windows: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub zero_pad_final: bool,
    #[serde(default = "default_true")]
    pub sync_to_playback: bool,
    #[serde(default = "default_deadline_multiplier")]
    pub deadline_multiplier: u32,
}

#[derive(Debug, Deserialize)]
pub struct DisplaySection {
    #[serde(default)]
    pub visualizer: VisualizerKind,
    #[serde(default)]
    pub show_fps: bool,
    #[serde(default = "default_true")]
    pub exit_on_end: bool,
    pub bars: Option<usize>,
    pub height: Option<usize>,
    /// `#rrggbb` colors for the vertical bars.
    pub full_color: Option<String>,
    pub empty_color: Option<String>,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            buffer_windows: default_buffer_windows(),
            queue_capacity: default_queue_capacity(),
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
            zero_pad_final: true,
            sync_to_playback: true,
            deadline_multiplier: default_deadline_multiplier(),
        }
    }
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            visualizer: VisualizerKind::default(),
            show_fps: false,
            exit_on_end: true,
            bars: None,
            height: None,
            full_color: None,
            empty_color: None,
        }
    }
}

impl StreamSection {
    pub fn streamer_config(&self, window_size: usize) -> StreamerConfig {
        StreamerConfig {
            window_size,
            buffer_windows: self.buffer_windows,
            queue_capacity: self.queue_capacity,
            enqueue_timeout: Duration::from_millis(self.enqueue_timeout_ms),
            zero_pad_final: self.zero_pad_final,
            sync_to_playback: self.sync_to_playback,
        }
    }

    pub fn update_loop_config(&self) -> UpdateLoopConfig {
        UpdateLoopConfig {
            deadline_multiplier: self.deadline_multiplier,
            ..UpdateLoopConfig::default()
        }
    }
}

fn default_target_fps() -> u32 { 30 }
fn default_buffer_windows() -> usize { 2 }
fn default_queue_capacity() -> usize { 10 }
fn default_enqueue_timeout_ms() -> u64 { 2 }
fn default_deadline_multiplier() -> u32 { 6 }
fn default_true() -> bool { true }

pub fn load_config(path: &PathBuf) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            log::warn!("Invalid config {}: {}", path.display(), e);
            None
        }
    }
}

/// Explicit path first, then `barscope.toml` in the working directory, then
/// the per-user config locations.
pub fn discover(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let local = PathBuf::from("barscope.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("barscope").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("barscope").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    })
}
