//! Visualizer interface and the terminal bar renderers behind it.

pub mod bars;
pub mod fps;
pub mod horizontal;
pub mod terminal;
pub mod vertical;

use std::time::Instant;

use clap::ValueEnum;
use crossbeam_channel::Receiver;
use crossterm::style::Color;
use serde::Deserialize;

use crate::error::VisualizerError;
use crate::fft::Spectrum;

pub use horizontal::HorizontalBars;
pub use terminal::{TerminalOptions, TerminalVisualizer};
pub use vertical::VerticalBars;

/// Update delivered from the update loop to a visualizer.
#[derive(Clone, Debug, PartialEq)]
pub enum VisualizerEvent {
    Spectrum(Spectrum),
    /// Playback and analysis are both finished; no more spectra follow.
    EndOfStream,
}

/// The only surface the update loop sees of a visualizer.
pub trait Visualizer: Send + Sync {
    fn send(&self, event: VisualizerEvent);

    /// Blocks until the visualizer exits on its own, or until `cancel`
    /// fires, which yields `VisualizerError::Timeout`.
    fn wait_until_finished(&self, cancel: &Receiver<Instant>) -> Result<(), VisualizerError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualizerKind {
    #[default]
    #[value(name = "vertical_bars")]
    VerticalBars,
    #[value(name = "horizontal_bars")]
    HorizontalBars,
}

/// One character cell of a rendered frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub color: Color,
}

impl Cell {
    pub fn new(ch: char, color: Color) -> Self {
        Self { ch, color }
    }
}

/// Turns a bar set into rows of cells.
pub trait BarRenderer: Send {
    fn num_bars(&self) -> usize;

    fn render(&self, bars: &[f32]) -> Vec<Vec<Cell>>;
}

/// Parses `#rrggbb` into a terminal color.
pub fn hex_color(hex: &str) -> Option<Color> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    Some(Color::Rgb {
        r: channel(0)?,
        g: channel(2)?,
        b: channel(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_colors() {
        assert_eq!(hex_color("#7571F9"), Some(Color::Rgb { r: 0x75, g: 0x71, b: 0xF9 }));
        assert_eq!(hex_color("606060"), Some(Color::Rgb { r: 0x60, g: 0x60, b: 0x60 }));
        assert_eq!(hex_color("#12345"), None);
        assert_eq!(hex_color("#zz0000"), None);
    }

    #[test]
    fn visualizer_kind_names_match_cli() {
        let kind = VisualizerKind::from_str("horizontal_bars", false).unwrap();
        assert_eq!(kind, VisualizerKind::HorizontalBars);
        let parsed: VisualizerKind = toml::from_str::<Wrapper>("kind = \"vertical_bars\"").unwrap().kind;
        assert_eq!(parsed, VisualizerKind::VerticalBars);
    }

    #[derive(Deserialize)]
    struct Wrapper {
        kind: VisualizerKind,
    }
}
