use crossterm::style::Color;

use super::{BarRenderer, Cell};

/// One progress-style row per bar, shaded with a left-to-right gradient and
/// followed by its percentage.
#[derive(Debug, Clone)]
pub struct HorizontalBars {
    pub num_bars: usize,
    /// Row length in cells at a value of 1.0.
    pub width: usize,
    pub full: char,
    pub empty: char,
    pub gradient: ((u8, u8, u8), (u8, u8, u8)),
    pub empty_color: Color,
    pub show_percent: bool,
}

impl HorizontalBars {
    pub fn new(num_bars: usize, width: usize) -> Self {
        Self {
            num_bars,
            width,
            full: '█',
            empty: '░',
            gradient: ((0x5A, 0x56, 0xE0), (0xEE, 0x6F, 0xF8)),
            empty_color: Color::Rgb { r: 0x60, g: 0x60, b: 0x60 },
            show_percent: true,
        }
    }

    fn ramp(&self, col: usize) -> Color {
        let t = if self.width > 1 {
            col as f32 / (self.width - 1) as f32
        } else {
            0.0
        };
        let ((r0, g0, b0), (r1, g1, b1)) = self.gradient;
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Color::Rgb {
            r: mix(r0, r1),
            g: mix(g0, g1),
            b: mix(b0, b1),
        }
    }
}

impl BarRenderer for HorizontalBars {
    fn num_bars(&self) -> usize {
        self.num_bars
    }

    fn render(&self, bars: &[f32]) -> Vec<Vec<Cell>> {
        bars.iter()
            .map(|&p| {
                let p = p.clamp(0.0, 1.0);
                let filled = (p * self.width as f32).round() as usize;
                let mut line: Vec<Cell> = (0..self.width)
                    .map(|col| {
                        if col < filled {
                            Cell::new(self.full, self.ramp(col))
                        } else {
                            Cell::new(self.empty, self.empty_color)
                        }
                    })
                    .collect();
                if self.show_percent {
                    let label = format!(" {:>3.0}%", p * 100.0);
                    line.extend(label.chars().map(|ch| Cell::new(ch, Color::Reset)));
                }
                line
            })
            .collect()
    }
}
