use crossterm::style::Color;

use super::{BarRenderer, Cell};

/// Column chart growing up from the bottom (or down from the top).
#[derive(Debug, Clone)]
pub struct VerticalBars {
    pub num_bars: usize,
    /// Bar height in rows at a value of 1.0.
    pub max_height: usize,
    pub bar_width: usize,
    pub top_down: bool,
    pub full: char,
    pub empty: char,
    pub full_color: Color,
    pub empty_color: Color,
}

impl VerticalBars {
    pub fn new(num_bars: usize, max_height: usize) -> Self {
        Self {
            num_bars,
            max_height,
            bar_width: 2,
            top_down: false,
            full: '█',
            empty: '░',
            full_color: Color::Rgb { r: 0x75, g: 0x71, b: 0xF9 },
            empty_color: Color::Rgb { r: 0x60, g: 0x60, b: 0x60 },
        }
    }
}

impl BarRenderer for VerticalBars {
    fn num_bars(&self) -> usize {
        self.num_bars
    }

    fn render(&self, bars: &[f32]) -> Vec<Vec<Cell>> {
        let heights: Vec<usize> = bars
            .iter()
            .map(|p| (p.clamp(0.0, 1.0) * self.max_height as f32) as usize)
            .collect();

        (0..self.max_height)
            .map(|i| {
                let row = if self.top_down { i } else { self.max_height - i - 1 };
                let mut line = Vec::with_capacity(heights.len() * (self.bar_width + 1));
                for &height in &heights {
                    let cell = if row < height {
                        Cell::new(self.full, self.full_color)
                    } else {
                        Cell::new(self.empty, self.empty_color)
                    };
                    line.extend(std::iter::repeat(cell).take(self.bar_width));
                    line.push(Cell::new(' ', Color::Reset));
                }
                line
            })
            .collect()
    }
}
