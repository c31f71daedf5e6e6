use rustfft::num_complex::Complex;

/// Complex spectrum of one analysis window.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Spectrum {
    /// Zero-based position of this window in emission order.
    pub index: u64,
    /// Frames of real audio behind this spectrum; less than `bins.len()`
    /// when the final short window was zero-padded.
    pub frames: usize,
    pub bins: Vec<Complex<f32>>,
}

impl Spectrum {
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn is_padded(&self) -> bool {
        self.frames < self.bins.len()
    }
}
