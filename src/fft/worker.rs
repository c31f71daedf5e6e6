use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::spectrum::Spectrum;
use crate::audio::source::Frame;

/// Per-window transform state: a planned FFT and Hann coefficients for the
/// nominal window size, plus a planner for the odd short window at the end.
pub struct SpectrumAnalyzer {
    window_size: usize,
    zero_pad: bool,
    planner: FftPlanner<f32>,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new(window_size: usize, zero_pad: bool) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self {
            window_size,
            zero_pad,
            planner,
            fft,
            window: hann_window(window_size),
            scratch,
        }
    }

    /// Downmix, taper and transform one window of at most `window_size`
    /// frames.
    pub fn analyze(&mut self, frames: &[Frame], index: u64) -> Spectrum {
        let mut mono = to_mono(frames);

        if mono.len() == self.window.len() {
            apply_window(&mut mono, &self.window);
        } else {
            let taper = hann_window(mono.len());
            apply_window(&mut mono, &taper);
        }

        let len = if self.zero_pad {
            self.window_size.max(mono.len())
        } else {
            mono.len()
        };

        let mut bins: Vec<Complex<f32>> = mono.iter().map(|&s| Complex::new(s, 0.0)).collect();
        bins.resize(len, Complex::new(0.0, 0.0));

        if len == self.window_size {
            if self.scratch.len() < self.fft.get_inplace_scratch_len() {
                self.scratch
                    .resize(self.fft.get_inplace_scratch_len(), Complex::new(0.0, 0.0));
            }
            self.fft.process_with_scratch(&mut bins, &mut self.scratch);
        } else if len > 0 {
            let fft = self.planner.plan_fft_forward(len);
            fft.process(&mut bins);
        }

        Spectrum {
            index,
            frames: frames.len(),
            bins,
        }
    }
}

/// Splits `chunk` into consecutive windows of `size` items; the last window
/// is shorter when `size` does not divide the chunk.
pub fn split_windows<T>(chunk: &[T], size: usize) -> impl Iterator<Item = &[T]> {
    chunk.chunks(size.max(1))
}

/// Averages left and right into one channel.
pub fn to_mono(frames: &[Frame]) -> Vec<f32> {
    frames.iter().map(|[l, r]| (l + r) / 2.0).collect()
}

/// Symmetric Hann window of `size` points.
pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

pub fn apply_window(samples: &mut [f32], window: &[f32]) {
    for (s, w) in samples.iter_mut().zip(window) {
        *s *= w;
    }
}

/// Starts the analysis thread. It runs until `input` is closed and drained,
/// then drops `output`, which is how the consumer learns the stream is done.
/// The join handle yields the number of spectra emitted.
pub(crate) fn spawn_worker(
    input: Receiver<Vec<Frame>>,
    output: Sender<Spectrum>,
    window_size: usize,
    zero_pad: bool,
) -> std::io::Result<JoinHandle<u64>> {
    thread::Builder::new()
        .name("fft-worker".to_string())
        .spawn(move || {
            let mut analyzer = SpectrumAnalyzer::new(window_size, zero_pad);
            let mut emitted = 0u64;

            for chunk in input.iter() {
                for window in split_windows(&chunk, window_size) {
                    let spectrum = analyzer.analyze(window, emitted);
                    if output.send(spectrum).is_err() {
                        log::debug!("Spectrum reader dropped, stopping after {} windows", emitted);
                        return emitted;
                    }
                    emitted += 1;
                }
            }

            log::debug!("FFT worker drained: {} windows analysed", emitted);
            emitted
        })
}
