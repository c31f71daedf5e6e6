use rustfft::num_complex::Complex;

/// Number of spectrum bins folded into each bar.
///
/// The spectrum of a real signal is conjugate symmetric, so only half of it
/// is spread across the bars; each positive bin is paired with its mirror.
pub fn bins_per_bar(spectrum_len: usize, num_bars: usize) -> usize {
    if num_bars == 0 {
        return 0;
    }
    spectrum_len / num_bars / 2
}

/// Raw per-bar magnitude sums, before log scaling and normalization.
pub fn group_sums(bins: &[Complex<f32>], num_bars: usize) -> Vec<f32> {
    let width = bins_per_bar(bins.len(), num_bars);
    let last = bins.len().saturating_sub(1);

    (0..num_bars)
        .map(|bar| {
            (0..width)
                .map(|i| {
                    let k = bar * width + i;
                    bins[k].norm() + bins[last - k].norm()
                })
                .sum()
        })
        .collect()
}

/// Folds a spectrum into `num_bars` log-scaled heights in `[0, 1]`, with the
/// tallest bar at exactly 1. A silent (or too short) spectrum gives all
/// zeros.
pub fn aggregate_bars(bins: &[Complex<f32>], num_bars: usize) -> Vec<f32> {
    let mut bars: Vec<f32> = group_sums(bins, num_bars)
        .into_iter()
        .map(f32::ln_1p)
        .collect();

    let max = bars.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 && max.is_finite() {
        for bar in &mut bars {
            *bar /= max;
        }
    } else {
        bars.iter_mut().for_each(|b| *b = 0.0);
    }
    bars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f32, im: f32) -> Complex<f32> {
        Complex::new(re, im)
    }

    #[test]
    fn mirrored_bins_sum_to_twice_one_side() {
        // Positive half (3+4i), negative half (3-4i): |z| = 5 on both sides.
        let mut bins = vec![c(3.0, 4.0); 8];
        bins.extend(vec![c(3.0, -4.0); 8]);

        let sums = group_sums(&bins, 2);
        assert_eq!(bins_per_bar(16, 2), 4);
        assert_eq!(sums, vec![40.0, 40.0]);
        for s in sums {
            assert_eq!(s, 2.0 * (4.0 * 5.0));
        }
    }

    #[test]
    fn pairs_bin_with_its_mirror() {
        let mut bins = vec![c(0.0, 0.0); 16];
        bins[0] = c(1.0, 0.0);
        bins[15] = c(2.0, 0.0);
        bins[5] = c(0.0, 7.0);
        bins[10] = c(0.0, 1.0);

        // width 4: bar 0 covers 0..4 with 15..12, bar 1 covers 4..8 with 11..8.
        assert_eq!(group_sums(&bins, 2), vec![3.0, 8.0]);
    }

    #[test]
    fn normalized_max_is_one() {
        let bins: Vec<Complex<f32>> = (0..256).map(|i| c((i % 17) as f32, (i % 5) as f32)).collect();
        let bars = aggregate_bars(&bins, 16);

        assert_eq!(bars.len(), 16);
        assert_eq!(bars.iter().copied().fold(f32::MIN, f32::max), 1.0);
        assert!(bars.iter().all(|&b| (0.0..=1.0).contains(&b)));
    }

    #[test]
    fn log_scale_compresses_range() {
        let mut bins = vec![c(0.0, 0.0); 8];
        bins[0] = c(1000.0, 0.0);
        bins[2] = c(1.0, 0.0);
        let bars = aggregate_bars(&bins, 2);
        assert_eq!(bars[0], 1.0);
        assert!((bars[1] - 1f32.ln_1p() / 1000f32.ln_1p()).abs() < 1e-6);
    }

    #[test]
    fn silent_spectrum_gives_zero_bars() {
        let bars = aggregate_bars(&vec![c(0.0, 0.0); 1024], 64);
        assert_eq!(bars, vec![0.0; 64]);
    }

    #[test]
    fn short_or_empty_spectrum_gives_zero_bars() {
        assert_eq!(aggregate_bars(&[], 8), vec![0.0; 8]);
        assert_eq!(aggregate_bars(&vec![c(1.0, 1.0); 10], 8), vec![0.0; 8]);
        assert!(aggregate_bars(&vec![c(1.0, 1.0); 10], 0).is_empty());
    }

    #[test]
    fn aggregation_is_deterministic() {
        let bins: Vec<Complex<f32>> = (0..512).map(|i| c((i as f32).sin(), (i as f32).cos())).collect();
        let a = aggregate_bars(&bins, 32);
        let b = aggregate_bars(&bins, 32);
        assert_eq!(
            a.iter().map(|x| x.to_bits()).collect::<Vec<_>>(),
            b.iter().map(|x| x.to_bits()).collect::<Vec<_>>()
        );
    }
}
