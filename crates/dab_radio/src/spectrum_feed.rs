use num::complex::Complex32;
use ofdm::circular_bucket::CircularBucket;
use std::sync::Mutex;

/// Blackman window coefficient at sample `i` of `n` (`spec.md` §4.5).
pub fn blackman_window(i: usize, n: usize) -> f32 {
    use std::f32::consts::PI;
    let i = i as f32;
    let n = n as f32;
    0.42 - 0.5 * (2.0 * PI * i / (n - 1.0)).cos() + 0.08 * (4.0 * PI * i / (n - 1.0)).cos()
}

/// Converts a linear magnitude to dB, normalized to a device bit depth
/// (`spec.md` §4.5). `bit_depth` is the device's sample bit depth, not the
/// soft-bit width.
pub fn magnitude_to_db(magnitude: f32, bit_depth: u32) -> f32 {
    let normalizer = 2f32.powi(bit_depth as i32 - 1);
    20.0 * ((magnitude + 1.0) / normalizer).log10()
}

/// Exponentially averages successive magnitude spectra (`spec.md` §4.5,
/// `y <- alpha*y + (1-alpha)*|X|`). NaN and Inf inputs are skipped rather
/// than poisoning the running average (`spec.md` §7).
pub struct SpectrumAverager {
    alpha: f32,
    average: Vec<f32>,
}

impl SpectrumAverager {
    pub fn new(size: usize, alpha: f32) -> Self {
        Self { alpha, average: vec![0.0; size] }
    }

    pub fn update(&mut self, magnitudes: &[f32]) {
        assert_eq!(magnitudes.len(), self.average.len());
        for (y, &x) in self.average.iter_mut().zip(magnitudes) {
            if x.is_nan() || x.is_infinite() {
                continue;
            }
            *y = self.alpha * *y + (1.0 - self.alpha) * x;
        }
    }

    pub fn current(&self) -> &[f32] {
        &self.average
    }
}

/// Non-blocking duplicate of raw time-domain samples for an external
/// spectrum viewer (`spec.md` §4.5). The push point must never stall the
/// sync loop: when the ring buffer is full, the oldest samples are
/// overwritten rather than blocking the producer.
pub struct SpectrumFeed {
    buffer: Mutex<CircularBucket<Complex32>>,
}

impl SpectrumFeed {
    pub fn new(capacity: usize) -> Self {
        Self { buffer: Mutex::new(CircularBucket::new(capacity)) }
    }

    /// Duplicates `samples` into the feed, overwriting the oldest entries
    /// if the buffer is already full.
    pub fn push(&self, samples: &[Complex32]) {
        self.buffer.lock().unwrap().consume(samples, true);
    }

    pub fn drain_into(&self, dst: &mut [Complex32]) -> usize {
        self.buffer.lock().unwrap().read_into(dst)
    }

    pub fn available(&self) -> usize {
        self.buffer.lock().unwrap().available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitdepth_normalization_agrees_within_half_a_db() {
        let magnitude = 1000.0f32;
        let reference = magnitude_to_db(magnitude, 16);
        for bit_depth in [8u32, 12, 16, 24] {
            let scaled_magnitude = magnitude * 2f32.powi(bit_depth as i32 - 16);
            let db = magnitude_to_db(scaled_magnitude, bit_depth);
            assert!((db - reference).abs() <= 0.5, "bit_depth {bit_depth} diverged: {db} vs {reference}");
        }
    }

    #[test]
    fn averager_skips_nan_and_inf() {
        let mut averager = SpectrumAverager::new(2, 0.8);
        averager.update(&[1.0, 1.0]);
        averager.update(&[f32::NAN, f32::INFINITY]);
        assert_eq!(averager.current(), &[1.0, 1.0]);
    }

    #[test]
    fn push_never_blocks_even_when_full() {
        let feed = SpectrumFeed::new(4);
        let samples = vec![Complex32::new(1.0, 0.0); 10];
        feed.push(&samples);
        assert_eq!(feed.available(), 4);
    }

    #[test]
    fn blackman_window_is_zero_at_edges_and_peaks_in_the_middle() {
        let n = 256;
        let edge = blackman_window(0, n);
        let middle = blackman_window(n / 2, n);
        assert!(edge.abs() < 1e-3);
        assert!(middle > edge);
    }
}
