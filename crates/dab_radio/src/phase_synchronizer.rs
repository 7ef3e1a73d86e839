use std::sync::Arc;

use num::complex::Complex32;
use rustfft::{Fft, FftPlanner};

use dab_core::dab_transmission_mode::DabTransmissionMode;
use dab_ofdm::phase_reference_symbol::build_phase_reference_symbol_fft;
use ofdm::fft_engine::FftEngine;

/// Sentinel returned by [`PhaseSynchronizer::estimate_carrier_offset`] when
/// no candidate shift crosses the confidence floor (`spec.md` §4.2).
pub const NO_CONFIDENT_ESTIMATE: i32 = 100;

/// Correlates against the known phase reference symbol to find cyclic-prefix
/// alignment and coarse carrier offset (`spec.md` §4.2).
///
/// `threshold` and `diff_length` are opaque tuning knobs handed in by the
/// caller, not derived from mode parameters (`spec.md` §9, "fixed magic
/// numbers... reproduce them literally"). `max_shift_carriers` bounds the
/// coarse-offset search window; `spec.md` leaves this bound unspecified
/// ("−N..+N"), so it is derived here as a quarter of the active carrier
/// count, wide enough to catch a multi-kHz mistune without scanning the
/// full FFT.
pub struct PhaseSynchronizer {
    t_u: usize,
    threshold: i32,
    diff_length: usize,
    max_shift_carriers: i32,
    prs_time: Vec<Complex32>,
    prs_fft: Vec<Complex32>,
    active_bins: Vec<usize>,
    fft: FftEngine,
    ifft: Arc<dyn Fft<f32>>,
}

impl PhaseSynchronizer {
    pub fn new(
        mode: DabTransmissionMode,
        t_u: usize,
        nb_carriers: usize,
        threshold: i32,
        diff_length: usize,
    ) -> Self {
        assert!(diff_length > 0 && diff_length <= t_u, "diff_length must fit within T_u");

        let mut prs_fft = vec![Complex32::default(); t_u];
        build_phase_reference_symbol_fft(&mut prs_fft, mode);

        let active_bins: Vec<usize> = prs_fft
            .iter()
            .enumerate()
            .filter(|(_, bin)| bin.norm() > 0.5)
            .map(|(i, _)| i)
            .collect();

        let mut planner = FftPlanner::new();
        let ifft = planner.plan_fft_inverse(t_u);
        let mut prs_time = prs_fft.clone();
        ifft.process(&mut prs_time);
        let scale = 1.0 / (t_u as f32);
        for value in prs_time.iter_mut() {
            *value *= scale;
        }

        Self {
            t_u,
            threshold,
            diff_length,
            max_shift_carriers: (nb_carriers / 4) as i32,
            prs_time,
            prs_fft,
            active_bins,
            fft: FftEngine::new(t_u),
            ifft,
        }
    }

    /// Correlates `window` (`T_u` samples) against the time-domain phase
    /// reference symbol and returns the sample offset of the best match, or
    /// `-1` if the normalized correlation never crosses `threshold` (in
    /// thousandths, so `threshold = 700` means a 0.7 correlation floor).
    pub fn find_index(&self, window: &[Complex32]) -> i32 {
        assert_eq!(window.len(), self.t_u, "findIndex expects a T_u-sized window");

        let ref_energy: f32 = self.prs_time[..self.diff_length]
            .iter()
            .map(|c| c.norm_sqr())
            .sum();
        if ref_energy == 0.0 {
            return -1;
        }

        let search_len = self.t_u - self.diff_length;
        let mut best_lag: i32 = -1;
        let mut best_score: f32 = 0.0;

        for lag in 0..=search_len {
            let mut corr = Complex32::default();
            let mut win_energy = 0.0f32;
            for k in 0..self.diff_length {
                let sample = window[lag + k];
                corr += sample * self.prs_time[k].conj();
                win_energy += sample.norm_sqr();
            }
            let denom = (win_energy * ref_energy).sqrt();
            if denom == 0.0 {
                continue;
            }
            let score = corr.norm() / denom;
            if score > best_score {
                best_score = score;
                best_lag = lag as i32;
            }
        }

        if (best_score * 1000.0) as i32 > self.threshold {
            best_lag
        } else {
            -1
        }
    }

    /// Estimates the integer carrier-spacing shift of `block0` (`T_u`
    /// samples, no rotation applied yet) relative to the known phase
    /// reference symbol, or [`NO_CONFIDENT_ESTIMATE`] when no shift is
    /// confidently better than the rest.
    pub fn estimate_carrier_offset(&mut self, block0: &[Complex32]) -> i32 {
        let fft0 = self.fft.transform(block0);

        let mut best_k: i32 = 0;
        let mut best_score: f32 = 0.0;

        for k in -self.max_shift_carriers..=self.max_shift_carriers {
            let mut corr = Complex32::default();
            for &bin in &self.active_bins {
                let shifted = (bin as i32 + k).rem_euclid(self.t_u as i32) as usize;
                corr += fft0[shifted] * self.prs_fft[bin].conj();
            }
            let score = corr.norm();
            if score > best_score {
                best_score = score;
                best_k = k;
            }
        }

        let confidence = best_score / (self.active_bins.len() as f32);
        if confidence > 0.3 {
            best_k
        } else {
            NO_CONFIDENT_ESTIMATE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_block0(sync: &PhaseSynchronizer, shift: i32) -> Vec<Complex32> {
        let t_u = sync.t_u;
        let mut shifted_fft = vec![Complex32::default(); t_u];
        for &bin in &sync.active_bins {
            let dest = (bin as i32 + shift).rem_euclid(t_u as i32) as usize;
            shifted_fft[dest] = sync.prs_fft[bin];
        }
        let mut planner = FftPlanner::new();
        let ifft = planner.plan_fft_inverse(t_u);
        ifft.process(&mut shifted_fft);
        let scale = 1.0 / (t_u as f32);
        shifted_fft.iter_mut().for_each(|c| *c *= scale);
        shifted_fft
    }

    #[test]
    fn estimate_carrier_offset_recovers_exact_shift() {
        let mut sync = PhaseSynchronizer::new(DabTransmissionMode::I, 2048, 1536, 300, 504);
        for &shift in &[0, 5, -5, 50, -200] {
            let block0 = synthetic_block0(&sync, shift);
            assert_eq!(sync.estimate_carrier_offset(&block0), shift, "shift {shift} not recovered");
        }
    }

    #[test]
    fn estimate_carrier_offset_on_noise_returns_sentinel() {
        let mut sync = PhaseSynchronizer::new(DabTransmissionMode::I, 2048, 1536, 300, 504);
        // Deterministic pseudo-random noise, no external RNG dependency.
        let mut state: u32 = 0x1234_5678;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state as f32 / u32::MAX as f32) * 2.0 - 1.0
        };
        let noise: Vec<Complex32> = (0..2048).map(|_| Complex32::new(next(), next())).collect();
        assert_eq!(sync.estimate_carrier_offset(&noise), NO_CONFIDENT_ESTIMATE);
    }

    #[test]
    fn find_index_locates_embedded_reference_symbol() {
        let sync = PhaseSynchronizer::new(DabTransmissionMode::I, 2048, 1536, 300, 504);
        let mut window = vec![Complex32::default(); 2048];
        let offset = 37;
        for (i, sample) in sync.prs_time.iter().enumerate() {
            window[offset + i] = *sample;
        }
        assert_eq!(sync.find_index(&window), offset as i32);
    }

    #[test]
    fn find_index_on_silence_returns_sentinel() {
        let sync = PhaseSynchronizer::new(DabTransmissionMode::I, 2048, 1536, 300, 504);
        let window = vec![Complex32::default(); 2048];
        assert_eq!(sync.find_index(&window), -1);
    }
}
