use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use num::complex::Complex32;

use dab_core::error::ReceiverError;

use crate::device::VirtualInput;

/// Exponential-average decay applied to `|sample|` to form the long-term
/// envelope `sLevel` (`spec.md` §4.1). Not specified by the protocol; chosen
/// slow enough that a single null dip barely moves it, which is what the
/// null-search threshold (`spec.md` §4.4) relies on.
const S_LEVEL_DECAY: f32 = 0.999;

/// Thin adapter over a [`VirtualInput`] device (`spec.md` §4.1).
///
/// Applies the fine/coarse frequency correction as a per-sample time-domain
/// rotation driven by a single free-running sample counter, and tracks the
/// long-term envelope average `sLevel` used by the null-dip detector.
pub struct SampleReader {
    device: Box<dyn VirtualInput>,
    sample_rate_hz: f64,
    sample_index: u64,
    s_level: f32,
    running: Arc<AtomicBool>,
    scratch: Vec<Complex32>,
}

impl SampleReader {
    pub fn new(device: Box<dyn VirtualInput>, sample_rate_hz: f64, running: Arc<AtomicBool>) -> Self {
        Self {
            device,
            sample_rate_hz,
            sample_index: 0,
            s_level: 0.0,
            running,
            scratch: Vec::new(),
        }
    }

    pub fn s_level(&self) -> f32 {
        self.s_level
    }

    pub fn reset_buffer(&mut self) {
        self.device.reset_buffer();
    }

    pub fn device_mut(&mut self) -> &mut dyn VirtualInput {
        self.device.as_mut()
    }

    /// Pulls one rotated sample, equivalent to `getSamples` with `n=1`.
    pub fn get_sample(&mut self, offset_hz: f64) -> Result<Complex32, ReceiverError> {
        let mut one = [Complex32::default(); 1];
        self.get_samples(&mut one, offset_hz)?;
        Ok(one[0])
    }

    /// Pulls `dst.len()` rotated samples and advances the rolling sample
    /// index by that amount. `offset_hz` is applied as
    /// `exp(-j*2*pi*offset_hz*n/Fs)` where `n` is the absolute sample
    /// index since construction, not reset at every sync re-entry
    /// (`SPEC_FULL.md` §4.1).
    pub fn get_samples(&mut self, dst: &mut [Complex32], offset_hz: f64) -> Result<(), ReceiverError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(ReceiverError::Stopped);
        }

        let n = dst.len();
        self.scratch.resize(n, Complex32::default());
        let read = self.device.read_samples(&mut self.scratch);
        if read < n || !self.running.load(Ordering::Acquire) {
            return Err(ReceiverError::Stopped);
        }

        for (i, sample) in self.scratch.iter().enumerate() {
            let abs_index = self.sample_index + i as u64;
            let phase = -2.0 * PI * offset_hz * (abs_index as f64) / self.sample_rate_hz;
            let rotation = Complex32::from_polar(1.0, phase as f32);
            let rotated = sample * rotation;
            dst[i] = rotated;
            self.s_level = S_LEVEL_DECAY * self.s_level + (1.0 - S_LEVEL_DECAY) * rotated.norm();
        }
        self.sample_index += n as u64;
        Ok(())
    }
}
