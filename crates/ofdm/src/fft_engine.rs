use num::complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Forward-only DFT of a fixed size `t_u`, in-place over a buffer owned by
/// the engine so the OFDM decoder never allocates per block.
pub struct FftEngine {
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex32>,
}

impl FftEngine {
    pub fn new(t_u: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(t_u);
        Self {
            fft,
            buffer: vec![Complex32::default(); t_u],
        }
    }

    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Copies `input` into the internal buffer, executes the forward FFT in
    /// place, and returns a reference to the result.
    pub fn transform(&mut self, input: &[Complex32]) -> &[Complex32] {
        assert_eq!(input.len(), self.buffer.len(), "FFT input size mismatch");
        self.buffer.copy_from_slice(input);
        self.fft.process(&mut self.buffer);
        &self.buffer
    }
}
