use num::complex::Complex32;

/// Upstream SDR device contract (`spec.md` §6, "virtualInput").
///
/// The core never owns a device; it is handed one behind this trait so the
/// sync state machine can be driven against recorded captures or synthetic
/// generators in tests without any hardware dependency.
pub trait VirtualInput: Send {
    /// Pulls up to `dst.len()` raw complex samples, unrotated and
    /// untruncated by any frequency correction. Returns the number of
    /// samples written; a short read (including zero) means the device has
    /// stopped and the reader must raise `Stopped`.
    fn read_samples(&mut self, dst: &mut [Complex32]) -> usize;

    /// Discards any buffered samples the device is holding, e.g. after a
    /// `reset`.
    fn reset_buffer(&mut self);

    /// Current hardware tuning offset, in Hz.
    fn get_offset(&self) -> i32;

    /// Pushes a new hardware tuning offset, in Hz. Used when the coarse
    /// corrector is switched off externally (`spec.md` §4.4) so the
    /// residual offset is handed back to the device rather than silently
    /// dropped.
    fn set_offset(&mut self, offset_hz: i32);

    /// Sample bit depth, used only by the spectrum feed's dB normalization
    /// (`spec.md` §4.5); never consulted by the synchronization core.
    fn bit_depth(&self) -> u32;
}
