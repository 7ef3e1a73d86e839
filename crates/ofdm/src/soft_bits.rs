use num::complex::Complex32;

/// Quantises a normalized real value in `[-1, 1]` to a signed soft-decision
/// bit in `[-127, 127]`, rounding to nearest and clamping the extremes.
///
/// The sign is inverted relative to the symbol's real/imaginary components:
/// a soft-decision Viterbi decoder expects `+127` to mean "strong 1" and
/// `-127` to mean "strong 0", which is the opposite convention to the raw
/// QPSK symbol mapping (`spec.md` §4.3).
pub fn quantise_soft_bit(x: f32) -> i8 {
    let scaled = (-x * 127.0).round();
    scaled.clamp(-127.0, 127.0) as i8
}

/// Differentially demodulates one active subcarrier and produces its pair of
/// soft bits.
///
/// `fft_bin` is the current block's FFT output at this carrier's bin,
/// `phase_ref_bin` is the previous block's FFT output at the same bin. When
/// the phase difference has zero magnitude (a degenerate, noise-free-zero
/// input) both bits are left at `0` rather than dividing by zero
/// (`spec.md` §7, NaN/Inf guard).
pub fn differential_soft_bits(fft_bin: Complex32, phase_ref_bin: Complex32) -> (i8, i8) {
    let r = fft_bin * phase_ref_bin.conj();
    let amplitude = r.norm();
    if amplitude == 0.0 {
        return (0, 0);
    }
    let real_bit = quantise_soft_bit(r.re / amplitude);
    let imag_bit = quantise_soft_bit(r.im / amplitude);
    (real_bit, imag_bit)
}
