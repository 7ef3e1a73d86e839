use crate::dab_transmission_mode::DabTransmissionMode;

/// Immutable timing parameters for one DAB transmission mode, fixed for the
/// lifetime of a receiving session.
///
/// Field names follow ETSI EN 300 401 clause 14: `t_u` is the useful part of
/// an OFDM symbol, `t_g` the cyclic prefix, `t_s = t_u + t_g` the full symbol
/// including guard, `t_null` the length of the NULL symbol used for coarse
/// frame sync, `t_f` the length of an entire transmission frame, `l` the
/// number of data symbols per frame (block indices `0..l`, where block 0 is
/// the phase reference symbol), and `k` the number of active data
/// subcarriers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DabModeParameters {
    /// Sample rate of the complex baseband stream, in Hz.
    pub sample_rate_hz: f64,
    /// Samples per transmission frame.
    pub t_f: usize,
    /// Samples in the NULL symbol.
    pub t_null: usize,
    /// Samples in one OFDM symbol including the cyclic prefix.
    pub t_s: usize,
    /// Samples in the useful (FFT) part of one OFDM symbol.
    pub t_u: usize,
    /// Samples in the cyclic prefix of one OFDM symbol.
    pub t_g: usize,
    /// Number of data symbols per frame (block 0 is the phase reference).
    pub l: usize,
    /// Number of active data subcarriers, centered on DC.
    pub k: usize,
    /// Subcarrier spacing in Hz. Equal to `sample_rate_hz / t_u`.
    pub carrier_diff_hz: f64,
    /// Number of FIC blocks (always blocks `1..=3`).
    pub nb_fic_symbols: usize,
    /// Number of MSC blocks (always blocks `4..l`).
    pub nb_msc_symbols: usize,
}

/// Returns the fixed timing parameters for `mode` at the standard 2048 kHz
/// baseband sample rate.
pub fn get_dab_mode_parameters(mode: DabTransmissionMode) -> DabModeParameters {
    const SAMPLE_RATE_HZ: f64 = 2_048_000.0;

    let (t_null, t_s, t_u, k, l, nb_fic_symbols, nb_msc_symbols) = match mode {
        DabTransmissionMode::I => (2656, 2552, 2048, 1536, 76, 3, 72),
        DabTransmissionMode::II => (664, 638, 512, 384, 76, 3, 72),
        DabTransmissionMode::III => (345, 319, 256, 192, 153, 8, 144),
        DabTransmissionMode::IV => (1328, 1276, 1024, 768, 76, 3, 72),
    };

    let t_g = t_s - t_u;
    let t_f = t_null + l * t_s;
    let carrier_diff_hz = SAMPLE_RATE_HZ / (t_u as f64);

    let params = DabModeParameters {
        sample_rate_hz: SAMPLE_RATE_HZ,
        t_f,
        t_null,
        t_s,
        t_u,
        t_g,
        l,
        k,
        carrier_diff_hz,
        nb_fic_symbols,
        nb_msc_symbols,
    };

    assert!(params.t_s > params.t_u, "T_s must exceed T_u (need a cyclic prefix)");
    assert!(params.t_u > 0, "T_u must be positive");
    assert!(params.l >= 5, "need at least null + block0 + 3 FIC + 1 MSC");
    assert!(params.k % 2 == 0, "number of active carriers must be even");
    assert!(
        params.nb_fic_symbols + params.nb_msc_symbols == params.l - 1,
        "FIC + MSC block counts must account for every data block after block 0"
    );

    params
}
