/// The four DAB transmission modes. Each selects a fixed set of OFDM timing
/// parameters (see [`crate::dab_parameters::get_dab_mode_parameters`]).
///
/// Mode I is the common terrestrial mode; II/III/IV trade symbol duration
/// for Doppler/delay-spread robustness at other carrier frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DabTransmissionMode {
    I,
    II,
    III,
    IV,
}

impl DabTransmissionMode {
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            1 => Some(Self::I),
            2 => Some(Self::II),
            3 => Some(Self::III),
            4 => Some(Self::IV),
            _ => None,
        }
    }
}
