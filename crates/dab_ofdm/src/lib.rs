pub mod carrier_map;
pub mod phase_reference_symbol;
