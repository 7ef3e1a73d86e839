pub mod dab_processor;
pub mod device;
pub mod events;
pub mod fic_handler;
pub mod mailbox;
pub mod msc_handler;
pub mod ofdm_decoder;
pub mod phase_synchronizer;
pub mod sample_reader;
pub mod spectrum_feed;
