use std::fs::File;
use std::io::{self, BufReader, Read};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use num::complex::Complex32;

use dab_core::dab_parameters::get_dab_mode_parameters;
use dab_core::dab_transmission_mode::DabTransmissionMode;
use dab_ofdm::carrier_map::build_frequency_interleaver_map;
use dab_radio::dab_processor::DabProcessor;
use dab_radio::device::VirtualInput;
use dab_radio::events::{DabEvent, EventEmitter};
use dab_radio::fic_handler::NullFicHandler;
use dab_radio::msc_handler::NullMscHandler;
use dab_radio::ofdm_decoder::OfdmDecoder;
use dab_radio::phase_synchronizer::PhaseSynchronizer;
use dab_radio::sample_reader::SampleReader;

/// DAB/DAB+ synchronization and OFDM demodulation core, driven standalone
/// against a raw I/Q capture.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct AppArguments {
    /// DAB transmission mode, 1-4.
    #[arg(short, long, default_value_t = 1)]
    mode: u32,

    /// Path to a raw interleaved unsigned-8-bit I/Q capture. Reads stdin
    /// when omitted.
    #[arg(short, long)]
    input_filepath: Option<String>,

    /// Run the OFDM decoder's FIC/MSC ingestion on a dedicated worker
    /// thread instead of inline on the processor task.
    #[arg(long, default_value_t = false)]
    threaded_decoder: bool,

    /// Enable scan mode: emit `noSignalFound` after 5 consecutive failed
    /// null searches instead of retrying forever.
    #[arg(long, default_value_t = false)]
    scan: bool,
}

/// Raw unsigned-8-bit interleaved I/Q samples, matching common SDR dongle
/// output (`x - 128` recovers the signed excursion around zero).
struct RawIqDevice {
    reader: Box<dyn Read + Send>,
    scratch: Vec<u8>,
}

impl RawIqDevice {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self { reader, scratch: Vec::new() }
    }
}

impl VirtualInput for RawIqDevice {
    fn read_samples(&mut self, dst: &mut [Complex32]) -> usize {
        self.scratch.resize(dst.len() * 2, 0);
        let mut filled = 0;
        while filled < self.scratch.len() {
            match self.reader.read(&mut self.scratch[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(_) => break,
            }
        }
        let complete_samples = filled / 2;
        for i in 0..complete_samples {
            let re = self.scratch[2 * i] as f32 - 128.0;
            let im = self.scratch[2 * i + 1] as f32 - 128.0;
            dst[i] = Complex32::new(re, im);
        }
        complete_samples
    }

    fn reset_buffer(&mut self) {}

    fn get_offset(&self) -> i32 {
        0
    }

    fn set_offset(&mut self, _offset_hz: i32) {}

    fn bit_depth(&self) -> u32 {
        8
    }
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = AppArguments::parse();
    let mode = DabTransmissionMode::from_index(args.mode).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid transmission mode index {}", args.mode),
        )
    })?;
    let params = get_dab_mode_parameters(mode);

    let reader_source: Box<dyn Read + Send> = match &args.input_filepath {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let device = RawIqDevice::new(reader_source);

    let running = Arc::new(AtomicBool::new(true));
    let sample_reader = SampleReader::new(Box::new(device), params.sample_rate_hz, running.clone());
    let phase_sync = PhaseSynchronizer::new(mode, params.t_u, params.k, 300, 504);
    let carrier_map = build_frequency_interleaver_map(params.k, params.t_u);

    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let decoder = OfdmDecoder::new(
        params.t_u,
        params.t_g,
        params.k,
        params.l,
        params.nb_fic_symbols,
        carrier_map,
        EventEmitter::new(event_tx.clone()),
        Box::new(NullFicHandler::default()),
        Box::new(NullMscHandler::default()),
        args.threaded_decoder,
    );

    let (mut processor, handle) = DabProcessor::new(
        params,
        sample_reader,
        phase_sync,
        decoder,
        EventEmitter::new(event_tx),
        running,
    );
    handle.set_scan_mode(args.scan);

    let event_logger = std::thread::spawn(move || {
        for event in event_rx {
            match event {
                DabEvent::SetSynced(synced) => tracing::info!(synced, "sync state changed"),
                DabEvent::SyncLost => tracing::warn!("sync lost"),
                DabEvent::NoSignalFound => tracing::warn!("no signal found, giving up on this frequency"),
                DabEvent::ShowSnr(snr_db) => tracing::debug!(snr_db, "snr update"),
            }
        }
    });

    let result = processor.run();
    drop(processor);
    let _ = event_logger.join();

    if let Err(err) = result {
        tracing::error!(%err, "processor stopped");
    }
    Ok(())
}
