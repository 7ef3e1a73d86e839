use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use num::complex::Complex32;

use dab_ofdm::carrier_map::map_logical_carrier_to_fft_bin;
use ofdm::fft_engine::FftEngine;
use ofdm::soft_bits::differential_soft_bits;

use crate::events::{DabEvent, EventEmitter};
use crate::fic_handler::FicHandler;
use crate::mailbox::{Block, Mailbox};
use crate::msc_handler::MscHandler;

/// SNR estimate from Block 0 (`spec.md` §4.3, "SNR estimate").
///
/// `noise` averages magnitude around the bin opposite DC (`T_u/2`), `signal`
/// averages magnitude around DC itself (wrapped, since DC sits at bin 0 of
/// the raw, non-fftshifted FFT output).
pub fn get_snr(fft_out: &[Complex32], t_u: usize, nb_carriers: usize) -> i32 {
    let mut noise_sum = 0.0f32;
    let mut noise_count = 0usize;
    for i in -100i32..100 {
        let idx = (t_u as i32 / 2 + i).rem_euclid(t_u as i32) as usize;
        noise_sum += fft_out[idx].norm();
        noise_count += 1;
    }
    let noise = noise_sum / noise_count as f32;

    let mut signal_sum = 0.0f32;
    let mut signal_count = 0usize;
    let quarter = nb_carriers as i32 / 4;
    for i in -quarter..quarter {
        let idx = (t_u as i32 + i).rem_euclid(t_u as i32) as usize;
        signal_sum += fft_out[idx].norm();
        signal_count += 1;
    }
    let signal = signal_sum / signal_count as f32;

    (20.0 * ((signal + 0.005) / (noise + 0.005)).log10()) as i32
}

/// Mutable decoding state shared between the processor task (which always
/// calls `process_block0` inline) and, when threaded, the decoder worker
/// (which calls `decode_block` for FIC/MSC blocks).
struct OfdmDecoderCore {
    t_u: usize,
    t_g: usize,
    nb_carriers: usize,
    carrier_map: Vec<i32>,
    fft: FftEngine,
    phase_reference: Vec<Complex32>,
    snr_count: u32,
    snr: f32,
    events: EventEmitter,
}

impl OfdmDecoderCore {
    /// Block 0 processing (`spec.md` §4.3): FFT, periodic SNR update, and
    /// seeding the phase reference for the rest of the frame.
    fn process_block0(&mut self, block: &[Complex32]) {
        let fft_out = self.fft.transform(block);

        // "the 11-sample oddity": the 12th Block 0 updates SNR, not the
        // 11th (`spec.md` §9). Preserve the off-by-one literally.
        self.snr_count += 1;
        if self.snr_count > 10 {
            let sample_snr = get_snr(fft_out, self.t_u, self.nb_carriers) as f32;
            self.snr = 0.8 * self.snr + 0.2 * sample_snr;
            self.events.emit(DabEvent::ShowSnr(self.snr.round() as i32));
            self.snr_count = 0;
        }

        self.phase_reference.copy_from_slice(fft_out);
    }

    /// FIC/MSC block processing (`spec.md` §4.3): drops the cyclic prefix,
    /// FFTs the useful part, differentially demodulates every active
    /// carrier against the previous block's phase reference, then adopts
    /// this block's FFT output as the new phase reference.
    fn decode_block(&mut self, block_ts: &[Complex32]) -> Vec<i8> {
        let useful = &block_ts[self.t_g..];
        let fft_out = self.fft.transform(useful);

        let mut soft_bits = vec![0i8; 2 * self.nb_carriers];
        for i in 0..self.nb_carriers {
            let idx = map_logical_carrier_to_fft_bin(&self.carrier_map, i, self.t_u);
            let (re_bit, im_bit) = differential_soft_bits(fft_out[idx], self.phase_reference[idx]);
            soft_bits[i] = re_bit;
            soft_bits[self.nb_carriers + i] = im_bit;
        }

        self.phase_reference.copy_from_slice(fft_out);
        soft_bits
    }

    fn reset(&mut self) {
        self.snr_count = 0;
        self.snr = 0.0;
        for value in self.phase_reference.iter_mut() {
            *value = Complex32::default();
        }
    }
}

struct SharedState {
    core: Mutex<OfdmDecoderCore>,
    fic_handler: Mutex<Box<dyn FicHandler>>,
    msc_handler: Mutex<Box<dyn MscHandler>>,
    nb_fic_symbols: usize,
}

fn dispatch_block(shared: &SharedState, block: &Block) {
    let soft_bits = shared.core.lock().unwrap().decode_block(&block.samples);
    if block.block_index >= 1 && block.block_index <= shared.nb_fic_symbols {
        shared
            .fic_handler
            .lock()
            .unwrap()
            .process_fic_block(&soft_bits, block.block_index);
    } else {
        shared
            .msc_handler
            .lock()
            .unwrap()
            .process_msc_block(&soft_bits, block.block_index);
    }
}

fn worker_loop(shared: Arc<SharedState>, mailbox: Arc<Mailbox>, running: Arc<AtomicBool>) {
    loop {
        match mailbox.take_timeout(Duration::from_millis(100)) {
            Some(block) => dispatch_block(&shared, &block),
            None => {
                if !running.load(Ordering::Acquire) {
                    return;
                }
            }
        }
    }
}

enum Backend {
    Inline,
    Threaded {
        mailbox: Arc<Mailbox>,
        running: Arc<AtomicBool>,
        handle: Option<JoinHandle<()>>,
    },
}

/// Owns the FFT/demap pipeline plus (optionally) the dedicated worker that
/// runs it off the processor task (`spec.md` §4.3, §5).
pub struct OfdmDecoder {
    shared: Arc<SharedState>,
    backend: Backend,
}

impl OfdmDecoder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        t_u: usize,
        t_g: usize,
        nb_carriers: usize,
        l: usize,
        nb_fic_symbols: usize,
        carrier_map: Vec<i32>,
        events: EventEmitter,
        fic_handler: Box<dyn FicHandler>,
        msc_handler: Box<dyn MscHandler>,
        threaded: bool,
    ) -> Self {
        let core = OfdmDecoderCore {
            t_u,
            t_g,
            nb_carriers,
            carrier_map,
            fft: FftEngine::new(t_u),
            phase_reference: vec![Complex32::default(); t_u],
            snr_count: 0,
            snr: 0.0,
            events,
        };
        let shared = Arc::new(SharedState {
            core: Mutex::new(core),
            fic_handler: Mutex::new(fic_handler),
            msc_handler: Mutex::new(msc_handler),
            nb_fic_symbols,
        });

        let backend = if threaded {
            let mailbox = Arc::new(Mailbox::new(l));
            let running = Arc::new(AtomicBool::new(true));
            let worker_shared = shared.clone();
            let worker_mailbox = mailbox.clone();
            let worker_running = running.clone();
            let handle = thread::spawn(move || worker_loop(worker_shared, worker_mailbox, worker_running));
            Backend::Threaded { mailbox, running, handle: Some(handle) }
        } else {
            Backend::Inline
        };

        Self { shared, backend }
    }

    pub fn process_block0(&self, block: &[Complex32]) {
        self.shared.core.lock().unwrap().process_block0(block);
    }

    pub fn decode_fic_block(&self, block: &[Complex32], block_index: usize) {
        self.submit(block, block_index);
    }

    pub fn decode_msc_block(&self, block: &[Complex32], block_index: usize) {
        self.submit(block, block_index);
    }

    fn submit(&self, block: &[Complex32], block_index: usize) {
        match &self.backend {
            Backend::Inline => {
                dispatch_block(&self.shared, &Block { samples: block.to_vec(), block_index });
            }
            Backend::Threaded { mailbox, .. } => {
                mailbox.post(Block { samples: block.to_vec(), block_index });
            }
        }
    }

    /// Delegated query used by the processor's Block_0 step to decide
    /// `f2Correction` (`spec.md` §4.4).
    pub fn sync_reached(&self) -> bool {
        self.shared.fic_handler.lock().unwrap().sync_reached()
    }

    pub fn snr_db(&self) -> i32 {
        self.shared.core.lock().unwrap().snr.round() as i32
    }

    /// Number of blocks currently in flight in the mailbox; always `0` for
    /// the inline configuration (`spec.md` §8, "bounded backlog").
    pub fn in_flight(&self) -> usize {
        match &self.backend {
            Backend::Inline => 0,
            Backend::Threaded { mailbox, .. } => mailbox.in_flight(),
        }
    }

    pub fn start(&self) {
        if let Backend::Threaded { mailbox, .. } = &self.backend {
            mailbox.reopen();
        }
    }

    pub fn reset(&self) {
        self.shared.core.lock().unwrap().reset();
        self.shared.fic_handler.lock().unwrap().reset();
        self.shared.msc_handler.lock().unwrap().reset();
    }

    pub fn stop(&mut self) {
        self.shared.fic_handler.lock().unwrap().stop();
        self.shared.msc_handler.lock().unwrap().stop();
        if let Backend::Threaded { mailbox, running, handle } = &mut self.backend {
            mailbox.close();
            running.store(false, Ordering::Release);
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for OfdmDecoder {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fic_handler::NullFicHandler;
    use crate::msc_handler::NullMscHandler;
    use dab_ofdm::carrier_map::build_frequency_interleaver_map;

    fn make_decoder(threaded: bool) -> (OfdmDecoder, crossbeam_channel::Receiver<DabEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let map = build_frequency_interleaver_map(1536, 2048);
        let decoder = OfdmDecoder::new(
            2048,
            504,
            1536,
            76,
            3,
            map,
            EventEmitter::new(tx),
            Box::new(NullFicHandler::default()),
            Box::new(NullMscHandler::default()),
            threaded,
        );
        (decoder, rx)
    }

    #[test]
    fn get_snr_matches_known_ratio_within_one_db() {
        let t_u = 2048;
        let nb_carriers = 1536;
        let mut fft_out = vec![Complex32::new(0.1, 0.0); t_u];
        let quarter = nb_carriers as i32 / 4;
        for i in -quarter..quarter {
            let idx = (t_u as i32 + i).rem_euclid(t_u as i32) as usize;
            fft_out[idx] = Complex32::new(1.0, 0.0);
        }
        let snr = get_snr(&fft_out, t_u, nb_carriers);
        let expected = 20.0 * (1.0f32 / 0.1).log10();
        assert!((snr as f32 - expected).abs() <= 1.0, "got {snr}, expected near {expected}");
    }

    #[test]
    fn soft_bits_stay_within_signed_byte_range() {
        let (decoder, _rx) = make_decoder(false);
        let zeros = vec![Complex32::new(1.0, 0.0); 2048];
        decoder.process_block0(&zeros);
        let ts = vec![Complex32::new(1.0, 0.0); 2048 + 504];
        decoder.decode_fic_block(&ts, 1);
    }

    #[test]
    fn inline_decoder_never_reports_in_flight_work() {
        let (decoder, _rx) = make_decoder(false);
        assert_eq!(decoder.in_flight(), 0);
    }

    #[test]
    fn threaded_decoder_processes_posted_blocks() {
        let (mut decoder, _rx) = make_decoder(true);
        let zeros = vec![Complex32::new(1.0, 0.0); 2048];
        decoder.process_block0(&zeros);
        let ts = vec![Complex32::new(1.0, 0.0); 2048 + 504];
        for n in 1..4 {
            decoder.decode_fic_block(&ts, n);
        }
        for n in 4..76 {
            decoder.decode_msc_block(&ts, n);
        }
        decoder.stop();
    }
}
