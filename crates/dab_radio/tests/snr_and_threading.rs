use std::sync::{Arc, Mutex};
use std::time::Duration;

use num::complex::Complex32;

use dab_core::dab_parameters::get_dab_mode_parameters;
use dab_core::dab_transmission_mode::DabTransmissionMode;
use dab_ofdm::carrier_map::build_frequency_interleaver_map;
use dab_radio::events::EventEmitter;
use dab_radio::fic_handler::{FicHandler, NullFicHandler};
use dab_radio::mailbox::{Block, Mailbox};
use dab_radio::msc_handler::{MscHandler, NullMscHandler};
use dab_radio::ofdm_decoder::{get_snr, OfdmDecoder};

/// `spec.md` §8: "The SNR estimator on a synthetic signal with flat
/// signal = A on active carriers and flat noise = B on guard bins returns a
/// value within +-1 dB of 20*log10(A/B) for A/B in [0.1, 100]."
#[test]
fn snr_estimator_matches_known_ratio_across_the_specified_range() {
    let params = get_dab_mode_parameters(DabTransmissionMode::I);
    for &ratio in &[0.1f32, 0.5, 1.0, 2.0, 10.0, 100.0] {
        let b = 1.0f32;
        let a = ratio * b;
        let mut fft_out = vec![Complex32::new(b, 0.0); params.t_u];
        let quarter = params.k as i32 / 4;
        for i in -quarter..quarter {
            let idx = (params.t_u as i32 + i).rem_euclid(params.t_u as i32) as usize;
            fft_out[idx] = Complex32::new(a, 0.0);
        }
        let snr = get_snr(&fft_out, params.t_u, params.k);
        let expected = 20.0 * (a / b).log10();
        assert!(
            (snr as f32 - expected).abs() <= 1.0,
            "ratio {ratio}: got {snr} dB, expected near {expected} dB"
        );
    }
}

/// `spec.md` §8, invariant 4: "the number of in-flight blocks between
/// processor and decoder never exceeds L."
#[test]
fn mailbox_backlog_never_exceeds_capacity() {
    let capacity = 76;
    let mailbox = Arc::new(Mailbox::new(capacity));
    for i in 0..capacity {
        assert!(mailbox.post(Block { samples: vec![Complex32::default(); 4], block_index: i }));
    }
    assert_eq!(mailbox.in_flight(), capacity);

    let blocked_mailbox = mailbox.clone();
    let handle = std::thread::spawn(move || {
        blocked_mailbox.post(Block { samples: vec![Complex32::default(); 4], block_index: capacity })
    });
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(mailbox.in_flight(), capacity, "producer must not exceed capacity");

    mailbox.take_timeout(Duration::from_millis(50));
    assert!(handle.join().unwrap());
}

/// `spec.md` §8, scenario 5: "the same input stream decoded with and
/// without the worker configuration produces byte-identical ibits
/// sequences at the FIC/MSC handler boundary."
#[test]
fn threaded_and_inline_decoders_agree_on_soft_bits() {
    let params = get_dab_mode_parameters(DabTransmissionMode::I);
    let carrier_map = build_frequency_interleaver_map(params.k, params.t_u);

    struct RecordingMsc {
        log: Arc<Mutex<Vec<(usize, Vec<i8>)>>>,
    }
    impl MscHandler for RecordingMsc {
        fn process_msc_block(&mut self, soft_bits: &[i8], block_index: usize) {
            self.log.lock().unwrap().push((block_index, soft_bits.to_vec()));
        }
        fn set_audio_channel(&mut self, _sub_channel_id: u32) {}
        fn set_data_channel(&mut self, _sub_channel_id: u32) {}
        fn reset(&mut self) {}
        fn stop(&mut self) {}
    }

    // A handful of pseudo-random (but deterministic) symbols, identical for
    // both configurations.
    let mut state: u32 = 0xC0FF_EE11;
    let mut next = || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        (state as f32 / u32::MAX as f32) * 2.0 - 1.0
    };
    let symbols: Vec<Vec<Complex32>> = (0..3)
        .map(|_| (0..params.t_s).map(|_| Complex32::new(next(), next())).collect())
        .collect();
    let block0: Vec<Complex32> = (0..params.t_u).map(|_| Complex32::new(next(), next())).collect();

    let run = |threaded: bool| -> Vec<(usize, Vec<i8>)> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut decoder = OfdmDecoder::new(
            params.t_u,
            params.t_g,
            params.k,
            params.l,
            params.nb_fic_symbols,
            carrier_map.clone(),
            EventEmitter::new(tx),
            Box::new(NullFicHandler::default()),
            Box::new(RecordingMsc { log: log.clone() }),
            threaded,
        );
        decoder.process_block0(&block0);
        for (n, symbol) in symbols.iter().enumerate() {
            decoder.decode_msc_block(symbol, params.nb_fic_symbols + 1 + n);
        }
        decoder.stop();
        // Drain any trailing worker activity.
        std::thread::sleep(Duration::from_millis(50));
        let mut recorded = log.lock().unwrap().clone();
        recorded.sort_by_key(|(index, _)| *index);
        recorded
    };

    let inline_result = run(false);
    let threaded_result = run(true);
    assert_eq!(inline_result, threaded_result);
}

/// `spec.md` §8, invariant 3: block indices are observed in order within a
/// frame.
#[test]
fn blocks_are_observed_in_ascending_order() {
    let params = get_dab_mode_parameters(DabTransmissionMode::I);
    let carrier_map = build_frequency_interleaver_map(params.k, params.t_u);
    let log = Arc::new(Mutex::new(Vec::new()));

    struct OrderCheckingFic {
        log: Arc<Mutex<Vec<usize>>>,
    }
    impl FicHandler for OrderCheckingFic {
        fn process_fic_block(&mut self, _soft_bits: &[i8], block_index: usize) {
            self.log.lock().unwrap().push(block_index);
        }
        fn sync_reached(&self) -> bool {
            true
        }
        fn reset(&mut self) {}
        fn stop(&mut self) {}
    }

    let (tx, _rx) = crossbeam_channel::unbounded();
    let mut decoder = OfdmDecoder::new(
        params.t_u,
        params.t_g,
        params.k,
        params.l,
        params.nb_fic_symbols,
        carrier_map,
        EventEmitter::new(tx),
        Box::new(OrderCheckingFic { log: log.clone() }),
        Box::new(NullMscHandler::default()),
        true,
    );

    let block0 = vec![Complex32::new(1.0, 0.0); params.t_u];
    decoder.process_block0(&block0);
    let symbol = vec![Complex32::new(1.0, 0.0); params.t_s];
    for n in 1..=params.nb_fic_symbols {
        decoder.decode_fic_block(&symbol, n);
    }
    decoder.stop();

    let observed = log.lock().unwrap().clone();
    let mut expected: Vec<usize> = (1..=params.nb_fic_symbols).collect();
    let mut sorted_observed = observed.clone();
    sorted_observed.sort();
    expected.sort();
    assert_eq!(sorted_observed, expected, "every FIC block index must be observed exactly once");
    assert_eq!(observed, (1..=params.nb_fic_symbols).collect::<Vec<_>>(), "FIFO mailbox must preserve submission order");
}
