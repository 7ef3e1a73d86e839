use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use num::complex::Complex32;

use dab_core::dab_parameters::DabModeParameters;
use dab_core::error::ReceiverError;
use dab_core::sync_state::SyncState;

use crate::events::{DabEvent, EventEmitter};
use crate::phase_synchronizer::{PhaseSynchronizer, NO_CONFIDENT_ESTIMATE};
use crate::sample_reader::SampleReader;
use crate::ofdm_decoder::OfdmDecoder;

/// Width of the short averaging window used to detect the null dip
/// (`spec.md` §4.4).
const C_LEVEL_SIZE: usize = 50;
/// Capacity of the sliding envelope history, a power of two so the index can
/// be masked rather than taken modulo (`spec.md` §4.4).
const ENVELOPE_RING_SIZE: usize = 32768;
const NULL_LOW_THRESHOLD: f32 = 0.40;
const NULL_HIGH_THRESHOLD: f32 = 0.75;
const COARSE_OFFSET_LIMIT_HZ: f64 = 35_000.0;
const SCAN_FAILURE_LIMIT: u32 = 5;
const FINE_CORRECTOR_GAIN: f64 = 0.1;

/// Explicit tagged state replacing the original goto-label state machine
/// (`spec.md` §9, "Control flow via labels and jumps"). One variant per row
/// of the transition table in `spec.md` §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Initing,
    SyncOnNull,
    SyncOnEndNull,
    SyncOnPhase,
    Block0,
    DataBlocks,
    NewOffset,
}

/// Sliding short-window average of `|sample|` backed by a masked power-of-two
/// ring (`spec.md` §4.4, "sliding envelope buffer size is 32768").
struct NullEnvelope {
    ring: Vec<f32>,
    mask: usize,
    write_pos: usize,
    window: usize,
    window_sum: f32,
}

impl NullEnvelope {
    fn new(window: usize) -> Self {
        assert!(ENVELOPE_RING_SIZE.is_power_of_two());
        Self {
            ring: vec![0.0; ENVELOPE_RING_SIZE],
            mask: ENVELOPE_RING_SIZE - 1,
            write_pos: 0,
            window,
            window_sum: 0.0,
        }
    }

    fn reset(&mut self) {
        for value in self.ring.iter_mut() {
            *value = 0.0;
        }
        self.write_pos = 0;
        self.window_sum = 0.0;
    }

    /// Pushes one magnitude sample and returns the updated `cLevel`
    /// (the mean of the last `window` pushes).
    fn push(&mut self, magnitude: f32) -> f32 {
        let expiring_pos = (self.write_pos + self.ring.len() - self.window) & self.mask;
        let expiring = self.ring[expiring_pos];
        self.window_sum += magnitude - expiring;
        self.ring[self.write_pos & self.mask] = magnitude;
        self.write_pos = (self.write_pos + 1) & self.mask;
        self.window_sum / self.window as f32
    }
}

/// Inbound control-surface operations (`spec.md` §6). Delivered over a
/// channel rather than shared atomics for the operations that must take
/// effect atomically at a frame boundary (`spec.md` §5, "relaxed
/// visibility... hints that take effect at the next frame boundary").
enum ControlCommand {
    Stop,
    Reset,
    ResetMsc,
    SetScanMode(bool),
    CoarseCorrectorOn,
    CoarseCorrectorOff,
}

/// Cloneable remote control for a running [`DabProcessor`]
/// (`spec.md` §6, "Control surface").
#[derive(Clone)]
pub struct ProcessorHandle {
    control_tx: crossbeam_channel::Sender<ControlCommand>,
    running: Arc<AtomicBool>,
}

impl ProcessorHandle {
    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    /// Flips `running` false and wakes the processor; `run()` returns once
    /// it observes the flag (`spec.md` §5, §7).
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self.control_tx.send(ControlCommand::Stop);
    }

    pub fn reset(&self) {
        let _ = self.control_tx.send(ControlCommand::Reset);
    }

    pub fn reset_msc(&self) {
        let _ = self.control_tx.send(ControlCommand::ResetMsc);
    }

    pub fn set_scan_mode(&self, on: bool) {
        let _ = self.control_tx.send(ControlCommand::SetScanMode(on));
    }

    pub fn coarse_corrector_on(&self) {
        let _ = self.control_tx.send(ControlCommand::CoarseCorrectorOn);
    }

    pub fn coarse_corrector_off(&self) {
        let _ = self.control_tx.send(ControlCommand::CoarseCorrectorOff);
    }
}

/// Top-level driver owning the sync state machine (`spec.md` §4.4, §2 item
/// 6). Runs the pipeline end to end: reads samples, finds the null and the
/// cyclic-prefix boundary, tracks the fine/coarse frequency offset, and
/// feeds the OFDM decoder.
pub struct DabProcessor {
    params: DabModeParameters,
    reader: SampleReader,
    phase_sync: PhaseSynchronizer,
    decoder: OfdmDecoder,
    events: EventEmitter,
    control_rx: crossbeam_channel::Receiver<ControlCommand>,
    running: Arc<AtomicBool>,

    state: ProcessorState,
    sync: SyncState,
    envelope: NullEnvelope,
    scan_mode: bool,
    attempts: u32,

    pending_block0: Option<Vec<Complex32>>,
    pending_freq_corr: Complex32,
}

impl DabProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: DabModeParameters,
        reader: SampleReader,
        phase_sync: PhaseSynchronizer,
        decoder: OfdmDecoder,
        events: EventEmitter,
        running: Arc<AtomicBool>,
    ) -> (Self, ProcessorHandle) {
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let handle = ProcessorHandle { control_tx, running: running.clone() };
        let processor = Self {
            params,
            reader,
            phase_sync,
            decoder,
            events,
            control_rx,
            running,
            state: ProcessorState::Initing,
            sync: SyncState::new(),
            envelope: NullEnvelope::new(C_LEVEL_SIZE),
            scan_mode: false,
            attempts: 0,
            pending_block0: None,
            pending_freq_corr: Complex32::default(),
        };
        (processor, handle)
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync
    }

    /// Drives the state machine until the sample reader raises `Stopped` or
    /// an external `stop()` is observed. Mirrors `spec.md` §7: a `Stopped`
    /// error unwinds the loop and shuts the decoder/handlers down in order.
    pub fn run(&mut self) -> Result<(), ReceiverError> {
        loop {
            self.drain_control_commands();
            if !self.running.load(Ordering::Acquire) {
                break;
            }

            match self.step() {
                Ok(()) => {}
                Err(ReceiverError::Stopped) => break,
                Err(ReceiverError::SyncLost) => unreachable!("SyncLost is handled inside step()"),
            }
        }
        self.decoder.stop();
        Ok(())
    }

    fn drain_control_commands(&mut self) {
        while let Ok(command) = self.control_rx.try_recv() {
            match command {
                ControlCommand::Stop => {}
                ControlCommand::Reset => {
                    self.state = ProcessorState::Initing;
                    self.sync = SyncState::new();
                    self.attempts = 0;
                    self.decoder.reset();
                    self.reader.reset_buffer();
                }
                ControlCommand::ResetMsc => self.decoder.reset(),
                ControlCommand::SetScanMode(on) => {
                    self.scan_mode = on;
                    self.attempts = 0;
                }
                ControlCommand::CoarseCorrectorOn => {
                    self.sync.coarse_offset_hz = 0.0;
                }
                ControlCommand::CoarseCorrectorOff => {
                    self.reader
                        .device_mut()
                        .set_offset(self.sync.coarse_offset_hz as i32);
                    self.sync.f2_correction = false;
                }
            }
        }
    }

    fn step(&mut self) -> Result<(), ReceiverError> {
        match self.state {
            ProcessorState::Initing => self.step_initing(),
            ProcessorState::SyncOnNull => self.step_sync_on_null(),
            ProcessorState::SyncOnEndNull => self.step_sync_on_end_null(),
            ProcessorState::SyncOnPhase => self.step_sync_on_phase(),
            ProcessorState::Block0 => self.step_block0(),
            ProcessorState::DataBlocks => self.step_data_blocks(),
            ProcessorState::NewOffset => self.step_new_offset(),
        }
    }

    fn step_initing(&mut self) -> Result<(), ReceiverError> {
        let warmup_len = self.params.t_f / 5;
        let mut warmup = vec![Complex32::default(); warmup_len];
        self.reader.get_samples(&mut warmup, self.sync.total_offset_hz())?;

        self.envelope.reset();
        for _ in 0..C_LEVEL_SIZE {
            let sample = self.reader.get_sample(self.sync.total_offset_hz())?;
            self.envelope.push(sample.norm());
        }

        self.state = ProcessorState::SyncOnNull;
        Ok(())
    }

    fn step_sync_on_null(&mut self) -> Result<(), ReceiverError> {
        self.events.emit(DabEvent::SetSynced(false));
        let mut counter: u64 = 0;
        loop {
            let sample = self.reader.get_sample(self.sync.total_offset_hz())?;
            let c_level = self.envelope.push(sample.norm());
            counter += 1;

            if c_level < NULL_LOW_THRESHOLD * self.reader.s_level() {
                self.state = ProcessorState::SyncOnEndNull;
                return Ok(());
            }
            if counter > self.params.t_f as u64 {
                self.state = ProcessorState::Initing;
                if self.scan_mode {
                    self.attempts += 1;
                    if self.attempts % SCAN_FAILURE_LIMIT == 0 {
                        self.events.emit(DabEvent::NoSignalFound);
                        self.attempts = 0;
                    }
                }
                return Ok(());
            }
        }
    }

    fn step_sync_on_end_null(&mut self) -> Result<(), ReceiverError> {
        let mut counter: u64 = 0;
        let limit = self.params.t_null as u64 + 50;
        loop {
            let sample = self.reader.get_sample(self.sync.total_offset_hz())?;
            let c_level = self.envelope.push(sample.norm());
            counter += 1;

            if c_level > NULL_HIGH_THRESHOLD * self.reader.s_level() {
                self.state = ProcessorState::SyncOnPhase;
                return Ok(());
            }
            if counter > limit {
                self.state = ProcessorState::Initing;
                return Ok(());
            }
        }
    }

    fn step_sync_on_phase(&mut self) -> Result<(), ReceiverError> {
        let mut window = vec![Complex32::default(); self.params.t_u];
        self.reader.get_samples(&mut window, self.sync.total_offset_hz())?;

        let start_index = self.phase_sync.find_index(&window);
        if start_index < 0 {
            self.state = ProcessorState::Initing;
            if !self.sync.f2_correction {
                self.events.emit(DabEvent::SyncLost);
            }
            return Ok(());
        }

        let start_index = start_index as usize;
        let tail_len = self.params.t_u - start_index;
        let mut block0 = vec![Complex32::default(); self.params.t_u];
        block0[..tail_len].copy_from_slice(&window[start_index..]);
        self.reader.get_samples(&mut block0[tail_len..], self.sync.total_offset_hz())?;

        self.pending_block0 = Some(block0);
        self.state = ProcessorState::Block0;
        Ok(())
    }

    fn step_block0(&mut self) -> Result<(), ReceiverError> {
        let block0 = self
            .pending_block0
            .take()
            .expect("Block0 state entered without a pending window");

        self.events.emit(DabEvent::SetSynced(true));
        self.sync.synced = true;
        self.sync.total_frames_synced += 1;

        self.decoder.process_block0(&block0);
        self.sync.f2_correction = !self.decoder.sync_reached();

        if self.sync.f2_correction {
            let estimate = self.phase_sync.estimate_carrier_offset(&block0);
            if estimate != NO_CONFIDENT_ESTIMATE {
                self.sync.coarse_offset_hz += (estimate as f64) * self.params.carrier_diff_hz;
                self.sync.clamp_coarse_offset(COARSE_OFFSET_LIMIT_HZ);
            }
        }

        self.attempts = 0;
        self.state = ProcessorState::DataBlocks;
        Ok(())
    }

    fn step_data_blocks(&mut self) -> Result<(), ReceiverError> {
        let mut freq_corr = Complex32::default();
        let mut block = vec![Complex32::default(); self.params.t_s];

        for n in 1..self.params.l {
            self.reader.get_samples(&mut block, self.sync.total_offset_hz())?;

            for i in self.params.t_u..self.params.t_s {
                freq_corr += block[i] * block[i - self.params.t_u].conj();
            }

            if n <= self.params.nb_fic_symbols {
                self.decoder.decode_fic_block(&block, n);
            } else {
                self.decoder.decode_msc_block(&block, n);
            }
        }

        self.pending_freq_corr = freq_corr;
        self.state = ProcessorState::NewOffset;
        Ok(())
    }

    fn step_new_offset(&mut self) -> Result<(), ReceiverError> {
        let arg = self.pending_freq_corr.arg() as f64;
        self.sync.fine_corrector_hz += FINE_CORRECTOR_GAIN * (arg / (2.0 * PI)) * self.params.carrier_diff_hz;

        let mut null_block = vec![Complex32::default(); self.params.t_null];
        self.reader.get_samples(&mut null_block, self.sync.total_offset_hz())?;

        self.sync.normalize_fine_corrector(self.params.carrier_diff_hz);

        // Locked: skip the null search and re-enter via the cyclic-prefix
        // correlator directly (`spec.md` §4.4, NewOffset -> SyncOnPhase).
        self.state = ProcessorState::SyncOnPhase;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::VirtualInput;
    use crate::fic_handler::NullFicHandler;
    use crate::msc_handler::NullMscHandler;
    use dab_core::dab_parameters::get_dab_mode_parameters;
    use dab_core::dab_transmission_mode::DabTransmissionMode;
    use dab_ofdm::carrier_map::build_frequency_interleaver_map;
    use dab_ofdm::phase_reference_symbol::build_phase_reference_symbol_fft;

    /// Emits one full synthetic Mode-I frame repeatedly: a deep null,
    /// silence, then the time-domain phase reference symbol followed by
    /// `L-1` flat symbols (cyclic prefix copied from the tail of each).
    struct SyntheticFrameDevice {
        frame: Vec<Complex32>,
        position: usize,
        stopped: bool,
    }

    impl SyntheticFrameDevice {
        fn new(params: &DabModeParameters) -> Self {
            let mut planner = rustfft::FftPlanner::new();
            let ifft = planner.plan_fft_inverse(params.t_u);
            let mut prs_fft = vec![Complex32::default(); params.t_u];
            build_phase_reference_symbol_fft(&mut prs_fft, DabTransmissionMode::I);
            let mut prs_time = prs_fft.clone();
            ifft.process(&mut prs_time);
            let scale = 1.0 / params.t_u as f32;
            prs_time.iter_mut().for_each(|c| *c *= scale);

            let mut frame = Vec::new();
            frame.extend(vec![Complex32::default(); params.t_null]);
            let mut block0 = vec![Complex32::default(); params.t_s];
            block0[params.t_g..].copy_from_slice(&prs_time);
            block0[..params.t_g].copy_from_slice(&prs_time[prs_time.len() - params.t_g..]);
            frame.extend(block0);

            for _ in 1..params.l {
                let mut symbol = vec![Complex32::default(); params.t_s];
                symbol[params.t_g..].copy_from_slice(&prs_time);
                symbol[..params.t_g].copy_from_slice(&prs_time[prs_time.len() - params.t_g..]);
                frame.extend(symbol);
            }

            Self { frame, position: 0, stopped: false }
        }
    }

    impl VirtualInput for SyntheticFrameDevice {
        fn read_samples(&mut self, dst: &mut [Complex32]) -> usize {
            if self.stopped {
                return 0;
            }
            for slot in dst.iter_mut() {
                *slot = self.frame[self.position % self.frame.len()];
                self.position += 1;
            }
            dst.len()
        }
        fn reset_buffer(&mut self) {}
        fn get_offset(&self) -> i32 {
            0
        }
        fn set_offset(&mut self, _offset_hz: i32) {}
        fn bit_depth(&self) -> u32 {
            16
        }
    }

    fn make_processor() -> (DabProcessor, ProcessorHandle, crossbeam_channel::Receiver<DabEvent>) {
        let params = get_dab_mode_parameters(DabTransmissionMode::I);
        let device = SyntheticFrameDevice::new(&params);
        let running = Arc::new(AtomicBool::new(true));
        let reader = SampleReader::new(Box::new(device), params.sample_rate_hz, running.clone());
        let phase_sync = PhaseSynchronizer::new(DabTransmissionMode::I, params.t_u, params.k, 300, 504);
        let carrier_map = build_frequency_interleaver_map(params.k, params.t_u);
        let (tx, rx) = crossbeam_channel::unbounded();
        let decoder = OfdmDecoder::new(
            params.t_u,
            params.t_g,
            params.k,
            params.l,
            params.nb_fic_symbols,
            carrier_map,
            EventEmitter::new(tx.clone()),
            Box::new(NullFicHandler::default()),
            Box::new(NullMscHandler::default()),
            false,
        );
        let (processor, handle) =
            DabProcessor::new(params, reader, phase_sync, decoder, EventEmitter::new(tx), running);
        (processor, handle, rx)
    }

    #[test]
    fn cold_start_reaches_synced_state() {
        let (mut processor, _handle, rx) = make_processor();
        for _ in 0..12 {
            processor.step().unwrap();
            if processor.sync_state().synced {
                break;
            }
        }
        assert!(processor.sync_state().synced, "expected sync to be reached on a clean synthetic frame");
        let events: Vec<DabEvent> = rx.try_iter().collect();
        assert!(events.contains(&DabEvent::SetSynced(true)));
    }

    #[test]
    fn stop_handle_unwinds_run_loop() {
        let (mut processor, handle, _rx) = make_processor();
        handle.stop();
        let result = processor.run();
        assert!(result.is_ok());
    }
}
