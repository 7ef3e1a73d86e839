/// Downstream Fast Information Channel consumer (`spec.md` §6).
///
/// Blocks `1..=3` of every frame are routed here. `sync_reached` is polled
/// once per frame (`spec.md` §4.4, Block_0) to decide whether the coarse
/// frequency corrector should keep adjusting (`f2Correction`).
pub trait FicHandler: Send {
    fn process_fic_block(&mut self, soft_bits: &[i8], block_index: usize);

    /// True once the ensemble configuration has been fully parsed from the
    /// FIC stream. Queried, never computed, by the core.
    fn sync_reached(&self) -> bool;

    fn reset(&mut self);
    fn stop(&mut self);
}

/// Minimal handler used when no real FIC decoder is wired in: accepts every
/// block and reports sync reached immediately, which keeps the coarse
/// corrector frozen (`f2Correction = false`) after the very first Block 0.
#[derive(Default)]
pub struct NullFicHandler {
    pub blocks_received: usize,
}

impl FicHandler for NullFicHandler {
    fn process_fic_block(&mut self, _soft_bits: &[i8], _block_index: usize) {
        self.blocks_received += 1;
    }

    fn sync_reached(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        self.blocks_received = 0;
    }

    fn stop(&mut self) {}
}
