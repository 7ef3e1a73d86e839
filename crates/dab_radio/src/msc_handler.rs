/// Downstream Main Service Channel consumer (`spec.md` §6).
///
/// Blocks `4..L-1` of every frame are routed here. Channel setup operations
/// are control-surface delegations, never called from the hot decode path.
pub trait MscHandler: Send {
    fn process_msc_block(&mut self, soft_bits: &[i8], block_index: usize);

    fn set_audio_channel(&mut self, sub_channel_id: u32);
    fn set_data_channel(&mut self, sub_channel_id: u32);
    fn reset(&mut self);
    fn stop(&mut self);
}

#[derive(Default)]
pub struct NullMscHandler {
    pub blocks_received: usize,
}

impl MscHandler for NullMscHandler {
    fn process_msc_block(&mut self, _soft_bits: &[i8], _block_index: usize) {
        self.blocks_received += 1;
    }

    fn set_audio_channel(&mut self, _sub_channel_id: u32) {}
    fn set_data_channel(&mut self, _sub_channel_id: u32) {}

    fn reset(&mut self) {
        self.blocks_received = 0;
    }

    fn stop(&mut self) {}
}
