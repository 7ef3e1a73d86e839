/// Outbound signals to the UI (`spec.md` §6, "Event surface").
///
/// Collapsed from four separate signals into one enum delivered over a
/// non-blocking channel (`spec.md` §9, "Signal emission... must not block
/// the processor").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DabEvent {
    SetSynced(bool),
    SyncLost,
    NoSignalFound,
    ShowSnr(i32),
}

/// Fire-and-forget emitter over an unbounded `crossbeam_channel`. Dropping a
/// duplicate `SetSynced(true)` is acceptable (`spec.md` §9); a disconnected
/// receiver is likewise swallowed rather than propagated, since losing the
/// UI must never stall the processor loop.
pub struct EventEmitter {
    sender: crossbeam_channel::Sender<DabEvent>,
}

impl EventEmitter {
    pub fn new(sender: crossbeam_channel::Sender<DabEvent>) -> Self {
        Self { sender }
    }

    pub fn emit(&self, event: DabEvent) {
        let _ = self.sender.send(event);
    }
}
