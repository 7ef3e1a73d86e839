use thiserror::Error;

/// The two failure kinds the processing core can encounter.
///
/// `Stopped` unwinds the processor's main loop entirely and is
/// non-recoverable within a run. `SyncLost` is a soft failure: the sync
/// state machine falls back to `Initing` and the run continues.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverError {
    /// The sample reader refuses to deliver more samples: external stop
    /// requested, or the upstream device disappeared.
    #[error("sample reader stopped")]
    Stopped,
    /// Frame or carrier synchronization was lost; the state machine resets
    /// to `Initing` and will attempt to reacquire sync.
    #[error("synchronization lost")]
    SyncLost,
}
