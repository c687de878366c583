use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Offset;

/// Position of live delivery in the log.
///
/// Holds the exclusive upper bound of what has been broadcast: one past the
/// offset of the most recently broadcast event, or `0` before anything was
/// broadcast. A client registering when the cursor reads `n` replays
/// `[earliest, n)` from the log and receives `n..` live.
///
/// Only the fan-out consumer advances the cursor, through
/// [`ChannelRegistry::broadcast`](crate::registry::ChannelRegistry::broadcast).
#[derive(Debug, Default)]
pub struct LiveCursor(AtomicU64);

impl LiveCursor {
    /// Sentinel value for "start of log"
    pub const START: Offset = 0;

    pub fn new() -> Self {
        Self(AtomicU64::new(Self::START))
    }

    /// Replay boundary for a client registering now.
    pub fn load(&self) -> Offset {
        self.0.load(Ordering::Acquire)
    }

    /// Offset of the most recently broadcast event.
    pub fn last_broadcast(&self) -> Option<Offset> {
        self.load().checked_sub(1)
    }

    /// Mark `offset` as broadcast. Never moves the cursor backwards.
    pub(crate) fn advance_past(&self, offset: Offset) {
        self.0.fetch_max(offset.saturating_add(1), Ordering::AcqRel);
    }
}
