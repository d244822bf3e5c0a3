// Single-slot cache holding the most recent reading. The supervisor is the
// only writer; HTTP handlers read it as often as they like. Reads copy the
// reading out and never drain the slot, so concurrent requests all see a
// value instead of racing each other for broker messages.
use std::sync::RwLock;

use crate::reading::Reading;

#[derive(Debug, Default)]
pub struct LatestValueStore {
    slot: RwLock<Option<Reading>>,
}

impl LatestValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored reading. Last write wins.
    pub fn set(&self, reading: Reading) {
        // A poisoned lock only means a previous holder panicked; the slot
        // itself is a plain `Copy` value and is never half-written.
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(reading);
    }

    /// The latest reading, or `None` before the first one arrives.
    pub fn get(&self) -> Option<Reading> {
        *self.slot.read().unwrap_or_else(|e| e.into_inner())
    }
}
