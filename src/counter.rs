use std::sync::atomic::{AtomicU64, Ordering};

/// Count of requests served by this instance.
///
/// The first request observes `1`, matching the numbering the service has
/// always reported.
#[derive(Debug, Default)]
pub struct RequestCounter {
    served: AtomicU64,
}

impl RequestCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request and return its number. Every caller gets a
    /// distinct value.
    pub fn increment_and_get(&self) -> u64 {
        self.served.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }
}
