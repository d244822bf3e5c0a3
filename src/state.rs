// Shared handles injected into every HTTP handler through an `Extension`
// layer. The store and counter are the only mutable state the handlers and
// the supervisor have in common.
use std::sync::Arc;

use crate::config::DeviceTarget;
use crate::counter::RequestCounter;
use crate::metrics::Metrics;
use crate::store::LatestValueStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LatestValueStore>,
    pub counter: Arc<RequestCounter>,
    pub metrics: Metrics,
    pub target: Arc<DeviceTarget>,
}

impl AppState {
    pub fn new(store: Arc<LatestValueStore>, metrics: Metrics, target: DeviceTarget) -> Self {
        Self {
            store,
            counter: Arc::new(RequestCounter::new()),
            metrics,
            target: Arc::new(target),
        }
    }

    /// Count one served request against `route`.
    pub fn record_request(&self, route: &str) -> u64 {
        self.metrics.http_requests.with_label_values(&[route]).inc();
        self.counter.increment_and_get()
    }
}
