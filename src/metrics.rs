// Prometheus instrumentation. All collectors are registered on one registry
// which is exposed on `/metrics`.
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub http_requests: IntCounterVec,
    pub uplinks_received: IntCounter,
    pub uplink_faults: IntCounterVec,
    pub subscriptions: IntCounter,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Requests served, by route"),
            &["route"],
        )?;
        let uplinks_received =
            IntCounter::new("uplinks_received_total", "Uplink readings installed")?;
        let uplink_faults = IntCounterVec::new(
            Opts::new("uplink_faults_total", "Uplinks that could not be processed"),
            &["kind"],
        )?;
        let subscriptions = IntCounter::new(
            "subscriptions_established_total",
            "Broker sessions opened, including the initial one",
        )?;

        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(uplinks_received.clone()))?;
        registry.register(Box::new(uplink_faults.clone()))?;
        registry.register(Box::new(subscriptions.clone()))?;

        Ok(Self { registry, http_requests, uplinks_received, uplink_faults, subscriptions })
    }

    /// Render every registered metric in the text exposition format.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.http_requests.with_label_values(&["count"]).inc();
        metrics.uplinks_received.inc();
        metrics.uplink_faults.with_label_values(&["invalid_json"]).inc();

        let body = metrics.encode();
        assert!(body.contains("http_requests_total{route=\"count\"} 1"));
        assert!(body.contains("uplinks_received_total 1"));
        assert!(body.contains("uplink_faults_total{kind=\"invalid_json\"} 1"));
        assert!(body.contains("subscriptions_established_total 0"));
    }
}
