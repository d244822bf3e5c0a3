// Owns the broker subscription and keeps the latest-value store current.
//
// Faults stay inside this task. A malformed uplink is logged and skipped. A
// panic while decoding, or the uplink stream closing, discards the session
// and opens a new one after a backoff delay. Nothing here ever reaches the
// HTTP side except through the store.
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::broker::{Broker, SubscriptionHandle};
use crate::config::DeviceTarget;
use crate::error::{MessageError, SupervisorError};
use crate::metrics::Metrics;
use crate::reading::Reading;
use crate::store::LatestValueStore;

type Decoder = fn(&[u8]) -> Result<Reading, MessageError>;

enum Outcome {
    Installed,
    Skipped,
    Panicked,
}

pub struct SubscriptionSupervisor {
    broker: Arc<dyn Broker>,
    target: DeviceTarget,
    store: Arc<LatestValueStore>,
    metrics: Metrics,
    backoff: BackoffPolicy,
    decode: Decoder,
}

impl SubscriptionSupervisor {
    pub fn new(
        broker: Arc<dyn Broker>,
        target: DeviceTarget,
        store: Arc<LatestValueStore>,
        metrics: Metrics,
    ) -> Self {
        Self {
            broker,
            target,
            store,
            metrics,
            backoff: BackoffPolicy::default(),
            decode: Reading::from_uplink,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    #[cfg(test)]
    fn with_decoder(mut self, decode: Decoder) -> Self {
        self.decode = decode;
        self
    }

    /// Open the first session. Unlike later reconnects, a failure here is
    /// fatal to the caller.
    pub async fn establish(&self) -> Result<SubscriptionHandle, SupervisorError> {
        let handle = self
            .broker
            .subscribe(&self.target)
            .await
            .map_err(SupervisorError::Establish)?;
        self.metrics.subscriptions.inc();
        Ok(handle)
    }

    /// Consume uplinks until `cancel` fires, re-establishing the session
    /// whenever it is lost.
    pub async fn run(self, mut handle: SubscriptionHandle, cancel: CancellationToken) {
        info!(app_id = %self.target.app_id, dev_id = %self.target.dev_id, "supervisor started");

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = handle.next_uplink() => next,
            };

            match next {
                Some(payload) => match self.process(&payload) {
                    Outcome::Installed | Outcome::Skipped => continue,
                    Outcome::Panicked => warn!("discarding session after decoder panic"),
                },
                None => warn!("uplink stream closed"),
            }

            drop(handle);
            handle = match self.resubscribe(&cancel).await {
                Some(h) => h,
                None => break,
            };
        }

        info!("supervisor stopped");
    }

    fn process(&self, payload: &[u8]) -> Outcome {
        let decode = self.decode;
        match panic::catch_unwind(AssertUnwindSafe(|| decode(payload))) {
            Ok(Ok(reading)) => {
                self.store.set(reading);
                self.metrics.uplinks_received.inc();
                info!(
                    temperature = reading.temperature,
                    observed_at = %reading.observed_at,
                    "received uplink"
                );
                Outcome::Installed
            }
            Ok(Err(e)) => {
                self.metrics.uplink_faults.with_label_values(&[e.as_label()]).inc();
                warn!(error = %e, "skipping malformed uplink");
                Outcome::Skipped
            }
            Err(_) => {
                self.metrics.uplink_faults.with_label_values(&["panic"]).inc();
                error!("decoder panicked on uplink");
                Outcome::Panicked
            }
        }
    }

    // Returns `None` only when cancelled.
    async fn resubscribe(&self, cancel: &CancellationToken) -> Option<SubscriptionHandle> {
        let mut attempt = 0;
        loop {
            let delay = self.backoff.next(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "resubscribing");

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => return None,
                result = self.broker.subscribe(&self.target) => result,
            };

            match result {
                Ok(handle) => {
                    self.metrics.subscriptions.inc();
                    info!(attempt, "resubscribed");
                    return Some(handle);
                }
                Err(e) => {
                    error!(attempt, error = %e, "resubscription failed");
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}
