// The seam between the supervisor and whatever delivers uplinks. A broker
// hands out one `SubscriptionHandle` per session; once its stream closes the
// handle is spent and a new session has to be opened.
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::DeviceTarget;
use crate::error::BrokerError;

#[async_trait]
pub trait Broker: Send + Sync {
    /// Open an authenticated session and subscribe to the device's uplinks.
    async fn subscribe(&self, target: &DeviceTarget) -> Result<SubscriptionHandle, BrokerError>;
}

/// A live uplink subscription. Owned by the supervisor only.
#[derive(Debug)]
pub struct SubscriptionHandle {
    uplinks: mpsc::Receiver<Vec<u8>>,
    pump: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    /// Wrap a channel of raw uplink payloads. `pump` is the task feeding the
    /// channel, if any; it is aborted when the handle is dropped.
    pub fn new(uplinks: mpsc::Receiver<Vec<u8>>, pump: Option<JoinHandle<()>>) -> Self {
        Self { uplinks, pump }
    }

    /// Next raw payload, or `None` once the session has closed.
    pub async fn next_uplink(&mut self) -> Option<Vec<u8>> {
        self.uplinks.recv().await
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}
