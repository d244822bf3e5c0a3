// Error taxonomy for the relay. Configuration errors are handled by clap
// before anything here is constructed; the composition root in `server.rs`
// wraps the rest in `anyhow`.
use thiserror::Error;

/// Failure to open or keep a broker session.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("could not connect to broker at {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("broker refused the session: {0}")]
    Refused(String),

    #[error("could not subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("no acknowledgement from broker within {0:?}")]
    Timeout(std::time::Duration),
}

/// An inbound uplink that does not carry a usable temperature.
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("uplink is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("uplink has no temperature field")]
    MissingTemperature,

    #[error("temperature field is not a number: {0}")]
    NotNumeric(String),
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("initial subscription failed: {0}")]
    Establish(#[source] BrokerError),
}

impl MessageError {
    /// Short label used for the fault counter.
    pub fn as_label(&self) -> &'static str {
        match self {
            MessageError::InvalidJson(_) => "invalid_json",
            MessageError::MissingTemperature => "missing_temperature",
            MessageError::NotNumeric(_) => "not_numeric",
        }
    }
}
