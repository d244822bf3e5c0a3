// Decoding of The Things Network uplink messages into `Reading`s. Only the
// `temperature` payload field and the gateway metadata time are of interest;
// everything else in the uplink is ignored.
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::MessageError;

const TEMPERATURE_FIELD: &str = "temperature";

/// One temperature observation. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub temperature: f64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawUplink {
    #[serde(default)]
    payload_fields: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    metadata: Option<RawMetadata>,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    time: Option<String>,
}

impl Reading {
    pub fn new(temperature: f64, observed_at: DateTime<Utc>) -> Self {
        Self { temperature, observed_at }
    }

    /// Build a reading from a raw uplink payload.
    pub fn from_uplink(payload: &[u8]) -> Result<Self, MessageError> {
        let raw: RawUplink = serde_json::from_slice(payload)?;

        let value = raw
            .payload_fields
            .get(TEMPERATURE_FIELD)
            .ok_or(MessageError::MissingTemperature)?;
        let temperature = value
            .as_f64()
            .ok_or_else(|| MessageError::NotNumeric(value.to_string()))?;

        let observed_at = parse_time(raw.metadata.as_ref().and_then(|m| m.time.as_deref()));
        Ok(Self::new(temperature, observed_at))
    }
}

// Falls back to the receive time when the gateway did not stamp the uplink.
fn parse_time(val: Option<&str>) -> DateTime<Utc> {
    val.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}
