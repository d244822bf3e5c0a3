// The Things Network MQTT broker. Each `subscribe` opens a fresh `rumqttc`
// session authenticated with the application ID and access key, waits until
// the broker has acknowledged both the connection and the subscription, and
// then hands the event loop to a background pump that forwards uplink
// payloads to the supervisor. Any event loop error ends the pump, which
// closes the subscription's channel; reconnecting is the supervisor's call.
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Incoming, MqttOptions, QoS,
    SubscribeReasonCode,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::broker::{Broker, SubscriptionHandle};
use crate::config::{Config, DeviceTarget};
use crate::error::BrokerError;

const UPLINK_BUFFER: usize = 64;
const KEEP_ALIVE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct MqttBroker {
    host: String,
    port: u16,
    client_name: String,
    access_key: String,
    connect_timeout: Duration,
}

impl MqttBroker {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            host: cfg.mqtt_host.clone(),
            port: cfg.mqtt_port,
            client_name: cfg.client_name.clone(),
            access_key: cfg.app_access_key.clone(),
            connect_timeout: cfg.connect_timeout(),
        }
    }

    fn options(&self, target: &DeviceTarget) -> MqttOptions {
        let client_id = format!(
            "{}-{}-{}",
            self.client_name,
            target.dev_id,
            Utc::now().timestamp_millis()
        );
        let mut options = MqttOptions::new(client_id, &self.host, self.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_credentials(&target.app_id, &self.access_key);
        options
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Topic carrying the uplinks of one device.
pub fn uplink_topic(target: &DeviceTarget) -> String {
    format!("{}/devices/{}/up", target.app_id, target.dev_id)
}

#[async_trait]
impl Broker for MqttBroker {
    async fn subscribe(&self, target: &DeviceTarget) -> Result<SubscriptionHandle, BrokerError> {
        let topic = uplink_topic(target);
        info!(broker = %self.addr(), topic = %topic, "opening broker session");

        let (client, mut eventloop) = AsyncClient::new(self.options(target), 10);
        client
            .subscribe(topic.as_str(), QoS::AtLeastOnce)
            .await
            .map_err(|e| BrokerError::Subscribe { topic: topic.clone(), reason: e.to_string() })?;

        tokio::time::timeout(self.connect_timeout, self.await_acks(&mut eventloop, &topic))
            .await
            .map_err(|_| BrokerError::Timeout(self.connect_timeout))??;

        info!(topic = %topic, "subscribed to uplinks");

        let (tx, rx) = mpsc::channel(UPLINK_BUFFER);
        let pump = tokio::spawn(pump_uplinks(client, eventloop, tx));
        Ok(SubscriptionHandle::new(rx, Some(pump)))
    }
}

impl MqttBroker {
    // Drive the event loop until both CONNACK and SUBACK are in.
    async fn await_acks(&self, eventloop: &mut EventLoop, topic: &str) -> Result<(), BrokerError> {
        let mut connected = false;
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(BrokerError::Refused(format!("{:?}", ack.code)));
                    }
                    debug!("broker acknowledged connection");
                    connected = true;
                }
                Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        return Err(BrokerError::Subscribe {
                            topic: topic.to_string(),
                            reason: "rejected by broker".to_string(),
                        });
                    }
                    if connected {
                        return Ok(());
                    }
                }
                Ok(_) => {}
                Err(ConnectionError::ConnectionRefused(code)) => {
                    return Err(BrokerError::Refused(format!("{code:?}")));
                }
                Err(e) => {
                    return Err(BrokerError::Connect { addr: self.addr(), reason: e.to_string() });
                }
            }
        }
    }
}

// The client is kept alive here; dropping it would tear the session down.
async fn pump_uplinks(_client: AsyncClient, mut eventloop: EventLoop, tx: mpsc::Sender<Vec<u8>>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::Publish(p))) => {
                debug!(topic = %p.topic, bytes = p.payload.len(), "uplink received");
                if tx.send(p.payload.to_vec()).await.is_err() {
                    // Subscriber went away.
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "broker session lost");
                return;
            }
        }
    }
}
