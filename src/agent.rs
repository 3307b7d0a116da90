use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{error, info, warn};

use crate::mqtt::{MqttMessage, Payload, TopicKind, parse_device_topic};

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid signal payload: {0}")]
    Invalid(#[source] serde_json::Error),
    #[error("forward request failed: {0}")]
    Network(#[source] reqwest::Error),
}

#[derive(Debug)]
pub struct Forwarded {
    pub status: StatusCode,
    pub body: String,
}

/// Posts signal command payloads to the local receiver.
#[derive(Clone)]
pub struct Forwarder {
    client: Client,
    endpoint: String,
}

impl Forwarder {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Builds a forwarder whose requests never time out unless `timeout` is set.
    pub fn with_timeout(
        endpoint: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ForwardError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(ForwardError::Network)?;
        Ok(Self::new(client, endpoint))
    }

    /// Checks that `raw` is a signal payload, then posts it unchanged.
    pub async fn forward(&self, raw: &[u8]) -> Result<Forwarded, ForwardError> {
        let payload: Payload = serde_json::from_slice(raw).map_err(ForwardError::Invalid)?;
        info!(
            "Forwarding {}/{} to {}",
            payload.remote, payload.name, self.endpoint
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .body(raw.to_vec())
            .send()
            .await
            .map_err(ForwardError::Network)?;

        let status = resp.status();
        let body = resp.text().await.map_err(ForwardError::Network)?;
        Ok(Forwarded { status, body })
    }
}

/// Routes broker messages for one device.
pub struct Agent {
    device_id: String,
    forwarder: Forwarder,
}

impl Agent {
    pub fn new(device_id: impl Into<String>, forwarder: Forwarder) -> Self {
        Self {
            device_id: device_id.into(),
            forwarder,
        }
    }

    /// Logs config/state messages and hands signal commands to a forwarding task.
    pub fn handle(&self, msg: MqttMessage) -> Option<tokio::task::JoinHandle<()>> {
        let text = String::from_utf8_lossy(&msg.payload);
        match parse_device_topic(&msg.topic, &self.device_id) {
            Some(TopicKind::Config) => {
                info!("config:: topic: {}, payload: {}", msg.topic, text);
                None
            }
            Some(TopicKind::State) => {
                info!("state:: topic: {}, payload: {}", msg.topic, text);
                None
            }
            Some(TopicKind::Command("signal")) => {
                info!("commands:: topic: {}, payload: {}", msg.topic, text);
                let forwarder = self.forwarder.clone();
                let payload = msg.payload.clone();
                Some(tokio::spawn(async move {
                    match forwarder.forward(&payload).await {
                        Ok(resp) => info!("Response ({}): {}", resp.status, resp.body),
                        Err(e) => error!("{}", e),
                    }
                }))
            }
            Some(TopicKind::Command(other)) => {
                info!("commands:: ignoring subfolder {:?}: {}", other, text);
                None
            }
            None => {
                warn!("Unexpected topic: {}", msg.topic);
                None
            }
        }
    }
}
