use std::time::Duration;

use rumqttc::{
    AsyncClient, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS, TlsConfiguration,
    Transport,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::auth::TokenSigner;
use crate::config::Config;

use super::{MqttMessage, commands_filter, config_topic, state_topic};

pub struct MqttClient {
    client: AsyncClient,
    eventloop: EventLoop,
    signer: TokenSigner,
    username: String,
    device_id: String,
    heartbeat_interval: Duration,
}

impl MqttClient {
    pub fn new(config: &Config, signer: TokenSigner) -> Result<Self, String> {
        let mut mqttopts = MqttOptions::new(
            config.client_id(),
            &config.mqtt.broker_host,
            config.mqtt.broker_port,
        );
        mqttopts.set_keep_alive(Duration::from_secs(60));
        mqttopts.set_clean_session(true);

        let password = signer
            .mint()
            .map_err(|e| format!("Failed to mint MQTT password: {e}"))?;
        mqttopts.set_credentials(&config.mqtt.username, password);

        if config.mqtt.tls {
            mqttopts.set_transport(tls_transport(&config.mqtt.root_ca_file));
        }

        let (client, eventloop) = AsyncClient::new(mqttopts, 100);

        Ok(Self {
            client,
            eventloop,
            signer,
            username: config.mqtt.username.clone(),
            device_id: config.device.device_id.clone(),
            heartbeat_interval: config.heartbeat_interval(),
        })
    }

    /// Handle for publishing from outside the event loop.
    pub fn handle(&self) -> AsyncClient {
        self.client.clone()
    }

    /// Run the MQTT event loop. Subscribes to the device topics on every connect,
    /// forwards incoming publishes through message_tx, and returns once an
    /// outgoing disconnect has been flushed.
    pub async fn run(mut self, message_tx: mpsc::Sender<MqttMessage>) {
        let subscribe_topics = [
            config_topic(&self.device_id),
            state_topic(&self.device_id),
            commands_filter(&self.device_id),
        ];

        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        let mut connected = false;

        loop {
            tokio::select! {
                event = self.eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                            info!("Connected to MQTT broker");
                            connected = true;

                            for topic in &subscribe_topics {
                                if let Err(e) = self.client.subscribe(topic, QoS::AtLeastOnce).await {
                                    error!("Failed to subscribe to {}: {}", topic, e);
                                }
                            }

                            let topic = state_topic(&self.device_id);
                            if let Err(e) = self
                                .client
                                .publish(&topic, QoS::AtLeastOnce, false, "started")
                                .await
                            {
                                error!("Failed to publish started state: {}", e);
                            }
                        }
                        Ok(Event::Incoming(Incoming::Publish(publish))) => {
                            let msg = MqttMessage {
                                topic: publish.topic.clone(),
                                payload: publish.payload.to_vec(),
                            };
                            if message_tx.send(msg).await.is_err() {
                                warn!("Message channel closed");
                            }
                        }
                        Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                            info!("Disconnected from MQTT broker");
                            return;
                        }
                        Ok(other) => {
                            debug!("MQTT event: {:?}", other);
                        }
                        Err(e) => {
                            connected = false;
                            error!("MQTT connection lost: {}. Reconnecting...", e);
                            self.refresh_credentials();
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
                t = heartbeat.tick() => {
                    info!("connected: {}, ts: {:?}", connected, t);
                }
            }
        }
    }

    /// The broker rejects expired tokens, so every reconnect gets a fresh one.
    fn refresh_credentials(&mut self) {
        match self.signer.mint() {
            Ok(password) => {
                self.eventloop
                    .mqtt_options
                    .set_credentials(&self.username, password);
            }
            Err(e) => error!("Failed to refresh MQTT password: {}", e),
        }
    }
}

fn tls_transport(root_ca_file: &str) -> Transport {
    match std::fs::read(root_ca_file) {
        Ok(ca) => Transport::tls_with_config(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: None,
        }),
        Err(e) => {
            warn!(
                "Root CA {} unavailable ({}), using default trust roots",
                root_ca_file, e
            );
            Transport::tls_with_default_config()
        }
    }
}
