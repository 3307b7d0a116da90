use std::env;
use std::time::Duration;

/// Longest JWT lifetime the broker accepts.
const MAX_JWT_EXPIRE_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub device: DeviceConfig,
    pub forward: ForwardConfig,
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub tls: bool,
    pub root_ca_file: String,
    pub username: String,
    pub private_key_file: String,
    pub jwt_expire_secs: u64,
    pub heartbeat_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub project_id: String,
    pub cloud_region: String,
    pub registry_id: String,
    pub device_id: String,
}

#[derive(Debug, Clone)]
pub struct ForwardConfig {
    pub endpoint: String,
}

fn env_required(key: &str) -> Result<String, String> {
    env::var(key).map_err(|_| format!("{key} environment variable is required"))
}

fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let config = Self {
            mqtt: MqttConfig {
                broker_host: env_or_default("MQTT_BROKER_HOST", "mqtt.googleapis.com".to_string()),
                broker_port: env_or_default("MQTT_BROKER_PORT", 8883),
                tls: env_or_default("MQTT_TLS", true),
                root_ca_file: env_or_default("MQTT_ROOT_CA", "roots.pem".to_string()),
                username: env_or_default("MQTT_USERNAME", "unused".to_string()),
                private_key_file: env_or_default("RSA_PRIVATE_KEY", "rsa_private.pem".to_string()),
                jwt_expire_secs: env_or_default("JWT_EXPIRE_SECS", 3600),
                heartbeat_interval_secs: env_or_default("HEARTBEAT_INTERVAL_SECS", 60),
            },
            device: DeviceConfig {
                project_id: env_required("PROJECT_ID")?,
                cloud_region: env_required("CLOUD_REGION")?,
                registry_id: env_required("REGISTRY_ID")?,
                device_id: env_required("DEVICE_ID")?,
            },
            forward: ForwardConfig {
                endpoint: env_required("ENDPOINT")?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.mqtt.broker_host.is_empty() {
            return Err("MQTT_BROKER_HOST must not be empty".into());
        }
        if self.device.device_id.is_empty() {
            return Err("DEVICE_ID must not be empty".into());
        }
        if self.forward.endpoint.is_empty() {
            return Err("ENDPOINT must not be empty".into());
        }
        if self.mqtt.jwt_expire_secs == 0 || self.mqtt.jwt_expire_secs > MAX_JWT_EXPIRE_SECS {
            return Err(format!(
                "JWT_EXPIRE_SECS must be between 1 and {MAX_JWT_EXPIRE_SECS}"
            ));
        }
        if self.mqtt.heartbeat_interval_secs == 0 {
            return Err("HEARTBEAT_INTERVAL_SECS must be > 0".into());
        }
        Ok(())
    }

    /// `projects/{project}/locations/{region}/registries/{registry}/devices/{device}`
    pub fn client_id(&self) -> String {
        format!(
            "projects/{}/locations/{}/registries/{}/devices/{}",
            self.device.project_id,
            self.device.cloud_region,
            self.device.registry_id,
            self.device.device_id
        )
    }

    pub fn jwt_lifetime(&self) -> Duration {
        Duration::from_secs(self.mqtt.jwt_expire_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.mqtt.heartbeat_interval_secs)
    }
}

#[cfg(test)]
pub(crate) fn test_config(endpoint: &str) -> Config {
    Config {
        mqtt: MqttConfig {
            broker_host: "localhost".into(),
            broker_port: 1883,
            tls: false,
            root_ca_file: "roots.pem".into(),
            username: "unused".into(),
            private_key_file: "rsa_private.pem".into(),
            jwt_expire_secs: 3600,
            heartbeat_interval_secs: 60,
        },
        device: DeviceConfig {
            project_id: "proj".into(),
            cloud_region: "asia-east1".into(),
            registry_id: "home".into(),
            device_id: "raspi".into(),
        },
        forward: ForwardConfig {
            endpoint: endpoint.into(),
        },
    }
}
