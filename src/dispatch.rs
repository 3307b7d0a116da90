use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::signal::Signal;
use crate::store::{ConfigStore, KEY_DEVICE_ID, KEY_ENDPOINT};

/// Body of one outbound signal POST.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendRequest {
    pub remote: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    /// Serialized as `null` when no device id has been stored.
    pub device_id: Option<String>,
}

impl SendRequest {
    pub fn new(signal: &Signal, device_id: Option<String>) -> Self {
        Self {
            remote: signal.remote.clone(),
            name: signal.name.clone(),
            duration: None,
            device_id,
        }
    }

    pub fn with_duration(mut self, duration: Option<i64>) -> Self {
        self.duration = duration;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("endpoint is not usable: {0}")]
    Endpoint(String),
    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),
    #[error("endpoint answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("response is not JSON: {0}")]
    Parse(#[source] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: Client,
}

impl Dispatcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a dispatcher whose requests never time out unless `timeout` is set.
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self, SendError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(SendError::Network)?;
        Ok(Self::new(client))
    }

    /// Reads the device id and endpoint from `store` and posts `signal` there.
    pub async fn send(
        &self,
        store: &dyn ConfigStore,
        signal: &Signal,
        duration: Option<i64>,
    ) -> Result<Value, SendError> {
        let request =
            SendRequest::new(signal, store.get(KEY_DEVICE_ID)).with_duration(duration);
        let endpoint = store.get(KEY_ENDPOINT);
        self.post(endpoint.as_deref(), &request).await
    }

    pub async fn post(
        &self,
        endpoint: Option<&str>,
        request: &SendRequest,
    ) -> Result<Value, SendError> {
        let endpoint =
            endpoint.ok_or_else(|| SendError::Endpoint("no endpoint configured".into()))?;
        let url = Url::parse(endpoint)
            .map_err(|e| SendError::Endpoint(format!("{endpoint:?}: {e}")))?;

        debug!("POST {} {:?}", url, request);
        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(SendError::Network)?;

        let status = resp.status();
        let body = resp.text().await.map_err(SendError::Network)?;
        if !status.is_success() {
            return Err(SendError::Status { status, body });
        }
        serde_json::from_str(&body).map_err(SendError::Parse)
    }
}
