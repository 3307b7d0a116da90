pub mod client;

use serde::{Deserialize, Deserializer, Serialize};

/// Command payload delivered on `/devices/{id}/commands/signal`.
///
/// Missing or `null` fields decode to their zero value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, deserialize_with = "null_as_default")]
    pub remote: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration: i64,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A message received from the broker.
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TopicKind<'a> {
    Config,
    State,
    /// Command subfolder, e.g. `signal` for `commands/signal`.
    Command(&'a str),
}

pub fn device_topic(device_id: &str, suffix: &str) -> String {
    format!("/devices/{device_id}/{suffix}")
}

pub fn config_topic(device_id: &str) -> String {
    device_topic(device_id, "config")
}

pub fn state_topic(device_id: &str) -> String {
    device_topic(device_id, "state")
}

pub fn commands_filter(device_id: &str) -> String {
    device_topic(device_id, "commands/#")
}

/// Classify a topic under `/devices/{device_id}/`.
pub fn parse_device_topic<'a>(topic: &'a str, device_id: &str) -> Option<TopicKind<'a>> {
    let rest = topic
        .strip_prefix("/devices/")?
        .strip_prefix(device_id)?
        .strip_prefix('/')?;
    match rest {
        "config" => Some(TopicKind::Config),
        "state" => Some(TopicKind::State),
        "commands" => Some(TopicKind::Command("")),
        _ => rest.strip_prefix("commands/").map(TopicKind::Command),
    }
}
