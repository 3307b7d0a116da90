use serde_json::Value;
use tracing::{error, info};

use crate::dispatch::Dispatcher;
use crate::signal::{Signal, SignalCatalog};
use crate::store::{self, ConfigStore, StoreError, SubmitEvent};

/// Where failed sends are surfaced to the user.
pub trait Notifier: Send + Sync {
    fn alert(&self, message: &str);
}

pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn alert(&self, message: &str) {
        eprintln!("alert: {message}");
    }
}

/// The `signals` panel: the static catalog plus its two handlers.
pub struct SignalsPanel<S, N> {
    api: SignalCatalog,
    store: S,
    dispatcher: Dispatcher,
    notifier: N,
}

impl<S: ConfigStore, N: Notifier> SignalsPanel<S, N> {
    pub fn mount(api: SignalCatalog, store: S, dispatcher: Dispatcher, notifier: N) -> Self {
        Self {
            api,
            store,
            dispatcher,
            notifier,
        }
    }

    pub fn api(&self) -> &SignalCatalog {
        &self.api
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_endpoint(&self, event: &mut SubmitEvent) -> Result<(), StoreError> {
        store::store_endpoint(&self.store, event)
    }

    /// Sends one signal. Failures are logged and alerted, never returned.
    pub async fn send(&self, item: &Signal, duration: Option<i64>) -> Option<Value> {
        info!("Sending {}/{}", item.remote, item.name);
        match self.dispatcher.send(&self.store, item, duration).await {
            Ok(data) => {
                info!("Response: {}", data);
                Some(data)
            }
            Err(e) => {
                error!("Send {}/{} failed: {}", item.remote, item.name, e);
                self.notifier.alert(&e.to_string());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KEY_DEVICE_ID, KEY_ENDPOINT, MemoryStore};
    use httpmock::prelude::*;
    use reqwest::Client;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        alerts: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingNotifier {
        fn alerts(&self) -> Vec<String> {
            self.alerts.lock().expect("lock").clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn alert(&self, message: &str) {
            self.alerts.lock().expect("lock").push(message.to_string());
        }
    }

    fn panel(notifier: RecordingNotifier) -> SignalsPanel<MemoryStore, RecordingNotifier> {
        SignalsPanel::mount(
            SignalCatalog::builtin(),
            MemoryStore::new(),
            Dispatcher::new(Client::new()),
            notifier,
        )
    }

    #[test]
    fn store_endpoint_handler_persists_form() {
        let panel = panel(RecordingNotifier::default());
        let mut event = SubmitEvent::new("https://x/y", "d1");

        panel.store_endpoint(&mut event).expect("store");

        assert!(event.default_prevented());
        assert_eq!(panel.store().get(KEY_ENDPOINT).as_deref(), Some("https://x/y"));
        assert_eq!(panel.store().get(KEY_DEVICE_ID).as_deref(), Some("d1"));
    }

    #[tokio::test]
    async fn successful_send_does_not_alert() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/signal")
                .json_body(json!({ "remote": "light", "name": "night", "device_id": "d1" }));
            then.status(200).json_body(json!({ "message": "success" }));
        });

        let notifier = RecordingNotifier::default();
        let panel = panel(notifier.clone());
        panel
            .store_endpoint(&mut SubmitEvent::new(server.url("/signal"), "d1"))
            .expect("store");

        let item = panel.api().signals[2].clone();
        let data = panel.send(&item, None).await;

        mock.assert();
        assert_eq!(data, Some(json!({ "message": "success" })));
        assert!(notifier.alerts().is_empty());
    }

    #[tokio::test]
    async fn network_failure_alerts_exactly_once() {
        let notifier = RecordingNotifier::default();
        let panel = panel(notifier.clone());
        panel
            .store_endpoint(&mut SubmitEvent::new("http://127.0.0.1:9/signal", "d1"))
            .expect("store");

        let data = panel.send(&Signal::new("light", "on"), None).await;

        assert!(data.is_none());
        assert_eq!(notifier.alerts().len(), 1);
    }

    #[tokio::test]
    async fn non_json_response_takes_the_alert_path() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/signal");
            then.status(200).body("<html>ok</html>");
        });

        let notifier = RecordingNotifier::default();
        let panel = panel(notifier.clone());
        panel
            .store_endpoint(&mut SubmitEvent::new(server.url("/signal"), "d1"))
            .expect("store");

        assert!(panel.send(&Signal::new("light", "off"), None).await.is_none());
        let alerts = notifier.alerts();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("not JSON"), "got {alerts:?}");
    }

    #[tokio::test]
    async fn unconfigured_panel_alerts_instead_of_sending() {
        let notifier = RecordingNotifier::default();
        let panel = panel(notifier.clone());

        assert!(panel.send(&Signal::new("light", "on"), None).await.is_none());
        assert_eq!(notifier.alerts().len(), 1);
    }
}
