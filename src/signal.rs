use serde::{Deserialize, Serialize};

/// A remote-control action the panel can send, e.g. `light/on`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub remote: String,
    pub name: String,
}

impl Signal {
    pub fn new(remote: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            name: name.into(),
        }
    }
}

/// The `api` object handed to the signals panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalCatalog {
    pub status: String,
    pub signals: Vec<Signal>,
}

impl SignalCatalog {
    /// The static catalog the panel is mounted with.
    pub fn builtin() -> Self {
        Self {
            status: "ok".to_string(),
            signals: vec![
                Signal::new("light", "on"),
                Signal::new("light", "off"),
                Signal::new("light", "night"),
            ],
        }
    }

    pub fn find(&self, remote: &str, name: &str) -> Option<&Signal> {
        self.signals
            .iter()
            .find(|s| s.remote == remote && s.name == name)
    }
}
