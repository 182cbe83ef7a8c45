use serde::{Deserialize, Serialize};

/// Plain settings of a view
///
/// Strategy objects (codec, hasher, storage and transport builders) live in
/// the view options of the `vista` crate; this struct only carries what can
/// be written down in a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Client identifier handed to the consumer builder
    /// Default: "vista"
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Broker addresses (or log locations) handed to the transport builders
    #[serde(default)]
    pub brokers: Vec<String>,

    /// Whether `terminate()` tears the view down and `run()` leaves storages
    /// open on exit so the view can be run again.
    /// Default: false
    #[serde(default)]
    pub restartable: bool,
}

fn default_client_id() -> String {
    "vista".to_string()
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            brokers: Vec::new(),
            restartable: false,
        }
    }
}

impl ViewConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_brokers(mut self, brokers: Vec<String>) -> Self {
        self.brokers = brokers;
        self
    }

    pub fn with_restartable(mut self, restartable: bool) -> Self {
        self.restartable = restartable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let cfg: ViewConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.client_id, "vista");
        assert!(cfg.brokers.is_empty());
        assert!(!cfg.restartable);
    }

    #[test]
    fn test_builder() {
        let cfg = ViewConfig::new()
            .with_client_id("reader")
            .with_brokers(vec!["./data".into()])
            .with_restartable(true);
        assert_eq!(cfg.client_id, "reader");
        assert_eq!(cfg.brokers, vec!["./data".to_string()]);
        assert!(cfg.restartable);
    }
}
