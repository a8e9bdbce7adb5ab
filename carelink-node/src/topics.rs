use crate::config::NodeConfig;

/// Topic set of one unit, derived once from its configuration
///
/// Layout: `<domain>/<zone>/<class>/{status,display,button}`,
/// `<domain>/<zone>/safety/alert`, `<domain>/<zone>/env/telemetry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub status: String,
    pub display: String,
    pub button: String,
    pub alert: String,
    pub telemetry: String,
}

impl Topics {
    pub fn new(domain: &str, zone: &str, class: &str) -> Self {
        let base = format!("{domain}/{zone}/{class}");
        Self {
            status: format!("{base}/status"),
            display: format!("{base}/display"),
            button: format!("{base}/button"),
            alert: format!("{domain}/{zone}/safety/alert"),
            telemetry: format!("{domain}/{zone}/env/telemetry"),
        }
    }

    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(&config.unit.domain, &config.unit.zone, &config.unit.class)
    }
}

/// Topics the node must (re-)subscribe to on every new session, in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet(Vec<String>);

impl SubscriptionSet {
    pub fn new(topics: Vec<String>) -> Self {
        Self(topics)
    }

    pub fn from_config(config: &NodeConfig, topics: &Topics) -> Self {
        let mut set = Vec::new();
        if config.display.is_some() {
            set.push(topics.display.clone());
        }
        Self(set)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.0.iter().any(|t| t == topic)
    }
}
