use std::time::Duration;

use crate::DEFAULT_CONFIG_MAP;

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Namespace holding both the Ingresses and the provider ConfigMap.
    pub namespace: String,
    pub config_map: String,
    pub resync_period: Duration,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub workers: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: "default".into(),
            config_map: DEFAULT_CONFIG_MAP.into(),
            resync_period: Duration::from_secs(30),
            min_backoff: Duration::from_secs(15),
            max_backoff: Duration::from_secs(60),
            workers: 1,
        }
    }
}
