use std::time::Duration;

use dmz_k8s_utils::ObjectKey;

use crate::{
    ConfigMapStore, ControllerConfig, IngressStore,
    backoff::{Backoff, Failures},
    metrics::ControllerMetrics,
};

const CONTROLLER_NAME: &str = "ingress-whitelist";
const MIN_RESYNC_PERIOD: Duration = Duration::from_secs(1);

pub struct Context<I: IngressStore, C: ConfigMapStore> {
    pub ingresses: I,
    pub config_maps: C,
    /// ConfigMap holding the provider address lists.
    pub config_map: ObjectKey,
    pub metrics: ControllerMetrics,
    pub resync_period: Duration,
    pub backoff: Backoff,
    pub(crate) failures: Failures,
}

impl<I: IngressStore, C: ConfigMapStore> Context<I, C> {
    pub fn new(ingresses: I, config_maps: C, config: &ControllerConfig) -> Self {
        Self {
            ingresses,
            config_maps,
            config_map: ObjectKey::new(Some(&config.namespace), &config.config_map),
            metrics: ControllerMetrics::new(CONTROLLER_NAME),
            resync_period: config.resync_period.max(MIN_RESYNC_PERIOD),
            backoff: Backoff::new(config.min_backoff, config.max_backoff),
            failures: Failures::default(),
        }
    }

    /// Counts a failed attempt for `key` and returns the delay before the
    /// next one.
    pub fn retry_delay(&self, key: &ObjectKey) -> Duration {
        let live = self.ingresses.keys().into_iter().collect();
        self.backoff.delay(self.failures.record(key, &live))
    }

    pub fn reset_failures(&self, key: &ObjectKey) {
        self.failures.clear(key);
    }

    pub fn failures(&self, key: &ObjectKey) -> u32 {
        self.failures.get(key)
    }
}
