mod backoff;
mod config;
mod context;
mod controller;
mod error;
#[cfg(test)]
mod fake;
pub mod metrics;
pub mod reconcile;
mod runtime;
mod store;

use std::future::Future;

pub use backoff::Backoff;
pub use config::ControllerConfig;
pub use context::Context;
pub use controller::run;
pub use dmz_k8s_utils::ObjectKey;
pub use error::Error;
use k8s_openapi::api::{core::v1::ConfigMap, networking::v1::Ingress};
pub use runtime::start_ingress_controller;
pub use store::{KubeConfigMapStore, KubeIngressStore};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Comma separated provider names. Its presence opts an Ingress in.
pub const PROVIDERS_ANNOTATION: &str = "armesto.net/ingress";
/// Source ranges enforced by the ingress controller.
pub const WHITELIST_ANNOTATION: &str = "ingress.kubernetes.io/whitelist-source-range";
/// Ranges written by this controller on its last successful pass.
pub const MANAGED_ANNOTATION: &str = "dmz-controller";
pub const DEFAULT_CONFIG_MAP: &str = "dmz-controller";

/// Access to the Ingress objects being whitelisted.
pub trait IngressStore: Send + Sync + 'static {
    fn fetch(&self, key: &ObjectKey) -> impl Future<Output = Result<Ingress>> + Send;

    fn persist(&self, ingress: Ingress) -> impl Future<Output = Result<Ingress>> + Send;

    /// Keys of every Ingress currently known to the store.
    fn keys(&self) -> Vec<String>;
}

/// Read access to the ConfigMap holding the provider address lists.
pub trait ConfigMapStore: Send + Sync + 'static {
    fn fetch(&self, key: &ObjectKey) -> impl Future<Output = Result<ConfigMap>> + Send;
}

impl<T: IngressStore> IngressStore for std::sync::Arc<T> {
    fn fetch(&self, key: &ObjectKey) -> impl Future<Output = Result<Ingress>> + Send {
        T::fetch(self, key)
    }

    fn persist(&self, ingress: Ingress) -> impl Future<Output = Result<Ingress>> + Send {
        T::persist(self, ingress)
    }

    fn keys(&self) -> Vec<String> {
        T::keys(self)
    }
}

impl<T: ConfigMapStore> ConfigMapStore for std::sync::Arc<T> {
    fn fetch(&self, key: &ObjectKey) -> impl Future<Output = Result<ConfigMap>> + Send {
        T::fetch(self, key)
    }
}
