use dmz_k8s_utils::{ObjectKey, object_key};
use k8s_openapi::api::{core::v1::ConfigMap, networking::v1::Ingress};
use kube::{Api, Client, ResourceExt, api::PostParams, runtime::reflector::Store};

use crate::{ConfigMapStore, Error, IngressStore, Result};

/// Reads Ingresses from the reflector cache and writes them back through
/// the API server. Writes carry the cached resourceVersion, so writing over
/// a newer object fails with a conflict.
#[derive(Clone)]
pub struct KubeIngressStore {
    client: Client,
    cache: Store<Ingress>,
}

impl KubeIngressStore {
    pub fn new(client: Client, cache: Store<Ingress>) -> Self {
        Self { client, cache }
    }
}

impl IngressStore for KubeIngressStore {
    async fn fetch(&self, key: &ObjectKey) -> Result<Ingress> {
        self.cache
            .get(&key.object_ref())
            .map(|ingress| (*ingress).clone())
            .ok_or_else(|| Error::ResourceNotFound(key.to_string()))
    }

    async fn persist(&self, mut ingress: Ingress) -> Result<Ingress> {
        let ns = ingress.namespace().ok_or(Error::InvalidResource)?;
        let name = ingress.metadata.name.clone().ok_or(Error::InvalidResource)?;
        ingress.metadata.managed_fields = None;
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), &ns);
        Ok(api.replace(&name, &PostParams::default(), &ingress).await?)
    }

    fn keys(&self) -> Vec<String> {
        self.cache
            .state()
            .iter()
            .filter_map(|ingress| object_key(ingress.as_ref()))
            .collect()
    }
}

#[derive(Clone)]
pub struct KubeConfigMapStore {
    cache: Store<ConfigMap>,
}

impl KubeConfigMapStore {
    pub fn new(cache: Store<ConfigMap>) -> Self {
        Self { cache }
    }
}

impl ConfigMapStore for KubeConfigMapStore {
    async fn fetch(&self, key: &ObjectKey) -> Result<ConfigMap> {
        self.cache
            .get(&key.object_ref())
            .map(|config_map| (*config_map).clone())
            .ok_or_else(|| Error::ConfigNotFound(key.to_string()))
    }
}
