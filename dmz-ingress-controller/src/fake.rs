use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use k8s_openapi::api::{core::v1::ConfigMap, networking::v1::Ingress};
use kube::api::ObjectMeta;

use crate::{ConfigMapStore, Error, IngressStore, ObjectKey, Result};

/// In-memory Ingress store. Persisting bumps the resourceVersion the way
/// the API server does.
#[derive(Default)]
pub(crate) struct FakeIngressStore {
    objects: Mutex<BTreeMap<String, Ingress>>,
    pub fetches: AtomicUsize,
    pub persists: AtomicUsize,
    /// Number of upcoming persists that fail.
    pub fail_persists: AtomicUsize,
}

impl FakeIngressStore {
    pub fn insert(&self, ingress: Ingress) {
        let key = dmz_k8s_utils::object_key(&ingress).expect("named ingress");
        self.objects.lock().expect("lock").insert(key, ingress);
    }

    pub fn get(&self, key: &str) -> Option<Ingress> {
        self.objects.lock().expect("lock").get(key).cloned()
    }

    pub fn annotation(&self, key: &str, annotation: &str) -> Option<String> {
        self.get(key)?
            .metadata
            .annotations?
            .get(annotation)
            .cloned()
    }
}

impl IngressStore for FakeIngressStore {
    async fn fetch(&self, key: &ObjectKey) -> Result<Ingress> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.get(&key.to_string())
            .ok_or_else(|| Error::ResourceNotFound(key.to_string()))
    }

    async fn persist(&self, mut ingress: Ingress) -> Result<Ingress> {
        if self
            .fail_persists
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::StoreError("conflict".into()));
        }
        self.persists.fetch_add(1, Ordering::SeqCst);
        let version = ingress
            .metadata
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or_default();
        ingress.metadata.resource_version = Some((version + 1).to_string());
        self.insert(ingress.clone());
        Ok(ingress)
    }

    fn keys(&self) -> Vec<String> {
        self.objects.lock().expect("lock").keys().cloned().collect()
    }
}

#[derive(Default)]
pub(crate) struct FakeConfigMapStore {
    config_map: Mutex<Option<ConfigMap>>,
}

impl FakeConfigMapStore {
    pub fn set(&self, data: &[(&str, &str)]) {
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some("dmz-controller".into()),
                namespace: Some("dmz".into()),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            ),
            ..Default::default()
        };
        *self.config_map.lock().expect("lock") = Some(config_map);
    }
}

impl ConfigMapStore for FakeConfigMapStore {
    async fn fetch(&self, key: &ObjectKey) -> Result<ConfigMap> {
        self.config_map
            .lock()
            .expect("lock")
            .clone()
            .ok_or_else(|| Error::ConfigNotFound(key.to_string()))
    }
}

pub(crate) fn make_ingress(name: &str, annotations: &[(&str, &str)]) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some("dmz".into()),
            resource_version: Some("1".into()),
            annotations: Some(
                annotations
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            ),
            ..Default::default()
        },
        ..Default::default()
    }
}
