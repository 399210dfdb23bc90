use std::sync::Arc;
use std::time::Duration;

use dmz_k8s_utils::create_store_and_subscriber;
use k8s_openapi::api::{core::v1::ConfigMap, networking::v1::Ingress};
use kube::{Api, Client, runtime::watcher};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    ControllerConfig, Error, KubeConfigMapStore, KubeIngressStore, Result, context::Context,
    controller,
};

const STORE_TIMEOUT: Duration = Duration::from_secs(30);

/// Watches Ingresses and the provider ConfigMap in `config.namespace` and
/// keeps the Ingress whitelists in sync until `cancel` fires. `ready` is
/// cancelled once the caches are populated.
pub async fn start_ingress_controller(
    client: Client,
    config: ControllerConfig,
    ready: CancellationToken,
    cancel: CancellationToken,
) -> Result<()> {
    let ingress_api: Api<Ingress> = Api::namespaced(client.clone(), &config.namespace);
    let config_map_api: Api<ConfigMap> = Api::namespaced(client.clone(), &config.namespace);
    let config_map_watch =
        watcher::Config::default().fields(&format!("metadata.name={}", config.config_map));

    let store_init = timeout(STORE_TIMEOUT, async {
        tokio::try_join!(
            create_store_and_subscriber(
                ingress_api,
                watcher::Config::default(),
                Some(STORE_TIMEOUT)
            ),
            create_store_and_subscriber(config_map_api, config_map_watch, Some(STORE_TIMEOUT)),
        )
    })
    .await
    .map_err(|_| Error::Timeout("store initialization".into()))??;

    let ((ingress_store, ingress_subscriber), (config_map_store, config_map_subscriber)) =
        store_init;
    info!(
        "caches synced for namespace {}, watching ConfigMap {}",
        config.namespace, config.config_map
    );
    ready.cancel();

    let ctx = Arc::new(Context::new(
        KubeIngressStore::new(client, ingress_store.clone()),
        KubeConfigMapStore::new(config_map_store),
        &config,
    ));
    controller::run(
        ctx,
        ingress_store,
        ingress_subscriber,
        config_map_subscriber,
        config.workers,
        cancel,
    )
    .await;
    Ok(())
}
