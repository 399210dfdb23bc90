use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use dmz_k8s_utils::{ObjectKey, object_key, split_key};
use futures::{Stream, StreamExt, future};
use k8s_openapi::api::{core::v1::ConfigMap, networking::v1::Ingress};
use kube::{
    ResourceExt,
    runtime::{Config, Controller, controller::Action, reflector::Store},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    ConfigMapStore, Error, IngressStore, PROVIDERS_ANNOTATION, Result, context::Context,
    reconcile::reconcile,
};

// Seen versions are pruned against the cache once the map outgrows this.
const PRUNE_THRESHOLD: usize = 1024;

/// Drives `reconcile_ingress` until `cancel` fires.
///
/// Ingresses are reconciled when they change, when the provider ConfigMap
/// changes, and every resync period after a successful pass. Failed passes
/// are retried with exponential backoff.
pub async fn run<I, C, S, T>(
    ctx: Arc<Context<I, C>>,
    store: Store<Ingress>,
    ingresses: S,
    config_maps: T,
    workers: usize,
    cancel: CancellationToken,
) where
    I: IngressStore,
    C: ConfigMapStore,
    S: Stream<Item = Arc<Ingress>> + Send + 'static,
    T: Stream<Item = Arc<ConfigMap>> + Send + Sync + 'static,
{
    let concurrency = u16::try_from(workers.max(1)).unwrap_or(u16::MAX);
    info!(concurrency, "starting ingress whitelist controller");

    let config_changes = config_changes(config_maps, ctx.config_map.name.clone());
    Controller::for_shared_stream(changed_ingresses(ingresses, store.clone()), store)
        .reconcile_all_on(config_changes)
        .graceful_shutdown_on(shutdown(cancel))
        .with_config(Config::default().concurrency(concurrency))
        .run(reconcile_ingress::<I, C>, error_policy::<I, C>, ctx)
        .for_each(|res| {
            if let Err(e) = res {
                debug!(%e, "controller event failed");
            }
            future::ready(())
        })
        .await;
    info!("ingress whitelist controller stopped");
}

async fn shutdown(cancel: CancellationToken) {
    cancel.cancelled().await;
}

/// Passes an Ingress on only when its resourceVersion differs from the
/// last one seen for it.
fn changed_ingresses<S>(
    ingresses: S,
    store: Store<Ingress>,
) -> impl Stream<Item = Arc<Ingress>> + Send + 'static
where
    S: Stream<Item = Arc<Ingress>> + Send + 'static,
{
    let mut seen = SeenVersions::default();
    ingresses.filter(move |ingress| {
        let changed = seen.observe(ingress, || {
            store
                .state()
                .iter()
                .filter_map(|ingress| object_key(ingress.as_ref()))
                .collect()
        });
        future::ready(changed)
    })
}

/// Emits once per new resourceVersion of the ConfigMap called `name`.
fn config_changes<S>(config_maps: S, name: String) -> impl Stream<Item = ()> + Send + Sync + 'static
where
    S: Stream<Item = Arc<ConfigMap>> + Send + Sync + 'static,
{
    let mut last_version = None;
    config_maps.filter_map(move |config_map| {
        let version = config_map.resource_version();
        let changed = config_map.name_any() == name && version != last_version;
        if changed {
            info!("ConfigMap {} changed, reconciling all Ingresses", name);
            last_version = version;
        }
        future::ready(changed.then_some(()))
    })
}

#[derive(Default)]
struct SeenVersions {
    versions: HashMap<String, String>,
    prune_at: usize,
}

impl SeenVersions {
    fn observe(&mut self, ingress: &Ingress, live: impl FnOnce() -> HashSet<String>) -> bool {
        let Some(key) = object_key(ingress) else {
            return false;
        };
        let version = ingress.resource_version().unwrap_or_default();
        if self.versions.get(&key) == Some(&version) {
            trace!("Ingress {} unchanged at version {}", key, version);
            return false;
        }
        debug!("Ingress {} changed to version {}", key, version);
        self.versions.insert(key.clone(), version);

        if self.versions.len() >= self.prune_at.max(PRUNE_THRESHOLD) {
            let live = live();
            self.versions.retain(|k, _| *k == key || live.contains(k));
            self.prune_at = self.versions.len() * 2;
        }
        true
    }
}

fn ingress_key(ingress: &Ingress) -> Result<ObjectKey> {
    let key = object_key(ingress).ok_or_else(|| Error::InvalidKey(String::new()))?;
    split_key(&key).map_err(|_| Error::InvalidKey(key))
}

#[instrument(skip(ingress, ctx), fields(name = %ingress.name_any()))]
pub(crate) async fn reconcile_ingress<I, C>(
    ingress: Arc<Ingress>,
    ctx: Arc<Context<I, C>>,
) -> Result<Action>
where
    I: IngressStore,
    C: ConfigMapStore,
{
    let _timer = ctx.metrics.count_and_measure();
    let key = ingress_key(&ingress)?;
    let mut ingress = ctx.ingresses.fetch(&key).await?;
    let config_map = ctx.config_maps.fetch(&ctx.config_map).await?;
    let providers = config_map.data.unwrap_or_default();

    let Some(whitelist) = reconcile(ingress.annotations(), &providers) else {
        trace!("Ingress {} has no {} annotation", key, PROVIDERS_ANNOTATION);
        ctx.reset_failures(&key);
        return Ok(Action::requeue(ctx.resync_period));
    };
    info!("started reconciling Ingress {}", key);

    if whitelist.changed {
        whitelist.apply(ingress.annotations_mut());
        ctx.ingresses.persist(ingress).await?;
        ctx.metrics.count_write();
        info!(whitelist = %whitelist.effective, "updated whitelist of Ingress {}", key);
    } else {
        debug!("whitelist of Ingress {} is up to date", key);
    }
    ctx.reset_failures(&key);
    Ok(Action::requeue(ctx.resync_period))
}

pub(crate) fn error_policy<I, C>(
    ingress: Arc<Ingress>,
    error: &Error,
    ctx: Arc<Context<I, C>>,
) -> Action
where
    I: IngressStore,
    C: ConfigMapStore,
{
    ctx.metrics.count_failure(error);
    match ingress_key(&ingress) {
        Ok(key) if error.is_retryable() => {
            let delay = ctx.retry_delay(&key);
            error!(?error, ?delay, "reconcile error for Ingress {}", key);
            Action::requeue(delay)
        }
        _ => {
            warn!(%error, "dropping Ingress {}", ingress.name_any());
            Action::await_change()
        }
    }
}
