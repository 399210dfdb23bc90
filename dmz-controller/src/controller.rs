use std::path::{Path, PathBuf};

use dmz_ingress_controller::{ControllerConfig, start_ingress_controller};
use kube::config::{KubeConfigOptions, Kubeconfig};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::Result;

pub async fn start(
    config: ControllerConfig,
    kubeconfig: Option<PathBuf>,
    ready: CancellationToken,
    cancel: CancellationToken,
) -> Result<()> {
    let client = client(kubeconfig.as_deref()).await?;

    info!(
        "starting ingress whitelist controller in namespace {}",
        config.namespace
    );
    start_ingress_controller(client, config, ready, cancel).await?;
    Ok(())
}

async fn client(kubeconfig: Option<&Path>) -> Result<kube::Client> {
    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?
        }
        None => kube::Config::infer().await?,
    };
    Ok(kube::Client::try_from(config)?)
}
