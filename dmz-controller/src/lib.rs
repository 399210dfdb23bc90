pub mod config;
pub mod controller;
pub mod http;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("kube error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("failed to create config from kubeconfig: {0}")]
    KubeConfig(#[from] kube::config::KubeconfigError),

    #[error("failed to infer kube config: {0}")]
    InferConfig(#[from] kube::config::InferConfigError),

    #[error("controller error: {0}")]
    ControllerError(#[from] dmz_ingress_controller::Error),

    #[error("namespace not set and {0} is unreadable")]
    MissingNamespace(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
