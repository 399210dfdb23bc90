use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("kube error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("utils error: {0}")]
    UtilsError(#[from] dmz_k8s_utils::Error),

    #[error("invalid object key: {0:?}")]
    InvalidKey(String),

    #[error("encountered invalid resource")]
    InvalidResource,

    #[error("Ingress {0} not found")]
    ResourceNotFound(String),

    #[error("ConfigMap {0} not found")]
    ConfigNotFound(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("store error: {0}")]
    StoreError(String),
}

impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::KubeError(_) => "kube",
            Error::UtilsError(_) => "utils",
            Error::InvalidKey(_) => "invalid_key",
            Error::InvalidResource => "invalid_resource",
            Error::ResourceNotFound(_) => "resource_not_found",
            Error::ConfigNotFound(_) => "config_not_found",
            Error::Timeout(_) => "timeout",
            Error::StoreError(_) => "store",
        }
        .into()
    }

    /// Malformed keys never become valid, retrying them is pointless.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::InvalidKey(_))
    }
}
