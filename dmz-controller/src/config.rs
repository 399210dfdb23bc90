use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use dmz_ingress_controller::{ControllerConfig, DEFAULT_CONFIG_MAP};

use crate::{Error, Result};

pub const SERVICE_ACCOUNT_NAMESPACE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Subcommand, Debug)]
pub enum Commands {
    Controller(ControllerArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ControllerArgs {
    /// Path to a kubeconfig file, in-cluster or default config is used when unset
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace of the Ingresses and the provider ConfigMap
    #[arg(long, env = "DMZ_NAMESPACE")]
    pub namespace: Option<String>,

    /// Name of the ConfigMap holding the provider address lists
    #[arg(long, default_value = DEFAULT_CONFIG_MAP)]
    pub config_map: String,

    /// Seconds between resyncs of each Ingress
    #[arg(long, default_value_t = 30)]
    pub resync_period_secs: u64,

    /// Retry delay after the first failure
    #[arg(long, default_value_t = 15)]
    pub min_backoff_secs: u64,

    /// Upper bound for the retry delay
    #[arg(long, default_value_t = 60)]
    pub max_backoff_secs: u64,

    /// Number of concurrent reconcile workers
    #[arg(long, default_value_t = 1)]
    pub workers: usize,

    /// Metrics listener for controller
    #[arg(long, default_value = "0.0.0.0:9090")]
    pub metrics_address: SocketAddr,
}

impl ControllerArgs {
    pub fn controller_config(&self) -> Result<ControllerConfig> {
        Ok(ControllerConfig {
            namespace: resolve_namespace(
                self.namespace.as_deref(),
                Path::new(SERVICE_ACCOUNT_NAMESPACE),
            )?,
            config_map: self.config_map.clone(),
            resync_period: Duration::from_secs(self.resync_period_secs.max(1)),
            min_backoff: Duration::from_secs(self.min_backoff_secs),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
            workers: self.workers.max(1),
        })
    }
}

/// Uses the explicit namespace when given, otherwise the one mounted with
/// the service account token.
pub fn resolve_namespace(namespace: Option<&str>, service_account: &Path) -> Result<String> {
    if let Some(ns) = namespace.map(str::trim).filter(|ns| !ns.is_empty()) {
        return Ok(ns.into());
    }
    let missing = || Error::MissingNamespace(service_account.display().to_string());
    let ns = std::fs::read_to_string(service_account).map_err(|_| missing())?;
    let ns = ns.trim();
    if ns.is_empty() {
        return Err(missing());
    }
    Ok(ns.into())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn parse(args: &[&str]) -> ControllerArgs {
        let cli = Cli::try_parse_from(["dmz-controller", "controller"].iter().chain(args))
            .expect("valid arguments");
        match cli.command {
            Commands::Controller(args) => args,
        }
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--namespace", "dmz"]);
        let config = args.controller_config().expect("config");
        assert_eq!(config.namespace, "dmz");
        assert_eq!(config.config_map, "dmz-controller");
        assert_eq!(config.resync_period, Duration::from_secs(30));
        assert_eq!(config.min_backoff, Duration::from_secs(15));
        assert_eq!(config.max_backoff, Duration::from_secs(60));
        assert_eq!(config.workers, 1);
        assert_eq!(args.metrics_address, "0.0.0.0:9090".parse().expect("addr"));
    }

    #[test]
    fn test_overrides() {
        let args = parse(&[
            "--namespace",
            "edge",
            "--config-map",
            "providers",
            "--resync-period-secs",
            "0",
            "--workers",
            "4",
        ]);
        let config = args.controller_config().expect("config");
        assert_eq!(config.namespace, "edge");
        assert_eq!(config.config_map, "providers");
        assert_eq!(config.resync_period, Duration::from_secs(1));
        assert_eq!(config.workers, 4);
    }

    #[test]
    fn test_namespace_from_service_account() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "ingress-system").expect("write namespace");

        let ns = resolve_namespace(None, file.path()).expect("namespace");
        assert_eq!(ns, "ingress-system");

        let ns = resolve_namespace(Some("explicit"), file.path()).expect("namespace");
        assert_eq!(ns, "explicit");
    }

    #[test]
    fn test_missing_namespace() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("namespace");
        assert!(matches!(
            resolve_namespace(None, &path),
            Err(Error::MissingNamespace(_))
        ));

        std::fs::write(&path, "  \n").expect("write namespace");
        assert!(matches!(
            resolve_namespace(Some(""), &path),
            Err(Error::MissingNamespace(_))
        ));
    }
}
