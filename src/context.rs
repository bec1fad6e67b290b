use crate::{Error, Metrics, Result, Settings};
use kube::Client as KubeClient;
use kube::config::{KubeConfigOptions, Kubeconfig};
use std::sync::Arc;
use tracing::*;

// Context shared by the run stages
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub kube_client: KubeClient,
    /// Prometheus metrics
    pub metrics: Arc<Metrics>,
    /// Settings
    pub settings: Arc<Settings>,
}

impl Context {
    pub fn namespace(&self) -> &str {
        &self.settings.namespace
    }
}

/// Build a Kubernetes client from the configured kubeconfig file
///
/// Falls back to the default inference chain (`KUBECONFIG`, `~/.kube/config`,
/// in-cluster service account) when the file does not exist.
pub async fn connect(settings: &Settings) -> Result<KubeClient> {
    let path = &settings.kubeconfig;

    if !path.exists() {
        warn!(
            "kubeconfig {} not found, inferring cluster configuration",
            path.display()
        );
        return KubeClient::try_default().await.map_err(Error::KubeError);
    }

    let kubeconfig = Kubeconfig::read_from(path)?;
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await?;

    info!(
        "Connected to Kubernetes cluster_url={} kubeconfig={}",
        config.cluster_url,
        path.display()
    );

    KubeClient::try_from(config).map_err(Error::KubeError)
}
