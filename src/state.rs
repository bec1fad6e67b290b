use crate::{Context, Metrics, Result, Settings, resources::Applied, settings::Variant};
use chrono::{DateTime, Utc};
use kube::client::Client as KubeClient;
use serde::Serialize;
use std::sync::Arc;
use tracing::*;

/// Object applied during provisioning
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppliedResource {
    pub kind: String,
    pub name: String,
    pub outcome: Applied,
}

/// Summary of one run, printed with `--json`
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub namespace: String,
    pub variant: Variant,
    pub resources: Vec<AppliedResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_pod: Option<String>,
    pub readiness_polls: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
}

impl RunReport {
    pub fn new(settings: &Settings) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            namespace: settings.namespace.clone(),
            variant: settings.workflow.variant,
            resources: Vec::new(),
            ready_pod: None,
            readiness_polls: 0,
            workflow: None,
        }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }
}

/// Settings and metrics living for the whole process
#[derive(Clone)]
pub struct State {
    /// Metrics
    metrics: Arc<Metrics>,
    /// Settings
    settings: Arc<Settings>,
}

impl State {
    pub fn new(settings: Settings) -> State {
        State {
            settings: Arc::new(settings),
            metrics: Arc::new(Metrics::default()),
        }
    }

    /// Settings getter
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Metrics encoded as OpenMetrics text
    pub fn metrics(&self) -> Result<String> {
        let mut buffer = String::new();
        let registry = &*self.metrics.registry;
        prometheus_client::encoding::text::encode(&mut buffer, registry)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(buffer)
    }

    /// Write metrics to the configured textfile, if any
    pub fn write_metrics(&self) -> Result<()> {
        let Some(path) = &self.settings.metrics.textfile else {
            debug!("metrics:\n{}", self.metrics()?);
            return Ok(());
        };

        // Write then rename into place
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, self.metrics()?)?;
        std::fs::rename(&tmp, path)?;
        info!("Wrote metrics to {}", path.display());
        Ok(())
    }

    // Create a Context the run stages share
    pub fn to_context(&self, kube_client: KubeClient) -> Arc<Context> {
        Arc::new(Context {
            kube_client,
            metrics: self.metrics.clone(),
            settings: self.settings.clone(),
        })
    }
}
