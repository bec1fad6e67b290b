use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("YamlError: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("Kubeconfig Error: {0}")]
    KubeconfigError(#[from] kube::config::KubeconfigError),

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("no pod matching `{selector}` became ready after {attempts} polls in {elapsed:?}")]
    ReadinessTimeout {
        selector: String,
        attempts: u32,
        elapsed: std::time::Duration,
    },

    #[error("Argo Server is selected but no url is configured")]
    MissingArgoServerUrl,

    #[error("ArgoServerClientError: {0}")]
    ArgoServerClientError(#[from] crate::argo_server::Error),

    #[error("Telemetry Error: {0}")]
    TelemetryError(String),

    #[error("StdIoError")]
    StdIoError(#[from] std::io::Error),

    #[error("Interrupted")]
    Interrupted,
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::YamlError(_) => "yaml",
            Error::KubeError(_) => "kube",
            Error::KubeconfigError(_) => "kubeconfig",
            Error::AlreadyExists { .. } => "already_exists",
            Error::ReadinessTimeout { .. } => "readiness_timeout",
            Error::MissingArgoServerUrl => "missing_argo_server_url",
            Error::ArgoServerClientError(_) => "argo_server",
            Error::TelemetryError(_) => "telemetry",
            Error::StdIoError(_) => "io",
            Error::Interrupted => "interrupted",
        }
        .to_string()
    }
}

/// Provision, wait and submit stages used by main
pub mod pipeline;
pub use crate::pipeline::*;

/// Log and trace integrations
pub mod telemetry;

/// Metrics
mod metrics;
pub use metrics::Metrics;

/// Resources
pub mod resources;

/// Settings
pub mod settings;
pub use settings::Settings;

/// State
mod state;
pub use state::*;

/// Context
mod context;
pub use context::*;

/// Argo Server Client
pub mod argo_server;
pub use argo_server::ArgoServerClient;

#[cfg(test)]
pub mod fixtures;
