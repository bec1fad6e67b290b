use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub namespace: String,
    pub kubeconfig: PathBuf,
    pub minio: Minio,
    pub credentials: Credentials,
    pub workflow: Workflow,
    pub readiness: Readiness,
    pub provision: Provision,
    pub submit: Submit,
    pub metrics: MetricsSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: "argo".into(),
            kubeconfig: PathBuf::from("./kubeconfig"),
            minio: Minio::default(),
            credentials: Credentials::default(),
            workflow: Workflow::default(),
            readiness: Readiness::default(),
            provision: Provision::default(),
            submit: Submit::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Minio {
    pub name: String,
    pub pvc_name: String,
    pub image: String,
    pub args: Vec<String>,
    pub api_port: i32,
    pub console_port: i32,
    pub storage: String,
    pub storage_class: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl Default for Minio {
    fn default() -> Self {
        Self {
            name: "minio".into(),
            pvc_name: "minio-pvc".into(),
            image: "quay.io/minio/minio:latest".into(),
            args: ["server", "/data", "--console-address", ":9001"]
                .map(String::from)
                .to_vec(),
            api_port: 9000,
            console_port: 9001,
            storage: "1Gi".into(),
            storage_class: None,
            labels: BTreeMap::from([("app".to_string(), "minio".to_string())]),
        }
    }
}

impl Minio {
    /// Label selector matching the pods of the deployment, e.g. `app=minio`
    pub fn selector(&self) -> String {
        self.labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Object store credentials, either inline or read from an existing Secret.
///
/// When `secret_name` is set, containers reference the keys `access-key`
/// and `secret-key` of that Secret and the inline values are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub secret_name: Option<String>,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            access_key: "minioadmin".into(),
            secret_key: "thisisfortesting".into(),
            secret_name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// Create, read, update and delete an object through the AWS CLI
    #[default]
    MinioCrud,
    /// Placeholder containers that only echo their step
    EchoDemo,
}

impl Variant {
    pub fn needs_object_store(&self) -> bool {
        matches!(self, Variant::MinioCrud)
    }

    pub fn default_generate_name(&self) -> &'static str {
        match self {
            Variant::MinioCrud => "minio-crud-",
            Variant::EchoDemo => "echo-demo-task-",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Workflow {
    pub variant: Variant,
    /// Falls back to the variant's prefix when unset
    pub generate_name: Option<String>,
    pub service_account: String,
    pub entrypoint: String,
    pub cli_image: String,
    pub echo_image: String,
    pub endpoint: String,
    pub bucket: String,
    pub object_key: String,
    pub scratch_file: String,
    pub capture_outputs: bool,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            variant: Variant::default(),
            generate_name: None,
            service_account: "argo".into(),
            entrypoint: "main".into(),
            cli_image: "amazon/aws-cli:latest".into(),
            echo_image: "busybox:latest".into(),
            endpoint: "http://minio:9000".into(),
            bucket: "testbucket".into(),
            object_key: "himinio.txt".into(),
            scratch_file: "/tmp/himinio.txt".into(),
            capture_outputs: false,
        }
    }
}

impl Workflow {
    pub fn generate_name(&self) -> String {
        self.generate_name
            .clone()
            .unwrap_or_else(|| self.variant.default_generate_name().to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Readiness {
    pub timeout_secs: u64,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for Readiness {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            initial_interval_ms: 2_000,
            max_interval_ms: 30_000,
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

/// Longest wait accepted for a pod to become ready
pub const MAX_READINESS_TIMEOUT_SECS: u64 = 30 * 24 * 60 * 60;

impl Readiness {
    /// Capped at [`MAX_READINESS_TIMEOUT_SECS`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.min(MAX_READINESS_TIMEOUT_SECS))
    }

    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs > MAX_READINESS_TIMEOUT_SECS {
            return Err(ConfigError::Message(format!(
                "readiness.timeout_secs must be at most {MAX_READINESS_TIMEOUT_SECS}"
            )));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::Message(
                "readiness.multiplier must be a finite number of at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Message(
                "readiness.jitter must be between 0 and 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Existing objects count as applied and are left untouched
    #[default]
    Ignore,
    Fail,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Provision {
    pub conflict_policy: ConflictPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmitBackend {
    #[default]
    Kubernetes,
    ArgoServer,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Submit {
    pub backend: SubmitBackend,
    pub argo_server_url: Option<String>,
    pub argo_server_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Where to write OpenMetrics text after a run
    pub textfile: Option<PathBuf>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("settings").required(false))
            .add_source(File::with_name("/etc/minio-crud/settings").required(false))
            .add_source(
                Environment::with_prefix("MINIOCRUD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = settings.try_deserialize()?;
        settings.readiness.validate()?;
        Ok(settings)
    }

    pub fn minio(&self) -> &Minio {
        &self.minio
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }
}
