use anyhow::Context as _;
use clap::{Parser, Subcommand};
use kube::ResourceExt;
use minio_crud::{Error, Settings, State, resources, settings::Variant, telemetry};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::*;

#[derive(Parser)]
#[command(name = "minio-crud")]
#[command(about = "Deploy MinIO on Kubernetes and exercise it with an Argo Workflow")]
#[command(version)]
struct Cli {
    /// Namespace for every object, overrides settings
    #[arg(long, short, global = true)]
    namespace: Option<String>,

    /// Path to the kubeconfig file, overrides settings
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Workflow variant, overrides settings
    #[arg(long, global = true, value_enum)]
    variant: Option<Variant>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision MinIO, wait for it and submit the workflow (default).
    Run {
        /// Print the run report as JSON on stdout.
        #[arg(long)]
        json: bool,
    },
    /// Create the PVC, Deployment and Service only.
    Provision,
    /// Wait for a MinIO pod to become ready.
    Wait,
    /// Build and submit the workflow only.
    Submit,
    /// Print every manifest as YAML without contacting the cluster.
    Render,
    /// Delete the Service, Deployment and PVC.
    Teardown,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = Settings::new().context("failed to load settings")?;
        if let Some(namespace) = &self.namespace {
            settings.namespace = namespace.clone();
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            settings.kubeconfig = kubeconfig.clone();
        }
        if let Some(variant) = self.variant {
            settings.workflow.variant = variant;
        }
        Ok(settings)
    }
}

async fn execute(command: Commands, state: &State) -> anyhow::Result<()> {
    let connect = || async {
        let kube_client = minio_crud::connect(state.settings())
            .await
            .context("failed to connect to Kubernetes")?;
        Ok::<_, anyhow::Error>(state.to_context(kube_client))
    };

    match command {
        Commands::Run { json } => {
            let report = minio_crud::run(connect().await?).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if let Some(name) = &report.workflow {
                println!("Workflow {name} submitted successfully!");
            }
        }
        Commands::Provision => {
            for applied in minio_crud::provision(&*connect().await?).await? {
                println!("{} {} {}", applied.kind, applied.name, applied.outcome.as_str());
            }
        }
        Commands::Wait => {
            let (pod, _) = minio_crud::wait(&*connect().await?).await?;
            println!("Pod {pod} is ready");
        }
        Commands::Submit => {
            let workflow = minio_crud::submit(&*connect().await?).await?;
            println!("Workflow {} submitted successfully!", workflow.name_any());
        }
        Commands::Render => {
            print!("{}", resources::render(state.settings())?);
        }
        Commands::Teardown => {
            let deleted = resources::minio::teardown(&*connect().await?).await?;
            println!("Deleted {deleted} objects");
        }
    }

    Ok(())
}

/// Resolves once `signal` fires; never if the handler could not be installed
async fn interrupted(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        warn!("Ctrl-C handler unavailable, running without it: {e}");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = telemetry::init(cli.log_json) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    // Must be installed before any TLS client is built
    let _ = rustls::crypto::ring::default_provider().install_default();

    let settings = match cli.settings() {
        Ok(settings) => settings,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };
    let state = State::new(settings);

    let command = cli.command.unwrap_or(Commands::Run { json: false });
    // Dropping the running stage cancels it; objects created so far are kept
    let result = tokio::select! {
        result = execute(command, &state) => result,
        _ = interrupted(tokio::signal::ctrl_c()) => Err(Error::Interrupted.into()),
    };

    if let Err(e) = state.write_metrics() {
        warn!("failed to write metrics: {e}");
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(namespace = %state.settings().namespace, "{e:#}");
            ExitCode::FAILURE
        }
    }
}
