//! Kubeception operator - provisions Kubernetes control planes as workloads
//! inside a host cluster

mod controller_runner;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};

use kubeception_common::crd::all_crds;
use kubeception_common::store::{KubeStore, ObjectStore};
use kubeception_common::FIELD_MANAGER;
use kubeception_controller::{Context, Images, ReconcilerConfig};

use controller_runner::{build_controllers, RequeuePolicy, RunnerContext};
use telemetry::{init_telemetry, LogFormat};

/// Kubeception - CRD-driven operator running virtual Kubernetes control planes
#[derive(Parser, Debug)]
#[command(name = "kubeception", version, about, long_about = None)]
struct Cli {
    /// Print CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Only watch objects in this namespace (default: all namespaces)
    #[arg(long, env = "KUBECEPTION_NAMESPACE")]
    namespace: Option<String>,

    /// Seconds before re-checking a missing prerequisite
    #[arg(long, env = "KUBECEPTION_NOT_READY_REQUEUE_SECS", default_value_t = 3)]
    not_ready_requeue_secs: u64,

    /// Seconds before retrying after a transient error
    #[arg(long, env = "KUBECEPTION_ERROR_REQUEUE_SECS", default_value_t = 15)]
    error_requeue_secs: u64,

    /// Seconds before retrying after a fatal error
    #[arg(long, env = "KUBECEPTION_FATAL_REQUEUE_SECS", default_value_t = 60)]
    fatal_requeue_secs: u64,

    /// Emit logs as JSON lines
    #[arg(long, env = "KUBECEPTION_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            not_ready_requeue: Duration::from_secs(self.not_ready_requeue_secs),
            images: Images::default(),
        }
    }

    fn requeue_policy(&self) -> RequeuePolicy {
        RequeuePolicy {
            transient: Duration::from_secs(self.error_requeue_secs),
            fatal: Duration::from_secs(self.fatal_requeue_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        for crd in all_crds() {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    init_telemetry(LogFormat::from_json_flag(cli.log_json))?;
    run_controllers(cli).await
}

/// Install the CRDs with server-side apply so they track the operator version
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for crd in all_crds() {
        let name = crd.metadata.name.clone().unwrap_or_default();
        tracing::info!(crd = %name, "Installing CRD...");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install {} CRD: {}", name, e))?;
    }

    tracing::info!("All Kubeception CRDs installed/updated");
    Ok(())
}

async fn run_controllers(cli: Cli) -> anyhow::Result<()> {
    tracing::info!("Kubeception operator starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    let store: Arc<dyn ObjectStore> = Arc::new(KubeStore::new(client.clone()));
    let ctx = Arc::new(RunnerContext {
        reconciler: Context::with_config(store, cli.reconciler_config()),
        requeue: cli.requeue_policy(),
    });

    let controllers = build_controllers(client, cli.namespace.clone(), ctx);
    futures::future::join_all(controllers).await;

    tracing::info!("Kubeception operator stopped");
    Ok(())
}
