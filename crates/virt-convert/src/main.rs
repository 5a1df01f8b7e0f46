//! convert-machine-type - strips outdated machine types from KubeVirt VMs

use clap::Parser;
use tracing::{error, info};

use virt_common::kube_utils::create_client;
use virt_common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use virt_convert::cli::Cli;
use virt_convert::runner::{self, RunOutcome};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version print to stdout and are not failures
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_telemetry(TelemetryConfig {
        json_logs: cli.json_logs,
        ..Default::default()
    })?;

    let result = run(cli).await;
    if let Err(e) = &result {
        error!(error = %e, "machine type conversion failed");
    }
    shutdown_telemetry();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.job_config()?;
    let client = create_client(cli.kubeconfig.as_deref()).await?;

    match runner::run(client, config).await? {
        RunOutcome::Converged => {
            info!("machine type conversion complete");
            Ok(())
        }
        RunOutcome::Interrupted => {
            anyhow::bail!("interrupted before all virtual machines converged")
        }
    }
}
