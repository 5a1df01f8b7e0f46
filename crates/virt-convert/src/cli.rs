//! Command line and environment configuration

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};

use virt_machine_type::{JobConfig, JobError, MachineTypeGlob};

/// Remove outdated explicit machine types from KubeVirt VirtualMachines
///
/// VMs whose machine type matches the glob fall back to their architecture's
/// default. Running VMs are flagged as needing a restart (or restarted with
/// --restart-now). Exits once every selected VM has converged.
#[derive(Parser, Debug)]
#[command(name = "convert-machine-type", version, about)]
pub struct Cli {
    /// Glob selecting the machine types to remove (e.g. "pc-q35-rhel8.*")
    #[arg(long, env = "MACHINE_TYPE")]
    pub machine_type: String,

    /// Restart running VMs right away instead of waiting for their owners
    #[arg(
        long,
        env = "RESTART_NOW",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub restart_now: bool,

    /// Only convert VMs in this namespace (all namespaces when unset)
    #[arg(long, env = "NAMESPACE")]
    pub namespace: Option<String>,

    /// Only convert VMs matching this label selector
    #[arg(long, env = "LABEL_SELECTOR")]
    pub label_selector: Option<String>,

    /// Path to a kubeconfig file (in-cluster or inferred config when unset)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(
        long,
        env = "JSON_LOGS",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub json_logs: bool,
}

impl Cli {
    /// Validate the settings into a [`JobConfig`]
    pub fn job_config(&self) -> Result<JobConfig, JobError> {
        let glob = MachineTypeGlob::new(&self.machine_type)?;
        Ok(JobConfig::new(glob)
            .with_restart_now(self.restart_now)
            .with_namespace(self.namespace.as_deref())
            .with_label_selector(self.label_selector.as_deref()))
    }
}
