//! Per-VM reconciliation plan
//!
//! [`plan`] looks at one VM, its instance (if any), the outdated instance
//! recorded for it and the job config, and decides the single next step. It
//! is pure so the controller and the completion scan agree on what
//! "converged" means.
//!
//! ```text
//!   spec has outdated type     ──► RemoveMachineType { mark, restart }
//!   flag set, VM stopped       ──► ClearRestartRequired
//!   flag set, VMI caught up    ──► ClearRestartRequired
//!   flag set, VMI replaced     ──► ClearRestartRequired
//!   flag set, VMI restarted    ──► AwaitInstance
//!   flag set, VMI behind       ──► Restart (restart_now) | AwaitInstance
//!   otherwise                  ──► Converged
//! ```

use std::fmt;

use virt_common::crd::{VirtualMachine, VirtualMachineInstance};

use crate::config::JobConfig;
use crate::machine_type::{instance_converged, outdated_machine_type};
use crate::tracker::OutdatedInstance;

/// Next step for a VM
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Remove the explicit machine type from the VM template
    RemoveMachineType {
        /// The VM is running; flag it as needing a restart first
        mark_restart_required: bool,
        /// Restart it right after the spec patch
        restart: bool,
    },
    /// Remove the restart-required flag
    ClearRestartRequired,
    /// Restart a running VM whose instance still has the old machine type
    Restart,
    /// Nothing to do until the instance changes (owner restart or deletion)
    AwaitInstance,
    /// Nothing left to do
    Converged,
}

impl Step {
    /// Whether the VM needs no further work
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoveMachineType { .. } => write!(f, "RemoveMachineType"),
            Self::ClearRestartRequired => write!(f, "ClearRestartRequired"),
            Self::Restart => write!(f, "Restart"),
            Self::AwaitInstance => write!(f, "AwaitInstance"),
            Self::Converged => write!(f, "Converged"),
        }
    }
}

/// What the instance cache says about a VM's guest
#[derive(Clone, Copy, Debug)]
pub enum InstanceState<'a> {
    /// No VMI exists
    Absent,
    /// The VMI reached a final phase
    Stopped,
    /// The VMI is live but being deleted (stop or restart in progress)
    Terminating(&'a VirtualMachineInstance),
    /// The VMI is live
    Running(&'a VirtualMachineInstance),
}

impl<'a> InstanceState<'a> {
    /// Classify a cached VMI
    pub fn of(vmi: Option<&'a VirtualMachineInstance>) -> Self {
        match vmi {
            None => Self::Absent,
            Some(vmi) if !vmi.is_active() => Self::Stopped,
            Some(vmi) if vmi.is_terminating() => Self::Terminating(vmi),
            Some(vmi) => Self::Running(vmi),
        }
    }

    /// Whether a guest is live, including one shutting down
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_) | Self::Terminating(_))
    }

    /// The live VMI, including one shutting down
    pub fn live(&self) -> Option<&'a VirtualMachineInstance> {
        match self {
            Self::Running(vmi) | Self::Terminating(vmi) => Some(vmi),
            Self::Absent | Self::Stopped => None,
        }
    }
}

/// Decide the next step for `vm` given its cached instance and the instance
/// recorded as outdated for it, if any
pub fn plan(
    vm: &VirtualMachine,
    vmi: Option<&VirtualMachineInstance>,
    outdated: Option<&OutdatedInstance>,
    config: &JobConfig,
) -> Step {
    let glob = &config.machine_type_glob;
    let instance = InstanceState::of(vmi);

    if outdated_machine_type(vm, glob).is_some() {
        let restart = match instance {
            InstanceState::Running(vmi) => {
                let restarted = outdated.is_some_and(|record| record.restarted && record.is(vmi));
                config.restart_now && !restarted
            }
            _ => false,
        };
        return Step::RemoveMachineType {
            mark_restart_required: instance.is_running(),
            restart,
        };
    }

    if !vm.restart_required() {
        return Step::Converged;
    }

    match instance {
        InstanceState::Absent | InstanceState::Stopped => Step::ClearRestartRequired,
        InstanceState::Terminating(_) => Step::AwaitInstance,
        InstanceState::Running(vmi) => match outdated {
            _ if instance_converged(vmi, glob) => Step::ClearRestartRequired,
            Some(record) if !record.is(vmi) => Step::ClearRestartRequired,
            Some(record) if record.restarted => Step::AwaitInstance,
            _ if config.restart_now => Step::Restart,
            _ => Step::AwaitInstance,
        },
    }
}
