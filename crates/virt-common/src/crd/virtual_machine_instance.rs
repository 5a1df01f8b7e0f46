//! VirtualMachineInstance mirror (`kubevirt.io/v1`)
//!
//! `VirtualMachineInstanceSpec` doubles as the spec of VM templates.

use std::fmt;

use kube::CustomResource;
use serde::{Deserialize, Serialize};

use super::types::{Architecture, DomainSpec, Machine};

/// Subset of the VirtualMachineInstance spec
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "kubevirt.io",
    version = "v1",
    kind = "VirtualMachineInstance",
    plural = "virtualmachineinstances",
    shortname = "vmi",
    namespaced,
    status = "VirtualMachineInstanceStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineInstanceSpec {
    /// Domain (hardware) definition
    #[serde(default)]
    pub domain: DomainSpec,

    /// CPU architecture; unset means amd64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
}

impl VirtualMachineInstanceSpec {
    /// The explicitly requested machine type, if any non-empty one is set
    pub fn machine_type(&self) -> Option<&str> {
        self.domain
            .machine
            .as_ref()
            .map(|m| m.type_.as_str())
            .filter(|t| !t.is_empty())
    }

    /// Resolved architecture of this spec
    pub fn resolved_architecture(&self) -> Option<Architecture> {
        Architecture::resolve(self.architecture.as_deref())
    }
}

/// Lifecycle phase of a VMI
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum VirtualMachineInstancePhase {
    /// Accepted, waiting for a pod
    Pending,
    /// Launcher pod is being scheduled
    Scheduling,
    /// Launcher pod is running, domain not yet started
    Scheduled,
    /// Domain is running
    Running,
    /// Domain exited cleanly
    Succeeded,
    /// Domain exited with an error
    Failed,
    /// Phase not reported or not recognized
    #[default]
    #[serde(other)]
    Unknown,
}

impl VirtualMachineInstancePhase {
    /// Whether the VMI has reached a terminal phase
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for VirtualMachineInstancePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Scheduling => "Scheduling",
            Self::Scheduled => "Scheduled",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Observed state of a VMI
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineInstanceStatus {
    /// Lifecycle phase
    #[serde(default)]
    pub phase: VirtualMachineInstancePhase,

    /// Machine type the domain was actually started with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<Machine>,
}

impl VirtualMachineInstance {
    /// Current phase (Unknown when no status is reported yet)
    pub fn phase(&self) -> VirtualMachineInstancePhase {
        self.status
            .as_ref()
            .map(|s| s.phase.clone())
            .unwrap_or_default()
    }

    /// Whether the VMI is being deleted
    pub fn is_terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether the VMI still represents a live guest
    pub fn is_active(&self) -> bool {
        !self.phase().is_final()
    }

    /// Machine type the guest runs with: the status-reported type when
    /// available, otherwise the (webhook-defaulted) spec type
    pub fn observed_machine_type(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.machine.as_ref())
            .map(|m| m.type_.as_str())
            .filter(|t| !t.is_empty())
            .or_else(|| self.spec.machine_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn vmi(
        machine: Option<&str>,
        status: Option<VirtualMachineInstanceStatus>,
    ) -> VirtualMachineInstance {
        let mut spec = VirtualMachineInstanceSpec::default();
        spec.domain.machine = machine.map(Machine::new);
        let mut vmi = VirtualMachineInstance::new("vm-a", spec);
        vmi.status = status;
        vmi
    }

    #[test]
    fn test_machine_type_ignores_empty_type() {
        let mut spec = VirtualMachineInstanceSpec::default();
        assert_eq!(spec.machine_type(), None);

        spec.domain.machine = Some(Machine::default());
        assert_eq!(spec.machine_type(), None);

        spec.domain.machine = Some(Machine::new("pc-q35-rhel8.2.0"));
        assert_eq!(spec.machine_type(), Some("pc-q35-rhel8.2.0"));
    }

    #[test]
    fn test_spec_deserializes_from_kubevirt_json() {
        let spec: VirtualMachineInstanceSpec = serde_json::from_value(serde_json::json!({
            "architecture": "arm64",
            "domain": {
                "machine": { "type": "virt-rhel9.2.0" },
                "devices": { "disks": [] },
                "resources": { "requests": { "memory": "1Gi" } }
            },
            "terminationGracePeriodSeconds": 0
        }))
        .expect("spec should deserialize");

        assert_eq!(spec.machine_type(), Some("virt-rhel9.2.0"));
        assert_eq!(spec.resolved_architecture(), Some(Architecture::Arm64));
    }

    #[test]
    fn test_phase_defaults_to_unknown() {
        let vmi = vmi(None, None);
        assert_eq!(vmi.phase(), VirtualMachineInstancePhase::Unknown);
        assert!(vmi.is_active());
    }

    #[test]
    fn test_final_phases_are_inactive() {
        for phase in [
            VirtualMachineInstancePhase::Succeeded,
            VirtualMachineInstancePhase::Failed,
        ] {
            let vmi = vmi(
                None,
                Some(VirtualMachineInstanceStatus {
                    phase,
                    machine: None,
                }),
            );
            assert!(!vmi.is_active());
        }
    }

    #[test]
    fn test_unrecognized_phase_deserializes_as_unknown() {
        let status: VirtualMachineInstanceStatus =
            serde_json::from_value(serde_json::json!({ "phase": "WaitingForSync" }))
                .expect("status should deserialize");
        assert_eq!(status.phase, VirtualMachineInstancePhase::Unknown);
    }

    #[test]
    fn test_observed_machine_type_prefers_status() {
        let vmi = vmi(
            Some("pc-q35-rhel8.2.0"),
            Some(VirtualMachineInstanceStatus {
                phase: VirtualMachineInstancePhase::Running,
                machine: Some(Machine::new("pc-q35-rhel9.2.0")),
            }),
        );
        assert_eq!(vmi.observed_machine_type(), Some("pc-q35-rhel9.2.0"));
    }

    #[test]
    fn test_observed_machine_type_falls_back_to_spec() {
        let vmi = vmi(
            Some("pc-q35-rhel8.2.0"),
            Some(VirtualMachineInstanceStatus {
                phase: VirtualMachineInstancePhase::Running,
                machine: Some(Machine::default()),
            }),
        );
        assert_eq!(vmi.observed_machine_type(), Some("pc-q35-rhel8.2.0"));
    }

    #[test]
    fn test_terminating_follows_deletion_timestamp() {
        let mut vmi = vmi(None, None);
        assert!(!vmi.is_terminating());
        vmi.metadata.deletion_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()));
        assert!(vmi.is_terminating());
    }

    #[test]
    fn test_deserializes_kubevirt_object() {
        let vmi: VirtualMachineInstance = serde_json::from_value(serde_json::json!({
            "apiVersion": "kubevirt.io/v1",
            "kind": "VirtualMachineInstance",
            "metadata": { "name": "vm-a", "namespace": "default" },
            "spec": {
                "domain": { "machine": { "type": "q35" }, "devices": {} }
            },
            "status": {
                "phase": "Running",
                "machine": { "type": "pc-q35-rhel9.2.0" },
                "nodeName": "node-1"
            }
        }))
        .expect("VirtualMachineInstance should deserialize");

        assert_eq!(vmi.phase(), VirtualMachineInstancePhase::Running);
        assert_eq!(vmi.spec.machine_type(), Some("q35"));
        assert_eq!(vmi.observed_machine_type(), Some("pc-q35-rhel9.2.0"));
    }
}
