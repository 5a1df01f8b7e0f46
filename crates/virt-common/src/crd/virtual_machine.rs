//! VirtualMachine mirror (`kubevirt.io/v1`)

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

use super::types::Architecture;
use super::virtual_machine_instance::VirtualMachineInstanceSpec;

/// Template the VM controller stamps VirtualMachineInstances from
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineInstanceTemplateSpec {
    /// Template metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ObjectMeta>,

    /// Spec of the VMIs created from this template
    #[serde(default)]
    pub spec: VirtualMachineInstanceSpec,
}

/// Desired state of a virtual machine
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "kubevirt.io",
    version = "v1",
    kind = "VirtualMachine",
    plural = "virtualmachines",
    shortname = "vm",
    namespaced,
    status = "VirtualMachineStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    /// Legacy on/off switch, superseded by `runStrategy`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,

    /// Run strategy (Always, Halted, Manual, RerunOnFailure, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_strategy: Option<String>,

    /// VMI template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<VirtualMachineInstanceTemplateSpec>,
}

/// Observed state of a virtual machine
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineStatus {
    /// Whether a VMI exists for this VM
    #[serde(default)]
    pub created: bool,

    /// Whether the VMI is ready
    #[serde(default)]
    pub ready: bool,

    /// Human-readable state (Running, Stopped, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub printable_status: Option<String>,

    /// Set when the machine type was changed while the VM was running and the
    /// running instance still uses the old machine type
    #[serde(default)]
    pub machine_type_restart_required: bool,
}

impl VirtualMachine {
    /// The explicitly requested machine type of the VM template
    pub fn machine_type(&self) -> Option<&str> {
        self.spec
            .template
            .as_ref()
            .and_then(|t| t.spec.machine_type())
    }

    /// Resolved architecture of the VM template (`None` if unknown)
    pub fn architecture(&self) -> Option<Architecture> {
        match &self.spec.template {
            Some(t) => t.spec.resolved_architecture(),
            None => Some(Architecture::default()),
        }
    }

    /// Whether the status carries the restart-required flag
    pub fn restart_required(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.machine_type_restart_required)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::Machine;

    fn vm_with_template(spec: VirtualMachineInstanceSpec) -> VirtualMachine {
        VirtualMachine::new(
            "vm-a",
            VirtualMachineSpec {
                template: Some(VirtualMachineInstanceTemplateSpec {
                    metadata: None,
                    spec,
                }),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_machine_type_from_template() {
        let mut spec = VirtualMachineInstanceSpec::default();
        spec.domain.machine = Some(Machine::new("pc-q35-rhel8.2.0"));
        let vm = vm_with_template(spec);
        assert_eq!(vm.machine_type(), Some("pc-q35-rhel8.2.0"));
    }

    #[test]
    fn test_machine_type_absent_without_template() {
        let vm = VirtualMachine::new("vm-a", VirtualMachineSpec::default());
        assert_eq!(vm.machine_type(), None);
        assert_eq!(vm.architecture(), Some(Architecture::Amd64));
    }

    #[test]
    fn test_restart_required_defaults_false() {
        let mut vm = VirtualMachine::new("vm-a", VirtualMachineSpec::default());
        assert!(!vm.restart_required());

        vm.status = Some(VirtualMachineStatus {
            machine_type_restart_required: true,
            ..Default::default()
        });
        assert!(vm.restart_required());
    }

    #[test]
    fn test_deserializes_full_kubevirt_object() {
        let vm: VirtualMachine = serde_json::from_value(serde_json::json!({
            "apiVersion": "kubevirt.io/v1",
            "kind": "VirtualMachine",
            "metadata": { "name": "vm-a", "namespace": "default", "labels": { "app": "db" } },
            "spec": {
                "runStrategy": "Always",
                "template": {
                    "metadata": { "labels": { "kubevirt.io/vm": "vm-a" } },
                    "spec": {
                        "domain": {
                            "machine": { "type": "pc-q35-rhel8.2.0" },
                            "devices": {}
                        },
                        "volumes": []
                    }
                }
            },
            "status": {
                "created": true,
                "ready": true,
                "printableStatus": "Running",
                "machineTypeRestartRequired": true,
                "conditions": []
            }
        }))
        .expect("VirtualMachine should deserialize");

        assert_eq!(vm.machine_type(), Some("pc-q35-rhel8.2.0"));
        assert_eq!(vm.spec.run_strategy.as_deref(), Some("Always"));
        assert!(vm.restart_required());
        assert_eq!(
            vm.status.as_ref().and_then(|s| s.printable_status.as_deref()),
            Some("Running")
        );
    }

    #[test]
    fn test_api_coordinates() {
        use kube::Resource;

        assert_eq!(VirtualMachine::group(&()), "kubevirt.io");
        assert_eq!(VirtualMachine::version(&()), crate::KUBEVIRT_VERSION);
        assert_eq!(VirtualMachine::plural(&()), "virtualmachines");
    }
}
