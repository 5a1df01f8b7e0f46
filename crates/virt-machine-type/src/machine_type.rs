//! Machine-type predicates over VMs and their instances

use virt_common::crd::{Architecture, VirtualMachine, VirtualMachineInstance};

use crate::config::MachineTypeGlob;

/// Whether a machine type is already the default of the given architecture
fn is_arch_default(machine_type: &str, arch: Option<Architecture>) -> bool {
    arch.is_some_and(|a| a.default_machine_type() == machine_type)
}

/// The explicit machine type that should be removed from the VM template,
/// if any: it matches the glob and is not already the architecture default.
pub fn outdated_machine_type<'a>(vm: &'a VirtualMachine, glob: &MachineTypeGlob) -> Option<&'a str> {
    vm.machine_type()
        .filter(|mt| glob.matches(mt) && !is_arch_default(mt, vm.architecture()))
}

/// Whether a running instance has caught up: its observed machine type is
/// unset, no longer matches the glob, or is the architecture default.
pub fn instance_converged(vmi: &VirtualMachineInstance, glob: &MachineTypeGlob) -> bool {
    match vmi.observed_machine_type() {
        None => true,
        Some(mt) => !glob.matches(mt) || is_arch_default(mt, vmi.spec.resolved_architecture()),
    }
}
