//! Rust mirrors of the KubeVirt resources the machine-type tooling reads
//!
//! Only the fields the controllers inspect are modelled. Unknown fields are
//! ignored on deserialization and every write is a JSON patch, so nothing is
//! lost on the server.

mod types;
mod virtual_machine;
mod virtual_machine_instance;

pub use types::{Architecture, DomainSpec, Machine};
pub use virtual_machine::{
    VirtualMachine, VirtualMachineInstanceTemplateSpec, VirtualMachineSpec, VirtualMachineStatus,
};
pub use virtual_machine_instance::{
    VirtualMachineInstance, VirtualMachineInstancePhase, VirtualMachineInstanceSpec,
    VirtualMachineInstanceStatus,
};
