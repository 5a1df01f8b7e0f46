//! Read access to the locally cached VirtualMachines and instances
//!
//! Reconciliation only ever reads from the informer caches; the trait lets
//! tests swap in hand-built stores.

use std::fmt;
use std::sync::Arc;

use kube::runtime::reflector::{ObjectRef, Store};
use kube::ResourceExt;
use virt_common::crd::{VirtualMachine, VirtualMachineInstance};

use crate::error::JobError;

/// Namespaced key of a VM (and of its same-named instance)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a cached VM; VMs are namespaced so a missing namespace is an error
    pub fn for_vm(vm: &VirtualMachine) -> Result<Self, JobError> {
        let name = vm.name_any();
        let namespace = vm
            .namespace()
            .ok_or_else(|| JobError::MissingNamespace(name.clone()))?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Cached cluster state the controller reads from
pub trait ClusterCache: Send + Sync {
    /// VM by key
    fn virtual_machine(&self, key: &ObjectKey) -> Option<Arc<VirtualMachine>>;

    /// Instance of the VM with the given key
    fn virtual_machine_instance(&self, key: &ObjectKey) -> Option<Arc<VirtualMachineInstance>>;

    /// Every cached VM
    fn virtual_machines(&self) -> Vec<Arc<VirtualMachine>>;
}

/// Cache backed by kube-runtime reflector stores
#[derive(Clone)]
pub struct ReflectorCache {
    vms: Store<VirtualMachine>,
    vmis: Store<VirtualMachineInstance>,
}

impl ReflectorCache {
    pub fn new(vms: Store<VirtualMachine>, vmis: Store<VirtualMachineInstance>) -> Self {
        Self { vms, vmis }
    }
}

impl ClusterCache for ReflectorCache {
    fn virtual_machine(&self, key: &ObjectKey) -> Option<Arc<VirtualMachine>> {
        self.vms
            .get(&ObjectRef::new(&key.name).within(&key.namespace))
    }

    fn virtual_machine_instance(&self, key: &ObjectKey) -> Option<Arc<VirtualMachineInstance>> {
        self.vmis
            .get(&ObjectRef::new(&key.name).within(&key.namespace))
    }

    fn virtual_machines(&self) -> Vec<Arc<VirtualMachine>> {
        self.vms.state()
    }
}
