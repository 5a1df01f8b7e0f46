//! Instances still running an outdated machine type
//!
//! A VMI's reported machine type is the resolved, versioned name (a
//! template asking for `q35` runs as e.g. `pc-q35-rhel9.4.0`), so a glob
//! like `pc-q35-*` keeps matching after a restart. Whether a flagged VM has
//! picked up its converted template is therefore also decided by instance
//! identity: once the UID recorded here is replaced, the new instance was
//! started from the converted template.

use dashmap::DashMap;
use kube::ResourceExt;
use virt_common::crd::VirtualMachineInstance;

use crate::cache::ObjectKey;

/// Instance that was live on an outdated machine type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutdatedInstance {
    /// UID of the VMI
    pub uid: String,
    /// A restart has been requested for this VMI
    pub restarted: bool,
}

impl OutdatedInstance {
    /// Whether `vmi` is this instance
    pub fn is(&self, vmi: &VirtualMachineInstance) -> bool {
        vmi.uid().as_deref() == Some(self.uid.as_str())
    }
}

/// Outdated instances per VM key
#[derive(Debug, Default)]
pub struct InstanceTracker {
    instances: DashMap<ObjectKey, OutdatedInstance>,
}

impl InstanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ObjectKey) -> Option<OutdatedInstance> {
        self.instances.get(key).map(|i| i.clone())
    }

    /// Record `vmi` as outdated. A record for the same instance keeps its
    /// restart state; a record for another instance is replaced.
    pub fn observe(&self, key: &ObjectKey, vmi: &VirtualMachineInstance) {
        let Some(uid) = vmi.uid() else {
            return;
        };
        let mut entry = self
            .instances
            .entry(key.clone())
            .or_insert_with(|| OutdatedInstance {
                uid: uid.clone(),
                restarted: false,
            });
        if entry.uid != uid {
            *entry = OutdatedInstance {
                uid,
                restarted: false,
            };
        }
    }

    /// Record that a restart was requested for `vmi`
    pub fn mark_restarted(&self, key: &ObjectKey, vmi: &VirtualMachineInstance) {
        if let Some(uid) = vmi.uid() {
            self.instances.insert(
                key.clone(),
                OutdatedInstance {
                    uid,
                    restarted: true,
                },
            );
        }
    }

    pub fn forget(&self, key: &ObjectKey) {
        self.instances.remove(key);
    }
}
