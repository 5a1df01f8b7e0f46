//! Job completion detection
//!
//! After every reconciliation the whole VM cache is re-planned; once no VM
//! has anything left to do the completion signal fires, exactly once.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{ClusterCache, ObjectKey};
use crate::config::JobConfig;
use crate::plan::{plan, Step};
use crate::tracker::InstanceTracker;

/// One-shot completion signal for the conversion job
#[derive(Debug, Default)]
pub struct JobCompletion {
    fired: AtomicBool,
    token: CancellationToken,
}

impl JobCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns `true` only for the call that fired it.
    pub fn complete(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_complete(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Token cancelled on completion, for wiring into shutdown selectors
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Every cached VM that still has work left, with its next step
pub fn pending_vms(
    cache: &dyn ClusterCache,
    tracker: &InstanceTracker,
    config: &JobConfig,
) -> Vec<(ObjectKey, Step)> {
    let mut pending: Vec<_> = cache
        .virtual_machines()
        .iter()
        .filter_map(|vm| {
            let key = ObjectKey::for_vm(vm).ok()?;
            let vmi = cache.virtual_machine_instance(&key);
            let outdated = tracker.get(&key);
            let step = plan(vm, vmi.as_deref(), outdated.as_ref(), config);
            (!step.is_converged()).then_some((key, step))
        })
        .collect();
    pending.sort_by(|a, b| a.0.cmp(&b.0));
    pending
}

/// Scan the VM cache and fire `completion` if every VM has converged.
///
/// Returns whether the job is complete.
pub fn exit_job(
    cache: &dyn ClusterCache,
    tracker: &InstanceTracker,
    config: &JobConfig,
    completion: &JobCompletion,
) -> bool {
    if completion.is_complete() {
        return true;
    }

    let pending = pending_vms(cache, tracker, config);
    if !pending.is_empty() {
        debug!(
            pending = pending.len(),
            next = %pending[0].0,
            step = %pending[0].1,
            "virtual machines still converging"
        );
        return false;
    }

    if completion.complete() {
        info!(
            glob = %config.machine_type_glob,
            vms = cache.virtual_machines().len(),
            "all virtual machines converged, machine type conversion complete"
        );
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::TestCache;
    use crate::config::MachineTypeGlob;
    use virt_common::crd::{
        Machine, VirtualMachine, VirtualMachineInstance, VirtualMachineInstancePhase,
        VirtualMachineInstanceSpec, VirtualMachineInstanceStatus,
        VirtualMachineInstanceTemplateSpec, VirtualMachineSpec, VirtualMachineStatus,
    };

    fn config() -> JobConfig {
        JobConfig::new(MachineTypeGlob::new("pc-q35-rhel8.*").expect("glob should parse"))
    }

    fn vm(name: &str, machine_type: Option<&str>, restart_required: bool) -> VirtualMachine {
        let mut spec = VirtualMachineInstanceSpec::default();
        spec.domain.machine = machine_type.map(Machine::new);
        let mut vm = VirtualMachine::new(
            name,
            VirtualMachineSpec {
                template: Some(VirtualMachineInstanceTemplateSpec {
                    metadata: None,
                    spec,
                }),
                ..Default::default()
            },
        );
        vm.metadata.namespace = Some("default".to_string());
        vm.status = Some(VirtualMachineStatus {
            machine_type_restart_required: restart_required,
            ..Default::default()
        });
        vm
    }

    fn running_vmi(name: &str, machine_type: &str) -> VirtualMachineInstance {
        let mut vmi = VirtualMachineInstance::new(name, VirtualMachineInstanceSpec::default());
        vmi.metadata.namespace = Some("default".to_string());
        vmi.status = Some(VirtualMachineInstanceStatus {
            phase: VirtualMachineInstancePhase::Running,
            machine: Some(Machine::new(machine_type)),
        });
        vmi
    }

    #[test]
    fn test_complete_fires_once() {
        let completion = JobCompletion::new();
        assert!(!completion.is_complete());
        assert!(completion.complete());
        assert!(!completion.complete());
        assert!(completion.is_complete());
        assert!(completion.token().is_cancelled());
    }

    #[test]
    fn test_empty_cache_completes() {
        let test = TestCache::new();
        let completion = JobCompletion::new();
        assert!(exit_job(&test.cache, &InstanceTracker::new(), &config(), &completion));
        assert!(completion.is_complete());
    }

    #[test]
    fn test_does_not_complete_with_outdated_spec() {
        let mut test = TestCache::new();
        test.put_vm(vm("vm-a", Some("pc-q35-rhel8.2.0"), false));
        test.put_vm(vm("vm-b", None, false));

        let completion = JobCompletion::new();
        assert!(!exit_job(&test.cache, &InstanceTracker::new(), &config(), &completion));
        assert!(!completion.is_complete());

        let pending = pending_vms(&test.cache, &InstanceTracker::new(), &config());
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, ObjectKey::new("default", "vm-a"));
    }

    #[test]
    fn test_does_not_complete_while_instance_lags() {
        let mut test = TestCache::new();
        test.put_vm(vm("vm-a", None, true));
        test.put_vmi(running_vmi("vm-a", "pc-q35-rhel8.2.0"));

        let completion = JobCompletion::new();
        assert!(!exit_job(&test.cache, &InstanceTracker::new(), &config(), &completion));
        assert_eq!(
            pending_vms(&test.cache, &InstanceTracker::new(), &config()),
            vec![(ObjectKey::new("default", "vm-a"), Step::AwaitInstance)]
        );
    }

    #[test]
    fn test_does_not_complete_with_stale_flag() {
        let mut test = TestCache::new();
        test.put_vm(vm("vm-a", None, true));

        let completion = JobCompletion::new();
        assert!(!exit_job(&test.cache, &InstanceTracker::new(), &config(), &completion));
        assert_eq!(
            pending_vms(&test.cache, &InstanceTracker::new(), &config()),
            vec![(ObjectKey::new("default", "vm-a"), Step::ClearRestartRequired)]
        );
    }

    #[test]
    fn test_completes_once_everything_converged() {
        let mut test = TestCache::new();
        test.put_vm(vm("vm-a", None, false));
        test.put_vm(vm("vm-b", Some("pc-q35-rhel9.2.0"), false));
        test.put_vmi(running_vmi("vm-b", "pc-q35-rhel9.2.0"));

        let completion = JobCompletion::new();
        assert!(exit_job(&test.cache, &InstanceTracker::new(), &config(), &completion));
        assert!(completion.is_complete());
        // Subsequent scans are no-ops
        assert!(exit_job(&test.cache, &InstanceTracker::new(), &config(), &completion));
    }

    #[test]
    fn test_pending_is_sorted_by_key() {
        let mut test = TestCache::new();
        for name in ["vm-c", "vm-a", "vm-b"] {
            test.put_vm(vm(name, Some("pc-q35-rhel8.2.0"), false));
        }
        let names: Vec<_> = pending_vms(&test.cache, &InstanceTracker::new(), &config())
            .into_iter()
            .map(|(key, _)| key.name)
            .collect();
        assert_eq!(names, vec!["vm-a", "vm-b", "vm-c"]);
    }

    #[test]
    fn test_replaced_instance_counts_as_converged() {
        let config = JobConfig::new(MachineTypeGlob::new("pc-q35-*").expect("glob should parse"));
        let mut test = TestCache::new();
        test.put_vm(vm("vm-a", None, true));
        let mut vmi = running_vmi("vm-a", "pc-q35-rhel9.4.0");
        vmi.metadata.uid = Some("uid-1".to_string());
        test.put_vmi(vmi.clone());

        let tracker = InstanceTracker::new();
        let key = ObjectKey::new("default", "vm-a");
        tracker.mark_restarted(&key, &vmi);
        assert_eq!(
            pending_vms(&test.cache, &tracker, &config),
            vec![(key.clone(), Step::AwaitInstance)]
        );

        vmi.metadata.uid = Some("uid-2".to_string());
        test.put_vmi(vmi);
        assert_eq!(
            pending_vms(&test.cache, &tracker, &config),
            vec![(key, Step::ClearRestartRequired)]
        );
    }
}
