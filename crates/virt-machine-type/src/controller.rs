//! Machine-type job controller
//!
//! `reconcile` is driven by the kube-runtime controller for every
//! VirtualMachine key (VM events and events of the same-named instance).
//! It plans the next step from the local caches, applies it, then rescans
//! the whole VM cache to decide whether the job is done.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use virt_common::crd::{VirtualMachine, VirtualMachineInstance};
use virt_common::events::{actions, reasons, EventPublisher};

use crate::backoff::{RequeueBackoff, DEFAULT_MAX_DELAY};
use crate::cache::{ClusterCache, ObjectKey};
use crate::client::VirtClient;
use crate::completion::{self, JobCompletion};
use crate::config::JobConfig;
use crate::error::JobError;
use crate::plan::{plan, InstanceState, Step};
use crate::tracker::InstanceTracker;

/// Requeue interval for VMs that are still waiting on their instance
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Shared context for the machine-type job controller
pub struct JobContext {
    pub client: Arc<dyn VirtClient>,
    pub cache: Arc<dyn ClusterCache>,
    pub events: Arc<dyn EventPublisher>,
    pub config: JobConfig,
    pub completion: Arc<JobCompletion>,
    pub backoff: RequeueBackoff,
    /// Instances seen running an outdated machine type, per VM
    pub instances: InstanceTracker,
}

impl JobContext {
    pub fn new(
        client: Arc<dyn VirtClient>,
        cache: Arc<dyn ClusterCache>,
        events: Arc<dyn EventPublisher>,
        config: JobConfig,
    ) -> Self {
        Self {
            client,
            cache,
            events,
            config,
            completion: Arc::new(JobCompletion::new()),
            backoff: RequeueBackoff::default(),
            instances: InstanceTracker::new(),
        }
    }

    /// Fire the completion signal if every cached VM has converged
    pub fn exit_job(&self) -> bool {
        completion::exit_job(
            self.cache.as_ref(),
            &self.instances,
            &self.config,
            &self.completion,
        )
    }

    /// Handle that resolves once the job is complete
    pub fn completion(&self) -> Arc<JobCompletion> {
        self.completion.clone()
    }
}

/// Reconcile one VirtualMachine
#[instrument(skip(vm, ctx), fields(vm = %vm.name_any(), namespace = %vm.namespace().unwrap_or_default()))]
pub async fn reconcile(vm: Arc<VirtualMachine>, ctx: Arc<JobContext>) -> Result<Action, JobError> {
    let key = ObjectKey::for_vm(&vm)?;
    let step = execute(&key, &ctx).await?;

    ctx.backoff.reset(&key);
    ctx.exit_job();

    if step.is_converged() {
        Ok(Action::await_change())
    } else {
        Ok(Action::requeue(RESYNC_INTERVAL))
    }
}

/// Requeue a failed key with per-key exponential backoff
pub fn error_policy(vm: Arc<VirtualMachine>, error: &JobError, ctx: Arc<JobContext>) -> Action {
    let delay = match ObjectKey::for_vm(&vm) {
        Ok(key) => ctx.backoff.next_delay(&key),
        Err(_) => DEFAULT_MAX_DELAY,
    };
    warn!(
        ?error,
        vm = %vm.name_any(),
        namespace = %vm.namespace().unwrap_or_default(),
        requeue_ms = delay.as_millis() as u64,
        "machine type reconciliation failed"
    );
    ctx.exit_job();
    Action::requeue(delay)
}

/// Bring one VM a step closer to convergence and return the step applied.
///
/// A VM missing from the cache has been deleted and counts as converged.
/// The live instance of a VM whose template is being converted is recorded
/// in [`JobContext::instances`] until the VM converges.
pub async fn execute(key: &ObjectKey, ctx: &JobContext) -> Result<Step, JobError> {
    let Some(vm) = ctx.cache.virtual_machine(key) else {
        debug!(%key, "VirtualMachine no longer cached, nothing to do");
        ctx.instances.forget(key);
        return Ok(Step::Converged);
    };
    let vmi = ctx.cache.virtual_machine_instance(key);
    let outdated = ctx.instances.get(key);
    let step = plan(&vm, vmi.as_deref(), outdated.as_ref(), &ctx.config);
    let live = InstanceState::of(vmi.as_deref()).live();
    let obj_ref = vm.object_ref(&());
    let (namespace, name) = (key.namespace.as_str(), key.name.as_str());
    let has_status = vm.status.is_some();

    match step {
        Step::RemoveMachineType {
            mark_restart_required,
            restart,
        } => {
            let machine_type = vm.machine_type().unwrap_or_default().to_string();

            // The flag must land before the spec patch
            if mark_restart_required {
                if let Some(vmi) = live {
                    ctx.instances.observe(key, vmi);
                }
                ctx.client
                    .set_restart_required(namespace, name, true, has_status)
                    .await?;
                publish(
                    ctx,
                    &obj_ref,
                    reasons::RESTART_REQUIRED,
                    actions::PATCH,
                    format!("Restart required to apply default machine type (was {machine_type})"),
                )
                .await;
            }

            ctx.client.remove_machine_type(namespace, name).await?;
            info!(%key, %machine_type, "removed outdated machine type");
            publish(
                ctx,
                &obj_ref,
                reasons::MACHINE_TYPE_UPDATED,
                actions::PATCH,
                format!("Removed machine type {machine_type}, VM now uses the architecture default"),
            )
            .await;

            if restart {
                restart_vm(ctx, key, &obj_ref, live).await?;
            }
        }
        Step::ClearRestartRequired => {
            ctx.client
                .set_restart_required(namespace, name, false, has_status)
                .await?;
            info!(%key, "cleared machineTypeRestartRequired");
            publish(
                ctx,
                &obj_ref,
                reasons::RESTART_REQUIRED_CLEARED,
                actions::PATCH,
                "Running instance no longer uses an outdated machine type".to_string(),
            )
            .await;
        }
        Step::Restart => restart_vm(ctx, key, &obj_ref, live).await?,
        Step::AwaitInstance => {
            if let Some(vmi) = live {
                ctx.instances.observe(key, vmi);
            }
            debug!(%key, "waiting for instance to pick up the default machine type");
        }
        Step::Converged => ctx.instances.forget(key),
    }

    Ok(step)
}

async fn restart_vm(
    ctx: &JobContext,
    key: &ObjectKey,
    obj_ref: &ObjectReference,
    vmi: Option<&VirtualMachineInstance>,
) -> Result<(), JobError> {
    ctx.client.restart(&key.namespace, &key.name).await?;
    if let Some(vmi) = vmi {
        ctx.instances.mark_restarted(key, vmi);
    }
    info!(%key, "restarted VirtualMachine");
    publish(
        ctx,
        obj_ref,
        reasons::RESTART_TRIGGERED,
        actions::RESTART,
        "Restarted to apply default machine type".to_string(),
    )
    .await;
    Ok(())
}

async fn publish(ctx: &JobContext, obj_ref: &ObjectReference, reason: &str, action: &str, note: String) {
    ctx.events
        .publish(obj_ref, EventType::Normal, reason, action, Some(note))
        .await;
}
