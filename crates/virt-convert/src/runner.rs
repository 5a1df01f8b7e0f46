//! Controller runner - wires the watches, the job controller and the
//! completion signal together and drives them until the job ends

use std::sync::Arc;

use futures::{future, Stream, StreamExt};
use kube::runtime::controller::{self, Controller};
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, ResourceExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use virt_common::crd::{VirtualMachine, VirtualMachineInstance};
use virt_common::events::KubeEventPublisher;
use virt_common::kube_utils::{scoped_api, watcher_config};
use virt_machine_type::{
    error_policy, reconcile, JobConfig, JobContext, KubeVirtClient, ReflectorCache,
    CONTROLLER_NAME,
};

type InstanceEvent = Result<watcher::Event<VirtualMachineInstance>, watcher::Error>;

/// Pending VM keys triggered by instance events
const INSTANCE_TRIGGER_BUFFER: usize = 256;

/// How a run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every selected VM converged
    Converged,
    /// Shut down by a signal first
    Interrupted,
}

/// Run the conversion job until every VM converges or a signal arrives
pub async fn run(client: Client, config: JobConfig) -> anyhow::Result<RunOutcome> {
    let namespace = config.namespace.clone();
    let vm_api = scoped_api::<VirtualMachine>(client.clone(), namespace.as_deref());
    let vmi_api = scoped_api::<VirtualMachineInstance>(client.clone(), namespace.as_deref());

    let controller = Controller::new(vm_api, watcher_config(config.label_selector.as_deref()))
        .with_config(controller::Config::default().concurrency(1));
    let vm_store = controller.store();

    let (vmi_store, vmi_writer) = reflector::store();
    let (trigger_tx, trigger_rx) = mpsc::channel(INSTANCE_TRIGGER_BUFFER);
    let instance_watch = tokio::spawn(watch_instances(
        vmi_api,
        vmi_writer,
        vm_store.clone(),
        trigger_tx,
    ));

    info!(
        glob = %config.machine_type_glob,
        restart_now = config.restart_now,
        namespace = namespace.as_deref().unwrap_or("<all>"),
        label_selector = config.label_selector.as_deref().unwrap_or(""),
        "starting machine type conversion"
    );

    tokio::select! {
        ready = vmi_store.wait_until_ready() => ready?,
        _ = shutdown_signal() => {
            instance_watch.abort();
            return Ok(RunOutcome::Interrupted);
        }
    }
    debug!("VirtualMachineInstance cache synced");

    let ctx = Arc::new(JobContext::new(
        Arc::new(KubeVirtClient::new(client.clone())),
        Arc::new(ReflectorCache::new(vm_store.clone(), vmi_store)),
        Arc::new(KubeEventPublisher::new(client, CONTROLLER_NAME)),
        config,
    ));
    let completion = ctx.completion();

    let controller = controller
        .reconcile_on(ReceiverStream::new(trigger_rx))
        .graceful_shutdown_on(completion.token().cancelled_owned())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx.clone())
        .for_each(log_reconcile_result("VirtualMachine"));

    // An empty selection never reconciles anything, so scan once on sync
    let initial_scan = complete_when_synced(&vm_store, &ctx);

    let _ = futures::join!(controller, initial_scan);
    instance_watch.abort();

    Ok(if completion.is_complete() {
        RunOutcome::Converged
    } else {
        RunOutcome::Interrupted
    })
}

/// Once the VM cache has synced, complete the job if nothing is pending.
/// Returns whether the job is complete.
pub async fn complete_when_synced(vms: &Store<VirtualMachine>, ctx: &JobContext) -> bool {
    match vms.wait_until_ready().await {
        Ok(()) => ctx.exit_job(),
        Err(error) => {
            warn!(%error, "VirtualMachine cache never synced");
            false
        }
    }
}

/// Keep the instance cache in sync and enqueue the owning VM of every
/// changed instance that is part of the selection
async fn watch_instances(
    api: kube::Api<VirtualMachineInstance>,
    writer: reflector::store::Writer<VirtualMachineInstance>,
    vms: Store<VirtualMachine>,
    trigger: mpsc::Sender<ObjectRef<VirtualMachine>>,
) {
    let events = reflector::reflector(writer, watcher(api, watcher_config(None))).default_backoff();
    let triggers = instance_triggers(events, vms);
    futures::pin_mut!(triggers);

    while let Some(vm_ref) = triggers.next().await {
        if trigger.send(vm_ref).await.is_err() {
            break;
        }
    }
}

/// Map instance watch events to the VMs to reconcile. Instances whose VM is
/// not in `vms` are outside the selection and dropped.
pub fn instance_triggers<S>(
    events: S,
    vms: Store<VirtualMachine>,
) -> impl Stream<Item = ObjectRef<VirtualMachine>>
where
    S: Stream<Item = InstanceEvent>,
{
    events.filter_map(move |event| {
        let vm_ref = match event {
            Ok(
                watcher::Event::Apply(vmi)
                | watcher::Event::InitApply(vmi)
                | watcher::Event::Delete(vmi),
            ) => owning_vm(&vmi),
            Ok(watcher::Event::Init | watcher::Event::InitDone) => None,
            Err(error) => {
                warn!(%error, "VirtualMachineInstance watch failed, retrying");
                None
            }
        };
        future::ready(vm_ref.filter(|vm_ref| vms.get(vm_ref).is_some()))
    })
}

/// Reference to the VM owning an instance (same namespace and name)
pub fn owning_vm(vmi: &VirtualMachineInstance) -> Option<ObjectRef<VirtualMachine>> {
    let namespace = vmi.namespace()?;
    Some(ObjectRef::new(&vmi.name_any()).within(&namespace))
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut terminate) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
            return;
        }
    }
    let _ = tokio::signal::ctrl_c().await;
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => warn!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
