//! Mutating calls against VirtualMachines
//!
//! All writes are JSON patches (or the restart subresource), never full
//! object updates, so fields unknown to the local CRD mirrors survive.

use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use json_patch::{AddOperation, PatchOperation, RemoveOperation};
use jsonptr::PointerBuf;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use virt_common::crd::VirtualMachine;
use virt_common::{KUBEVIRT_SUBRESOURCES_GROUP, KUBEVIRT_VERSION};

use crate::error::JobError;
use crate::CONTROLLER_NAME;

/// Trait abstracting the VM mutations the job controller performs
///
/// Lets tests assert exactly which calls a reconciliation makes.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VirtClient: Send + Sync {
    /// Remove `spec.template.spec.domain.machine` from a VM
    async fn remove_machine_type(&self, namespace: &str, name: &str) -> Result<(), JobError>;

    /// Set `status.machineTypeRestartRequired` on a VM. `has_status` tells
    /// whether the VM already carries a status object.
    async fn set_restart_required(
        &self,
        namespace: &str,
        name: &str,
        required: bool,
        has_status: bool,
    ) -> Result<(), JobError>;

    /// Restart a VM through the KubeVirt `restart` subresource
    async fn restart(&self, namespace: &str, name: &str) -> Result<(), JobError>;
}

/// [`VirtClient`] backed by the Kubernetes API
pub struct KubeVirtClient {
    client: Client,
}

impl KubeVirtClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<VirtualMachine> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(CONTROLLER_NAME.to_string()),
        ..Default::default()
    }
}

/// JSON patch dropping the explicit machine type from the VM template
pub fn remove_machine_type_patch() -> json_patch::Patch {
    json_patch::Patch(vec![PatchOperation::Remove(RemoveOperation {
        path: PointerBuf::from_tokens(["spec", "template", "spec", "domain", "machine"]),
    })])
}

/// JSON patch setting the restart-required status flag
///
/// `add` replaces an existing member, so it works whether or not the flag
/// has been written before. A VM without a status first gets an empty one,
/// since `add` needs the parent object to exist.
pub fn restart_required_patch(required: bool, has_status: bool) -> json_patch::Patch {
    let mut ops = Vec::with_capacity(2);
    if !has_status {
        ops.push(PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["status"]),
            value: serde_json::Value::Object(serde_json::Map::new()),
        }));
    }
    ops.push(PatchOperation::Add(AddOperation {
        path: PointerBuf::from_tokens(["status", "machineTypeRestartRequired"]),
        value: serde_json::Value::Bool(required),
    }));
    json_patch::Patch(ops)
}

/// Path of the `restart` subresource of a VM
pub fn restart_path(namespace: &str, name: &str) -> String {
    format!(
        "/apis/{KUBEVIRT_SUBRESOURCES_GROUP}/{KUBEVIRT_VERSION}/namespaces/{namespace}/virtualmachines/{name}/restart"
    )
}

/// `PUT` request for the `restart` subresource with empty restart options
pub fn restart_request(namespace: &str, name: &str) -> Result<http::Request<Vec<u8>>, JobError> {
    http::Request::put(restart_path(namespace, name))
        .header(CONTENT_TYPE, "application/json")
        .body(b"{}".to_vec())
        .map_err(|e| JobError::Request {
            operation: "restart".to_string(),
            message: e.to_string(),
        })
}

#[async_trait]
impl VirtClient for KubeVirtClient {
    async fn remove_machine_type(&self, namespace: &str, name: &str) -> Result<(), JobError> {
        self.api(namespace)
            .patch(name, &patch_params(), &Patch::Json::<()>(remove_machine_type_patch()))
            .await?;
        debug!(namespace, name, "removed machine type from VirtualMachine template");
        Ok(())
    }

    async fn set_restart_required(
        &self,
        namespace: &str,
        name: &str,
        required: bool,
        has_status: bool,
    ) -> Result<(), JobError> {
        self.api(namespace)
            .patch_status(
                name,
                &patch_params(),
                &Patch::Json::<()>(restart_required_patch(required, has_status)),
            )
            .await?;
        debug!(namespace, name, required, "patched machineTypeRestartRequired");
        Ok(())
    }

    async fn restart(&self, namespace: &str, name: &str) -> Result<(), JobError> {
        let request = restart_request(namespace, name)?;
        self.client.request_text(request).await?;
        debug!(namespace, name, "requested VirtualMachine restart");
        Ok(())
    }
}
