//! Common types for the KubeVirt machine-type tooling: resource mirrors,
//! errors, Kubernetes helpers, events and telemetry

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group serving KubeVirt subresources (restart, start, stop, ...)
pub const KUBEVIRT_SUBRESOURCES_GROUP: &str = "subresources.kubevirt.io";

/// API version shared by the KubeVirt core and subresource groups
pub const KUBEVIRT_VERSION: &str = "v1";
