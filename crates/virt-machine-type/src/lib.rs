//! Machine-type conversion job for KubeVirt
//!
//! Watches VirtualMachines and their instances, strips explicit machine
//! types that match a configured glob so VMs fall back to their
//! architecture's default, tracks which running VMs need a restart to pick
//! the change up, and signals completion once every VM has converged.
//!
//! - [`plan`]: pure per-VM decision logic
//! - [`controller`]: `execute`/`reconcile`/`error_policy` wiring the plan to the API
//! - [`completion`]: one-shot completion signal and the store scan behind it

pub mod backoff;
pub mod cache;
pub mod client;
pub mod completion;
pub mod config;
pub mod controller;
pub mod error;
pub mod machine_type;
pub mod plan;
pub mod tracker;

pub use cache::{ClusterCache, ObjectKey, ReflectorCache};
pub use client::{KubeVirtClient, VirtClient};
pub use completion::JobCompletion;
pub use config::{JobConfig, MachineTypeGlob};
pub use controller::{error_policy, execute, reconcile, JobContext};
pub use error::JobError;

/// Name reported as field manager and event reporting component
pub const CONTROLLER_NAME: &str = "convert-machine-type";
