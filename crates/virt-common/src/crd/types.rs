//! Spec fragments shared by VirtualMachine templates and VirtualMachineInstances

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =============================================================================
// Architecture
// =============================================================================

/// CPU architecture of a virtual machine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Architecture {
    /// x86-64; the KubeVirt default when no architecture is set
    #[default]
    Amd64,
    /// 64-bit ARM
    Arm64,
    /// Little-endian POWER
    Ppc64le,
    /// IBM Z
    S390x,
}

impl Architecture {
    /// Resolve the architecture of a spec field, treating an unset or empty
    /// value as the KubeVirt default. Unknown architectures yield `None`.
    pub fn resolve(value: Option<&str>) -> Option<Self> {
        match value.map(str::trim) {
            None | Some("") => Some(Self::default()),
            Some(v) => v.parse().ok(),
        }
    }

    /// Machine type KubeVirt applies when a VM does not request one
    pub fn default_machine_type(self) -> &'static str {
        match self {
            Self::Amd64 => "q35",
            Self::Arm64 => "virt",
            Self::Ppc64le => "pseries",
            Self::S390x => "s390-ccw-virtio",
        }
    }

    /// Canonical lowercase name as used in the KubeVirt API
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
            Self::Ppc64le => "ppc64le",
            Self::S390x => "s390x",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "amd64" | "x86_64" => Ok(Self::Amd64),
            "arm64" | "aarch64" => Ok(Self::Arm64),
            "ppc64le" => Ok(Self::Ppc64le),
            "s390x" => Ok(Self::S390x),
            other => Err(format!("unknown architecture: {other}")),
        }
    }
}

// =============================================================================
// Domain
// =============================================================================

/// Emulated machine selection
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Machine {
    /// QEMU machine type, e.g. `q35` or `pc-q35-rhel8.2.0`
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub type_: String,
}

impl Machine {
    /// Create a machine selection for the given type
    pub fn new(type_: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
        }
    }
}

/// Subset of the KubeVirt domain spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainSpec {
    /// Explicit machine type; absent means the architecture default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<Machine>,
}
