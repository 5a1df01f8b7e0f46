//! Job configuration
//!
//! Everything the controller needs to know about the conversion run is held
//! in [`JobConfig`] and handed to the context at construction.

use std::fmt;
use std::str::FromStr;

use glob::{MatchOptions, Pattern};
use virt_common::kube_utils::non_empty;

use crate::error::JobError;

/// Shell-style matching: `*` never crosses a `/`, case matters
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Validated glob selecting the machine types to convert
/// (e.g. `pc-q35-rhel8.*` or `pc-q35-rhel[78].?.0`)
#[derive(Clone, Debug)]
pub struct MachineTypeGlob {
    raw: String,
    pattern: Pattern,
}

impl MachineTypeGlob {
    /// Parse and validate a glob
    pub fn new(raw: &str) -> Result<Self, JobError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(JobError::config("machine type glob must not be empty"));
        }
        let pattern = Pattern::new(raw)
            .map_err(|e| JobError::config(format!("invalid machine type glob {raw:?}: {e}")))?;
        Ok(Self {
            raw: raw.to_string(),
            pattern,
        })
    }

    /// Whether the whole machine type matches. Empty types never match.
    pub fn matches(&self, machine_type: &str) -> bool {
        !machine_type.is_empty() && self.pattern.matches_with(machine_type, MATCH_OPTIONS)
    }

    /// The glob as configured
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for MachineTypeGlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for MachineTypeGlob {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Configuration of a conversion run
#[derive(Clone, Debug)]
pub struct JobConfig {
    /// Machine types to convert
    pub machine_type_glob: MachineTypeGlob,
    /// Restart running VMs immediately instead of waiting for their owners to
    pub restart_now: bool,
    /// Restrict the run to one namespace (`None` = all namespaces)
    pub namespace: Option<String>,
    /// Restrict the run to VMs matching this label selector
    pub label_selector: Option<String>,
}

impl JobConfig {
    /// Cluster-wide run without restarts
    pub fn new(machine_type_glob: MachineTypeGlob) -> Self {
        Self {
            machine_type_glob,
            restart_now: false,
            namespace: None,
            label_selector: None,
        }
    }

    /// Restart running VMs as part of the conversion
    pub fn with_restart_now(mut self, restart_now: bool) -> Self {
        self.restart_now = restart_now;
        self
    }

    /// Scope the run to a namespace; blank values mean all namespaces
    pub fn with_namespace(mut self, namespace: Option<&str>) -> Self {
        self.namespace = non_empty(namespace).map(str::to_string);
        self
    }

    /// Select VMs by label; blank values select every VM
    pub fn with_label_selector(mut self, selector: Option<&str>) -> Self {
        self.label_selector = non_empty(selector).map(str::to_string);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glob(raw: &str) -> MachineTypeGlob {
        MachineTypeGlob::new(raw).expect("glob should parse")
    }

    #[test]
    fn test_star_matches_versions() {
        let g = glob("pc-q35-rhel8.*");
        assert!(g.matches("pc-q35-rhel8.2.0"));
        assert!(g.matches("pc-q35-rhel8.6.0"));
        assert!(!g.matches("pc-q35-rhel9.2.0"));
        assert!(!g.matches("q35"));
    }

    #[test]
    fn test_match_is_anchored() {
        let g = glob("rhel8");
        assert!(!g.matches("pc-q35-rhel8.2.0"));
        assert!(g.matches("rhel8"));
    }

    #[test]
    fn test_question_mark_and_classes() {
        let g = glob("pc-q35-rhel[78].?.0");
        assert!(g.matches("pc-q35-rhel7.6.0"));
        assert!(g.matches("pc-q35-rhel8.2.0"));
        assert!(!g.matches("pc-q35-rhel9.2.0"));
        assert!(!g.matches("pc-q35-rhel8.10.0"));

        let negated = glob("pc-q35-rhel[!9].*");
        assert!(negated.matches("pc-q35-rhel8.2.0"));
        assert!(!negated.matches("pc-q35-rhel9.2.0"));
    }

    #[test]
    fn test_case_sensitive() {
        assert!(!glob("PC-Q35-*").matches("pc-q35-rhel8.2.0"));
    }

    #[test]
    fn test_empty_machine_type_never_matches() {
        assert!(!glob("*").matches(""));
        assert!(glob("*").matches("q35"));
    }

    #[test]
    fn test_rejects_empty_and_invalid_globs() {
        assert!(matches!(MachineTypeGlob::new(""), Err(JobError::Config(_))));
        assert!(matches!(MachineTypeGlob::new("   "), Err(JobError::Config(_))));
        assert!(matches!(MachineTypeGlob::new("pc-[q35"), Err(JobError::Config(_))));
    }

    #[test]
    fn test_glob_is_trimmed() {
        let g = glob("  pc-q35-*  ");
        assert_eq!(g.as_str(), "pc-q35-*");
        assert_eq!(g.to_string(), "pc-q35-*");
    }

    #[test]
    fn test_config_builder_normalizes_blanks() {
        let config = JobConfig::new(glob("pc-q35-*"))
            .with_restart_now(true)
            .with_namespace(Some(""))
            .with_label_selector(Some(" app=db "));

        assert!(config.restart_now);
        assert_eq!(config.namespace, None);
        assert_eq!(config.label_selector.as_deref(), Some("app=db"));
    }

    #[test]
    fn test_config_defaults() {
        let config = JobConfig::new(glob("*"));
        assert!(!config.restart_now);
        assert!(config.namespace.is_none());
        assert!(config.label_selector.is_none());
    }
}
