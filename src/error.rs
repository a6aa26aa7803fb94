//! Error types with error codes and fix suggestions
//!
//! Error code ranges:
//! - PROV-000-009: Configuration loading
//! - PROV-010-029: Graph errors (duplicates, unknown references, cycles)
//! - PROV-030-039: Placeholder/template errors
//! - PROV-040-049: Resolution errors
//! - PROV-050-059: Redirection errors
//! - PROV-060-069: Dispatch errors (unsupported kinds)
//! - PROV-070-079: Reconciliation errors
//! - PROV-080-089: Provisioning errors
//! - PROV-090-099: Run control (cancellation)

use std::fmt;

use thiserror::Error;

use crate::model::Channel;

pub type Result<T> = std::result::Result<T, ProvisioError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Phase of the run an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Configuration and graph construction (before any external call)
    Graph,
    /// Value / expression resolution
    Resolve,
    /// External resource enumeration and reconciliation
    Enumerate,
    /// Create/deploy calls
    Provision,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Graph => "graph",
            Phase::Resolve => "resolve",
            Phase::Enumerate => "enumerate",
            Phase::Provision => "provision",
        };
        f.write_str(s)
    }
}

/// Error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Fatal, surfaced before any external call
    Configuration,
    /// An expression was resolved before its target was provisioned
    UnresolvedReference,
    /// External create/deploy failed or timed out
    Provisioning,
    /// More than one external object claims a resource's identity
    Reconciliation,
    /// The run was cancelled
    Cancelled,
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum ProvisioError {
    // ═══════════════════════════════════════════
    // CONFIG (000-009)
    // ═══════════════════════════════════════════
    #[error("[PROV-001] Invalid run configuration: {reason}")]
    Config { reason: String },

    // ═══════════════════════════════════════════
    // GRAPH (010-029)
    // ═══════════════════════════════════════════
    #[error("[PROV-010] Resource '{name}' is declared more than once")]
    DuplicateResource { name: String },

    #[error("[PROV-011] Resource '{resource}' references unknown resource '{target}'")]
    UnknownReference { resource: String, target: String },

    #[error("[PROV-012] Resource '{resource}' declares unknown parent '{parent}'")]
    UnknownParent { resource: String, parent: String },

    #[error("[PROV-020] Cycle detected in resource graph: {cycle}")]
    CycleDetected { cycle: String },

    // ═══════════════════════════════════════════
    // PLACEHOLDERS (030-039)
    // ═══════════════════════════════════════════
    #[error("[PROV-030] Malformed placeholder in '{template}' of '{resource}' at position {position}: {details}")]
    MalformedPlaceholder {
        resource: String,
        template: String,
        position: usize,
        details: String,
    },

    // ═══════════════════════════════════════════
    // RESOLUTION (040-049)
    // ═══════════════════════════════════════════
    #[error("[PROV-040] Output '{target}.{channel}.{key}' is not yet available (needed by '{resource}')")]
    UnresolvedReference {
        resource: String,
        target: String,
        channel: Channel,
        key: String,
    },

    #[error("[PROV-041] Resource '{resource}' has no value")]
    NoValue { resource: String },

    #[error("[PROV-042] Resource '{resource}' exposes no connection string")]
    NoConnectionString { resource: String },

    #[error("[PROV-043] Circular expression while resolving '{resource}': {chain}")]
    CircularExpression { resource: String, chain: String },

    #[error("[PROV-044] Environment callback of '{resource}' failed: {reason}")]
    EnvironmentCallback { resource: String, reason: String },

    // ═══════════════════════════════════════════
    // REDIRECTION (050-059)
    // ═══════════════════════════════════════════
    #[error("[PROV-050] Resource '{resource}' is already redirected to a cloud counterpart")]
    AlreadyRedirected { resource: String },

    #[error("[PROV-051] Resource '{resource}' cannot be redirected: {reason}")]
    InvalidRedirect { resource: String, reason: String },

    // ═══════════════════════════════════════════
    // DISPATCH (060-069)
    // ═══════════════════════════════════════════
    #[error("[PROV-060] No provisioner registered for kind '{kind}' (resource '{resource}')")]
    UnsupportedKind { resource: String, kind: String },

    // ═══════════════════════════════════════════
    // RECONCILIATION (070-079)
    // ═══════════════════════════════════════════
    #[error("[PROV-070] {} existing objects claim resource '{resource}': {}", .matches.len(), .matches.join(", "))]
    ReconciliationAmbiguity {
        resource: String,
        matches: Vec<String>,
    },

    #[error("[PROV-071] Enumerating existing objects for '{resource}' failed: {reason}")]
    EnumerationFailed { resource: String, reason: String },

    // ═══════════════════════════════════════════
    // PROVISIONING (080-089)
    // ═══════════════════════════════════════════
    #[error("[PROV-080] Provisioning '{resource}' failed: {reason}")]
    ProvisioningFailed { resource: String, reason: String },

    #[error("[PROV-081] Provisioning '{resource}' timed out after {timeout_ms}ms")]
    ProvisioningTimeout { resource: String, timeout_ms: u64 },

    // ═══════════════════════════════════════════
    // RUN CONTROL (090-099)
    // ═══════════════════════════════════════════
    #[error("[PROV-090] Provisioning of '{resource}' was cancelled")]
    Cancelled { resource: String },
}

impl ProvisioError {
    /// Error code (e.g., "PROV-040")
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "PROV-001",
            Self::DuplicateResource { .. } => "PROV-010",
            Self::UnknownReference { .. } => "PROV-011",
            Self::UnknownParent { .. } => "PROV-012",
            Self::CycleDetected { .. } => "PROV-020",
            Self::MalformedPlaceholder { .. } => "PROV-030",
            Self::UnresolvedReference { .. } => "PROV-040",
            Self::NoValue { .. } => "PROV-041",
            Self::NoConnectionString { .. } => "PROV-042",
            Self::CircularExpression { .. } => "PROV-043",
            Self::EnvironmentCallback { .. } => "PROV-044",
            Self::AlreadyRedirected { .. } => "PROV-050",
            Self::InvalidRedirect { .. } => "PROV-051",
            Self::UnsupportedKind { .. } => "PROV-060",
            Self::ReconciliationAmbiguity { .. } => "PROV-070",
            Self::EnumerationFailed { .. } => "PROV-071",
            Self::ProvisioningFailed { .. } => "PROV-080",
            Self::ProvisioningTimeout { .. } => "PROV-081",
            Self::Cancelled { .. } => "PROV-090",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. }
            | Self::DuplicateResource { .. }
            | Self::UnknownReference { .. }
            | Self::UnknownParent { .. }
            | Self::CycleDetected { .. }
            | Self::MalformedPlaceholder { .. }
            | Self::CircularExpression { .. }
            | Self::AlreadyRedirected { .. }
            | Self::InvalidRedirect { .. }
            | Self::UnsupportedKind { .. } => ErrorCategory::Configuration,
            Self::UnresolvedReference { .. }
            | Self::NoValue { .. }
            | Self::NoConnectionString { .. } => ErrorCategory::UnresolvedReference,
            Self::ReconciliationAmbiguity { .. } | Self::EnumerationFailed { .. } => {
                ErrorCategory::Reconciliation
            }
            Self::ProvisioningFailed { .. }
            | Self::ProvisioningTimeout { .. }
            | Self::EnvironmentCallback { .. } => ErrorCategory::Provisioning,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Self::UnresolvedReference { .. }
            | Self::NoValue { .. }
            | Self::NoConnectionString { .. }
            | Self::CircularExpression { .. }
            | Self::EnvironmentCallback { .. } => Phase::Resolve,
            Self::ReconciliationAmbiguity { .. } | Self::EnumerationFailed { .. } => {
                Phase::Enumerate
            }
            Self::ProvisioningFailed { .. }
            | Self::ProvisioningTimeout { .. }
            | Self::Cancelled { .. } => Phase::Provision,
            _ => Phase::Graph,
        }
    }

    /// The offending resource, when the error is tied to one
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::Config { .. } | Self::CycleDetected { .. } => None,
            Self::DuplicateResource { name } => Some(name),
            Self::UnknownReference { resource, .. }
            | Self::UnknownParent { resource, .. }
            | Self::MalformedPlaceholder { resource, .. }
            | Self::UnresolvedReference { resource, .. }
            | Self::NoValue { resource }
            | Self::NoConnectionString { resource }
            | Self::CircularExpression { resource, .. }
            | Self::EnvironmentCallback { resource, .. }
            | Self::AlreadyRedirected { resource }
            | Self::InvalidRedirect { resource, .. }
            | Self::UnsupportedKind { resource, .. }
            | Self::ReconciliationAmbiguity { resource, .. }
            | Self::EnumerationFailed { resource, .. }
            | Self::ProvisioningFailed { resource, .. }
            | Self::ProvisioningTimeout { resource, .. }
            | Self::Cancelled { resource } => Some(resource),
        }
    }

    /// Check if error is fatal for the whole run (surfaced before any external call)
    pub fn is_configuration(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }
}

impl FixSuggestion for ProvisioError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            Self::Config { .. } => Some("Check the run configuration file and PROVISIO_* variables"),
            Self::DuplicateResource { .. } => Some("Use unique resource names"),
            Self::UnknownReference { .. } => {
                Some("Declare the referenced resource before provisioning the graph")
            }
            Self::UnknownParent { .. } => Some("Declare the parent resource in the same graph"),
            Self::CycleDetected { .. } => {
                Some("Remove the circular reference - resources cannot depend on themselves")
            }
            Self::MalformedPlaceholder { .. } => Some(
                "Use {name.outputs.key}, {name.secretOutputs.key}, {name.value} or {name.connectionString}; escape braces as {{ and }}",
            ),
            Self::UnresolvedReference { .. } => {
                Some("Resolve the expression only after the referenced resource is provisioned")
            }
            Self::NoValue { .. } => Some("Only parameter resources expose {name.value}"),
            Self::NoConnectionString { .. } => {
                Some("Set a connection string expression, allocate an endpoint, or redirect to a cloud resource")
            }
            Self::CircularExpression { .. } => {
                Some("Connection string expressions must not refer back to themselves")
            }
            Self::EnvironmentCallback { .. } => {
                Some("Check the environment callback; it runs after its references are provisioned")
            }
            Self::AlreadyRedirected { .. } => {
                Some("A resource can be promoted to a cloud counterpart only once")
            }
            Self::InvalidRedirect { .. } => Some("Only local resources can be redirected to cloud resources"),
            Self::UnsupportedKind { .. } => Some("Register a provisioner for this resource kind"),
            Self::ReconciliationAmbiguity { .. } => {
                Some("Remove or retag the duplicate external objects so exactly one carries the identity tag")
            }
            Self::EnumerationFailed { .. } => Some("Check access to the target resource group"),
            Self::ProvisioningFailed { .. } => Some("Inspect the provisioner error and re-run"),
            Self::ProvisioningTimeout { .. } => Some("Increase timeout_secs in the run configuration"),
            Self::Cancelled { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_in_messages() {
        let err = ProvisioError::CycleDetected {
            cycle: "a, b".into(),
        };
        assert!(err.to_string().starts_with("[PROV-020]"));
        assert_eq!(err.code(), "PROV-020");
    }

    #[test]
    fn unresolved_reference_carries_resource_and_phase() {
        let err = ProvisioError::UnresolvedReference {
            resource: "api".into(),
            target: "cache".into(),
            channel: Channel::SecretOutputs,
            key: "connectionString".into(),
        };
        assert_eq!(err.resource(), Some("api"));
        assert_eq!(err.phase(), Phase::Resolve);
        assert_eq!(err.category(), ErrorCategory::UnresolvedReference);
        assert!(err
            .to_string()
            .contains("cache.secretOutputs.connectionString"));
    }

    #[test]
    fn ambiguity_lists_matches() {
        let err = ProvisioError::ReconciliationAmbiguity {
            resource: "kv".into(),
            matches: vec!["/kv-1".into(), "/kv-2".into()],
        };
        assert_eq!(err.category(), ErrorCategory::Reconciliation);
        assert_eq!(err.phase(), Phase::Enumerate);
        assert!(err.to_string().contains("2 existing objects"));
    }

    #[test]
    fn malformed_placeholder_names_declaring_resource() {
        let err = ProvisioError::MalformedPlaceholder {
            resource: "kv".into(),
            template: "{kv.outputs}".into(),
            position: 0,
            details: "not a valid placeholder".into(),
        };
        assert_eq!(err.resource(), Some("kv"));
        assert_eq!(err.phase(), Phase::Graph);
        assert!(err.to_string().contains("of 'kv'"));
    }

    #[test]
    fn configuration_errors_are_fatal() {
        let err = ProvisioError::UnsupportedKind {
            resource: "bus".into(),
            kind: "cloud.servicebus.v0".into(),
        };
        assert!(err.is_configuration());
        assert!(err.fix_suggestion().is_some());
    }
}
