//! Per-resource outcomes of a provisioning run

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use indexmap::IndexMap;

use crate::environment::ResolvedEnvironment;
use crate::error::ProvisioError;
use crate::model::ResourceKind;

/// What happened to one resource
#[derive(Debug)]
pub enum ResourceOutcome {
    /// Created/deployed by its provisioner
    Created,
    /// Existing external object adopted
    Adopted { external_id: String },
    /// Nothing to provision (local or parameter resource)
    Ready,
    Failed(ProvisioError),
    /// Not attempted: a dependency did not succeed
    Skipped { dependency: Arc<str> },
    /// Not provisioned because the run was cancelled
    Cancelled,
}

impl ResourceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Created | Self::Adopted { .. } | Self::Ready)
    }

    pub fn error(&self) -> Option<&ProvisioError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Adopted { .. } => "adopted",
            Self::Ready => "ready",
            Self::Failed(_) => "failed",
            Self::Skipped { .. } => "skipped",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Outcome entry in the run report
#[derive(Debug)]
pub struct OutcomeEntry {
    pub resource: Arc<str>,
    pub kind: ResourceKind,
    pub outcome: ResourceOutcome,
    pub duration: Duration,
}

/// Outcome list of a run (declaration order) plus resolved local environments
#[derive(Debug, Default)]
pub struct RunReport {
    entries: Vec<OutcomeEntry>,
    environments: IndexMap<String, ResolvedEnvironment>,
    duration: Duration,
}

impl RunReport {
    pub(crate) fn new(
        entries: Vec<OutcomeEntry>,
        environments: IndexMap<String, ResolvedEnvironment>,
        duration: Duration,
    ) -> Self {
        Self {
            entries,
            environments,
            duration,
        }
    }

    pub fn entries(&self) -> &[OutcomeEntry] {
        &self.entries
    }

    pub fn outcome(&self, resource: &str) -> Option<&ResourceOutcome> {
        self.entries
            .iter()
            .find(|e| &*e.resource == resource)
            .map(|e| &e.outcome)
    }

    /// Resolved environment of a local resource (run context)
    pub fn environment(&self, resource: &str) -> Option<&ResolvedEnvironment> {
        self.environments.get(resource)
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|e| e.outcome.is_success())
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| o.is_success())
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ResourceOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ResourceOutcome::Skipped { .. }))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, ResourceOutcome::Cancelled))
    }

    /// Failed resources with their errors
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ProvisioError)> {
        self.entries
            .iter()
            .filter_map(|e| e.outcome.error().map(|err| (&*e.resource, err)))
    }

    fn count(&self, pred: impl Fn(&ResourceOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            let symbol = match &entry.outcome {
                ResourceOutcome::Created | ResourceOutcome::Adopted { .. } | ResourceOutcome::Ready => {
                    "✓".green()
                }
                ResourceOutcome::Failed(_) => "✗".red(),
                ResourceOutcome::Skipped { .. } | ResourceOutcome::Cancelled => "-".yellow(),
            };
            write!(
                f,
                "  {} {} {} {}",
                symbol,
                &*entry.resource,
                entry.outcome.label().dimmed(),
                format!("({:.1}s)", entry.duration.as_secs_f32()).dimmed()
            )?;
            match &entry.outcome {
                ResourceOutcome::Adopted { external_id } => write!(f, " {}", external_id)?,
                ResourceOutcome::Skipped { dependency } => {
                    write!(f, " (dependency '{}')", dependency)?
                }
                ResourceOutcome::Failed(e) => write!(f, "\n      {} {}", "Error:".red(), e)?,
                _ => {}
            }
            writeln!(f)?;
        }
        write!(
            f,
            "{} succeeded, {} failed, {} skipped, {} cancelled",
            self.succeeded(),
            self.failed(),
            self.skipped(),
            self.cancelled()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, outcome: ResourceOutcome) -> OutcomeEntry {
        OutcomeEntry {
            resource: name.into(),
            kind: ResourceKind::new(ResourceKind::BICEP),
            outcome,
            duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn counts_and_success() {
        let report = RunReport::new(
            vec![
                entry("sql", ResourceOutcome::Created),
                entry(
                    "kv",
                    ResourceOutcome::Failed(ProvisioError::ProvisioningFailed {
                        resource: "kv".into(),
                        reason: "quota".into(),
                    }),
                ),
                entry("app", ResourceOutcome::Skipped { dependency: "kv".into() }),
            ],
            IndexMap::new(),
            Duration::from_millis(20),
        );

        assert!(!report.is_success());
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failures().next().map(|(n, _)| n), Some("kv"));
        assert_eq!(report.outcome("sql").map(|o| o.label()), Some("created"));

        colored::control::set_override(false);
        let text = report.to_string();
        assert!(text.contains("app skipped"));
        assert!(text.ends_with("1 succeeded, 1 failed, 1 skipped, 0 cancelled"));
    }
}
