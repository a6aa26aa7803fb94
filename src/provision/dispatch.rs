//! Provisioner Dispatch - layered worker pool over the resource graph
//!
//! Performance notes:
//! - JoinSet per layer, bounded by a Semaphore (`max_parallel`)
//! - Parameters are resolved before a job is spawned, so jobs never touch the graph
//! - Each resource has exactly one job: the single writer of its outputs
//!
//! A layer starts only after the previous layer has fully finished.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::binding::Resolver;
use crate::config::RunConfig;
use crate::environment;
use crate::error::{ProvisioError, Result};
use crate::event::{EventKind, EventLog};
use crate::model::{DepVec, OutputWrite, ProvisionedOutputs, Resource, ResourceClass, ResourceGraph};
use crate::redirect;

use super::enumerate::{reconcile, Reconciliation, ResourceEnumerator};
use super::outcome::{OutcomeEntry, ResourceOutcome, RunReport};
use super::registry::ProvisionerRegistry;
use super::{ProvisionRequest, Provisioner};

/// Drives provisioning runs
pub struct Orchestrator {
    registry: Arc<ProvisionerRegistry>,
    config: RunConfig,
    event_log: EventLog,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(registry: ProvisionerRegistry, config: RunConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config,
            event_log: EventLog::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_event_log(mut self, event_log: EventLog) -> Self {
        self.event_log = event_log;
        self
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Token observed by running jobs; cancelling it aborts the run
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Validate the graph and compute layers (no external calls)
    ///
    /// Fails on cycles, unknown references, malformed placeholders and cloud
    /// kinds without a registered provisioner.
    pub fn preflight(&self, graph: &ResourceGraph) -> Result<Vec<Vec<Arc<str>>>> {
        self.config.validate()?;
        let layers = graph.layers()?;
        for declared in graph.iter() {
            let resource = redirect::effective(declared);
            if resource.is_cloud() {
                self.registry.provisioner_for(&resource)?;
            }
        }
        Ok(layers)
    }

    /// Provision every resource of the graph in dependency order
    ///
    /// Returns `Err` only for configuration errors found before any external
    /// call; per-resource failures are reported in the `RunReport`.
    #[instrument(skip_all, fields(resources = graph.len()))]
    pub async fn provision(&self, graph: &ResourceGraph) -> Result<RunReport> {
        let run_start = Instant::now();
        let layers = self.preflight(graph)?;
        info!(layers = layers.len(), "Starting provisioning run");

        self.event_log.emit(EventKind::RunStarted {
            resource_count: graph.len(),
            layer_count: layers.len(),
        });
        if self.config.progress {
            println!(
                "{} Provisioning {} resources in {} layers...\n",
                "→".cyan(),
                graph.len(),
                layers.len()
            );
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));
        let mut outcomes: FxHashMap<Arc<str>, (ResourceOutcome, Duration)> = FxHashMap::default();
        let mut environments = IndexMap::new();

        for (index, layer) in layers.iter().enumerate() {
            if self.cancel.is_cancelled() {
                for name in layer {
                    self.record_cancelled(&mut outcomes, name);
                }
                continue;
            }

            self.event_log.emit(EventKind::LayerStarted {
                index,
                resources: layer.clone(),
            });
            debug!(index, size = layer.len(), "layer started");

            let mut join_set = JoinSet::new();
            let mut pending: FxHashSet<Arc<str>> = FxHashSet::default();

            for name in layer {
                let Some(declared) = graph.get(name) else {
                    continue;
                };
                let resource = redirect::effective(declared);

                // graph is validated: dependencies() cannot fail here
                let deps = graph.dependencies(name).unwrap_or_default();
                if let Some(dependency) = failed_dependency(&deps, &outcomes) {
                    warn!(resource = %name, dependency = %dependency, "skipped: dependency not provisioned");
                    self.event_log.emit(EventKind::ResourceSkipped {
                        resource: Arc::clone(name),
                        dependency: Arc::clone(&dependency),
                    });
                    outcomes.insert(
                        Arc::clone(name),
                        (ResourceOutcome::Skipped { dependency }, Duration::ZERO),
                    );
                    continue;
                }

                match resource.class() {
                    ResourceClass::Parameter { .. } => {
                        outcomes.insert(Arc::clone(name), (ResourceOutcome::Ready, Duration::ZERO));
                    }
                    ResourceClass::Local { .. } => {
                        let started = Instant::now();
                        let outcome = match environment::resolve_environment(graph, declared) {
                            Ok(env) => {
                                environments.insert(name.to_string(), env);
                                ResourceOutcome::Ready
                            }
                            Err(e) => {
                                self.emit_failed(name, &e);
                                ResourceOutcome::Failed(e)
                            }
                        };
                        outcomes.insert(Arc::clone(name), (outcome, started.elapsed()));
                    }
                    ResourceClass::Cloud { .. } => {
                        let job = match self.job(graph, Arc::clone(&resource), OutputWrite::Append) {
                            Ok(job) => job,
                            Err(e) => {
                                self.emit_failed(name, &e);
                                outcomes.insert(
                                    Arc::clone(name),
                                    (ResourceOutcome::Failed(e), Duration::ZERO),
                                );
                                continue;
                            }
                        };
                        pending.insert(Arc::clone(name));
                        let semaphore = Arc::clone(&semaphore);
                        join_set.spawn(job.run(semaphore));
                    }
                }
            }

            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((name, outcome, duration)) => {
                        if self.config.progress {
                            print_outcome(&name, &outcome, duration);
                        }
                        pending.remove(&name);
                        outcomes.insert(name, (outcome, duration));
                    }
                    Err(e) => warn!(error = %e, "provisioning task aborted"),
                }
            }

            // panicked jobs never report back
            for name in pending {
                let error = ProvisioError::ProvisioningFailed {
                    resource: name.to_string(),
                    reason: "provisioning task panicked".into(),
                };
                self.emit_failed(&name, &error);
                outcomes.insert(name, (ResourceOutcome::Failed(error), Duration::ZERO));
            }
        }

        let entries: Vec<OutcomeEntry> = graph
            .iter()
            .map(|declared| {
                let name = declared.name_arc();
                let (outcome, duration) = outcomes
                    .remove(&name)
                    .unwrap_or((ResourceOutcome::Cancelled, Duration::ZERO));
                OutcomeEntry {
                    kind: redirect::effective(declared).kind().clone(),
                    resource: name,
                    outcome,
                    duration,
                }
            })
            .collect();
        let report = RunReport::new(entries, environments, run_start.elapsed());

        self.event_log.emit(EventKind::RunCompleted {
            succeeded: report.succeeded(),
            failed: report.failed(),
            skipped: report.skipped(),
            cancelled: report.cancelled(),
            total_duration_ms: run_start.elapsed().as_millis() as u64,
        });
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            cancelled = report.cancelled(),
            "Provisioning run finished"
        );
        if self.config.progress {
            println!("\n{}\n", report);
        }

        Ok(report)
    }

    /// Explicitly re-run provisioning of one resource, overwriting its outputs
    ///
    /// Dependencies must already be provisioned (their outputs are resolved now).
    #[instrument(skip(self, graph))]
    pub async fn reprovision(&self, graph: &ResourceGraph, name: &str) -> Result<ResourceOutcome> {
        let declared = graph.get(name).ok_or_else(|| ProvisioError::UnknownReference {
            resource: name.to_string(),
            target: name.to_string(),
        })?;
        let resource = redirect::effective(declared);
        if !resource.is_cloud() {
            return Ok(ResourceOutcome::Ready);
        }

        self.registry.provisioner_for(&resource)?;
        let job = self.job(graph, resource, OutputWrite::Overwrite)?;
        let semaphore = Arc::new(Semaphore::new(1));
        let (name, outcome, duration) = job.run(semaphore).await;
        if self.config.progress {
            print_outcome(&name, &outcome, duration);
        }
        Ok(outcome)
    }

    fn job(
        &self,
        graph: &ResourceGraph,
        resource: Arc<Resource>,
        mode: OutputWrite,
    ) -> Result<ProvisionJob> {
        let provisioner = self.registry.provisioner_for(&resource)?;
        let parameters = Resolver::new(graph).parameters(&resource)?;

        let mut tags = BTreeMap::new();
        tags.insert(self.config.identity_tag.clone(), resource.name().to_string());

        Ok(ProvisionJob {
            enumerator: self.registry.enumerator(resource.kind()),
            request: ProvisionRequest {
                resource,
                parameters,
                scope: self.config.scope.clone(),
                tags,
                cancel: self.cancel.clone(),
            },
            provisioner,
            identity_tag: self.config.identity_tag.clone(),
            timeout: self.config.timeout(),
            mode,
            event_log: self.event_log.clone(),
        })
    }

    fn record_cancelled(
        &self,
        outcomes: &mut FxHashMap<Arc<str>, (ResourceOutcome, Duration)>,
        name: &Arc<str>,
    ) {
        self.event_log.emit(EventKind::ResourceCancelled {
            resource: Arc::clone(name),
        });
        outcomes.insert(Arc::clone(name), (ResourceOutcome::Cancelled, Duration::ZERO));
    }

    fn emit_failed(&self, name: &Arc<str>, error: &ProvisioError) {
        warn!(resource = %name, code = error.code(), phase = %error.phase(), "{}", error);
        self.event_log.emit(failed_event(name, error));
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// First dependency that did not succeed
fn failed_dependency(
    deps: &DepVec,
    outcomes: &FxHashMap<Arc<str>, (ResourceOutcome, Duration)>,
) -> Option<Arc<str>> {
    deps.iter()
        .find(|d| !outcomes.get(*d).is_some_and(|(o, _)| o.is_success()))
        .cloned()
}

fn failed_event(name: &Arc<str>, error: &ProvisioError) -> EventKind {
    EventKind::ResourceFailed {
        resource: Arc::clone(name),
        code: error.code().to_string(),
        phase: error.phase().to_string(),
        error: error.to_string(),
    }
}

fn print_outcome(name: &str, outcome: &ResourceOutcome, duration: Duration) {
    let symbol = if outcome.is_success() {
        "✓".green()
    } else {
        "✗".red()
    };
    println!(
        "  {} {} {} {}",
        symbol,
        name,
        outcome.label(),
        format!("({:.1}s)", duration.as_secs_f32()).dimmed()
    );
}

/// One resource's reconcile + provision, owned by a single spawned task
struct ProvisionJob {
    request: ProvisionRequest,
    provisioner: Arc<dyn Provisioner>,
    enumerator: Option<Arc<dyn ResourceEnumerator>>,
    identity_tag: String,
    timeout: Option<Duration>,
    mode: OutputWrite,
    event_log: EventLog,
}

impl ProvisionJob {
    async fn run(self, semaphore: Arc<Semaphore>) -> (Arc<str>, ResourceOutcome, Duration) {
        let name = self.request.resource.name_arc();
        let cancel = self.request.cancel.clone();

        let permit = tokio::select! {
            _ = cancel.cancelled() => None,
            permit = semaphore.acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
            return self.cancelled(name, Duration::ZERO);
        };
        if cancel.is_cancelled() {
            return self.cancelled(name, Duration::ZERO);
        }

        let started = Instant::now();
        self.event_log.emit(EventKind::ResourceStarted {
            resource: Arc::clone(&name),
            kind: self.request.resource.kind().to_string(),
            parameters: self.request.parameters.public_json(),
        });
        info!(resource = %name, kind = %self.request.resource.kind(), "provisioning");

        // a call that already finished wins over a cancellation seen in the same poll
        let result = tokio::select! {
            biased;
            result = self.execute_with_timeout() => result,
            _ = cancel.cancelled() => Err(ProvisioError::Cancelled { resource: name.to_string() }),
        };
        let duration = started.elapsed();

        let outcome = match result {
            Ok((outcome, outputs)) => {
                let kept = self.request.resource.record_outputs(&outputs, self.mode);
                if !kept.is_empty() {
                    warn!(resource = %name, keys = ?kept, "outputs already set, keeping first values");
                }
                let output_keys = outputs.keys();
                match &outcome {
                    ResourceOutcome::Adopted { external_id } => {
                        info!(resource = %name, external_id = %external_id, keys = ?output_keys, "adopted existing object");
                        self.event_log.emit(EventKind::ResourceAdopted {
                            resource: Arc::clone(&name),
                            external_id: external_id.clone(),
                            output_keys,
                            duration_ms: duration.as_millis() as u64,
                        });
                    }
                    _ => {
                        info!(resource = %name, keys = ?output_keys, "created");
                        self.event_log.emit(EventKind::ResourceCreated {
                            resource: Arc::clone(&name),
                            output_keys,
                            duration_ms: duration.as_millis() as u64,
                        });
                    }
                }
                outcome
            }
            Err(ProvisioError::Cancelled { .. }) => return self.cancelled(name, duration),
            Err(e) => {
                warn!(resource = %name, code = e.code(), phase = %e.phase(), "{}", e);
                self.event_log.emit(failed_event(&name, &e));
                ResourceOutcome::Failed(e)
            }
        };

        (name, outcome, duration)
    }

    async fn execute_with_timeout(&self) -> Result<(ResourceOutcome, ProvisionedOutputs)> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.execute())
                .await
                .map_err(|_| ProvisioError::ProvisioningTimeout {
                    resource: self.request.name().to_string(),
                    timeout_ms: limit.as_millis() as u64,
                })?,
            None => self.execute().await,
        }
    }

    async fn execute(&self) -> Result<(ResourceOutcome, ProvisionedOutputs)> {
        let name = self.request.name();
        let decision = match &self.enumerator {
            Some(enumerator) => {
                reconcile(enumerator.as_ref(), &self.request.scope, &self.identity_tag, name).await?
            }
            None => {
                debug!(resource = name, "no enumerator registered, creating");
                Reconciliation::Create
            }
        };

        let failed = |e: anyhow::Error| ProvisioError::ProvisioningFailed {
            resource: name.to_string(),
            reason: format!("{:#}", e),
        };

        match decision {
            Reconciliation::Adopt(existing) => {
                let outputs = self.provisioner.adopt(&self.request, &existing).await.map_err(failed)?;
                Ok((
                    ResourceOutcome::Adopted {
                        external_id: existing.id,
                    },
                    outputs,
                ))
            }
            Reconciliation::Create => {
                let outputs = self.provisioner.create(&self.request).await.map_err(failed)?;
                Ok((ResourceOutcome::Created, outputs))
            }
        }
    }

    fn cancelled(&self, name: Arc<str>, duration: Duration) -> (Arc<str>, ResourceOutcome, Duration) {
        debug!(resource = %name, "cancelled");
        self.event_log.emit(EventKind::ResourceCancelled {
            resource: Arc::clone(&name),
        });
        (name, ResourceOutcome::Cancelled, duration)
    }
}
