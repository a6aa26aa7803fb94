//! Provisio - resource graph provisioning with deferred values
//!
//! Declares a graph of infrastructure resources, resolves cross-resource
//! values (endpoints, secrets, connection strings) once the resources they
//! come from are provisioned, and reconciles declared resources against
//! existing cloud objects before creating new ones.
//!
//! ## Layers
//!
//! ```text
//! model      Value, Resource, ResourceGraph (edges, Kahn layers)
//!   ↓
//! binding    placeholder grammar + Expression Resolver
//!   ↓
//! redirect   local → cloud counterpart (uniform connection string)
//! environment / manifest
//!   ↓
//! provision  registry, enumerator/reconciliation, layered dispatch
//! ```
//!
//! ## Example
//! ```rust,ignore
//! let mut graph = ResourceGraph::new();
//! graph.add(Resource::bicep("sql", "sql.bicep")
//!     .with_connection_string("Server=tcp:{sql.outputs.fqdn};Password={sql.secretOutputs.pwd}"))?;
//! graph.add(Resource::executable("api").with_connection_reference("sql"))?;
//!
//! let report = Orchestrator::new(registry, RunConfig::default().with_env()?)
//!     .provision(&graph)
//!     .await?;
//! let env = report.environment("api");
//! ```

pub mod binding;
pub mod config;
pub mod environment;
pub mod error;
pub mod event;
pub mod manifest;
pub mod model;
pub mod provision;
pub mod redirect;
pub mod telemetry;

pub use binding::{Resolved, ResolvedParameters, Resolver};
pub use config::RunConfig;
pub use environment::{ExecutionContext, EnvironmentContext, ResolvedEnvironment};
pub use error::{ErrorCategory, FixSuggestion, Phase, ProvisioError, Result};
pub use event::{Event, EventKind, EventLog};
pub use model::{
    Channel, OutputWrite, ProvisionedOutputs, Resource, ResourceClass, ResourceGraph, ResourceKind,
    Value,
};
pub use provision::{
    ExternalObject, ExternalScope, FnEnumerator, Orchestrator, ProvisionRequest, Provisioner,
    ProvisionerRegistry, ResourceEnumerator, ResourceOutcome, RunReport,
};
pub use redirect::{RedirectState, RuntimeMode};
