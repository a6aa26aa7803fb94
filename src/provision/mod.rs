//! Provisioning - dispatch of cloud resources to kind-specific provisioners
//!
//! ## Seams
//!
//! External collaborators (concrete cloud SDK bindings) plug in through two
//! traits registered per resource kind:
//!
//! - [`Provisioner`]: create/deploy a resource, or adopt an existing object
//! - [`ResourceEnumerator`]: list existing objects and expose their tags
//!
//! ## Example
//! ```rust,ignore
//! let registry = ProvisionerRegistry::new()
//!     .with_provisioner(ResourceKind::BICEP, BicepDeployer::new(client))
//!     .with_enumerator(ResourceKind::BICEP, FnEnumerator::new(list_group));
//! let report = Orchestrator::new(registry, RunConfig::default().with_env()?)
//!     .provision(&graph)
//!     .await?;
//! ```

mod dispatch;
mod enumerate;
mod outcome;
mod registry;

pub use dispatch::Orchestrator;
pub use enumerate::{
    reconcile, ExternalObject, ExternalScope, FnEnumerator, Reconciliation, ResourceEnumerator,
};
pub use outcome::{OutcomeEntry, ResourceOutcome, RunReport};
pub use registry::ProvisionerRegistry;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::binding::ResolvedParameters;
use crate::model::{ProvisionedOutputs, Resource};

/// Everything a provisioner needs for one resource
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// Effective resource (the cloud counterpart for redirected resources)
    pub resource: Arc<Resource>,
    /// Parameters resolved against already provisioned dependencies
    pub parameters: ResolvedParameters,
    pub scope: ExternalScope,
    /// Tags to stamp on created objects (identity tag → resource name)
    pub tags: BTreeMap<String, String>,
    /// Fires when the run is cancelled; long calls should stop early
    pub cancel: CancellationToken,
}

impl ProvisionRequest {
    pub fn name(&self) -> &str {
        self.resource.name()
    }
}

/// Kind-specific provisioning backend
///
/// Implementations:
/// - template deployers (`cloud.bicep.v0`)
/// - one per SDK-backed kind (key vault, storage, ...)
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create/deploy the resource and wait for completion
    async fn create(&self, request: &ProvisionRequest) -> Result<ProvisionedOutputs>;

    /// Read the outputs of an existing object carrying the resource's identity
    async fn adopt(
        &self,
        request: &ProvisionRequest,
        existing: &ExternalObject,
    ) -> Result<ProvisionedOutputs>;
}
