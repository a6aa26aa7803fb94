//! Provisioner registry - kind tag → provisioner / enumerator
//!
//! Chosen once per run; an unregistered cloud kind is a configuration error
//! reported before any external call.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::{ProvisioError, Result};
use crate::model::{Resource, ResourceKind};

use super::enumerate::ResourceEnumerator;
use super::Provisioner;

#[derive(Clone, Default)]
pub struct ProvisionerRegistry {
    provisioners: FxHashMap<ResourceKind, Arc<dyn Provisioner>>,
    enumerators: FxHashMap<ResourceKind, Arc<dyn ResourceEnumerator>>,
}

impl ProvisionerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the provisioner for `kind`
    pub fn register_provisioner(
        &mut self,
        kind: impl Into<ResourceKind>,
        provisioner: Arc<dyn Provisioner>,
    ) -> &mut Self {
        self.provisioners.insert(kind.into(), provisioner);
        self
    }

    /// Register (or replace) the enumerator for `kind`
    pub fn register_enumerator(
        &mut self,
        kind: impl Into<ResourceKind>,
        enumerator: Arc<dyn ResourceEnumerator>,
    ) -> &mut Self {
        self.enumerators.insert(kind.into(), enumerator);
        self
    }

    pub fn with_provisioner(
        mut self,
        kind: impl Into<ResourceKind>,
        provisioner: impl Provisioner + 'static,
    ) -> Self {
        self.register_provisioner(kind, Arc::new(provisioner));
        self
    }

    pub fn with_enumerator(
        mut self,
        kind: impl Into<ResourceKind>,
        enumerator: impl ResourceEnumerator + 'static,
    ) -> Self {
        self.register_enumerator(kind, Arc::new(enumerator));
        self
    }

    pub fn provisioner(&self, kind: &ResourceKind) -> Option<Arc<dyn Provisioner>> {
        self.provisioners.get(kind).cloned()
    }

    pub fn enumerator(&self, kind: &ResourceKind) -> Option<Arc<dyn ResourceEnumerator>> {
        self.enumerators.get(kind).cloned()
    }

    /// Provisioner for a resource, `UnsupportedKind` if none is registered
    pub fn provisioner_for(&self, resource: &Resource) -> Result<Arc<dyn Provisioner>> {
        self.provisioner(resource.kind())
            .ok_or_else(|| ProvisioError::UnsupportedKind {
                resource: resource.name().to_string(),
                kind: resource.kind().to_string(),
            })
    }

    pub fn supports(&self, kind: &ResourceKind) -> bool {
        self.provisioners.contains_key(kind)
    }

    /// Registered provisioner kinds (sorted)
    pub fn kinds(&self) -> Vec<&ResourceKind> {
        let mut kinds: Vec<_> = self.provisioners.keys().collect();
        kinds.sort();
        kinds
    }
}

impl std::fmt::Debug for ProvisionerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut enumerated: Vec<_> = self.enumerators.keys().collect();
        enumerated.sort();
        f.debug_struct("ProvisionerRegistry")
            .field("provisioners", &self.kinds())
            .field("enumerators", &enumerated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProvisionedOutputs;
    use crate::provision::{ExternalObject, FnEnumerator, ProvisionRequest};
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl Provisioner for Noop {
        async fn create(&self, _: &ProvisionRequest) -> anyhow::Result<ProvisionedOutputs> {
            Ok(ProvisionedOutputs::new())
        }

        async fn adopt(
            &self,
            _: &ProvisionRequest,
            _: &ExternalObject,
        ) -> anyhow::Result<ProvisionedOutputs> {
            Ok(ProvisionedOutputs::new())
        }
    }

    #[test]
    fn lookup_by_kind() {
        let registry = ProvisionerRegistry::new()
            .with_provisioner(ResourceKind::BICEP, Noop)
            .with_enumerator(ResourceKind::BICEP, FnEnumerator::new(|_| Ok(vec![])));

        let bicep = ResourceKind::new(ResourceKind::BICEP);
        assert!(registry.supports(&bicep));
        assert!(registry.enumerator(&bicep).is_some());
        assert!(registry.provisioner_for(&Resource::bicep("sql", "sql.bicep")).is_ok());
    }

    #[test]
    fn unregistered_kind_is_unsupported() {
        let registry = ProvisionerRegistry::new().with_provisioner(ResourceKind::BICEP, Noop);
        let err = registry
            .provisioner_for(&Resource::cloud("bus", "cloud.servicebus.v0"))
            .err()
            .unwrap();
        assert!(matches!(err, ProvisioError::UnsupportedKind { ref kind, .. } if kind == "cloud.servicebus.v0"));
        assert_eq!(format!("{:?}", registry.kinds()), r#"[ResourceKind("cloud.bicep.v0")]"#);
    }
}
