//! Redirection Layer - local resources backed by a cloud counterpart
//!
//! State machine per local resource:
//!
//! ```text
//!   Local ──promote_to_cloud──▶ Redirected   (once, no way back)
//! ```
//!
//! While `Local`, connection-string and runtime-mode queries use local
//! fields (allocated endpoint, image). Once `Redirected`, both delegate to
//! the counterpart, even if local fields are still populated.

use std::sync::Arc;

use tracing::debug;

use crate::binding::Resolver;
use crate::error::{ProvisioError, Result};
use crate::model::{Resource, ResourceClass, ResourceGraph, Value};

/// Redirection state of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectState {
    Local,
    Redirected,
}

/// How a resource runs in the current mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    /// Local container
    Container,
    /// Local process
    Executable,
    /// Provisioned by a cloud provisioner (cloud resource or redirected local)
    Provisioned,
    /// Value-only
    Parameter,
}

/// Where a connection string comes from
#[derive(Debug, Clone)]
pub(crate) enum ConnectionSource {
    Expression(String),
    Endpoint(String),
    Parameter { value: Value, secret: bool },
}

impl Resource {
    pub fn redirect_state(&self) -> RedirectState {
        if self.redirect.get().is_some() {
            RedirectState::Redirected
        } else {
            RedirectState::Local
        }
    }

    pub fn is_redirected(&self) -> bool {
        self.redirect_state() == RedirectState::Redirected
    }

    /// Attached cloud counterpart, if any
    pub fn redirect_target(&self) -> Option<&Arc<Resource>> {
        self.redirect.get()
    }

    /// Attach a cloud counterpart (Local → Redirected)
    ///
    /// Only local resources can be promoted, the counterpart must be a cloud
    /// resource answering for the same name, and the transition happens once.
    pub fn promote_to_cloud(&self, counterpart: Resource) -> Result<Arc<Resource>> {
        if !self.is_local() {
            return Err(ProvisioError::InvalidRedirect {
                resource: self.name().to_string(),
                reason: "only local resources can be redirected".into(),
            });
        }
        if !counterpart.is_cloud() {
            return Err(ProvisioError::InvalidRedirect {
                resource: self.name().to_string(),
                reason: format!("counterpart kind '{}' is not a cloud resource", counterpart.kind()),
            });
        }
        if counterpart.name() != self.name() {
            return Err(ProvisioError::InvalidRedirect {
                resource: self.name().to_string(),
                reason: format!(
                    "counterpart must be named '{}', got '{}'",
                    self.name(),
                    counterpart.name()
                ),
            });
        }

        let counterpart = Arc::new(counterpart);
        self.redirect
            .set(Arc::clone(&counterpart))
            .map_err(|_| ProvisioError::AlreadyRedirected {
                resource: self.name().to_string(),
            })?;

        debug!(
            resource = self.name(),
            kind = %counterpart.kind(),
            "redirected to cloud counterpart"
        );
        Ok(counterpart)
    }

    pub fn runtime_mode(&self) -> RuntimeMode {
        if self.is_redirected() {
            return RuntimeMode::Provisioned;
        }
        match self.class() {
            ResourceClass::Local { image: Some(_) } => RuntimeMode::Container,
            ResourceClass::Local { image: None } => RuntimeMode::Executable,
            ResourceClass::Cloud { .. } => RuntimeMode::Provisioned,
            ResourceClass::Parameter { .. } => RuntimeMode::Parameter,
        }
    }

    /// Runs as a local container (false once redirected)
    pub fn is_container(&self) -> bool {
        self.runtime_mode() == RuntimeMode::Container
    }
}

/// The resource that answers for `resource`'s name
pub fn effective(resource: &Arc<Resource>) -> Arc<Resource> {
    match resource.redirect_target() {
        Some(target) => Arc::clone(target),
        None => Arc::clone(resource),
    }
}

/// Connection-string source of a declared resource, redirection applied
pub(crate) fn connection_source(resource: &Arc<Resource>) -> Option<ConnectionSource> {
    let effective = effective(resource);
    if let Some(template) = effective.connection_string_expression() {
        return Some(ConnectionSource::Expression(template));
    }
    if resource.is_redirected() {
        // counterpart without an expression: local fields are never consulted
        return None;
    }
    if let Some(endpoint) = resource.endpoint() {
        return Some(ConnectionSource::Endpoint(endpoint));
    }
    match resource.class() {
        ResourceClass::Parameter { value, secret } => Some(ConnectionSource::Parameter {
            value: value.clone(),
            secret: *secret,
        }),
        _ => None,
    }
}

impl ResourceGraph {
    /// Promote the local resource `name` to a cloud counterpart
    pub fn promote_to_cloud(&self, name: &str, counterpart: Resource) -> Result<Arc<Resource>> {
        let local = self.get(name).ok_or_else(|| ProvisioError::UnknownReference {
            resource: counterpart.name().to_string(),
            target: name.to_string(),
        })?;
        local.promote_to_cloud(counterpart)
    }

    /// Uniform `GetConnectionString()` surface, redirection applied
    pub fn connection_string(&self, name: &str) -> Result<String> {
        Ok(Resolver::new(self).connection_string(name)?.as_string())
    }

    /// Unresolved connection-string expression as published, redirection applied
    pub fn connection_string_expression(&self, name: &str) -> Option<String> {
        self.effective(name)?.connection_string_expression()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_graph() -> ResourceGraph {
        let mut g = ResourceGraph::new();
        g.add(Resource::container("cache", "redis:7").with_endpoint("localhost:12455"))
            .unwrap();
        g
    }

    fn cloud_cache() -> Resource {
        Resource::cloud("cache", "cloud.redis.v0")
            .with_connection_string("{cache.secretOutputs.connectionString}")
    }

    #[test]
    fn local_resource_uses_endpoint() {
        let g = cache_graph();
        assert_eq!(g.connection_string("cache").unwrap(), "localhost:12455");
        assert_eq!(g.get("cache").unwrap().redirect_state(), RedirectState::Local);
        assert!(g.get("cache").unwrap().is_container());
    }

    #[test]
    fn redirected_resource_delegates_to_counterpart() {
        let g = cache_graph();
        let cloud = g.promote_to_cloud("cache", cloud_cache()).unwrap();

        let local = g.get("cache").unwrap();
        assert_eq!(local.redirect_state(), RedirectState::Redirected);
        assert_eq!(local.runtime_mode(), RuntimeMode::Provisioned);
        assert!(!local.is_container());
        assert_eq!(
            g.connection_string_expression("cache").as_deref(),
            Some("{cache.secretOutputs.connectionString}")
        );

        // endpoint is still set but never consulted
        assert!(g.connection_string("cache").is_err());
        cloud.set_secret_output("connectionString", "cache.redis.net:6380,ssl=true");
        assert_eq!(
            g.connection_string("cache").unwrap(),
            "cache.redis.net:6380,ssl=true"
        );
    }

    #[test]
    fn redirect_is_one_way() {
        let g = cache_graph();
        g.promote_to_cloud("cache", cloud_cache()).unwrap();
        let err = g.promote_to_cloud("cache", cloud_cache()).unwrap_err();
        assert!(matches!(err, ProvisioError::AlreadyRedirected { .. }));
    }

    #[test]
    fn only_local_resources_redirect_to_cloud() {
        let mut g = cache_graph();
        g.add(Resource::bicep("sql", "sql.bicep")).unwrap();

        let err = g
            .promote_to_cloud("sql", Resource::bicep("sql", "other.bicep"))
            .unwrap_err();
        assert!(matches!(err, ProvisioError::InvalidRedirect { .. }));

        let err = g
            .promote_to_cloud("cache", Resource::container("cache", "redis:8"))
            .unwrap_err();
        assert!(matches!(err, ProvisioError::InvalidRedirect { .. }));

        let err = g
            .promote_to_cloud("cache", Resource::cloud("other", "cloud.redis.v0"))
            .unwrap_err();
        assert!(matches!(err, ProvisioError::InvalidRedirect { .. }));
        assert_eq!(g.get("cache").unwrap().redirect_state(), RedirectState::Local);
    }

    #[test]
    fn counterpart_without_expression_has_no_connection_string() {
        let g = cache_graph();
        g.promote_to_cloud("cache", Resource::cloud("cache", "cloud.redis.v0"))
            .unwrap();
        let err = g.connection_string("cache").unwrap_err();
        assert!(matches!(err, ProvisioError::NoConnectionString { .. }));
    }

    #[test]
    fn parameter_connection_string_is_its_value() {
        let mut g = ResourceGraph::new();
        g.add(Resource::secret_parameter("external-db", "Server=legacy;User=sa"))
            .unwrap();
        assert_eq!(g.connection_string("external-db").unwrap(), "Server=legacy;User=sa");
    }

    #[test]
    fn executable_runtime_mode() {
        assert_eq!(Resource::executable("api").runtime_mode(), RuntimeMode::Executable);
        assert_eq!(
            Resource::parameter("region", "westeurope").runtime_mode(),
            RuntimeMode::Parameter
        );
    }
}
