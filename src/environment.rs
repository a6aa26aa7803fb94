//! Environment injection - callbacks that populate a consumer's variables
//!
//! A consuming resource (usually a local executable or container) registers
//! callbacks receiving a mutable variable map and the execution context.
//! Callbacks run in registration order; the run invokes them only once every
//! resource the consumer depends on has been provisioned.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::binding::Resolver;
use crate::error::{ProvisioError, Result};
use crate::model::{Resource, ResourceGraph, Value};

/// Why callbacks are being invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Local run: values are resolved to concrete strings
    Run,
    /// Manifest publishing: values stay as expressions
    Publish,
}

/// Argument passed to environment callbacks
pub struct EnvironmentContext<'a> {
    pub env: &'a mut IndexMap<String, Value>,
    pub execution: ExecutionContext,
    resource: &'a str,
}

impl EnvironmentContext<'_> {
    /// Name of the resource whose environment is being built
    pub fn resource(&self) -> &str {
        self.resource
    }

    pub fn is_publish(&self) -> bool {
        self.execution == ExecutionContext::Publish
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.env.insert(key.into(), value.into());
    }
}

pub type EnvironmentCallback =
    Arc<dyn Fn(&mut EnvironmentContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Box a closure as an environment callback
pub fn callback(
    f: impl Fn(&mut EnvironmentContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
) -> EnvironmentCallback {
    Arc::new(f)
}

/// Run all callbacks of `resource` in registration order
pub fn collect_environment(
    resource: &Resource,
    execution: ExecutionContext,
) -> Result<IndexMap<String, Value>> {
    let mut env = IndexMap::new();
    for cb in resource.environment_callbacks() {
        let mut ctx = EnvironmentContext {
            env: &mut env,
            execution,
            resource: resource.name(),
        };
        cb(&mut ctx).map_err(|e| ProvisioError::EnvironmentCallback {
            resource: resource.name().to_string(),
            reason: format!("{:#}", e),
        })?;
    }
    Ok(env)
}

/// Concrete environment of a resource in run context
#[derive(Clone, Default, PartialEq)]
pub struct ResolvedEnvironment {
    vars: IndexMap<String, String>,
    secret: Vec<String>,
}

impl ResolvedEnvironment {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether a variable carries secret material
    pub fn is_secret(&self, key: &str) -> bool {
        self.secret.iter().any(|k| k == key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl fmt::Debug for ResolvedEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in &self.vars {
            if self.is_secret(k) {
                map.entry(k, &"***");
            } else {
                map.entry(k, v);
            }
        }
        map.finish()
    }
}

/// Collect (run context) and resolve the environment of `resource`
pub fn resolve_environment(graph: &ResourceGraph, resource: &Resource) -> Result<ResolvedEnvironment> {
    let env = collect_environment(resource, ExecutionContext::Run)?;
    let resolver = Resolver::new(graph);

    let mut resolved = ResolvedEnvironment::default();
    for (key, value) in env {
        let r = resolver.resolve(resource.name(), &value)?;
        if r.secret {
            resolved.secret.push(key.clone());
        }
        resolved.vars.insert(key, r.as_string());
    }
    Ok(resolved)
}

impl Resource {
    /// Reference `target` and inject `ConnectionStrings__{target}`
    pub fn with_connection_reference(self, target: &str) -> Self {
        let key = format!("ConnectionStrings__{}", target);
        let template = format!("{{{}.connectionString}}", target);
        self.with_reference(target).with_environment(callback(move |ctx| {
            ctx.set(key.clone(), Value::expression(template.clone()));
            Ok(())
        }))
    }

    /// Inject a single variable
    pub fn with_env(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        self.with_environment(callback(move |ctx| {
            ctx.set(key.clone(), value.clone());
            Ok(())
        }))
    }
}
