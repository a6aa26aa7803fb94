//! Resource - a named node of the resource graph
//!
//! Identity (name, kind, class, parent) is fixed at declaration.
//! Parameters stay mutable afterwards; outputs are written only by the
//! provisioning step that owns the resource.

use std::fmt;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::environment::EnvironmentCallback;

use super::value::{Channel, Value};

/// Resource-kind tag (e.g., `cloud.bicep.v0`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKind(Arc<str>);

impl ResourceKind {
    pub const BICEP: &'static str = "cloud.bicep.v0";
    pub const PARAMETER: &'static str = "parameter.v0";
    pub const CONTAINER: &'static str = "container.v0";
    pub const EXECUTABLE: &'static str = "executable.v0";

    pub fn new(kind: impl AsRef<str>) -> Self {
        Self(Arc::from(kind.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// What a resource is, which decides how a run treats it
#[derive(Debug, Clone)]
pub enum ResourceClass {
    /// Provisioned through a registered provisioner
    Cloud {
        /// Declarative template location, when applicable
        path: Option<String>,
    },
    /// Runs locally (container or executable); never provisioned
    Local {
        /// Container image, `None` for a plain executable
        image: Option<String>,
    },
    /// Value-only resource exposing `{name.value}`
    Parameter { value: Value, secret: bool },
}

/// How an output write treats keys that already exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputWrite {
    /// Keep existing values (first write wins)
    Append,
    /// Explicit re-run: replace existing values
    Overwrite,
}

/// Values returned by a create/deploy (or adopt) call
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProvisionedOutputs {
    pub outputs: IndexMap<String, String>,
    pub secret_outputs: IndexMap<String, String>,
}

impl ProvisionedOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    pub fn with_secret_output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.secret_outputs.insert(key.into(), value.into());
        self
    }

    /// Output key names only (safe for logs)
    pub fn keys(&self) -> Vec<String> {
        self.outputs
            .keys()
            .chain(self.secret_outputs.keys())
            .cloned()
            .collect()
    }
}

impl fmt::Debug for ProvisionedOutputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionedOutputs")
            .field("outputs", &self.outputs)
            .field("secret_outputs", &self.secret_outputs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Declared infrastructure unit
pub struct Resource {
    name: Arc<str>,
    kind: ResourceKind,
    class: ResourceClass,
    parent: Option<Arc<str>>,
    parameters: RwLock<IndexMap<String, Value>>,
    outputs: RwLock<IndexMap<String, String>>,
    secret_outputs: RwLock<IndexMap<String, String>>,
    connection_string: RwLock<Option<String>>,
    references: RwLock<Vec<Arc<str>>>,
    endpoint: RwLock<Option<String>>,
    pub(crate) redirect: OnceLock<Arc<Resource>>,
    env_callbacks: RwLock<Vec<EnvironmentCallback>>,
}

impl Resource {
    fn with_class(name: &str, kind: ResourceKind, class: ResourceClass) -> Self {
        Self {
            name: Arc::from(name),
            kind,
            class,
            parent: None,
            parameters: RwLock::new(IndexMap::new()),
            outputs: RwLock::new(IndexMap::new()),
            secret_outputs: RwLock::new(IndexMap::new()),
            connection_string: RwLock::new(None),
            references: RwLock::new(Vec::new()),
            endpoint: RwLock::new(None),
            redirect: OnceLock::new(),
            env_callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Cloud resource provisioned by the provisioner registered for `kind`
    pub fn cloud(name: &str, kind: impl Into<ResourceKind>) -> Self {
        Self::with_class(name, kind.into(), ResourceClass::Cloud { path: None })
    }

    /// Cloud resource deployed from a declarative template (`cloud.bicep.v0`)
    pub fn bicep(name: &str, path: impl Into<String>) -> Self {
        Self::with_class(
            name,
            ResourceKind::new(ResourceKind::BICEP),
            ResourceClass::Cloud {
                path: Some(path.into()),
            },
        )
    }

    /// Local container resource
    pub fn container(name: &str, image: impl Into<String>) -> Self {
        Self::with_class(
            name,
            ResourceKind::new(ResourceKind::CONTAINER),
            ResourceClass::Local {
                image: Some(image.into()),
            },
        )
    }

    /// Local executable (e.g., an application process)
    pub fn executable(name: &str) -> Self {
        Self::with_class(
            name,
            ResourceKind::new(ResourceKind::EXECUTABLE),
            ResourceClass::Local { image: None },
        )
    }

    /// Parameter resource exposing `{name.value}`
    pub fn parameter(name: &str, value: impl Into<Value>) -> Self {
        Self::with_class(
            name,
            ResourceKind::new(ResourceKind::PARAMETER),
            ResourceClass::Parameter {
                value: value.into(),
                secret: false,
            },
        )
    }

    /// Secret parameter resource
    pub fn secret_parameter(name: &str, value: impl Into<Value>) -> Self {
        Self::with_class(
            name,
            ResourceKind::new(ResourceKind::PARAMETER),
            ResourceClass::Parameter {
                value: value.into(),
                secret: true,
            },
        )
    }

    // ─────────────────────────────────────────────────────────────
    // Declaration-time builders
    // ─────────────────────────────────────────────────────────────

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(Arc::from(parent));
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        if let ResourceClass::Cloud { path: p } = &mut self.class {
            *p = Some(path.into());
        }
        self
    }

    pub fn with_parameter(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_parameter(name, value);
        self
    }

    pub fn with_connection_string(self, template: impl Into<String>) -> Self {
        *self.connection_string.write() = Some(template.into());
        self
    }

    pub fn with_reference(self, target: &str) -> Self {
        self.add_reference(target);
        self
    }

    pub fn with_endpoint(self, endpoint: impl Into<String>) -> Self {
        self.allocate_endpoint(endpoint);
        self
    }

    pub fn with_environment(self, callback: EnvironmentCallback) -> Self {
        self.add_environment_callback(callback);
        self
    }

    // ─────────────────────────────────────────────────────────────
    // Identity
    // ─────────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn class(&self) -> &ResourceClass {
        &self.class
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        match &self.class {
            ResourceClass::Cloud { path } => path.as_deref(),
            _ => None,
        }
    }

    pub fn is_cloud(&self) -> bool {
        matches!(self.class, ResourceClass::Cloud { .. })
    }

    pub fn is_local(&self) -> bool {
        matches!(self.class, ResourceClass::Local { .. })
    }

    // ─────────────────────────────────────────────────────────────
    // Parameters (insertion order, duplicate keys overwrite in place)
    // ─────────────────────────────────────────────────────────────

    pub fn set_parameter(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.parameters.write().insert(name.into(), value.into());
    }

    pub fn parameter_value(&self, name: &str) -> Option<Value> {
        self.parameters.read().get(name).cloned()
    }

    /// Snapshot of all parameters in declaration order
    pub fn parameters(&self) -> IndexMap<String, Value> {
        self.parameters.read().clone()
    }

    // ─────────────────────────────────────────────────────────────
    // Outputs
    // ─────────────────────────────────────────────────────────────

    fn channel(&self, channel: Channel) -> &RwLock<IndexMap<String, String>> {
        match channel {
            Channel::Outputs => &self.outputs,
            Channel::SecretOutputs => &self.secret_outputs,
        }
    }

    pub fn output(&self, channel: Channel, key: &str) -> Option<String> {
        self.channel(channel).read().get(key).cloned()
    }

    pub fn outputs(&self) -> IndexMap<String, String> {
        self.outputs.read().clone()
    }

    pub fn secret_outputs(&self) -> IndexMap<String, String> {
        self.secret_outputs.read().clone()
    }

    /// Append-only write of a single output; returns false if the key was already set
    pub fn set_output(&self, key: impl Into<String>, value: impl Into<String>) -> bool {
        write_one(&self.outputs, key.into(), value.into(), OutputWrite::Append)
    }

    /// Append-only write of a single secret output
    pub fn set_secret_output(&self, key: impl Into<String>, value: impl Into<String>) -> bool {
        write_one(&self.secret_outputs, key.into(), value.into(), OutputWrite::Append)
    }

    /// Record the values returned by provisioning
    ///
    /// Returns the keys that were kept from a previous write (Append mode only).
    pub fn record_outputs(&self, provisioned: &ProvisionedOutputs, mode: OutputWrite) -> Vec<String> {
        let mut kept = Vec::new();
        for (channel, values) in [
            (Channel::Outputs, &provisioned.outputs),
            (Channel::SecretOutputs, &provisioned.secret_outputs),
        ] {
            let lock = self.channel(channel);
            for (k, v) in values {
                if !write_one(lock, k.clone(), v.clone(), mode) {
                    kept.push(k.clone());
                }
            }
        }
        kept
    }

    // ─────────────────────────────────────────────────────────────
    // Connection string, references, endpoint
    // ─────────────────────────────────────────────────────────────

    /// Own connection-string expression (no redirection applied)
    pub fn connection_string_expression(&self) -> Option<String> {
        self.connection_string.read().clone()
    }

    pub fn set_connection_string(&self, template: impl Into<String>) {
        *self.connection_string.write() = Some(template.into());
    }

    pub fn add_reference(&self, target: &str) {
        let mut refs = self.references.write();
        if !refs.iter().any(|r| r.as_ref() == target) {
            refs.push(Arc::from(target));
        }
    }

    /// Explicitly declared references
    pub fn references(&self) -> Vec<Arc<str>> {
        self.references.read().clone()
    }

    /// Allocated local endpoint annotation (e.g., `localhost:12455`)
    pub fn allocate_endpoint(&self, endpoint: impl Into<String>) {
        *self.endpoint.write() = Some(endpoint.into());
    }

    pub fn endpoint(&self) -> Option<String> {
        self.endpoint.read().clone()
    }

    // ─────────────────────────────────────────────────────────────
    // Environment callbacks (registration order)
    // ─────────────────────────────────────────────────────────────

    pub fn add_environment_callback(&self, callback: EnvironmentCallback) {
        self.env_callbacks.write().push(callback);
    }

    pub(crate) fn environment_callbacks(&self) -> Vec<EnvironmentCallback> {
        self.env_callbacks.read().clone()
    }
}

fn write_one(
    lock: &RwLock<IndexMap<String, String>>,
    key: String,
    value: String,
    mode: OutputWrite,
) -> bool {
    let mut map = lock.write();
    match mode {
        OutputWrite::Append if map.contains_key(&key) => false,
        _ => {
            map.insert(key, value);
            true
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("class", &self.class)
            .field("parent", &self.parent)
            .field("outputs", &*self.outputs.read())
            .field(
                "secret_outputs",
                &self.secret_outputs.read().keys().collect::<Vec<_>>(),
            )
            .field("redirected", &self.redirect.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_keep_insertion_order_and_overwrite() {
        let r = Resource::bicep("sql", "sql.bicep")
            .with_parameter("b", "1")
            .with_parameter("a", "2")
            .with_parameter("b", "3");

        let params = r.parameters();
        let keys: Vec<_> = params.keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert!(matches!(params.get("b"), Some(Value::Literal(s)) if s == "3"));
    }

    #[test]
    fn outputs_are_append_only() {
        let r = Resource::cloud("kv", "cloud.keyvault.v0");
        assert!(r.set_output("uri", "https://one"));
        assert!(!r.set_output("uri", "https://two"));
        assert_eq!(r.output(Channel::Outputs, "uri").as_deref(), Some("https://one"));
    }

    #[test]
    fn record_outputs_overwrites_only_on_rerun() {
        let r = Resource::cloud("kv", "cloud.keyvault.v0");
        let first = ProvisionedOutputs::new().with_output("uri", "a");
        let second = ProvisionedOutputs::new().with_output("uri", "b");

        assert!(r.record_outputs(&first, OutputWrite::Append).is_empty());
        assert_eq!(r.record_outputs(&second, OutputWrite::Append), vec!["uri"]);
        assert_eq!(r.output(Channel::Outputs, "uri").as_deref(), Some("a"));

        r.record_outputs(&second, OutputWrite::Overwrite);
        assert_eq!(r.output(Channel::Outputs, "uri").as_deref(), Some("b"));
    }

    #[test]
    fn debug_hides_secret_output_values() {
        let r = Resource::cloud("cache", "cloud.redis.v0");
        r.set_secret_output("connectionString", "host:6380,password=hunter2");
        let printed = format!("{:?}", r);
        assert!(printed.contains("connectionString"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn references_are_deduplicated() {
        let r = Resource::executable("api")
            .with_reference("db")
            .with_reference("db");
        assert_eq!(r.references().len(), 1);
    }
}
