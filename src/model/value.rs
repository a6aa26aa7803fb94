//! Value - resolved or deferred parameter values
//!
//! A `Value` is either known at declaration time (literals, lists, objects)
//! or deferred until resolution (callbacks, references to another
//! resource's outputs, connection-string style expressions).

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Output channel of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "outputs")]
    Outputs,
    #[serde(rename = "secretOutputs")]
    SecretOutputs,
}

impl Channel {
    /// Placeholder segment for this channel
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Outputs => "outputs",
            Channel::SecretOutputs => "secretOutputs",
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, Channel::SecretOutputs)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback evaluated at resolution time
///
/// Never cached: each resolution invokes the callback again, so values
/// extended by later declarations are always seen.
#[derive(Clone)]
pub struct Deferred(Arc<dyn Fn() -> Value + Send + Sync>);

impl Deferred {
    pub fn new(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invoke the callback
    pub fn evaluate(&self) -> Value {
        (self.0)()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Deferred(..)")
    }
}

/// Parameter value (tagged union)
#[derive(Clone)]
pub enum Value {
    Literal(String),
    /// Same as `Literal` but classified secret: never rendered in manifests or logs
    SecretLiteral(String),
    List(Vec<Value>),
    Object(IndexMap<String, Value>),
    Deferred(Deferred),
    Reference {
        resource: String,
        channel: Channel,
        key: String,
    },
    /// Template in placeholder grammar, e.g. `{db.connectionString}`
    Expression(String),
}

impl Value {
    pub fn literal(s: impl Into<String>) -> Self {
        Value::Literal(s.into())
    }

    pub fn secret(s: impl Into<String>) -> Self {
        Value::SecretLiteral(s.into())
    }

    pub fn deferred(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Value::Deferred(Deferred::new(f))
    }

    /// Reference to `{resource.outputs.key}`
    pub fn output(resource: impl Into<String>, key: impl Into<String>) -> Self {
        Value::Reference {
            resource: resource.into(),
            channel: Channel::Outputs,
            key: key.into(),
        }
    }

    /// Reference to `{resource.secretOutputs.key}`
    pub fn secret_output(resource: impl Into<String>, key: impl Into<String>) -> Self {
        Value::Reference {
            resource: resource.into(),
            channel: Channel::SecretOutputs,
            key: key.into(),
        }
    }

    pub fn expression(template: impl Into<String>) -> Self {
        Value::Expression(template.into())
    }

    /// Check if the value itself is classified secret (shallow)
    pub fn is_secret_literal(&self) -> bool {
        matches!(self, Value::SecretLiteral(_))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            Value::SecretLiteral(_) => f.write_str("SecretLiteral(***)"),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Object(map) => f.debug_tuple("Object").field(map).finish(),
            Value::Deferred(d) => d.fmt(f),
            Value::Reference {
                resource,
                channel,
                key,
            } => write!(f, "Reference({}.{}.{})", resource, channel, key),
            Value::Expression(t) => f.debug_tuple("Expression").field(t).finish(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Literal(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Literal(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn debug_never_prints_secret() {
        let v = Value::secret("p@ssw0rd");
        let printed = format!("{:?}", v);
        assert!(!printed.contains("p@ssw0rd"));
        assert_eq!(printed, "SecretLiteral(***)");
    }

    #[test]
    fn deferred_is_evaluated_on_every_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let v = Value::deferred(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Value::literal("x")
        });

        let Value::Deferred(d) = &v else {
            panic!("expected deferred");
        };
        d.evaluate();
        d.evaluate();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reference_constructors_pick_channel() {
        let Value::Reference { channel, .. } = Value::secret_output("kv", "uri") else {
            panic!("expected reference");
        };
        assert!(channel.is_secret());
        assert_eq!(channel.to_string(), "secretOutputs");
    }

    #[test]
    fn vec_converts_to_list() {
        let v: Value = vec!["a", "b"].into();
        assert!(matches!(v, Value::List(ref items) if items.len() == 2));
    }
}
