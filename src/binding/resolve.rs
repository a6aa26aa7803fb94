//! Expression Resolver - turns Values and templates into concrete strings
//!
//! Strict mode: a reference to an output that has not been written yet is an
//! `UnresolvedReference` error, never an empty string. Secrecy is tracked
//! alongside every resolved value so callers can keep secrets out of
//! non-secret channels.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value as Json;
use smallvec::SmallVec;
use tracing::trace;

use crate::error::{ProvisioError, Result};
use crate::model::{Channel, Resource, ResourceClass, ResourceGraph, Value};
use crate::redirect::{self, ConnectionSource};

use super::expr::{self, Accessor, Placeholder, Token};

/// Resolved value with its secrecy classification
#[derive(Clone, PartialEq)]
pub struct Resolved {
    pub value: Json,
    /// True if any secret literal, secret output or secret parameter contributed
    pub secret: bool,
}

impl Resolved {
    fn plain(value: impl Into<Json>) -> Self {
        Self {
            value: value.into(),
            secret: false,
        }
    }

    fn classified(value: impl Into<Json>, secret: bool) -> Self {
        Self {
            value: value.into(),
            secret,
        }
    }

    /// Scalars verbatim, lists/objects as compact JSON
    pub fn as_string(&self) -> String {
        match &self.value {
            Json::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.secret {
            f.write_str("Resolved(***)")
        } else {
            f.debug_tuple("Resolved").field(&self.value).finish()
        }
    }
}

/// Resolved parameters of one resource (declaration order)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedParameters {
    values: IndexMap<String, Resolved>,
}

impl ResolvedParameters {
    pub fn get(&self, name: &str) -> Option<&Resolved> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Resolved)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Non-secret parameters as JSON (safe for logs and events)
    pub fn public_json(&self) -> Json {
        Json::Object(
            self.values
                .iter()
                .filter(|(_, v)| !v.secret)
                .map(|(k, v)| (k.clone(), v.value.clone()))
                .collect(),
        )
    }

    /// All parameters as JSON, secrets included (for provisioner calls only)
    pub fn to_json(&self) -> Json {
        Json::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.value.clone()))
                .collect(),
        )
    }
}

/// Names currently being resolved through `{x.connectionString}` / `{x.value}`
type Chain = SmallVec<[String; 4]>;

/// Resolves values against the current outputs of a graph
///
/// Pure function of current outputs: resolving the same unchanged input twice
/// gives the same result.
pub struct Resolver<'g> {
    graph: &'g ResourceGraph,
}

impl<'g> Resolver<'g> {
    pub fn new(graph: &'g ResourceGraph) -> Self {
        Self { graph }
    }

    /// Resolve a value on behalf of `requester` (used in error reports)
    pub fn resolve(&self, requester: &str, value: &Value) -> Result<Resolved> {
        self.value(requester, value, &mut Chain::new())
    }

    /// Resolve a value to its string form
    pub fn resolve_string(&self, requester: &str, value: &Value) -> Result<String> {
        Ok(self.resolve(requester, value)?.as_string())
    }

    /// Substitute every placeholder of a template
    ///
    /// A template without placeholders is returned unchanged.
    pub fn resolve_template(&self, requester: &str, template: &str) -> Result<Resolved> {
        self.template(requester, template, &mut Chain::new())
    }

    /// Resolve `{target.channel.key}`
    pub fn resolve_reference(
        &self,
        requester: &str,
        target: &str,
        channel: Channel,
        key: &str,
    ) -> Result<String> {
        let resource = self.lookup(requester, target)?;
        resource
            .output(channel, key)
            .ok_or_else(|| ProvisioError::UnresolvedReference {
                resource: requester.to_string(),
                target: target.to_string(),
                channel,
                key: key.to_string(),
            })
    }

    /// Connection string of a resource, honoring redirection
    pub fn connection_string(&self, name: &str) -> Result<Resolved> {
        self.connection(name, name, &mut Chain::new())
    }

    /// Resolve every parameter of a resource
    pub fn parameters(&self, resource: &Resource) -> Result<ResolvedParameters> {
        let mut values = IndexMap::new();
        for (name, value) in resource.parameters() {
            let resolved = self.resolve(resource.name(), &value)?;
            values.insert(name, resolved);
        }
        Ok(ResolvedParameters { values })
    }

    fn lookup(&self, requester: &str, target: &str) -> Result<std::sync::Arc<Resource>> {
        self.graph
            .effective(target)
            .ok_or_else(|| ProvisioError::UnknownReference {
                resource: requester.to_string(),
                target: target.to_string(),
            })
    }

    fn value(&self, requester: &str, value: &Value, chain: &mut Chain) -> Result<Resolved> {
        match value {
            Value::Literal(s) => Ok(Resolved::plain(s.as_str())),
            Value::SecretLiteral(s) => Ok(Resolved::classified(s.as_str(), true)),
            Value::List(items) => {
                let mut secret = false;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let r = self.value(requester, item, chain)?;
                    secret |= r.secret;
                    out.push(r.value);
                }
                Ok(Resolved::classified(Json::Array(out), secret))
            }
            Value::Object(map) => {
                let mut secret = false;
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    let r = self.value(requester, v, chain)?;
                    secret |= r.secret;
                    out.insert(k.clone(), r.value);
                }
                Ok(Resolved::classified(Json::Object(out), secret))
            }
            Value::Deferred(d) => self.value(requester, &d.evaluate(), chain),
            Value::Reference {
                resource,
                channel,
                key,
            } => {
                let s = self.resolve_reference(requester, resource, *channel, key)?;
                Ok(Resolved::classified(s, channel.is_secret()))
            }
            Value::Expression(t) => self.template(requester, t, chain),
        }
    }

    fn template(&self, requester: &str, template: &str, chain: &mut Chain) -> Result<Resolved> {
        let parsed = expr::parse(requester, template)?;
        if !parsed.has_placeholders() {
            return Ok(Resolved::plain(template_literal(parsed.tokens())));
        }

        let mut out = String::with_capacity(template.len() + 64);
        let mut secret = false;
        for token in parsed.tokens() {
            match token {
                Token::Literal(s) => out.push_str(s),
                Token::Placeholder(p) => {
                    let r = self.placeholder(requester, p, chain)?;
                    secret |= r.secret;
                    out.push_str(&r.as_string());
                }
            }
        }
        trace!(requester, template, "template resolved");
        Ok(Resolved::classified(out, secret))
    }

    fn placeholder(&self, requester: &str, p: &Placeholder, chain: &mut Chain) -> Result<Resolved> {
        match &p.accessor {
            Accessor::Output { channel, key } => {
                let s = self.resolve_reference(requester, &p.resource, *channel, key)?;
                Ok(Resolved::classified(s, channel.is_secret()))
            }
            Accessor::Value => {
                let target = self.lookup(requester, &p.resource)?;
                let ResourceClass::Parameter { value, secret } = target.class() else {
                    return Err(ProvisioError::NoValue {
                        resource: p.resource.clone(),
                    });
                };
                self.guarded(&p.resource, chain, |this, chain| {
                    let mut r = this.value(requester, value, chain)?;
                    r.secret |= *secret;
                    Ok(r)
                })
            }
            Accessor::ConnectionString => self.connection(requester, &p.resource, chain),
        }
    }

    fn connection(&self, requester: &str, name: &str, chain: &mut Chain) -> Result<Resolved> {
        let declared = self
            .graph
            .get(name)
            .ok_or_else(|| ProvisioError::UnknownReference {
                resource: requester.to_string(),
                target: name.to_string(),
            })?;

        let source = redirect::connection_source(declared).ok_or_else(|| {
            ProvisioError::NoConnectionString {
                resource: name.to_string(),
            }
        })?;

        self.guarded(name, chain, |this, chain| match &source {
            ConnectionSource::Expression(t) => this.template(requester, t, chain),
            ConnectionSource::Endpoint(e) => Ok(Resolved::plain(e.as_str())),
            ConnectionSource::Parameter { value, secret } => {
                let mut r = this.value(requester, value, chain)?;
                r.secret |= *secret;
                Ok(r)
            }
        })
    }

    /// Run `f` with `name` pushed on the chain, failing on re-entry
    fn guarded(
        &self,
        name: &str,
        chain: &mut Chain,
        f: impl FnOnce(&Self, &mut Chain) -> Result<Resolved>,
    ) -> Result<Resolved> {
        if chain.iter().any(|n| n == name) {
            let mut path: Vec<&str> = chain.iter().map(String::as_str).collect();
            path.push(name);
            return Err(ProvisioError::CircularExpression {
                resource: name.to_string(),
                chain: path.join(" -> "),
            });
        }
        chain.push(name.to_string());
        let result = f(self, chain);
        chain.pop();
        result
    }
}

fn template_literal(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| match t {
            Token::Literal(s) => s.as_str(),
            Token::Placeholder(_) => "",
        })
        .collect()
}
