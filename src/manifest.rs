//! Manifest rendering - declarative JSON view of a resource graph
//!
//! One entry per declared resource, keyed by name:
//!
//! ```json
//! {
//!   "db": {
//!     "type": "cloud.bicep.v0",
//!     "path": "db.bicep",
//!     "parent": "sql",
//!     "connectionString": "{sql.connectionString}",
//!     "params": { "databases": ["mydatabase", "otherdb"] }
//!   }
//! }
//! ```
//!
//! Expressions are published verbatim (never resolved) and secret literals
//! only ever appear as placeholders.

use serde_json::{json, Map, Value as Json};

use crate::environment::{self, ExecutionContext};
use crate::error::Result;
use crate::model::{Resource, ResourceClass, ResourceGraph, Value};
use crate::redirect;

/// Render the whole graph (declaration order)
pub fn render(graph: &ResourceGraph) -> Result<Json> {
    let mut doc = Map::new();
    for declared in graph.iter() {
        doc.insert(declared.name().to_string(), entry(declared)?);
    }
    Ok(Json::Object(doc))
}

/// Pretty-printed manifest
pub fn render_pretty(graph: &ResourceGraph) -> Result<String> {
    let doc = render(graph)?;
    Ok(serde_json::to_string_pretty(&doc).unwrap_or_default())
}

/// Manifest entry of one declared resource (its counterpart when redirected)
pub fn entry(declared: &std::sync::Arc<Resource>) -> Result<Json> {
    let resource = redirect::effective(declared);
    let mut out = Map::new();
    out.insert("type".into(), json!(resource.kind().as_str()));

    match resource.class() {
        ResourceClass::Cloud { path } => {
            if let Some(path) = path {
                out.insert("path".into(), json!(path));
            }
        }
        ResourceClass::Local { image } => {
            if let Some(image) = image {
                out.insert("image".into(), json!(image));
            }
        }
        ResourceClass::Parameter { value, secret } => {
            let rendered = if *secret {
                json!(format!("{{{}.value}}", resource.name()))
            } else {
                render_value(resource.name(), "value", value)
            };
            out.insert("value".into(), rendered);
        }
    }

    if let Some(parent) = resource.parent() {
        out.insert("parent".into(), json!(parent));
    }
    if let Some(template) = resource.connection_string_expression() {
        out.insert("connectionString".into(), json!(template));
    }

    let params = resource.parameters();
    if !params.is_empty() {
        let rendered: Map<String, Json> = params
            .iter()
            .map(|(k, v)| (k.clone(), render_value(resource.name(), k, v)))
            .collect();
        out.insert("params".into(), Json::Object(rendered));
    }

    // environment belongs to the declared (local) resource
    if declared.is_local() && !declared.is_redirected() {
        let env = environment::collect_environment(declared, ExecutionContext::Publish)?;
        if !env.is_empty() {
            let rendered: Map<String, Json> = env
                .iter()
                .map(|(k, v)| (k.clone(), render_value(declared.name(), k, v)))
                .collect();
            out.insert("env".into(), Json::Object(rendered));
        }
    }

    Ok(Json::Object(out))
}

/// Publish form of a value: references and expressions stay symbolic
fn render_value(owner: &str, key: &str, value: &Value) -> Json {
    match value {
        Value::Literal(s) => json!(s),
        Value::SecretLiteral(_) => json!(format!("{{{}.secretParams.{}}}", owner, key)),
        Value::List(items) => Json::Array(items.iter().map(|v| render_value(owner, key, v)).collect()),
        Value::Object(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(owner, key, v)))
                .collect(),
        ),
        Value::Deferred(d) => render_value(owner, key, &d.evaluate()),
        Value::Reference {
            resource,
            channel,
            key: output,
        } => json!(format!("{{{}.{}.{}}}", resource, channel, output)),
        Value::Expression(t) => json!(t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cloud_entry_fields() {
        let mut g = ResourceGraph::new();
        g.add(
            Resource::bicep("kv", "kv.bicep")
                .with_parameter("sku", "standard")
                .with_connection_string("{kv.outputs.vaultUri}"),
        )
        .unwrap();

        let doc = render(&g).unwrap();
        assert_eq!(
            doc,
            json!({
                "kv": {
                    "type": "cloud.bicep.v0",
                    "path": "kv.bicep",
                    "connectionString": "{kv.outputs.vaultUri}",
                    "params": { "sku": "standard" }
                }
            })
        );
    }

    #[test]
    fn secrets_never_rendered_in_plaintext() {
        let mut g = ResourceGraph::new();
        g.add(Resource::bicep("sql", "sql.bicep").with_parameter("adminPassword", Value::secret("hunter2")))
            .unwrap();
        g.add(Resource::secret_parameter("apikey", "s3cr3t")).unwrap();

        let text = render_pretty(&g).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("s3cr3t"));

        let doc = render(&g).unwrap();
        assert_eq!(doc["sql"]["params"]["adminPassword"], "{sql.secretParams.adminPassword}");
        assert_eq!(doc["apikey"]["value"], "{apikey.value}");
    }

    #[test]
    fn references_render_as_placeholders() {
        let mut g = ResourceGraph::new();
        g.add(Resource::bicep("kv", "kv.bicep")).unwrap();
        g.add(
            Resource::bicep("app", "app.bicep")
                .with_parameter("vault", Value::output("kv", "vaultUri"))
                .with_parameter("key", Value::secret_output("kv", "key")),
        )
        .unwrap();

        let doc = render(&g).unwrap();
        assert_eq!(doc["app"]["params"]["vault"], "{kv.outputs.vaultUri}");
        assert_eq!(doc["app"]["params"]["key"], "{kv.secretOutputs.key}");
    }

    #[test]
    fn local_resource_publishes_image_and_env() {
        let mut g = ResourceGraph::new();
        g.add(Resource::bicep("db", "db.bicep").with_connection_string("{db.outputs.cs}"))
            .unwrap();
        g.add(
            Resource::container("api", "myapp:latest")
                .with_connection_reference("db")
                .with_env("MODE", "publish"),
        )
        .unwrap();

        let doc = render(&g).unwrap();
        assert_eq!(
            doc["api"],
            json!({
                "type": "container.v0",
                "image": "myapp:latest",
                "env": {
                    "ConnectionStrings__db": "{db.connectionString}",
                    "MODE": "publish"
                }
            })
        );
    }
}
