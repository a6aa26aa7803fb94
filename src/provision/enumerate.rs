//! Resource Enumerator - existing external objects and reconciliation
//!
//! Enumeration is a read-only query against external state: listing the
//! same scope twice with no external change yields the same objects, so the
//! reconciliation decision is idempotent across runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{ProvisioError, Result};

/// Where external objects live (subscription + resource group)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalScope {
    #[serde(default)]
    pub subscription_id: String,
    #[serde(default)]
    pub resource_group: String,
    #[serde(default)]
    pub location: Option<String>,
}

impl ExternalScope {
    pub fn new(subscription_id: impl Into<String>, resource_group: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            location: None,
        }
    }
}

/// An object that already exists in the external scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalObject {
    /// Provider-side identifier (stable, unique within the scope)
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Kind-specific properties handed to the provisioner on adoption
    #[serde(default)]
    pub properties: Json,
}

impl ExternalObject {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tags: BTreeMap::new(),
            properties: Json::Null,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_properties(mut self, properties: Json) -> Self {
        self.properties = properties;
        self
    }
}

/// Lists existing objects of one resource kind
///
/// Each call to `list` starts a fresh listing; the stream is lazy.
pub trait ResourceEnumerator: Send + Sync {
    fn list<'a>(&'a self, scope: &'a ExternalScope) -> BoxStream<'a, anyhow::Result<ExternalObject>>;

    /// Tag accessor (kinds may keep tags outside `ExternalObject::tags`)
    fn tags<'o>(&self, object: &'o ExternalObject) -> Option<&'o BTreeMap<String, String>> {
        Some(&object.tags)
    }
}

type ListFn = dyn Fn(&ExternalScope) -> anyhow::Result<Vec<ExternalObject>> + Send + Sync;
type TagFn = for<'o> fn(&'o ExternalObject) -> Option<&'o BTreeMap<String, String>>;

fn object_tags(object: &ExternalObject) -> Option<&BTreeMap<String, String>> {
    Some(&object.tags)
}

/// Enumerator built from a listing function and a tag-extraction function
pub struct FnEnumerator {
    list: Arc<ListFn>,
    tags: TagFn,
}

impl FnEnumerator {
    pub fn new(
        list: impl Fn(&ExternalScope) -> anyhow::Result<Vec<ExternalObject>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            list: Arc::new(list),
            tags: object_tags,
        }
    }

    pub fn with_tags(mut self, tags: TagFn) -> Self {
        self.tags = tags;
        self
    }
}

impl ResourceEnumerator for FnEnumerator {
    fn list<'a>(&'a self, scope: &'a ExternalScope) -> BoxStream<'a, anyhow::Result<ExternalObject>> {
        let list = Arc::clone(&self.list);
        stream::once(async move { list(scope) })
            .map(|batch| match batch {
                Ok(objects) => stream::iter(objects.into_iter().map(Ok::<_, anyhow::Error>)).left_stream(),
                Err(e) => stream::iter(std::iter::once(Err(e))).right_stream(),
            })
            .flatten()
            .boxed()
    }

    fn tags<'o>(&self, object: &'o ExternalObject) -> Option<&'o BTreeMap<String, String>> {
        (self.tags)(object)
    }
}

/// Decision for one declared resource
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// No external object carries the identity: create it
    Create,
    /// Exactly one match: adopt its outputs
    Adopt(ExternalObject),
}

/// Match `resource` against the objects listed for its kind
///
/// An object matches when its `identity_tag` equals the resource name.
/// More than one match is `ReconciliationAmbiguity` (never guess).
pub async fn reconcile(
    enumerator: &dyn ResourceEnumerator,
    scope: &ExternalScope,
    identity_tag: &str,
    resource: &str,
) -> Result<Reconciliation> {
    let objects: Vec<ExternalObject> = enumerator
        .list(scope)
        .try_collect()
        .await
        .map_err(|e| ProvisioError::EnumerationFailed {
            resource: resource.to_string(),
            reason: format!("{:#}", e),
        })?;

    let mut matches: Vec<ExternalObject> = objects
        .into_iter()
        .filter(|o| {
            enumerator
                .tags(o)
                .and_then(|t| t.get(identity_tag))
                .is_some_and(|v| v == resource)
        })
        .collect();

    match matches.len() {
        0 => Ok(Reconciliation::Create),
        1 => Ok(Reconciliation::Adopt(matches.remove(0))),
        _ => {
            let mut ids: Vec<String> = matches.into_iter().map(|o| o.id).collect();
            ids.sort();
            Err(ProvisioError::ReconciliationAmbiguity {
                resource: resource.to_string(),
                matches: ids,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAG: &str = "provisio-resource-name";

    fn scope() -> ExternalScope {
        ExternalScope::new("sub-1", "rg-dev")
    }

    fn objects() -> Vec<ExternalObject> {
        vec![
            ExternalObject::new("/rg-dev/kv-1", "kv-x1").with_tag(TAG, "kv"),
            ExternalObject::new("/rg-dev/sql-1", "sql-x1").with_tag(TAG, "sql"),
            ExternalObject::new("/rg-dev/sql-2", "sql-x2").with_tag(TAG, "sql"),
            ExternalObject::new("/rg-dev/untagged", "other"),
        ]
    }

    #[tokio::test]
    async fn single_match_is_adopted() {
        let e = FnEnumerator::new(|_| Ok(objects()));
        let decision = reconcile(&e, &scope(), TAG, "kv").await.unwrap();
        let Reconciliation::Adopt(obj) = decision else {
            panic!("expected adoption");
        };
        assert_eq!(obj.id, "/rg-dev/kv-1");
    }

    #[tokio::test]
    async fn no_match_creates() {
        let e = FnEnumerator::new(|_| Ok(objects()));
        assert_eq!(
            reconcile(&e, &scope(), TAG, "bus").await.unwrap(),
            Reconciliation::Create
        );
    }

    #[tokio::test]
    async fn multiple_matches_are_ambiguous() {
        let e = FnEnumerator::new(|_| Ok(objects()));
        let err = reconcile(&e, &scope(), TAG, "sql").await.unwrap_err();
        let ProvisioError::ReconciliationAmbiguity { matches, .. } = err else {
            panic!("expected ambiguity");
        };
        assert_eq!(matches, vec!["/rg-dev/sql-1", "/rg-dev/sql-2"]);
    }

    #[tokio::test]
    async fn repeated_enumeration_is_idempotent() {
        let e = FnEnumerator::new(|_| Ok(objects()));
        let first = reconcile(&e, &scope(), TAG, "kv").await.unwrap();
        let second = reconcile(&e, &scope(), TAG, "kv").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn custom_tag_accessor() {
        fn from_properties(o: &ExternalObject) -> Option<&BTreeMap<String, String>> {
            // kind keeps its tags nowhere: nothing ever matches
            let _ = o;
            None
        }
        let e = FnEnumerator::new(|_| Ok(objects())).with_tags(from_properties);
        assert_eq!(
            reconcile(&e, &scope(), TAG, "kv").await.unwrap(),
            Reconciliation::Create
        );
    }

    #[tokio::test]
    async fn listing_failure_is_enumeration_error() {
        let e = FnEnumerator::new(|_| Err(anyhow::anyhow!("403 forbidden")));
        let err = reconcile(&e, &scope(), TAG, "kv").await.unwrap_err();
        assert!(matches!(err, ProvisioError::EnumerationFailed { .. }));
        assert!(err.to_string().contains("403"));
    }
}
