//! ResourceGraph - declared resources and the edges between them
//!
//! Edges are discovered, not declared:
//! - parent → child ownership
//! - explicit references (`with_reference`)
//! - placeholders in connection-string expressions
//! - `Reference` / `Expression` values inside parameters
//! - values injected by environment callbacks (publish context)
//!
//! Layering uses Kahn's algorithm; resources left over form a cycle.

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::binding::expr;
use crate::environment::{self, ExecutionContext};
use crate::error::{ProvisioError, Result};
use crate::redirect;

use super::resource::{Resource, ResourceClass};
use super::value::Value;

/// Stack-allocated deps: most resources have 0-4 dependencies
pub type DepVec = SmallVec<[Arc<str>; 4]>;

/// Set of declared resources keyed by unique name (declaration order)
#[derive(Default, Clone)]
pub struct ResourceGraph {
    resources: IndexMap<Arc<str>, Arc<Resource>>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource; names must be unique
    pub fn add(&mut self, resource: Resource) -> Result<Arc<Resource>> {
        let name = resource.name_arc();
        if self.resources.contains_key(&name) {
            return Err(ProvisioError::DuplicateResource {
                name: name.to_string(),
            });
        }
        let resource = Arc::new(resource);
        self.resources.insert(name, Arc::clone(&resource));
        Ok(resource)
    }

    /// Declared resource (no redirection applied)
    pub fn get(&self, name: &str) -> Option<&Arc<Resource>> {
        self.resources.get(name)
    }

    /// Resource that answers for `name`: the cloud counterpart when redirected
    pub fn effective(&self, name: &str) -> Option<Arc<Resource>> {
        self.resources.get(name).map(redirect::effective)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Declared resources in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Resource>> {
        self.resources.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &Arc<str>> {
        self.resources.keys()
    }

    /// Resources declaring `name` as their parent
    pub fn children(&self, name: &str) -> Vec<Arc<Resource>> {
        self.resources
            .values()
            .filter(|r| r.parent() == Some(name))
            .cloned()
            .collect()
    }

    /// Direct dependencies of a resource (deduplicated, self-edges dropped)
    pub fn dependencies(&self, name: &str) -> Result<DepVec> {
        let declared = self
            .resources
            .get(name)
            .ok_or_else(|| ProvisioError::UnknownReference {
                resource: name.to_string(),
                target: name.to_string(),
            })?;
        let effective = redirect::effective(declared);

        let mut collector = DepCollector {
            graph: self,
            owner: name,
            deps: DepVec::new(),
        };

        for resource in [declared, &effective] {
            if let Some(parent) = resource.parent() {
                if !self.contains(parent) {
                    return Err(ProvisioError::UnknownParent {
                        resource: name.to_string(),
                        parent: parent.to_string(),
                    });
                }
                collector.push(parent)?;
            }
            for target in resource.references() {
                collector.push(&target)?;
            }
        }

        if let Some(template) = effective.connection_string_expression() {
            collector.template(&template)?;
        }
        for value in effective.parameters().values() {
            collector.value(value)?;
        }
        if let ResourceClass::Parameter { value, .. } = effective.class() {
            collector.value(value)?;
        }
        // a callback may reference different resources in each context
        for execution in [ExecutionContext::Publish, ExecutionContext::Run] {
            for value in environment::collect_environment(declared, execution)?.values() {
                collector.value(value)?;
            }
        }

        Ok(collector.deps)
    }

    /// Kahn layers: every resource in a layer depends only on earlier layers
    ///
    /// Layers keep declaration order. A cycle aborts with `CycleDetected`.
    pub fn layers(&self) -> Result<Vec<Vec<Arc<str>>>> {
        let mut deps: FxHashMap<Arc<str>, DepVec> =
            FxHashMap::with_capacity_and_hasher(self.len(), Default::default());
        let mut successors: FxHashMap<Arc<str>, DepVec> =
            FxHashMap::with_capacity_and_hasher(self.len(), Default::default());
        let mut indegree: FxHashMap<Arc<str>, usize> =
            FxHashMap::with_capacity_and_hasher(self.len(), Default::default());

        for name in self.resources.keys() {
            let d = self.dependencies(name)?;
            indegree.insert(Arc::clone(name), d.len());
            for dep in &d {
                successors
                    .entry(Arc::clone(dep))
                    .or_default()
                    .push(Arc::clone(name));
            }
            deps.insert(Arc::clone(name), d);
        }

        let mut layers = Vec::new();
        let mut current: Vec<Arc<str>> = self
            .resources
            .keys()
            .filter(|n| indegree[*n] == 0)
            .cloned()
            .collect();
        let mut placed = 0;

        while !current.is_empty() {
            placed += current.len();
            let mut next = Vec::new();
            for name in &current {
                if let Some(succ) = successors.get(name) {
                    for s in succ {
                        let Some(count) = indegree.get_mut(s) else {
                            continue;
                        };
                        *count -= 1;
                        if *count == 0 {
                            next.push(Arc::clone(s));
                        }
                    }
                }
            }
            next.sort_by_key(|n| self.resources.get_index_of(n));
            layers.push(std::mem::replace(&mut current, next));
        }

        if placed < self.len() {
            let remaining: FxHashSet<&Arc<str>> =
                indegree.iter().filter(|(_, c)| **c > 0).map(|(n, _)| n).collect();
            return Err(ProvisioError::CycleDetected {
                cycle: self.describe_cycle(&remaining, &deps),
            });
        }

        Ok(layers)
    }

    /// Check edges, placeholders and acyclicity
    pub fn validate(&self) -> Result<()> {
        self.layers().map(|_| ())
    }

    /// Walk dependency edges inside the unplaced set until a node repeats
    fn describe_cycle(
        &self,
        remaining: &FxHashSet<&Arc<str>>,
        deps: &FxHashMap<Arc<str>, DepVec>,
    ) -> String {
        let Some(start) = self.resources.keys().find(|n| remaining.contains(n)) else {
            return String::from("<unknown>");
        };

        let mut path: Vec<Arc<str>> = vec![Arc::clone(start)];
        loop {
            let last = &path[path.len() - 1];
            let Some(next) = deps
                .get(last)
                .and_then(|d| d.iter().find(|n| remaining.contains(n)))
            else {
                break;
            };
            if let Some(pos) = path.iter().position(|n| n == next) {
                let mut cycle: Vec<&str> = path[pos..].iter().map(AsRef::as_ref).collect();
                cycle.reverse();
                cycle.push(cycle[0]);
                return cycle.join(" -> ");
            }
            path.push(Arc::clone(next));
        }

        let mut names: Vec<&str> = remaining.iter().map(|n| n.as_ref()).collect();
        names.sort_unstable();
        names.join(", ")
    }
}

impl std::fmt::Debug for ResourceGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGraph")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish()
    }
}

struct DepCollector<'g> {
    graph: &'g ResourceGraph,
    owner: &'g str,
    deps: DepVec,
}

impl DepCollector<'_> {
    fn push(&mut self, target: &str) -> Result<()> {
        if target == self.owner {
            return Ok(());
        }
        let Some((name, _)) = self.graph.resources.get_key_value(target) else {
            return Err(ProvisioError::UnknownReference {
                resource: self.owner.to_string(),
                target: target.to_string(),
            });
        };
        if !self.deps.iter().any(|d| d == name) {
            self.deps.push(Arc::clone(name));
        }
        Ok(())
    }

    fn template(&mut self, template: &str) -> Result<()> {
        for placeholder in expr::placeholders(self.owner, template)? {
            self.push(&placeholder.resource)?;
        }
        Ok(())
    }

    fn value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Literal(_) | Value::SecretLiteral(_) => Ok(()),
            Value::List(items) => items.iter().try_for_each(|v| self.value(v)),
            Value::Object(map) => map.values().try_for_each(|v| self.value(v)),
            Value::Deferred(d) => self.value(&d.evaluate()),
            Value::Reference { resource, .. } => self.push(resource),
            Value::Expression(t) => self.template(t),
        }
    }
}
