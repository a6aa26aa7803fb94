//! Resource model - values, resources and the graph over them
//!
//! - `value`: Value tagged union (literal, secret, list, object, deferred, reference)
//! - `resource`: Resource node with parameters, outputs and connection string
//! - `graph`: ResourceGraph with edge discovery and Kahn layering

mod graph;
mod resource;
mod value;

pub use graph::{DepVec, ResourceGraph};
pub use resource::{OutputWrite, ProvisionedOutputs, Resource, ResourceClass, ResourceKind};
pub use value::{Channel, Deferred, Value};
