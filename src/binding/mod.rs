//! Binding Module - placeholder expressions and their resolution
//!
//! - `expr`: placeholder grammar (`{name.outputs.key}`, `{name.value}`, ...)
//! - `resolve`: Expression Resolver over the current outputs of a graph
//!
//! Data flow:
//! ```text
//! connection-string template / parameter Value
//!                 ↓
//!        Template (expr, cached)
//!                 ↓
//!   Resolver::resolve (outputs, redirection)
//!                 ↓
//!      Resolved { value, secret }
//! ```

pub mod expr;
mod resolve;

pub use expr::{Accessor, Placeholder, Template, Token};
pub use resolve::{Resolved, ResolvedParameters, Resolver};
