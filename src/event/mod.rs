//! Event Module - audit trail of a provisioning run
//!
//! Key types:
//! - `Event`: Envelope with id + timestamp + kind
//! - `EventKind`: run / layer / resource level events
//! - `EventLog`: Thread-safe, append-only log

mod log;

pub use log::{Event, EventKind, EventLog};
