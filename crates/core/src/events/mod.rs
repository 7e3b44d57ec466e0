//! Job lifecycle events.
//!
//! The orchestrator publishes every state change on an [`EventBus`]. The
//! server forwards them to WebSocket clients; tests subscribe directly.

mod bus;
mod types;

pub use bus::{EventBus, Subscription};
pub use types::{EventKind, JobEvent};
