//! SURETY Node Implementation
//! 
//! Hosts one flight insurance service and exposes it:
//! - Runtime with the stale request sweep and oracle event log
//! - HTTP API
//! - Node lifecycle and builder

mod api;
mod node;
mod runtime;

pub use api::*;
pub use node::*;
pub use runtime::*;
