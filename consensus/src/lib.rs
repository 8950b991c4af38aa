//! SURETY Oracle Consensus
//! 
//! Resolves flight statuses from independent oracle reports:
//! - Seeded pseudo-random index assignment per oracle
//! - Per-flight status requests under a randomly drawn index
//! - Write-once resolution once enough oracles agree

pub mod engine;
pub mod oracle;
pub mod request;
pub mod sampler;

pub use engine::*;
pub use oracle::*;
pub use request::*;
pub use sampler::*;
