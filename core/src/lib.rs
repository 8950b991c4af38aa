//! SURETY Core Library
//! 
//! Core types, traits, and abstractions for the SURETY flight insurance engine.
//! Every other SURETY crate builds on the identities, amounts, errors and
//! configuration defined here.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;
pub mod operating;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::*;
pub use operating::*;
