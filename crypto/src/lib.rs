//! SURETY Cryptography Module
//! 
//! Identity and hashing primitives:
//! - Ed25519 key pairs from which account identities are derived
//! - BLAKE3 for account ids, flight ids and seed derivation

pub mod keys;
pub mod hashing;

pub use keys::*;
pub use hashing::*;
