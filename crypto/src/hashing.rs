//! Hashing functions using BLAKE3

use surety_core::{FlightKey, Hash};

/// Compute BLAKE3 hash of data
pub fn blake3_hash(data: &[u8]) -> Hash {
    let hash = blake3::hash(data);
    Hash::from_bytes(*hash.as_bytes())
}

/// Default hash function (BLAKE3)
pub fn hash(data: &[u8]) -> Hash {
    blake3_hash(data)
}

/// Hash multiple pieces of data
pub fn hash_multiple(parts: &[&[u8]]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    let hash = hasher.finalize();
    Hash::from_bytes(*hash.as_bytes())
}

/// Stable id of a flight, used to address it over the wire
pub fn flight_id(key: &FlightKey) -> Hash {
    let designator_len = (key.designator.len() as u64).to_le_bytes();
    hash_multiple(&[
        b"SURETY_FLIGHT:",
        key.airline.as_bytes(),
        &designator_len,
        key.designator.as_bytes(),
        &key.timestamp.0.to_le_bytes(),
    ])
}

/// Derive a 64-bit seed from a label, for reproducible pseudo-random draws
pub fn derive_seed(label: &[u8]) -> u64 {
    let digest = hash_multiple(&[b"SURETY_SEED:", label]);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}
