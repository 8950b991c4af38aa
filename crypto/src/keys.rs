//! Key management for SURETY
//! 
//! Handles key generation and account id derivation.

use ed25519_dalek::{SigningKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use surety_core::{AccountId, SuretyError, SuretyResult};

use crate::hashing::blake3_hash;

/// A keypair identifying an airline, passenger, oracle or administrator
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }
    
    /// Create keypair from seed bytes
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }
    
    /// Create keypair from secret key bytes
    pub fn from_secret_bytes(bytes: &[u8]) -> SuretyResult<Self> {
        if bytes.len() != SECRET_KEY_LENGTH {
            return Err(SuretyError::ConfigError(format!(
                "secret key must be {} bytes, got {}",
                SECRET_KEY_LENGTH,
                bytes.len()
            )));
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(bytes);
        Ok(Self::from_seed(&seed))
    }
    
    /// Raw public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }
    
    /// Account id (hash of public key)
    pub fn account_id(&self) -> AccountId {
        account_id_from_public_key(&self.public_key())
    }
    
    /// Get the secret key bytes (BE CAREFUL with this!)
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

/// Derive an account id from a public key using BLAKE3
pub fn account_id_from_public_key(public_key: &[u8; 32]) -> AccountId {
    let hash = blake3_hash(public_key);
    AccountId::from_bytes(*hash.as_bytes())
}

/// Serializable key file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFile {
    pub public_key: String,
    pub account_id: String,
    pub secret_key: String,
}

impl From<&KeyPair> for KeyFile {
    fn from(keypair: &KeyPair) -> Self {
        Self {
            public_key: hex::encode(keypair.public_key()),
            account_id: keypair.account_id().to_hex(),
            secret_key: hex::encode(keypair.secret_bytes()),
        }
    }
}

impl KeyFile {
    pub fn to_keypair(&self) -> SuretyResult<KeyPair> {
        let bytes = hex::decode(&self.secret_key)
            .map_err(|e| SuretyError::ConfigError(format!("secret key: {}", e)))?;
        KeyPair::from_secret_bytes(&bytes)
    }
}
