//! Configuration types for SURETY

use crate::error::SuretyError;
use crate::traits::SuretyResult;
use crate::types::{AccountId, Amount};
use serde::{Deserialize, Serialize};

/// Main node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name for logging
    pub name: String,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Insurance scheme configuration
    #[serde(default)]
    pub surety: SuretyConfig,

    /// Airline seeded as the founding member
    #[serde(default)]
    pub founding_airline: Option<AccountId>,

    /// Logging level
    pub log_level: String,

    /// Interval of the stale oracle request sweep, in milliseconds
    #[serde(default = "default_sweep_interval")]
    pub expiry_sweep_ms: u64,
}

fn default_sweep_interval() -> u64 {
    5_000
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "surety-node".to_string(),
            api: ApiConfig::default(),
            surety: SuretyConfig::default(),
            founding_airline: None,
            log_level: "info".to_string(),
            expiry_sweep_ms: default_sweep_interval(),
        }
    }
}

impl NodeConfig {
    pub fn to_json(&self) -> SuretyResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> SuretyResult<Self> {
        let config: NodeConfig = serde_json::from_str(json)?;
        config.surety.validate()?;
        Ok(config)
    }
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    pub listen_addr: String,

    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            enable_cors: true,
        }
    }
}

/// Insurance scheme parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuretyConfig {
    /// Identity allowed to flip the operating switch
    pub admin: AccountId,

    /// Exact collateral an airline must post
    pub ante: Amount,

    /// Maximum stake per policy
    pub insurance_cap: Amount,

    /// Payout = stake * numerator / denominator
    pub payout_numerator: u128,
    pub payout_denominator: u128,

    /// Minimum fee an oracle pays to receive its indices
    pub oracle_registration_fee: Amount,

    /// Admission needs no votes while fewer airlines than this are registered
    pub fast_path_limit: usize,

    #[serde(default)]
    pub oracle: OracleConfig,
}

impl Default for SuretyConfig {
    fn default() -> Self {
        Self {
            admin: AccountId::ZERO,
            ante: Amount::from_tokens(10),
            insurance_cap: Amount::from_tokens(1),
            payout_numerator: 3,
            payout_denominator: 2, // 1.5x
            oracle_registration_fee: Amount::from_tokens(1),
            fast_path_limit: 4,
            oracle: OracleConfig::default(),
        }
    }
}

impl SuretyConfig {
    /// Reject parameter combinations the engine cannot honour
    pub fn validate(&self) -> SuretyResult<()> {
        if self.ante.is_zero() {
            return Err(SuretyError::ConfigError("ante must be positive".into()));
        }
        if self.insurance_cap.is_zero() {
            return Err(SuretyError::ConfigError("insurance cap must be positive".into()));
        }
        if self.payout_denominator == 0 {
            return Err(SuretyError::ConfigError("payout denominator is zero".into()));
        }
        if self.insurance_cap.0.checked_mul(self.payout_numerator).is_none() {
            return Err(SuretyError::ConfigError(
                "insurance cap times payout numerator overflows".into(),
            ));
        }
        self.oracle.validate()
    }
}

/// Oracle consensus parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Indices are drawn from `0..index_space`
    pub index_space: u8,

    /// Distinct indices held by each oracle
    pub indices_per_oracle: usize,

    /// Agreeing oracles needed to resolve a flight
    pub min_responses: usize,

    /// Age after which a collecting request expires
    pub request_timeout_ms: u64,

    /// Fixed seed for reproducible draws; entropy when absent
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            index_space: 10,
            indices_per_oracle: 3,
            min_responses: 3,
            request_timeout_ms: 60_000,
            rng_seed: None,
        }
    }
}

impl OracleConfig {
    pub fn validate(&self) -> SuretyResult<()> {
        if self.index_space == 0 {
            return Err(SuretyError::ConfigError("index space is empty".into()));
        }
        if self.indices_per_oracle == 0 || self.indices_per_oracle > self.index_space as usize {
            return Err(SuretyError::ConfigError(format!(
                "cannot draw {} distinct indices from {}",
                self.indices_per_oracle, self.index_space
            )));
        }
        if self.min_responses == 0 {
            return Err(SuretyError::ConfigError("min responses must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SuretyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ante, Amount::from_tokens(10));
        assert_eq!(config.oracle.min_responses, 3);
    }

    #[test]
    fn test_rejects_oversized_draw() {
        let config = OracleConfig {
            index_space: 2,
            indices_per_oracle: 3,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SuretyError::ConfigError(_))));
    }

    #[test]
    fn test_rejects_overflowing_payout() {
        let config = SuretyConfig {
            insurance_cap: Amount::MAX,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SuretyError::ConfigError(_))));

        let config = SuretyConfig {
            insurance_cap: Amount::new(u128::MAX / 3),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_node_config_json() {
        let config = NodeConfig {
            founding_airline: Some(AccountId([1u8; 32])),
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        let restored = NodeConfig::from_json(&json).unwrap();
        assert_eq!(restored.founding_airline, config.founding_airline);
        assert_eq!(restored.surety.ante, config.surety.ante);
    }
}
