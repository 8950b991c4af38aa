//! Oracle identity management

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use surety_core::{AccountId, OracleConfig, OracleIndex, SuretyError, SuretyResult, Timestamp};
use tracing::info;

use crate::sampler::IndexSampler;

/// Registered oracle and the indices it answers for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleInfo {
    pub id: AccountId,
    pub indices: Vec<OracleIndex>,
    pub registered_at: Timestamp,
}

impl OracleInfo {
    /// Whether a request under `index` is addressed to this oracle
    pub fn holds(&self, index: OracleIndex) -> bool {
        self.indices.contains(&index)
    }
}

/// Oracle set. Indices are assigned once and never change.
pub struct OracleRegistry {
    oracles: DashMap<AccountId, OracleInfo>,
    sampler: IndexSampler,
    indices_per_oracle: usize,
}

impl OracleRegistry {
    pub fn new(config: &OracleConfig) -> Self {
        Self {
            oracles: DashMap::new(),
            sampler: IndexSampler::labelled(config.index_space, config.rng_seed, "oracle-indices"),
            indices_per_oracle: config.indices_per_oracle,
        }
    }

    /// Draw and store the oracle's index set
    pub fn assign_indices(&self, oracle: AccountId) -> SuretyResult<Vec<OracleIndex>> {
        match self.oracles.entry(oracle) {
            Entry::Occupied(_) => Err(SuretyError::AlreadyAssigned(oracle.to_string())),
            Entry::Vacant(slot) => {
                let indices = self.sampler.draw_distinct(self.indices_per_oracle);
                slot.insert(OracleInfo {
                    id: oracle,
                    indices: indices.clone(),
                    registered_at: Timestamp::now(),
                });
                info!("Oracle {} assigned indices {:?}", oracle, indices);
                Ok(indices)
            }
        }
    }

    pub fn is_registered(&self, oracle: &AccountId) -> bool {
        self.oracles.contains_key(oracle)
    }

    pub fn get(&self, oracle: &AccountId) -> Option<OracleInfo> {
        self.oracles.get(oracle).map(|o| o.clone())
    }

    pub fn indices(&self, oracle: &AccountId) -> SuretyResult<Vec<OracleIndex>> {
        self.oracles
            .get(oracle)
            .map(|o| o.indices.clone())
            .ok_or_else(|| SuretyError::UnknownOracle(oracle.to_string()))
    }

    /// Oracles expected to answer a request under `index`
    pub fn holders_of(&self, index: OracleIndex) -> Vec<AccountId> {
        self.oracles
            .iter()
            .filter(|o| o.holds(index))
            .map(|o| o.id)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.oracles.len()
    }
}

pub type SharedOracleRegistry = Arc<OracleRegistry>;
