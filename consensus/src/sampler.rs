//! Seeded index draws
//!
//! Indices are uniform over `0..index_space`. Oracle triples are drawn
//! without replacement. A fixed seed makes every draw sequence reproducible.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use surety_core::OracleIndex;
use surety_crypto::hashing::derive_seed;

pub struct IndexSampler {
    rng: Mutex<StdRng>,
    index_space: u8,
}

impl IndexSampler {
    /// `seed` of `None` seeds from OS entropy
    pub fn new(index_space: u8, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
            index_space,
        }
    }

    /// Sampler whose stream is keyed by `label`, so two samplers built from
    /// one configured seed do not replay each other's draws
    pub fn labelled(index_space: u8, seed: Option<u64>, label: &str) -> Self {
        let seed = seed.map(|s| {
            let mut material = s.to_le_bytes().to_vec();
            material.extend_from_slice(label.as_bytes());
            derive_seed(&material)
        });
        Self::new(index_space, seed)
    }

    pub fn index_space(&self) -> u8 {
        self.index_space
    }

    /// One index, uniform over the index space
    pub fn draw_one(&self) -> OracleIndex {
        self.rng.lock().gen_range(0..self.index_space)
    }

    /// `count` distinct indices, sorted ascending
    pub fn draw_distinct(&self, count: usize) -> Vec<OracleIndex> {
        let mut rng = self.rng.lock();
        let mut indices: Vec<OracleIndex> = sample(&mut *rng, self.index_space as usize, count)
            .into_iter()
            .map(|i| i as OracleIndex)
            .collect();
        indices.sort_unstable();
        indices
    }
}
