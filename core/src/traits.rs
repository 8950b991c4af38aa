//! Core traits defining SURETY interfaces
//!
//! These traits are the seams between the oracle consensus, the escrow
//! ledger and whatever moves money outside the engine.

use crate::types::*;
use serde::{Deserialize, Serialize};

/// Result type for SURETY operations
pub type SuretyResult<T> = Result<T, crate::error::SuretyError>;

/// A flight status accepted by oracle quorum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightResolution {
    pub flight: FlightKey,
    pub status: FlightStatus,
    /// Request index the quorum formed under
    pub index: OracleIndex,
    /// Oracles whose reports made up the quorum
    pub oracles: Vec<AccountId>,
    pub resolved_at: Timestamp,
}

/// Consumer of quorum resolutions.
///
/// Called synchronously by the consensus engine while the flight's request
/// is still locked, so the terminal status and its side effects land together.
/// Implementations must tolerate the same resolution being delivered twice.
pub trait ResolutionHandler: Send + Sync {
    fn on_flight_resolved(&self, resolution: &FlightResolution) -> SuretyResult<()>;
}

/// Moves withdrawn funds out of the engine
pub trait Disburser: Send + Sync {
    /// Hand `amount` to `recipient`. An error leaves the owed balance in place.
    fn disburse(&self, recipient: &AccountId, amount: Amount) -> SuretyResult<()>;
}
