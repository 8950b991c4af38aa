//! In-memory wallet balances used as the default disbursement target

use dashmap::DashMap;
use surety_core::{AccountId, Amount, Disburser, SuretyError, SuretyResult};
use tracing::debug;

/// Passenger-side balances credited by withdrawals
#[derive(Debug, Default)]
pub struct InMemoryWallets {
    balances: DashMap<AccountId, Amount>,
}

impl InMemoryWallets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, account: &AccountId) -> Amount {
        self.balances.get(account).map(|b| *b).unwrap_or_default()
    }

    /// Accounts holding a non-zero balance
    pub fn accounts(&self) -> Vec<(AccountId, Amount)> {
        self.balances
            .iter()
            .filter(|b| !b.is_zero())
            .map(|b| (*b.key(), *b.value()))
            .collect()
    }
}

impl Disburser for InMemoryWallets {
    fn disburse(&self, recipient: &AccountId, amount: Amount) -> SuretyResult<()> {
        let mut balance = self.balances.entry(*recipient).or_default();
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| SuretyError::TransferFailed(format!("balance overflow for {}", recipient)))?;
        debug!("Disbursed {} to {}", amount, recipient);
        Ok(())
    }
}
