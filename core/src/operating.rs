//! Global operating switch shared by every component

use crate::error::SuretyError;
use crate::traits::SuretyResult;
use crate::types::AccountId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Administrator-controlled switch gating all state-mutating operations.
/// Queries keep working while it is off.
#[derive(Debug)]
pub struct OperatingSwitch {
    admin: AccountId,
    operational: AtomicBool,
}

impl OperatingSwitch {
    pub fn new(admin: AccountId) -> Self {
        Self {
            admin,
            operational: AtomicBool::new(true),
        }
    }

    pub fn admin(&self) -> AccountId {
        self.admin
    }

    pub fn is_operational(&self) -> bool {
        self.operational.load(Ordering::SeqCst)
    }

    pub fn set_operating_status(&self, caller: &AccountId, operational: bool) -> SuretyResult<()> {
        if *caller != self.admin {
            return Err(SuretyError::Unauthorized(format!(
                "{} is not the administrator",
                caller
            )));
        }
        self.operational.store(operational, Ordering::SeqCst);
        Ok(())
    }

    /// Guard placed at the top of every mutating operation
    pub fn ensure_operational(&self) -> SuretyResult<()> {
        if self.is_operational() {
            Ok(())
        } else {
            Err(SuretyError::NotOperational)
        }
    }
}

pub type SharedOperatingSwitch = Arc<OperatingSwitch>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_admin_toggles() {
        let admin = AccountId([9u8; 32]);
        let switch = OperatingSwitch::new(admin);
        assert!(switch.is_operational());

        let other = AccountId([1u8; 32]);
        assert!(matches!(
            switch.set_operating_status(&other, false),
            Err(SuretyError::Unauthorized(_))
        ));
        assert!(switch.is_operational());

        switch.set_operating_status(&admin, false).unwrap();
        assert!(matches!(switch.ensure_operational(), Err(SuretyError::NotOperational)));

        switch.set_operating_status(&admin, true).unwrap();
        assert!(switch.ensure_operational().is_ok());
    }
}
