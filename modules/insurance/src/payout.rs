//! Payout on airline-caused delay

use serde::{Deserialize, Serialize};
use surety_core::{
    AccountId, Amount, FlightKey, FlightResolution, FlightStatus, ResolutionHandler,
    SuretyError, SuretyResult,
};
use tracing::{debug, error, info};

use crate::ledger::SharedEscrowLedger;

/// What processing one resolution did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutSummary {
    /// Whether this call moved the flight to its terminal status
    pub newly_resolved: bool,
    pub credited: Vec<(AccountId, Amount)>,
    pub total: Amount,
}

/// Credits insured passengers when a flight resolves as an airline delay
pub struct InsurancePayout {
    ledger: SharedEscrowLedger,
}

impl InsurancePayout {
    pub fn new(ledger: SharedEscrowLedger) -> Self {
        Self { ledger }
    }

    /// Stake times the configured multiplier
    pub fn payout_for(&self, stake: Amount) -> SuretyResult<Amount> {
        self.ledger.payout_limit(stake)
    }

    /// Apply a resolution to the ledger. Safe to call again with the same resolution.
    ///
    /// Credits and the status change land together: if any credit fails the
    /// ones already made are reverted and the flight stays unresolved.
    pub fn process(&self, resolution: &FlightResolution) -> SuretyResult<PayoutSummary> {
        let flight = &resolution.flight;
        let mut credited = Vec::new();

        let newly_resolved = self.ledger.resolve_flight(flight, resolution.status, || {
            if resolution.status != FlightStatus::LateAirline {
                debug!("Flight {} resolved as {}, no payout", flight, resolution.status);
                return Ok(());
            }

            let plan = self
                .ledger
                .unpaid_policies(flight)
                .into_iter()
                .map(|policy| {
                    self.payout_for(policy.stake)
                        .map(|amount| (policy.passenger, amount))
                })
                .collect::<SuretyResult<Vec<_>>>()?;

            for (passenger, amount) in plan {
                match self.ledger.credit(&passenger, flight, amount) {
                    Ok(()) => credited.push((passenger, amount)),
                    // Already credited, nothing to add
                    Err(SuretyError::AlreadyPaid(_)) => {}
                    Err(e) => {
                        self.revert(flight, &credited);
                        return Err(e);
                    }
                }
            }
            Ok(())
        })?;

        let total = credited
            .iter()
            .fold(Amount::ZERO, |sum, (_, amount)| sum.saturating_add(*amount));
        if !credited.is_empty() {
            info!(
                "Flight {} payout: {} passengers credited {}",
                flight,
                credited.len(),
                total
            );
        }

        Ok(PayoutSummary {
            newly_resolved,
            credited,
            total,
        })
    }

    fn revert(&self, flight: &FlightKey, credited: &[(AccountId, Amount)]) {
        for (passenger, _) in credited {
            if let Err(e) = self.ledger.revert_credit(passenger, flight) {
                error!("Failed to revert credit of {} on {}: {}", passenger, flight, e);
            }
        }
    }

    /// Pay out everything owed to `passenger`
    pub fn withdraw(&self, passenger: &AccountId) -> SuretyResult<Amount> {
        self.ledger.withdraw(passenger)
    }
}

impl ResolutionHandler for InsurancePayout {
    fn on_flight_resolved(&self, resolution: &FlightResolution) -> SuretyResult<()> {
        self.process(resolution).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airline::AirlineRegistry;
    use crate::ledger::EscrowLedger;
    use crate::wallet::InMemoryWallets;
    use std::sync::Arc;
    use surety_core::{OperatingSwitch, SuretyConfig, Timestamp};

    const ADMIN: AccountId = AccountId([0xAA; 32]);
    const AIRLINE: AccountId = AccountId([1; 32]);

    fn passenger(n: u8) -> AccountId {
        AccountId([100 + n; 32])
    }

    fn setup() -> (InsurancePayout, SharedEscrowLedger, FlightKey) {
        setup_with(SuretyConfig::default())
    }

    fn setup_with(config: SuretyConfig) -> (InsurancePayout, SharedEscrowLedger, FlightKey) {
        let switch = Arc::new(OperatingSwitch::new(ADMIN));
        let airlines = Arc::new(AirlineRegistry::new(&config, switch.clone()));
        airlines.seed_founder(AIRLINE, "Founder Air");
        let ledger = Arc::new(EscrowLedger::new(
            &config,
            switch,
            airlines,
            Arc::new(InMemoryWallets::new()),
        ));
        ledger.post_ante(AIRLINE, config.ante).unwrap();
        let key = ledger.register_flight(AIRLINE, "SR100", Timestamp(1_000)).unwrap().key;
        (InsurancePayout::new(ledger.clone()), ledger, key)
    }

    fn resolution(flight: &FlightKey, status: FlightStatus) -> FlightResolution {
        FlightResolution {
            flight: flight.clone(),
            status,
            index: 0,
            oracles: vec![],
            resolved_at: Timestamp(2_000),
        }
    }

    #[test]
    fn test_payout_multiplier() {
        let (payout, _, _) = setup();
        assert_eq!(payout.payout_for(Amount::new(1000)).unwrap(), Amount::new(1500));
        assert_eq!(payout.payout_for(Amount::new(3)).unwrap(), Amount::new(4));
    }

    #[test]
    fn test_late_airline_credits_every_policy() {
        let (payout, ledger, key) = setup();
        ledger.buy_insurance(passenger(1), &key, Amount::new(1000)).unwrap();
        ledger.buy_insurance(passenger(2), &key, Amount::new(200)).unwrap();

        let summary = payout.process(&resolution(&key, FlightStatus::LateAirline)).unwrap();
        assert!(summary.newly_resolved);
        assert_eq!(summary.credited.len(), 2);
        assert_eq!(summary.total, Amount::new(1800));
        assert_eq!(ledger.get_payout_owed(&passenger(1)), Amount::new(1500));
        assert_eq!(ledger.get_payout_owed(&passenger(2)), Amount::new(300));
    }

    #[test]
    fn test_redelivery_pays_once() {
        let (payout, ledger, key) = setup();
        ledger.buy_insurance(passenger(1), &key, Amount::new(1000)).unwrap();

        let res = resolution(&key, FlightStatus::LateAirline);
        payout.process(&res).unwrap();
        let again = payout.process(&res).unwrap();

        assert!(!again.newly_resolved);
        assert!(again.credited.is_empty());
        assert_eq!(ledger.get_payout_owed(&passenger(1)), Amount::new(1500));
    }

    #[test]
    fn test_other_statuses_pay_nothing() {
        for status in [
            FlightStatus::OnTime,
            FlightStatus::LateWeather,
            FlightStatus::LateTechnical,
            FlightStatus::LateOther,
        ] {
            let (payout, ledger, key) = setup();
            ledger.buy_insurance(passenger(1), &key, Amount::new(1000)).unwrap();

            let summary = payout.process(&resolution(&key, status)).unwrap();
            assert!(summary.newly_resolved);
            assert!(summary.credited.is_empty());
            assert_eq!(ledger.get_payout_owed(&passenger(1)), Amount::ZERO);
            assert_eq!(ledger.flight(&key).unwrap().status, status);
        }
    }

    #[test]
    fn test_conflicting_resolution_rejected() {
        let (payout, ledger, key) = setup();
        ledger.buy_insurance(passenger(1), &key, Amount::new(1000)).unwrap();

        payout.process(&resolution(&key, FlightStatus::OnTime)).unwrap();
        assert!(matches!(
            payout.process(&resolution(&key, FlightStatus::LateAirline)),
            Err(SuretyError::AlreadyResolved(_))
        ));
        assert_eq!(ledger.get_payout_owed(&passenger(1)), Amount::ZERO);
    }

    #[test]
    fn test_failed_credit_leaves_flight_unresolved() {
        let config = SuretyConfig {
            insurance_cap: Amount::new(u128::MAX / 3),
            ..SuretyConfig::default()
        };
        let cap = config.insurance_cap;
        let (payout, ledger, first) = setup_with(config);
        let second = ledger.register_flight(AIRLINE, "SR200", Timestamp(1_000)).unwrap().key;
        let third = ledger.register_flight(AIRLINE, "SR300", Timestamp(1_000)).unwrap().key;
        for key in [&first, &second, &third] {
            ledger.buy_insurance(passenger(1), key, cap).unwrap();
        }
        ledger.buy_insurance(passenger(2), &third, Amount::new(100)).unwrap();

        payout.process(&resolution(&first, FlightStatus::LateAirline)).unwrap();
        payout.process(&resolution(&second, FlightStatus::LateAirline)).unwrap();
        let owed = ledger.get_payout_owed(&passenger(1));

        // A third credit to the same passenger overflows the owed balance
        assert!(matches!(
            payout.process(&resolution(&third, FlightStatus::LateAirline)),
            Err(SuretyError::Internal(_))
        ));
        assert_eq!(ledger.flight(&third).unwrap().status, FlightStatus::Unknown);
        assert_eq!(ledger.get_payout_owed(&passenger(1)), owed);
        assert_eq!(ledger.get_payout_owed(&passenger(2)), Amount::ZERO);
        assert_eq!(ledger.unpaid_policies(&third).len(), 2);

        // Still open for business and for a later resolution
        ledger.buy_insurance(passenger(3), &third, Amount::new(10)).unwrap();
        let summary = payout.process(&resolution(&third, FlightStatus::OnTime)).unwrap();
        assert!(summary.newly_resolved);
        assert_eq!(ledger.flight(&third).unwrap().status, FlightStatus::OnTime);
    }
}
