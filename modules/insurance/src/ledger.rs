//! Escrow ledger - flight catalog, policies, owed payouts and treasury
//!
//! Lock order across the ledger is flight, then that flight's policies,
//! then a passenger's owed balance, then the treasury.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use surety_core::{
    AccountId, Amount, Disburser, FlightKey, FlightStatus, Hash, SharedOperatingSwitch,
    SuretyConfig, SuretyError, SuretyResult, Timestamp,
};
use surety_crypto::hashing::flight_id;
use tracing::{debug, info, warn};

use crate::airline::SharedAirlineRegistry;

/// Registered flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flight {
    pub key: FlightKey,
    pub id: Hash,
    pub status: FlightStatus,
    pub registered_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
}

/// Read-only catalog row for presentation layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightView {
    pub id: Hash,
    pub airline: AccountId,
    pub designator: String,
    pub timestamp: Timestamp,
    pub status: FlightStatus,
    pub status_code: u8,
}

impl From<&Flight> for FlightView {
    fn from(flight: &Flight) -> Self {
        Self {
            id: flight.id,
            airline: flight.key.airline,
            designator: flight.key.designator.clone(),
            timestamp: flight.key.timestamp,
            status: flight.status,
            status_code: flight.status.code(),
        }
    }
}

/// A passenger's insurance on one flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsurancePolicy {
    pub passenger: AccountId,
    pub flight: FlightKey,
    pub stake: Amount,
    pub paid: bool,
    pub credited: Amount,
}

/// Funds held by the escrow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treasury {
    pub collateral: Amount,
    pub premiums: Amount,
    pub oracle_fees: Amount,
    pub withdrawn: Amount,
}

impl Treasury {
    /// Funds still held
    pub fn balance(&self) -> Amount {
        self.collateral
            .saturating_add(self.premiums)
            .saturating_add(self.oracle_fees)
            .saturating_sub(self.withdrawn)
    }
}

/// Escrow ledger
pub struct EscrowLedger {
    switch: SharedOperatingSwitch,
    airlines: SharedAirlineRegistry,
    disburser: Arc<dyn Disburser>,
    insurance_cap: Amount,
    payout_numerator: u128,
    payout_denominator: u128,
    flights: DashMap<FlightKey, Flight>,
    flight_ids: DashMap<Hash, FlightKey>,
    /// Policies grouped by flight, then passenger
    policies: DashMap<FlightKey, HashMap<AccountId, InsurancePolicy>>,
    owed: DashMap<AccountId, Amount>,
    collateral: DashMap<AccountId, Amount>,
    treasury: Mutex<Treasury>,
}

impl EscrowLedger {
    pub fn new(
        config: &SuretyConfig,
        switch: SharedOperatingSwitch,
        airlines: SharedAirlineRegistry,
        disburser: Arc<dyn Disburser>,
    ) -> Self {
        Self {
            switch,
            airlines,
            disburser,
            insurance_cap: config.insurance_cap,
            payout_numerator: config.payout_numerator,
            payout_denominator: config.payout_denominator,
            flights: DashMap::new(),
            flight_ids: DashMap::new(),
            policies: DashMap::new(),
            owed: DashMap::new(),
            collateral: DashMap::new(),
            treasury: Mutex::new(Treasury::default()),
        }
    }

    /// Post an airline's ante; funds it in the registry and holds the collateral
    pub fn post_ante(&self, airline: AccountId, amount: Amount) -> SuretyResult<()> {
        self.airlines.fund(airline, amount)?;
        *self.collateral.entry(airline).or_default() = amount;
        let mut treasury = self.treasury.lock();
        treasury.collateral = treasury.collateral.saturating_add(amount);
        Ok(())
    }

    pub fn collateral_of(&self, airline: &AccountId) -> Amount {
        self.collateral.get(airline).map(|c| *c).unwrap_or_default()
    }

    pub fn record_oracle_fee(&self, fee: Amount) {
        let mut treasury = self.treasury.lock();
        treasury.oracle_fees = treasury.oracle_fees.saturating_add(fee);
    }

    /// Add a flight to the catalog
    pub fn register_flight(
        &self,
        airline: AccountId,
        designator: &str,
        timestamp: Timestamp,
    ) -> SuretyResult<Flight> {
        self.switch.ensure_operational()?;

        if !self.airlines.is_funded(&airline) {
            return Err(SuretyError::Unauthorized(format!(
                "{} is not a funded airline",
                airline
            )));
        }

        let key = FlightKey::new(airline, designator, timestamp);
        match self.flights.entry(key.clone()) {
            Entry::Occupied(_) => Err(SuretyError::DuplicateFlight(key.to_string())),
            Entry::Vacant(slot) => {
                let flight = Flight {
                    id: flight_id(&key),
                    key: key.clone(),
                    status: FlightStatus::Unknown,
                    registered_at: Timestamp::now(),
                    resolved_at: None,
                };
                self.flight_ids.insert(flight.id, key);
                slot.insert(flight.clone());
                info!("Flight {} registered as {}", flight.key, flight.id);
                Ok(flight)
            }
        }
    }

    /// Buy or top up insurance on a registered, unresolved flight
    pub fn buy_insurance(
        &self,
        passenger: AccountId,
        flight: &FlightKey,
        stake: Amount,
    ) -> SuretyResult<InsurancePolicy> {
        self.switch.ensure_operational()?;

        if stake.is_zero() || stake > self.insurance_cap {
            return Err(SuretyError::InvalidStake {
                cap: self.insurance_cap.0,
                got: stake.0,
            });
        }

        // Held until the policy is written so resolution cannot interleave
        let record = self
            .flights
            .get(flight)
            .ok_or_else(|| SuretyError::UnknownFlight(flight.to_string()))?;
        if record.status.is_terminal() {
            return Err(SuretyError::AlreadyResolved(flight.to_string()));
        }

        let mut policies = self.policies.entry(flight.clone()).or_default();
        let existing = policies.get(&passenger).map(|p| p.stake).unwrap_or_default();
        let total = existing
            .checked_add(stake)
            .filter(|total| *total <= self.insurance_cap)
            .ok_or(SuretyError::InvalidStake {
                cap: self.insurance_cap.0,
                got: existing.0.saturating_add(stake.0),
            })?;

        let policy = policies
            .entry(passenger)
            .or_insert_with(|| InsurancePolicy {
                passenger,
                flight: flight.clone(),
                stake: Amount::ZERO,
                paid: false,
                credited: Amount::ZERO,
            });
        policy.stake = total;
        let policy = policy.clone();
        drop(policies);
        drop(record);

        let mut treasury = self.treasury.lock();
        treasury.premiums = treasury.premiums.saturating_add(stake);

        info!(
            "Passenger {} insured {} on {} (total {})",
            passenger, stake, flight, total
        );
        Ok(policy)
    }

    pub fn get_insurance(&self, passenger: &AccountId, flight: &FlightKey) -> Option<InsurancePolicy> {
        self.policies
            .get(flight)
            .and_then(|p| p.get(passenger).cloned())
    }

    /// Insured stake, zero when no policy exists
    pub fn insured_amount(&self, passenger: &AccountId, flight: &FlightKey) -> Amount {
        self.get_insurance(passenger, flight)
            .map(|p| p.stake)
            .unwrap_or_default()
    }

    pub fn policies_for(&self, flight: &FlightKey) -> Vec<InsurancePolicy> {
        self.policies
            .get(flight)
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn unpaid_policies(&self, flight: &FlightKey) -> Vec<InsurancePolicy> {
        self.policies_for(flight)
            .into_iter()
            .filter(|p| !p.paid)
            .collect()
    }

    pub fn get_payout_owed(&self, passenger: &AccountId) -> Amount {
        self.owed.get(passenger).map(|o| *o).unwrap_or_default()
    }

    /// Largest amount a policy may ever be credited
    pub fn payout_limit(&self, stake: Amount) -> SuretyResult<Amount> {
        stake
            .scale(self.payout_numerator, self.payout_denominator)
            .ok_or_else(|| SuretyError::Internal(format!("payout overflow for stake {}", stake)))
    }

    /// Write-once status transition. Re-delivering the same status is a no-op.
    ///
    /// `settle` runs with the flight locked, before the status is written.
    /// If it fails the flight stays unresolved.
    pub(crate) fn resolve_flight<F>(
        &self,
        flight: &FlightKey,
        status: FlightStatus,
        settle: F,
    ) -> SuretyResult<bool>
    where
        F: FnOnce() -> SuretyResult<()>,
    {
        let mut record = self
            .flights
            .get_mut(flight)
            .ok_or_else(|| SuretyError::UnknownFlight(flight.to_string()))?;

        if record.status.is_terminal() {
            if record.status == status {
                return Ok(false);
            }
            warn!(
                "Flight {} already resolved as {}, ignoring {}",
                flight, record.status, status
            );
            return Err(SuretyError::AlreadyResolved(flight.to_string()));
        }

        settle()?;

        record.status = status;
        record.resolved_at = Some(Timestamp::now());
        Ok(true)
    }

    /// Credit one policy. Only the payout component calls this.
    pub(crate) fn credit(
        &self,
        passenger: &AccountId,
        flight: &FlightKey,
        amount: Amount,
    ) -> SuretyResult<()> {
        let mut policies = self
            .policies
            .get_mut(flight)
            .ok_or_else(|| SuretyError::UnknownFlight(flight.to_string()))?;
        let policy = policies
            .get_mut(passenger)
            .ok_or_else(|| SuretyError::UnknownFlight(format!("no policy for {} on {}", passenger, flight)))?;

        if policy.paid {
            warn!("Policy of {} on {} already paid", passenger, flight);
            return Err(SuretyError::AlreadyPaid(format!("{} on {}", passenger, flight)));
        }
        let limit = self.payout_limit(policy.stake)?;
        if amount > limit {
            return Err(SuretyError::Internal(format!(
                "credit {} exceeds payout limit {}",
                amount, limit
            )));
        }

        let mut owed = self.owed.entry(*passenger).or_default();
        *owed = owed
            .checked_add(amount)
            .ok_or_else(|| SuretyError::Internal("owed balance overflow".into()))?;
        policy.paid = true;
        policy.credited = amount;

        info!("Credited {} to {} for {}", amount, passenger, flight);
        Ok(())
    }

    /// Undo a credit made while settling a flight that then failed to resolve
    pub(crate) fn revert_credit(&self, passenger: &AccountId, flight: &FlightKey) -> SuretyResult<()> {
        let mut policies = self
            .policies
            .get_mut(flight)
            .ok_or_else(|| SuretyError::UnknownFlight(flight.to_string()))?;
        let policy = match policies.get_mut(passenger) {
            Some(policy) if policy.paid => policy,
            _ => return Ok(()),
        };

        if let Some(mut owed) = self.owed.get_mut(passenger) {
            *owed = owed.saturating_sub(policy.credited);
        }
        warn!("Reverted credit of {} to {} for {}", policy.credited, passenger, flight);
        policy.paid = false;
        policy.credited = Amount::ZERO;
        Ok(())
    }

    /// Pay out everything owed to `passenger`
    pub fn withdraw(&self, passenger: &AccountId) -> SuretyResult<Amount> {
        self.switch.ensure_operational()?;

        // Guard held across disbursement so concurrent calls serialize
        let mut owed = self
            .owed
            .get_mut(passenger)
            .filter(|o| !o.is_zero())
            .ok_or_else(|| SuretyError::NothingOwed(passenger.to_string()))?;
        let amount = *owed;

        let mut treasury = self.treasury.lock();
        let available = treasury.balance();
        if amount > available {
            return Err(SuretyError::InsufficientFunds {
                required: amount.0,
                available: available.0,
            });
        }

        self.disburser.disburse(passenger, amount)?;

        *owed = Amount::ZERO;
        treasury.withdrawn = treasury.withdrawn.saturating_add(amount);

        info!("Passenger {} withdrew {}", passenger, amount);
        Ok(amount)
    }

    pub fn flight(&self, key: &FlightKey) -> Option<Flight> {
        self.flights.get(key).map(|f| f.clone())
    }

    pub fn flight_by_id(&self, id: &Hash) -> Option<Flight> {
        let key = self.flight_ids.get(id).map(|k| k.clone())?;
        self.flight(&key)
    }

    pub fn is_flight_registered(&self, key: &FlightKey) -> bool {
        self.flights.contains_key(key)
    }

    /// Catalog projection, ordered by departure then designator
    pub fn flight_catalog(&self) -> Vec<FlightView> {
        let mut catalog: Vec<FlightView> = self
            .flights
            .iter()
            .map(|f| FlightView::from(f.value()))
            .collect();
        catalog.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.designator.cmp(&b.designator))
        });
        debug!("Flight catalog with {} entries", catalog.len());
        catalog
    }

    pub fn treasury(&self) -> Treasury {
        *self.treasury.lock()
    }
}

pub type SharedEscrowLedger = Arc<EscrowLedger>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airline::AirlineRegistry;
    use crate::wallet::InMemoryWallets;
    use surety_core::OperatingSwitch;

    const ADMIN: AccountId = AccountId([0xAA; 32]);
    const AIRLINE: AccountId = AccountId([1; 32]);
    const PASSENGER: AccountId = AccountId([7; 32]);

    struct Fixture {
        ledger: EscrowLedger,
        wallets: Arc<InMemoryWallets>,
        switch: SharedOperatingSwitch,
    }

    fn setup() -> Fixture {
        let config = SuretyConfig::default();
        let switch = Arc::new(OperatingSwitch::new(ADMIN));
        let airlines = Arc::new(AirlineRegistry::new(&config, switch.clone()));
        airlines.seed_founder(AIRLINE, "Founder Air");
        let wallets = Arc::new(InMemoryWallets::new());
        let ledger = EscrowLedger::new(&config, switch.clone(), airlines, wallets.clone());
        ledger.post_ante(AIRLINE, config.ante).unwrap();
        Fixture { ledger, wallets, switch }
    }

    fn flight(fx: &Fixture) -> FlightKey {
        fx.ledger
            .register_flight(AIRLINE, "F1", Timestamp(1_700_000_000_000))
            .unwrap()
            .key
    }

    #[test]
    fn test_register_flight() {
        let fx = setup();
        let key = flight(&fx);

        let stored = fx.ledger.flight(&key).unwrap();
        assert_eq!(stored.status, FlightStatus::Unknown);
        assert_eq!(fx.ledger.flight_by_id(&stored.id).unwrap().key, key);

        assert!(matches!(
            fx.ledger.register_flight(AIRLINE, "F1", key.timestamp),
            Err(SuretyError::DuplicateFlight(_))
        ));
        assert!(matches!(
            fx.ledger.register_flight(AccountId([2; 32]), "F2", key.timestamp),
            Err(SuretyError::Unauthorized(_))
        ));
        assert_eq!(fx.ledger.flight_catalog().len(), 1);
    }

    #[test]
    fn test_buy_insurance_round_trip() {
        let fx = setup();
        let key = flight(&fx);

        fx.ledger.buy_insurance(PASSENGER, &key, Amount::new(1000)).unwrap();
        assert_eq!(fx.ledger.insured_amount(&PASSENGER, &key), Amount::new(1000));

        // Top-up accumulates
        let policy = fx.ledger.buy_insurance(PASSENGER, &key, Amount::new(500)).unwrap();
        assert_eq!(policy.stake, Amount::new(1500));
        assert_eq!(fx.ledger.treasury().premiums, Amount::new(1500));
    }

    #[test]
    fn test_buy_insurance_rejections() {
        let fx = setup();
        let key = flight(&fx);
        let cap = SuretyConfig::default().insurance_cap;

        let unknown = FlightKey::new(AIRLINE, "NOPE", Timestamp(1));
        assert!(matches!(
            fx.ledger.buy_insurance(PASSENGER, &unknown, Amount::new(10)),
            Err(SuretyError::UnknownFlight(_))
        ));
        assert!(matches!(
            fx.ledger.buy_insurance(PASSENGER, &key, Amount::ZERO),
            Err(SuretyError::InvalidStake { .. })
        ));
        assert!(matches!(
            fx.ledger.buy_insurance(PASSENGER, &key, cap.saturating_add(Amount::new(1))),
            Err(SuretyError::InvalidStake { .. })
        ));

        fx.ledger.buy_insurance(PASSENGER, &key, cap).unwrap();
        assert!(matches!(
            fx.ledger.buy_insurance(PASSENGER, &key, Amount::new(1)),
            Err(SuretyError::InvalidStake { .. })
        ));
        assert_eq!(fx.ledger.insured_amount(&PASSENGER, &key), cap);
    }

    #[test]
    fn test_credit_once_and_withdraw() {
        let fx = setup();
        let key = flight(&fx);
        fx.ledger.buy_insurance(PASSENGER, &key, Amount::new(1000)).unwrap();

        fx.ledger.credit(&PASSENGER, &key, Amount::new(1500)).unwrap();
        assert!(matches!(
            fx.ledger.credit(&PASSENGER, &key, Amount::new(1500)),
            Err(SuretyError::AlreadyPaid(_))
        ));
        assert_eq!(fx.ledger.get_payout_owed(&PASSENGER), Amount::new(1500));

        assert_eq!(fx.ledger.withdraw(&PASSENGER).unwrap(), Amount::new(1500));
        assert_eq!(fx.ledger.get_payout_owed(&PASSENGER), Amount::ZERO);
        assert_eq!(fx.wallets.balance(&PASSENGER), Amount::new(1500));
        assert!(matches!(
            fx.ledger.withdraw(&PASSENGER),
            Err(SuretyError::NothingOwed(_))
        ));
    }

    #[test]
    fn test_credit_limited_by_multiplier() {
        let fx = setup();
        let key = flight(&fx);
        fx.ledger.buy_insurance(PASSENGER, &key, Amount::new(1000)).unwrap();

        assert!(fx.ledger.credit(&PASSENGER, &key, Amount::new(1501)).is_err());
        assert!(!fx.ledger.get_insurance(&PASSENGER, &key).unwrap().paid);
    }

    #[test]
    fn test_resolve_is_write_once() {
        let fx = setup();
        let key = flight(&fx);

        assert!(fx.ledger.resolve_flight(&key, FlightStatus::LateWeather, || Ok(())).unwrap());
        assert!(!fx.ledger.resolve_flight(&key, FlightStatus::LateWeather, || Ok(())).unwrap());
        assert!(matches!(
            fx.ledger.resolve_flight(&key, FlightStatus::OnTime, || Ok(())),
            Err(SuretyError::AlreadyResolved(_))
        ));
        assert_eq!(fx.ledger.flight(&key).unwrap().status, FlightStatus::LateWeather);

        assert!(matches!(
            fx.ledger.buy_insurance(PASSENGER, &key, Amount::new(10)),
            Err(SuretyError::AlreadyResolved(_))
        ));
    }

    #[test]
    fn test_withdraw_beyond_treasury_fails() {
        let fx = setup();
        let key = flight(&fx);
        let stake = Amount::from_tokens(1);
        let payout = fx.ledger.payout_limit(stake).unwrap();

        // Ten tokens of collateral plus one per premium cannot cover 1.5x on every policy
        let passengers: Vec<AccountId> = (0..21u8).map(|n| AccountId([0x40 + n; 32])).collect();
        for passenger in &passengers {
            fx.ledger.buy_insurance(*passenger, &key, stake).unwrap();
            fx.ledger.credit(passenger, &key, payout).unwrap();
        }
        for passenger in &passengers[..20] {
            assert_eq!(fx.ledger.withdraw(passenger).unwrap(), payout);
        }

        let last = passengers[20];
        let withdrawn = fx.ledger.treasury().withdrawn;
        assert!(fx.ledger.treasury().balance() < payout);
        assert!(matches!(
            fx.ledger.withdraw(&last),
            Err(SuretyError::InsufficientFunds { .. })
        ));
        assert_eq!(fx.ledger.get_payout_owed(&last), payout);
        assert_eq!(fx.ledger.treasury().withdrawn, withdrawn);
        assert_eq!(fx.wallets.balance(&last), Amount::ZERO);
    }

    #[test]
    fn test_failed_disbursement_keeps_balance() {
        struct Refusing;
        impl Disburser for Refusing {
            fn disburse(&self, _: &AccountId, _: Amount) -> SuretyResult<()> {
                Err(SuretyError::TransferFailed("wallet offline".into()))
            }
        }

        let config = SuretyConfig::default();
        let switch = Arc::new(OperatingSwitch::new(ADMIN));
        let airlines = Arc::new(AirlineRegistry::new(&config, switch.clone()));
        airlines.seed_founder(AIRLINE, "Founder Air");
        let ledger = EscrowLedger::new(&config, switch, airlines, Arc::new(Refusing));
        ledger.post_ante(AIRLINE, config.ante).unwrap();
        let key = ledger.register_flight(AIRLINE, "F1", Timestamp(5)).unwrap().key;
        ledger.buy_insurance(PASSENGER, &key, Amount::new(100)).unwrap();
        ledger.credit(&PASSENGER, &key, Amount::new(150)).unwrap();

        assert!(matches!(
            ledger.withdraw(&PASSENGER),
            Err(SuretyError::TransferFailed(_))
        ));
        assert_eq!(ledger.get_payout_owed(&PASSENGER), Amount::new(150));
        assert_eq!(ledger.treasury().withdrawn, Amount::ZERO);
    }

    #[test]
    fn test_not_operational_blocks_buy() {
        let fx = setup();
        let key = flight(&fx);
        fx.switch.set_operating_status(&ADMIN, false).unwrap();

        assert!(matches!(
            fx.ledger.buy_insurance(PASSENGER, &key, Amount::new(10)),
            Err(SuretyError::NotOperational)
        ));
        // Queries still answer
        assert!(fx.ledger.flight(&key).is_some());

        fx.switch.set_operating_status(&ADMIN, true).unwrap();
        assert!(fx.ledger.buy_insurance(PASSENGER, &key, Amount::new(10)).is_ok());
    }

    #[test]
    fn test_post_ante_holds_collateral() {
        let fx = setup();
        let ante = SuretyConfig::default().ante;
        assert_eq!(fx.ledger.collateral_of(&AIRLINE), ante);
        assert_eq!(fx.ledger.treasury().balance(), ante);
    }
}
