//! Composed flight insurance service
//!
//! `FlightSurety` owns one instance of every component and wires the
//! payout handler into oracle consensus, so a quorum and its payouts
//! land in the same call.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use surety_consensus::{
    OracleConsensus, OracleEvent, OracleRegistry, ResponseOutcome, SharedOracleConsensus,
};
use surety_core::{
    AccountId, Amount, Disburser, FlightKey, FlightStatus, Hash, OperatingSwitch, OracleIndex,
    SharedOperatingSwitch, SuretyConfig, SuretyError, SuretyResult, Timestamp,
};
use tokio::sync::mpsc;
use tracing::info;

use crate::airline::{Airline, AirlineRegistry, RegistrationOutcome, SharedAirlineRegistry};
use crate::ledger::{EscrowLedger, Flight, FlightView, InsurancePolicy, SharedEscrowLedger, Treasury};
use crate::payout::InsurancePayout;
use crate::wallet::InMemoryWallets;

/// Snapshot served by status queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuretyStatus {
    pub operational: bool,
    pub registered_airlines: usize,
    pub funded_airlines: usize,
    pub flights: usize,
    pub oracles: usize,
    pub treasury: Treasury,
}

/// Flight insurance service
pub struct FlightSurety {
    config: SuretyConfig,
    switch: SharedOperatingSwitch,
    airlines: SharedAirlineRegistry,
    ledger: SharedEscrowLedger,
    oracles: SharedOracleConsensus,
    payout: Arc<InsurancePayout>,
    wallets: Option<Arc<InMemoryWallets>>,
}

impl FlightSurety {
    pub fn builder(config: SuretyConfig) -> SuretyBuilder {
        SuretyBuilder::new(config)
    }

    pub fn config(&self) -> &SuretyConfig {
        &self.config
    }

    // ============ Operating switch ============

    pub fn is_operational(&self) -> bool {
        self.switch.is_operational()
    }

    pub fn set_operating_status(&self, caller: &AccountId, operational: bool) -> SuretyResult<()> {
        self.switch.set_operating_status(caller, operational)
    }

    // ============ Airlines ============

    pub fn register_airline(
        &self,
        new_airline: AccountId,
        name: &str,
        requested_by: AccountId,
    ) -> SuretyResult<RegistrationOutcome> {
        self.airlines.register_airline(new_airline, name, requested_by)
    }

    /// Post the ante for a registered airline
    pub fn fund_airline(&self, airline: AccountId, amount: Amount) -> SuretyResult<()> {
        self.ledger.post_ante(airline, amount)
    }

    pub fn is_registered(&self, airline: &AccountId) -> bool {
        self.airlines.is_registered(airline)
    }

    pub fn is_funded(&self, airline: &AccountId) -> bool {
        self.airlines.is_funded(airline)
    }

    pub fn airline(&self, airline: &AccountId) -> Option<Airline> {
        self.airlines.get(airline)
    }

    pub fn airlines(&self) -> Vec<Airline> {
        self.airlines.list()
    }

    // ============ Flights and policies ============

    pub fn register_flight(
        &self,
        airline: AccountId,
        designator: &str,
        timestamp: Timestamp,
    ) -> SuretyResult<Flight> {
        self.ledger.register_flight(airline, designator, timestamp)
    }

    pub fn flight(&self, key: &FlightKey) -> Option<Flight> {
        self.ledger.flight(key)
    }

    pub fn flight_by_id(&self, id: &Hash) -> Option<Flight> {
        self.ledger.flight_by_id(id)
    }

    pub fn flight_catalog(&self) -> Vec<FlightView> {
        self.ledger.flight_catalog()
    }

    pub fn buy_insurance(
        &self,
        passenger: AccountId,
        flight: &FlightKey,
        stake: Amount,
    ) -> SuretyResult<InsurancePolicy> {
        self.ledger.buy_insurance(passenger, flight, stake)
    }

    pub fn insurance(&self, passenger: &AccountId, flight: &FlightKey) -> Option<InsurancePolicy> {
        self.ledger.get_insurance(passenger, flight)
    }

    pub fn payout_owed(&self, passenger: &AccountId) -> Amount {
        self.ledger.get_payout_owed(passenger)
    }

    pub fn withdraw(&self, passenger: &AccountId) -> SuretyResult<Amount> {
        self.payout.withdraw(passenger)
    }

    /// Balance held by the built-in wallets, if no external disburser was supplied
    pub fn wallet_balance(&self, account: &AccountId) -> Option<Amount> {
        self.wallets.as_ref().map(|w| w.balance(account))
    }

    // ============ Oracles ============

    /// Register an oracle that paid at least the registration fee
    pub fn register_oracle(&self, oracle: AccountId, fee: Amount) -> SuretyResult<Vec<OracleIndex>> {
        self.switch.ensure_operational()?;

        let required = self.config.oracle_registration_fee;
        if fee < required {
            return Err(SuretyError::InvalidAmount {
                expected: required.0,
                got: fee.0,
            });
        }

        let indices = self.oracles.registry().assign_indices(oracle)?;
        self.ledger.record_oracle_fee(fee);
        Ok(indices)
    }

    pub fn oracle_indices(&self, oracle: &AccountId) -> SuretyResult<Vec<OracleIndex>> {
        self.oracles.registry().indices(oracle)
    }

    /// Ask the oracles for a registered flight's status
    pub fn request_flight_status(
        &self,
        flight: &FlightKey,
        requester: AccountId,
    ) -> SuretyResult<OracleIndex> {
        if !self.ledger.is_flight_registered(flight) {
            return Err(SuretyError::UnknownFlight(flight.to_string()));
        }
        self.oracles.request_status(flight, requester)
    }

    pub fn submit_oracle_response(
        &self,
        oracle: AccountId,
        flight: &FlightKey,
        index: OracleIndex,
        status: FlightStatus,
    ) -> SuretyResult<ResponseOutcome> {
        self.oracles.submit_response(oracle, flight, index, status)
    }

    /// Same as `submit_oracle_response`, status given as its wire code
    pub fn submit_oracle_code(
        &self,
        oracle: AccountId,
        flight: &FlightKey,
        index: OracleIndex,
        code: u8,
    ) -> SuretyResult<ResponseOutcome> {
        let status = FlightStatus::from_code(code).ok_or(SuretyError::InvalidStatus(code))?;
        self.submit_oracle_response(oracle, flight, index, status)
    }

    pub fn expire_stale(&self, now: Timestamp) -> Vec<(FlightKey, OracleIndex)> {
        self.oracles.expire_stale(now)
    }

    pub fn oracles(&self) -> &SharedOracleConsensus {
        &self.oracles
    }

    pub fn ledger(&self) -> &SharedEscrowLedger {
        &self.ledger
    }

    pub fn status(&self) -> SuretyStatus {
        SuretyStatus {
            operational: self.switch.is_operational(),
            registered_airlines: self.airlines.registered_count(),
            funded_airlines: self.airlines.funded_count(),
            flights: self.ledger.flight_catalog().len(),
            oracles: self.oracles.registry().count(),
            treasury: self.ledger.treasury(),
        }
    }
}

pub type SharedFlightSurety = Arc<FlightSurety>;

/// Builder for `FlightSurety`
pub struct SuretyBuilder {
    config: SuretyConfig,
    founder: Option<(AccountId, String)>,
    disburser: Option<Arc<dyn Disburser>>,
    event_tx: Option<mpsc::Sender<OracleEvent>>,
}

impl SuretyBuilder {
    pub fn new(config: SuretyConfig) -> Self {
        Self {
            config,
            founder: None,
            disburser: None,
            event_tx: None,
        }
    }

    pub fn founding_airline(mut self, airline: AccountId, name: &str) -> Self {
        self.founder = Some((airline, name.to_string()));
        self
    }

    pub fn disburser(mut self, disburser: Arc<dyn Disburser>) -> Self {
        self.disburser = Some(disburser);
        self
    }

    pub fn event_channel(mut self, tx: mpsc::Sender<OracleEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn build(self) -> SuretyResult<FlightSurety> {
        self.config.validate()?;

        let switch = Arc::new(OperatingSwitch::new(self.config.admin));
        let airlines = Arc::new(AirlineRegistry::new(&self.config, switch.clone()));
        if let Some((founder, name)) = &self.founder {
            airlines.seed_founder(*founder, name);
        }

        let mut wallets = None;
        let disburser: Arc<dyn Disburser> = match self.disburser {
            Some(disburser) => disburser,
            None => {
                let local = Arc::new(InMemoryWallets::new());
                wallets = Some(local.clone());
                local
            }
        };

        let ledger = Arc::new(EscrowLedger::new(
            &self.config,
            switch.clone(),
            airlines.clone(),
            disburser,
        ));

        let registry = Arc::new(OracleRegistry::new(&self.config.oracle));
        let mut consensus = OracleConsensus::new(self.config.oracle.clone(), switch.clone(), registry);
        if let Some(tx) = self.event_tx {
            consensus.set_event_channel(tx);
        }
        let oracles = Arc::new(consensus);

        let payout = Arc::new(InsurancePayout::new(ledger.clone()));
        oracles.add_resolution_handler(payout.clone());

        info!(
            "Flight insurance service ready (ante {}, cap {}, quorum {})",
            self.config.ante, self.config.insurance_cap, self.config.oracle.min_responses
        );

        Ok(FlightSurety {
            config: self.config,
            switch,
            airlines,
            ledger,
            oracles,
            payout,
            wallets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surety_consensus::create_oracle_channel;

    const ADMIN: AccountId = AccountId([0xAA; 32]);
    const FOUNDER: AccountId = AccountId([1; 32]);

    fn config() -> SuretyConfig {
        SuretyConfig {
            admin: ADMIN,
            oracle: surety_core::OracleConfig {
                rng_seed: Some(42),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn service() -> FlightSurety {
        FlightSurety::builder(config())
            .founding_airline(FOUNDER, "Founder Air")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_rejects_bad_config() {
        let mut bad = config();
        bad.payout_denominator = 0;
        assert!(matches!(
            FlightSurety::builder(bad).build(),
            Err(SuretyError::ConfigError(_))
        ));
    }

    #[test]
    fn test_oracle_registration_fee() {
        let surety = service();
        let oracle = AccountId([50; 32]);
        let fee = surety.config().oracle_registration_fee;

        assert!(matches!(
            surety.register_oracle(oracle, Amount::new(fee.0 - 1)),
            Err(SuretyError::InvalidAmount { .. })
        ));
        assert!(matches!(
            surety.oracle_indices(&oracle),
            Err(SuretyError::UnknownOracle(_))
        ));

        let indices = surety.register_oracle(oracle, fee).unwrap();
        assert_eq!(indices.len(), 3);
        assert_eq!(surety.oracle_indices(&oracle).unwrap(), indices);
        assert!(matches!(
            surety.register_oracle(oracle, fee),
            Err(SuretyError::AlreadyAssigned(_))
        ));
        assert_eq!(surety.status().treasury.oracle_fees, fee);
    }

    #[test]
    fn test_request_requires_registered_flight() {
        let surety = service();
        let key = FlightKey::new(FOUNDER, "NONE", Timestamp(1));
        assert!(matches!(
            surety.request_flight_status(&key, AccountId([9; 32])),
            Err(SuretyError::UnknownFlight(_))
        ));
    }

    #[test]
    fn test_invalid_status_code() {
        let surety = service();
        let key = FlightKey::new(FOUNDER, "F1", Timestamp(1));
        assert!(matches!(
            surety.submit_oracle_code(AccountId([50; 32]), &key, 0, 25),
            Err(SuretyError::InvalidStatus(25))
        ));
        assert!(matches!(
            surety.submit_oracle_code(AccountId([50; 32]), &key, 0, 0),
            Err(SuretyError::InvalidStatus(0))
        ));
    }

    #[test]
    fn test_status_snapshot() {
        let surety = service();
        surety.fund_airline(FOUNDER, surety.config().ante).unwrap();
        surety.register_flight(FOUNDER, "SR1", Timestamp(10)).unwrap();

        let status = surety.status();
        assert!(status.operational);
        assert_eq!(status.registered_airlines, 1);
        assert_eq!(status.funded_airlines, 1);
        assert_eq!(status.flights, 1);
        assert_eq!(status.treasury.collateral, surety.config().ante);
    }

    #[tokio::test]
    async fn test_request_emits_event() {
        let (tx, mut rx) = create_oracle_channel();
        let surety = FlightSurety::builder(config())
            .founding_airline(FOUNDER, "Founder Air")
            .event_channel(tx)
            .build()
            .unwrap();
        surety.fund_airline(FOUNDER, surety.config().ante).unwrap();
        let key = surety.register_flight(FOUNDER, "SR1", Timestamp(10)).unwrap().key;

        let index = surety.request_flight_status(&key, AccountId([9; 32])).unwrap();
        match rx.recv().await {
            Some(OracleEvent::RequestIssued { flight, index: issued }) => {
                assert_eq!(flight, key);
                assert_eq!(issued, index);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
