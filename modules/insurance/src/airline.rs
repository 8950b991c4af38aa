//! Airline registry - admission votes and funding status

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use surety_core::{
    AccountId, Amount, SharedOperatingSwitch, SuretyConfig, SuretyError, SuretyResult, Timestamp,
};
use tracing::{debug, info};

/// Airline membership record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Airline {
    pub id: AccountId,
    pub name: String,
    pub registered: bool,
    pub funded: bool,
    /// Distinct funded airlines that voted for this airline's admission
    pub votes: BTreeSet<AccountId>,
    pub registered_at: Option<Timestamp>,
}

impl Airline {
    fn pending(id: AccountId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            registered: false,
            funded: false,
            votes: BTreeSet::new(),
            registered_at: None,
        }
    }

    fn admit(&mut self) {
        self.registered = true;
        self.registered_at = Some(Timestamp::now());
    }
}

/// Result of a registration call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    /// Airline is now registered (still unfunded)
    Admitted,
    /// Vote recorded, admission needs more voters
    Pending { votes: usize, required: usize },
    /// Airline was already registered; nothing changed
    AlreadyRegistered,
}

/// Votes needed to admit an airline: half of the funded airlines, rounded up
pub fn required_votes(funded: usize) -> usize {
    funded.div_ceil(2).max(1)
}

/// Airline registry.
///
/// Admission reads global counts, so every mutation runs under one write lock.
pub struct AirlineRegistry {
    switch: SharedOperatingSwitch,
    airlines: RwLock<HashMap<AccountId, Airline>>,
    ante: Amount,
    fast_path_limit: usize,
}

impl AirlineRegistry {
    pub fn new(config: &SuretyConfig, switch: SharedOperatingSwitch) -> Self {
        Self {
            switch,
            airlines: RwLock::new(HashMap::new()),
            ante: config.ante,
            fast_path_limit: config.fast_path_limit,
        }
    }

    /// Seed the founding airline: registered, awaiting its own ante
    pub fn seed_founder(&self, airline: AccountId, name: &str) {
        let mut founder = Airline::pending(airline, name);
        founder.admit();
        self.airlines.write().insert(airline, founder);
        info!("Founding airline {} seeded", airline);
    }

    /// Register `new_airline` on behalf of `requested_by`, or count its vote
    pub fn register_airline(
        &self,
        new_airline: AccountId,
        name: &str,
        requested_by: AccountId,
    ) -> SuretyResult<RegistrationOutcome> {
        self.switch.ensure_operational()?;

        let mut airlines = self.airlines.write();

        let requester_funded = airlines
            .get(&requested_by)
            .map(|a| a.registered && a.funded)
            .unwrap_or(false);
        if !requester_funded {
            return Err(SuretyError::Unauthorized(format!(
                "{} is not a funded airline",
                requested_by
            )));
        }

        if airlines.get(&new_airline).map(|a| a.registered).unwrap_or(false) {
            debug!("Airline {} already registered", new_airline);
            return Ok(RegistrationOutcome::AlreadyRegistered);
        }

        let registered = airlines.values().filter(|a| a.registered).count();
        let funded = airlines.values().filter(|a| a.funded).count();

        let airline = airlines
            .entry(new_airline)
            .or_insert_with(|| Airline::pending(new_airline, name));

        if registered < self.fast_path_limit {
            airline.admit();
            info!(
                "Airline {} admitted by {} ({} registered)",
                new_airline,
                requested_by,
                registered + 1
            );
            return Ok(RegistrationOutcome::Admitted);
        }

        airline.votes.insert(requested_by);
        let votes = airline.votes.len();
        let required = required_votes(funded);

        if votes >= required {
            airline.admit();
            info!(
                "Airline {} admitted with {} of {} required votes",
                new_airline, votes, required
            );
            Ok(RegistrationOutcome::Admitted)
        } else {
            debug!(
                "Vote from {} for {}: {} of {} required",
                requested_by, new_airline, votes, required
            );
            Ok(RegistrationOutcome::Pending { votes, required })
        }
    }

    /// Mark a registered airline funded once it posts exactly the ante
    pub fn fund(&self, airline: AccountId, amount: Amount) -> SuretyResult<()> {
        self.switch.ensure_operational()?;

        let mut airlines = self.airlines.write();
        let record = airlines
            .get_mut(&airline)
            .filter(|a| a.registered)
            .ok_or_else(|| SuretyError::Unauthorized(format!("{} is not registered", airline)))?;

        if record.funded {
            return Err(SuretyError::AlreadyFunded(airline.to_string()));
        }
        if amount != self.ante {
            return Err(SuretyError::InvalidAmount {
                expected: self.ante.0,
                got: amount.0,
            });
        }

        record.funded = true;
        info!("Airline {} funded with {}", airline, amount);
        Ok(())
    }

    pub fn is_registered(&self, airline: &AccountId) -> bool {
        self.airlines
            .read()
            .get(airline)
            .map(|a| a.registered)
            .unwrap_or(false)
    }

    pub fn is_funded(&self, airline: &AccountId) -> bool {
        self.airlines
            .read()
            .get(airline)
            .map(|a| a.registered && a.funded)
            .unwrap_or(false)
    }

    /// Known to the registry, admitted or still collecting votes
    pub fn is_listed(&self, airline: &AccountId) -> bool {
        self.airlines.read().contains_key(airline)
    }

    pub fn get(&self, airline: &AccountId) -> Option<Airline> {
        self.airlines.read().get(airline).cloned()
    }

    pub fn list(&self) -> Vec<Airline> {
        let mut airlines: Vec<Airline> = self.airlines.read().values().cloned().collect();
        airlines.sort_by_key(|a| (a.registered_at.is_none(), a.registered_at, a.id));
        airlines
    }

    pub fn registered_count(&self) -> usize {
        self.airlines.read().values().filter(|a| a.registered).count()
    }

    pub fn funded_count(&self) -> usize {
        self.airlines.read().values().filter(|a| a.funded).count()
    }

    pub fn ante(&self) -> Amount {
        self.ante
    }
}

pub type SharedAirlineRegistry = Arc<AirlineRegistry>;
