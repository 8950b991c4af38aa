//! Oracle consensus engine

use crate::oracle::SharedOracleRegistry;
use crate::request::{OracleRequest, Recorded, RequestStatus};
use crate::sampler::IndexSampler;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use surety_core::{
    AccountId, FlightKey, FlightResolution, FlightStatus, OracleConfig, OracleIndex,
    ResolutionHandler, SharedOperatingSwitch, SuretyError, SuretyResult, Timestamp,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Events emitted by the oracle consensus engine
#[derive(Debug, Clone)]
pub enum OracleEvent {
    /// Oracles holding `index` should report on `flight`
    RequestIssued { flight: FlightKey, index: OracleIndex },
    /// An oracle report was accepted
    Report {
        flight: FlightKey,
        oracle: AccountId,
        status: FlightStatus,
    },
    /// Quorum reached, status is final
    StatusResolved(FlightResolution),
    /// Request closed without quorum
    RequestExpired { flight: FlightKey, index: OracleIndex },
}

/// Result of an accepted oracle report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Counted, quorum not reached yet
    Recorded { support: usize, replaced: bool },
    /// This report completed the quorum
    Resolved(FlightResolution),
}

/// Per-flight oracle state
#[derive(Debug, Default)]
struct FlightOracleState {
    active: Option<OracleRequest>,
    resolution: Option<FlightResolution>,
    attempts: u32,
}

/// Quorum-based flight status resolution
pub struct OracleConsensus {
    config: OracleConfig,
    switch: SharedOperatingSwitch,
    registry: SharedOracleRegistry,
    flights: DashMap<FlightKey, FlightOracleState>,
    sampler: IndexSampler,
    handlers: RwLock<Vec<Arc<dyn ResolutionHandler>>>,
    event_tx: Option<mpsc::Sender<OracleEvent>>,
}

impl OracleConsensus {
    pub fn new(
        config: OracleConfig,
        switch: SharedOperatingSwitch,
        registry: SharedOracleRegistry,
    ) -> Self {
        let sampler =
            IndexSampler::labelled(config.index_space, config.rng_seed, "request-index");
        Self {
            config,
            switch,
            registry,
            flights: DashMap::new(),
            sampler,
            handlers: RwLock::new(Vec::new()),
            event_tx: None,
        }
    }

    /// Set event channel
    pub fn set_event_channel(&mut self, tx: mpsc::Sender<OracleEvent>) {
        self.event_tx = Some(tx);
    }

    /// Register a synchronous consumer of resolutions
    pub fn add_resolution_handler(&self, handler: Arc<dyn ResolutionHandler>) {
        self.handlers.write().push(handler);
    }

    pub fn registry(&self) -> &SharedOracleRegistry {
        &self.registry
    }

    /// Draw a fresh request index for `flight`, superseding any open request
    pub fn request_status(&self, flight: &FlightKey, requester: AccountId) -> SuretyResult<OracleIndex> {
        self.switch.ensure_operational()?;

        let mut state = self.flights.entry(flight.clone()).or_default();
        if let Some(resolution) = &state.resolution {
            warn!("Status request for resolved flight {} ({})", flight, resolution.status);
            return Err(SuretyError::AlreadyResolved(flight.to_string()));
        }

        if let Some(previous) = state.active.as_mut() {
            if previous.status.is_open() {
                previous.expire();
                debug!("Request {} for {} superseded", previous.index, flight);
                self.emit_event(OracleEvent::RequestExpired {
                    flight: flight.clone(),
                    index: previous.index,
                });
            }
        }

        let index = self.sampler.draw_one();
        state.active = Some(OracleRequest::new(flight.clone(), index, requester, Timestamp::now()));
        state.attempts += 1;

        info!(
            "Oracle request issued for {} with index {} (attempt {})",
            flight, index, state.attempts
        );
        self.emit_event(OracleEvent::RequestIssued {
            flight: flight.clone(),
            index,
        });

        Ok(index)
    }

    /// Accept an oracle's report for the flight's active request
    pub fn submit_response(
        &self,
        oracle: AccountId,
        flight: &FlightKey,
        index: OracleIndex,
        status: FlightStatus,
    ) -> SuretyResult<ResponseOutcome> {
        self.switch.ensure_operational()?;

        if !status.is_terminal() {
            return Err(SuretyError::InvalidStatus(status.code()));
        }

        let info = self
            .registry
            .get(&oracle)
            .ok_or_else(|| SuretyError::UnknownOracle(oracle.to_string()))?;
        if !info.holds(index) {
            warn!("Oracle {} reported under foreign index {}", oracle, index);
            return Err(SuretyError::IndexMismatch { index });
        }

        let now = Timestamp::now();
        let mut entry = self
            .flights
            .get_mut(flight)
            .ok_or(SuretyError::IndexMismatch { index })?;
        let state = &mut *entry;

        if let Some(resolution) = &state.resolution {
            if let Some(request) = state.active.as_mut().filter(|r| r.index == index) {
                request.record_late(oracle, status, now);
            }
            warn!(
                "Late report {} from {} for {} already resolved as {}",
                status, oracle, flight, resolution.status
            );
            return Err(SuretyError::AlreadyResolved(flight.to_string()));
        }

        let request = match state.active.as_mut() {
            Some(request) if request.index == index => request,
            _ => {
                warn!("Oracle {} answered inactive index {} for {}", oracle, index, flight);
                return Err(SuretyError::IndexMismatch { index });
            }
        };
        if !request.status.is_open() || request.is_stale(now, self.config.request_timeout_ms) {
            warn!("Oracle {} answered expired request {} for {}", oracle, index, flight);
            return Err(SuretyError::RequestExpired(flight.to_string()));
        }

        let checkpoint = request.checkpoint();
        let recorded = request.record(oracle, status, now);
        let support = request.support(status);
        debug!(
            "Oracle {} reported {} for {} ({} of {})",
            oracle, status, flight, support, self.config.min_responses
        );

        if support < self.config.min_responses {
            self.emit_event(OracleEvent::Report {
                flight: flight.clone(),
                oracle,
                status,
            });
            return Ok(ResponseOutcome::Recorded {
                support,
                replaced: matches!(recorded, Recorded::Replaced { .. }),
            });
        }

        let resolution = FlightResolution {
            flight: flight.clone(),
            status,
            index,
            oracles: request.supporters(status),
            resolved_at: now,
        };

        // Handlers run before the status is committed so a failure can be undone
        for handler in self.handlers.read().iter() {
            if let Err(e) = handler.on_flight_resolved(&resolution) {
                error!("Resolution handler failed for {}: {}", flight, e);
                request.restore(checkpoint);
                return Err(e);
            }
        }

        request.status = RequestStatus::Resolved(status);
        state.resolution = Some(resolution.clone());

        info!(
            "Flight {} resolved as {} by {} oracles under index {}",
            flight,
            status,
            resolution.oracles.len(),
            index
        );

        self.emit_event(OracleEvent::Report {
            flight: flight.clone(),
            oracle,
            status,
        });
        self.emit_event(OracleEvent::StatusResolved(resolution.clone()));

        Ok(ResponseOutcome::Resolved(resolution))
    }

    /// Expire every open request older than the configured timeout
    pub fn expire_stale(&self, now: Timestamp) -> Vec<(FlightKey, OracleIndex)> {
        let mut expired = Vec::new();
        for mut entry in self.flights.iter_mut() {
            if let Some(request) = entry.active.as_mut() {
                if request.is_stale(now, self.config.request_timeout_ms) {
                    request.expire();
                    expired.push((request.flight.clone(), request.index));
                }
            }
        }

        for (flight, index) in &expired {
            info!("Oracle request {} for {} expired without quorum", index, flight);
            self.emit_event(OracleEvent::RequestExpired {
                flight: flight.clone(),
                index: *index,
            });
        }

        expired
    }

    pub fn resolution(&self, flight: &FlightKey) -> Option<FlightResolution> {
        self.flights.get(flight).and_then(|s| s.resolution.clone())
    }

    /// Copy of the most recent request for `flight`
    pub fn active_request(&self, flight: &FlightKey) -> Option<OracleRequest> {
        self.flights.get(flight).and_then(|s| s.active.clone())
    }

    pub fn attempts(&self, flight: &FlightKey) -> u32 {
        self.flights.get(flight).map(|s| s.attempts).unwrap_or(0)
    }

    fn emit_event(&self, event: OracleEvent) {
        if let Some(tx) = &self.event_tx {
            if let Err(e) = tx.try_send(event) {
                debug!("Oracle event dropped: {}", e);
            }
        }
    }
}

/// Shared consensus engine
pub type SharedOracleConsensus = Arc<OracleConsensus>;

/// Create oracle event channel
pub fn create_oracle_channel() -> (mpsc::Sender<OracleEvent>, mpsc::Receiver<OracleEvent>) {
    mpsc::channel(1024)
}
