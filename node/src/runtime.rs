//! Node runtime owning the flight insurance service

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use surety_consensus::{create_oracle_channel, OracleEvent};
use surety_core::{NodeConfig, SuretyResult, Timestamp};
use surety_insurance::{FlightSurety, SharedFlightSurety};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Node runtime managing the service and its background tasks
pub struct SuretyRuntime {
    config: NodeConfig,
    surety: SharedFlightSurety,
    events: Mutex<Option<mpsc::Receiver<OracleEvent>>>,
}

impl SuretyRuntime {
    /// Create a new runtime from node configuration
    pub fn new(config: NodeConfig) -> SuretyResult<Self> {
        let (tx, rx) = create_oracle_channel();

        let mut builder = FlightSurety::builder(config.surety.clone()).event_channel(tx);
        if let Some(founder) = config.founding_airline {
            builder = builder.founding_airline(founder, "Founding Airline");
        }
        let surety = Arc::new(builder.build()?);

        Ok(Self {
            config,
            surety,
            events: Mutex::new(Some(rx)),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn surety(&self) -> &SharedFlightSurety {
        &self.surety
    }

    /// Start the expiry sweep and the oracle event log
    pub fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let surety = self.surety.clone();
        let period = Duration::from_millis(self.config.expiry_sweep_ms.max(1));
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let expired = surety.expire_stale(Timestamp::now());
                if !expired.is_empty() {
                    debug!("Expiry sweep closed {} requests", expired.len());
                }
            }
        }));

        if let Some(mut rx) = self.events.lock().take() {
            handles.push(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    log_event(&event);
                }
            }));
        }

        handles
    }
}

/// Surface oracle events to operators
pub fn log_event(event: &OracleEvent) {
    match event {
        OracleEvent::RequestIssued { flight, index } => {
            info!("Oracle request issued: flight {} index {}", flight, index);
        }
        OracleEvent::Report { flight, oracle, status } => {
            debug!("Oracle report: {} says {} for {}", oracle, status, flight);
        }
        OracleEvent::StatusResolved(resolution) => {
            info!(
                "Flight status resolved: {} is {} (code {})",
                resolution.flight,
                resolution.status,
                resolution.status.code()
            );
        }
        OracleEvent::RequestExpired { flight, index } => {
            info!("Oracle request expired: flight {} index {}", flight, index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surety_core::{AccountId, OracleConfig};

    fn config() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.founding_airline = Some(AccountId([1; 32]));
        config.expiry_sweep_ms = 10;
        config.surety.oracle = OracleConfig {
            request_timeout_ms: 0,
            rng_seed: Some(5),
            ..Default::default()
        };
        config
    }

    #[test]
    fn test_founder_seeded() {
        let runtime = SuretyRuntime::new(config()).unwrap();
        assert!(runtime.surety().is_registered(&AccountId([1; 32])));
    }

    #[tokio::test]
    async fn test_sweep_expires_requests() {
        let runtime = SuretyRuntime::new(config()).unwrap();
        let surety = runtime.surety().clone();
        let founder = AccountId([1; 32]);
        surety.fund_airline(founder, surety.config().ante).unwrap();
        let key = surety.register_flight(founder, "SW1", Timestamp(1)).unwrap().key;
        surety.request_flight_status(&key, founder).unwrap();

        let handles = runtime.spawn_background();
        assert_eq!(handles.len(), 2);
        // Receiver is handed out once
        assert_eq!(runtime.spawn_background().len(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let request = surety.oracles().active_request(&key).unwrap();
        assert!(!request.status.is_open());
    }
}
