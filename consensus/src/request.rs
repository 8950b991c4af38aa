//! Flight status requests and the responses collected for them

use serde::{Deserialize, Serialize};
use surety_core::{AccountId, FlightKey, FlightStatus, OracleIndex, Timestamp};

/// Lifecycle of a single resolution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Issued, no response yet
    Requested,
    /// At least one response recorded, no quorum yet
    Collecting,
    /// Quorum reached (terminal)
    Resolved(FlightStatus),
    /// Timed out or superseded without quorum (terminal, retry with a new request)
    Expired,
}

impl RequestStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, RequestStatus::Requested | RequestStatus::Collecting)
    }
}

/// One oracle's report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleResponse {
    pub oracle: AccountId,
    pub status: FlightStatus,
    pub received_at: Timestamp,
}

/// What recording a response did to the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// First report from this oracle
    New,
    /// Replaced the oracle's earlier report
    Replaced { previous: FlightStatus },
}

/// A status request under one drawn index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleRequest {
    pub flight: FlightKey,
    pub index: OracleIndex,
    pub requester: AccountId,
    pub issued_at: Timestamp,
    pub status: RequestStatus,
    /// One entry per oracle, in arrival order of its latest report
    responses: Vec<OracleResponse>,
    /// Reports that arrived after resolution; kept, never counted
    late_responses: Vec<OracleResponse>,
}

impl OracleRequest {
    pub fn new(flight: FlightKey, index: OracleIndex, requester: AccountId, issued_at: Timestamp) -> Self {
        Self {
            flight,
            index,
            requester,
            issued_at,
            status: RequestStatus::Requested,
            responses: Vec::new(),
            late_responses: Vec::new(),
        }
    }

    /// Record a report. A resubmission replaces the same oracle's prior vote.
    pub fn record(&mut self, oracle: AccountId, status: FlightStatus, at: Timestamp) -> Recorded {
        let previous = self
            .responses
            .iter()
            .position(|r| r.oracle == oracle)
            .map(|pos| self.responses.remove(pos).status);

        self.responses.push(OracleResponse {
            oracle,
            status,
            received_at: at,
        });
        if self.status == RequestStatus::Requested {
            self.status = RequestStatus::Collecting;
        }

        match previous {
            Some(previous) => Recorded::Replaced { previous },
            None => Recorded::New,
        }
    }

    /// Keeps only the latest late report per oracle
    pub fn record_late(&mut self, oracle: AccountId, status: FlightStatus, at: Timestamp) {
        self.late_responses.retain(|r| r.oracle != oracle);
        self.late_responses.push(OracleResponse {
            oracle,
            status,
            received_at: at,
        });
    }

    /// Distinct oracles currently reporting `status`
    pub fn support(&self, status: FlightStatus) -> usize {
        self.responses.iter().filter(|r| r.status == status).count()
    }

    /// Oracles currently reporting `status`, in arrival order
    pub fn supporters(&self, status: FlightStatus) -> Vec<AccountId> {
        self.responses
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.oracle)
            .collect()
    }

    /// Support per reported status, ordered by first arrival
    pub fn tally(&self) -> Vec<(FlightStatus, usize)> {
        let mut tally: Vec<(FlightStatus, usize)> = Vec::new();
        for response in &self.responses {
            match tally.iter_mut().find(|(s, _)| *s == response.status) {
                Some((_, count)) => *count += 1,
                None => tally.push((response.status, 1)),
            }
        }
        tally
    }

    pub fn responses(&self) -> &[OracleResponse] {
        &self.responses
    }

    pub fn late_responses(&self) -> &[OracleResponse] {
        &self.late_responses
    }

    /// Snapshot used to undo a recording
    pub(crate) fn checkpoint(&self) -> (RequestStatus, Vec<OracleResponse>) {
        (self.status, self.responses.clone())
    }

    pub(crate) fn restore(&mut self, checkpoint: (RequestStatus, Vec<OracleResponse>)) {
        self.status = checkpoint.0;
        self.responses = checkpoint.1;
    }

    pub fn is_stale(&self, now: Timestamp, timeout_ms: u64) -> bool {
        self.status.is_open() && now.millis_since(self.issued_at) > timeout_ms
    }

    pub fn expire(&mut self) {
        if self.status.is_open() {
            self.status = RequestStatus::Expired;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> OracleRequest {
        let flight = FlightKey::new(AccountId([1u8; 32]), "ABC123", Timestamp(10));
        OracleRequest::new(flight, 4, AccountId([9u8; 32]), Timestamp(100))
    }

    #[test]
    fn test_resubmission_overwrites() {
        let mut req = request();
        let oracle = AccountId([2u8; 32]);

        assert_eq!(req.record(oracle, FlightStatus::OnTime, Timestamp(101)), Recorded::New);
        assert_eq!(req.status, RequestStatus::Collecting);
        assert_eq!(
            req.record(oracle, FlightStatus::LateAirline, Timestamp(102)),
            Recorded::Replaced { previous: FlightStatus::OnTime }
        );

        assert_eq!(req.responses().len(), 1);
        assert_eq!(req.support(FlightStatus::OnTime), 0);
        assert_eq!(req.support(FlightStatus::LateAirline), 1);
    }

    #[test]
    fn test_late_reports_keep_one_per_oracle() {
        let mut req = request();
        let oracle = AccountId([2u8; 32]);
        for at in 0..50 {
            req.record_late(oracle, FlightStatus::OnTime, Timestamp(200 + at));
        }
        req.record_late(oracle, FlightStatus::LateOther, Timestamp(300));
        req.record_late(AccountId([3u8; 32]), FlightStatus::OnTime, Timestamp(301));

        assert_eq!(req.late_responses().len(), 2);
        let latest = req.late_responses().iter().find(|r| r.oracle == oracle).unwrap();
        assert_eq!(latest.status, FlightStatus::LateOther);
        assert_eq!(latest.received_at, Timestamp(300));
        assert!(req.responses().is_empty());
    }

    #[test]
    fn test_tally_in_arrival_order() {
        let mut req = request();
        req.record(AccountId([1u8; 32]), FlightStatus::LateWeather, Timestamp(1));
        req.record(AccountId([2u8; 32]), FlightStatus::OnTime, Timestamp(2));
        req.record(AccountId([3u8; 32]), FlightStatus::LateWeather, Timestamp(3));

        assert_eq!(
            req.tally(),
            vec![(FlightStatus::LateWeather, 2), (FlightStatus::OnTime, 1)]
        );
        assert_eq!(
            req.supporters(FlightStatus::LateWeather),
            vec![AccountId([1u8; 32]), AccountId([3u8; 32])]
        );
    }

    #[test]
    fn test_checkpoint_restore() {
        let mut req = request();
        let checkpoint = req.checkpoint();
        req.record(AccountId([1u8; 32]), FlightStatus::OnTime, Timestamp(1));
        req.restore(checkpoint);
        assert_eq!(req.status, RequestStatus::Requested);
        assert!(req.responses().is_empty());
    }

    #[test]
    fn test_expiry() {
        let mut req = request();
        assert!(!req.is_stale(Timestamp(150), 100));
        assert!(req.is_stale(Timestamp(201), 100));
        req.expire();
        assert_eq!(req.status, RequestStatus::Expired);
        assert!(!req.is_stale(Timestamp(500), 100));
    }
}
