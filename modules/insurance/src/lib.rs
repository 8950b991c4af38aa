//! SURETY Insurance Module
//! 
//! Implements the flight insurance scheme on top of oracle consensus:
//! - Airline admission by founding fast path or funded-member vote
//! - Escrow of airline ante, passenger stakes and oracle fees
//! - Automatic payout on airline-caused delay
//! - Passenger withdrawal

pub mod airline;
pub mod ledger;
pub mod payout;
pub mod service;
pub mod wallet;

pub use airline::*;
pub use ledger::*;
pub use payout::*;
pub use service::*;
pub use wallet::*;
