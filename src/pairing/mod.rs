//! Pairing-controller core for the companion app.
//!
//! Platform-neutral: the host app supplies [`CentralPort`] and
//! [`ClaimPort`] implementations and drives [`PairingSession`] from its
//! run loop.

pub mod ports;
pub mod session;

pub use ports::{CentralPort, ClaimPort, DiscoveredDevice};
pub use session::{
    CLAIM_DEADLINE_MS, CONNECT_TIMEOUT_MS, FailReason, PairingSession, SCAN_TIMEOUT_MS,
    STATUS_POLL_INTERVAL_MS, SessionPhase,
};
