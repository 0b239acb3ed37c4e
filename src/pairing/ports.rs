//! Port traits for the pairing controller.
//!
//! The companion app embeds [`PairingSession`](super::session::PairingSession)
//! and supplies platform implementations of these two traits: a central
//! role for the host's radio stack and a claim client for the backend.
//! Both are driven tick-by-tick from the app's own run loop, so every
//! operation here is non-blocking.

use crate::error::CommsError;
use crate::protocol::MAX_PAIRING_INFO_LEN;

/// A peripheral seen during the scan, after marker filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Advertised name (`Zen-XXXX` or `Zen-Setup`).
    pub name: String,
    /// Platform-specific address/handle used to connect.
    pub address: String,
    /// Signal strength in dBm; candidates are presented strongest first.
    pub rssi: i8,
}

/// Central-role radio operations against one provisionable peripheral.
pub trait CentralPort {
    /// Begin scanning for peripherals. Results accumulate until drained.
    fn start_scan(&mut self) -> Result<(), CommsError>;

    fn stop_scan(&mut self);

    /// Drain peripherals discovered since the last call. The session
    /// applies the name filter; adapters report everything.
    fn take_discovered(&mut self) -> Vec<DiscoveredDevice>;

    /// Begin connecting to `address`. Completion is observed via
    /// [`is_connected`](CentralPort::is_connected).
    fn connect(&mut self, address: &str) -> Result<(), CommsError>;

    fn is_connected(&self) -> bool;

    fn disconnect(&mut self);

    /// Write the credentials characteristic. Fire-and-forget: the
    /// peripheral may drop the link while bringing up Wi-Fi, so delivery
    /// is confirmed through the status characteristic, not the write ack.
    fn write_credentials(&mut self, payload: &[u8]) -> Result<(), CommsError>;

    /// Read the status characteristic (raw token).
    fn read_status(&mut self) -> Result<heapless::String<32>, CommsError>;

    /// Read the pairing-info characteristic (raw JSON).
    fn read_pairing_info(&mut self) -> Result<heapless::Vec<u8, MAX_PAIRING_INFO_LEN>, CommsError>;
}

/// Backend claim call made once the device reports a claimable status.
pub trait ClaimPort {
    /// Attach `device_id` to the signed-in user account using the
    /// pairing token read from the device.
    fn claim(&mut self, device_id: &str, token: &str) -> Result<(), CommsError>;
}
