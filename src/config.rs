//! Agent configuration parameters
//!
//! All tunable timing parameters for the Zenboard device agent.
//! Values can be overridden via NVS; the defaults match the deployed
//! backend's expectations.

use serde::{Deserialize, Serialize};

/// Core agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    // --- Main loop ---
    /// Control loop interval (milliseconds)
    pub control_loop_interval_ms: u32,

    // --- Wi-Fi ---
    /// Bound on a single Wi-Fi connection attempt (milliseconds)
    pub wifi_connect_timeout_ms: u32,

    // --- Backend ---
    /// State poll interval (seconds); a poll is also forced on entry to Polling
    pub poll_interval_secs: u32,
    /// Heartbeat interval (seconds); telemetry only, failures ignored
    pub heartbeat_interval_secs: u32,
    /// Connection timeout applied to every outbound HTTP call (milliseconds)
    pub http_timeout_ms: u32,

    // --- Display ---
    /// Provisioning-screen redraw cadence (seconds), independent of the
    /// content-signature mechanism
    pub provisioning_redraw_secs: u32,

    // --- Buttons ---
    /// Hold duration for the factory-reset control (milliseconds)
    pub reset_hold_ms: u32,
}

impl AgentConfig {
    /// Range-check a config before it is persisted or applied. Rejects
    /// values that would wedge the agent: a stalled control loop, a
    /// Wi-Fi window too short for one association, or a reset hold a
    /// bounce could trip.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.control_loop_interval_ms == 0 || self.control_loop_interval_ms > 5_000 {
            return Err("control_loop_interval_ms out of range");
        }
        if !(1_000..=120_000).contains(&self.wifi_connect_timeout_ms) {
            return Err("wifi_connect_timeout_ms out of range");
        }
        if !(1..=3_600).contains(&self.poll_interval_secs) {
            return Err("poll_interval_secs out of range");
        }
        if !(1..=3_600).contains(&self.heartbeat_interval_secs) {
            return Err("heartbeat_interval_secs out of range");
        }
        if !(1_000..=60_000).contains(&self.http_timeout_ms) {
            return Err("http_timeout_ms out of range");
        }
        if !(10..=3_600).contains(&self.provisioning_redraw_secs) {
            return Err("provisioning_redraw_secs out of range");
        }
        if !(500..=10_000).contains(&self.reset_hold_ms) {
            return Err("reset_hold_ms out of range");
        }
        Ok(())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            control_loop_interval_ms: 200, // 5 Hz
            wifi_connect_timeout_ms: 20_000,
            poll_interval_secs: 60,
            heartbeat_interval_secs: 30,
            http_timeout_ms: 10_000,
            provisioning_redraw_secs: 60,
            reset_hold_ms: 3000,
        }
    }
}
