//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the single struct that state handlers read from and
//! write to. The agent service fills in the input side before each tick
//! (link flags, staged credentials, operation outcomes, monotonic time)
//! and drains the output side after it (I/O commands, the radio-visible
//! provisioning status). Think of it as the "blackboard" in a blackboard
//! architecture: handlers never touch hardware, they only read flags and
//! raise commands.

use crate::config::AgentConfig;
use crate::protocol::ProvisioningStatus;

// ---------------------------------------------------------------------------
// I/O commands (written by state handlers; executed by the agent service)
// ---------------------------------------------------------------------------

/// One-shot requests raised by state handlers. The agent service executes
/// each raised command after the FSM tick and clears the flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct IoCommands {
    /// Start (or restart) a Wi-Fi attempt with the current credentials.
    pub connect_wifi: bool,
    /// Tear down the current Wi-Fi attempt/association.
    pub disconnect_wifi: bool,
    /// Perform a registration call against the backend.
    pub register: bool,
    /// Perform a state poll against the backend.
    pub poll: bool,
    /// Send a heartbeat (best-effort, result ignored).
    pub heartbeat: bool,
}

impl IoCommands {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// Operation outcomes (written by the agent service; read by handlers)
// ---------------------------------------------------------------------------

/// Result of the most recent registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Backend accepted (or replayed) the registration; identity stored.
    Registered,
    /// Transient failure; try again after the retry delay.
    Retry,
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct FsmContext {
    // -- Timing --
    /// Ticks elapsed since the current state was entered.
    pub ticks_in_state: u64,
    /// Monotonic total tick count.
    pub total_ticks: u64,
    /// Monotonic milliseconds since boot. Updated before each tick; all
    /// long-running timeouts are deadline checks against this value.
    pub now_ms: u64,

    // -- Inputs (written by the agent service) --
    /// Wi-Fi credentials are available (staged or persisted) and a
    /// connection attempt is wanted. Consumed on entry to ConnectingWifi.
    pub connect_requested: bool,
    /// Station currently holds an IP.
    pub wifi_up: bool,
    /// A registered identity exists (loaded from storage or just minted).
    pub identity_present: bool,
    /// Outcome of the last registration attempt, if one completed since
    /// the previous tick. Cleared by the handler that consumes it.
    pub register_outcome: Option<RegisterOutcome>,

    // -- Outputs --
    /// Commands for the agent service to execute after this tick.
    pub commands: IoCommands,
    /// Radio-visible provisioning status. Handlers move it through the
    /// connection lifecycle; the service sets the claim-side values
    /// (waiting_for_claim, ready) from poll responses.
    pub status: ProvisioningStatus,

    // -- Deadlines --
    /// Hard bound on the in-flight Wi-Fi attempt.
    pub wifi_deadline_ms: Option<u64>,
    /// Earliest time for the next registration retry.
    pub next_register_ms: Option<u64>,
    /// Next scheduled state poll.
    pub next_poll_ms: Option<u64>,
    /// Next scheduled heartbeat.
    pub next_heartbeat_ms: Option<u64>,

    // -- Configuration --
    pub config: AgentConfig,
}

impl FsmContext {
    /// Delay before retrying a failed registration call.
    pub const REGISTER_RETRY_MS: u64 = 5_000;

    pub fn new(config: AgentConfig) -> Self {
        Self {
            ticks_in_state: 0,
            total_ticks: 0,
            now_ms: 0,
            connect_requested: false,
            wifi_up: false,
            identity_present: false,
            register_outcome: None,
            commands: IoCommands::default(),
            status: ProvisioningStatus::Idle,
            wifi_deadline_ms: None,
            next_register_ms: None,
            next_poll_ms: None,
            next_heartbeat_ms: None,
            config,
        }
    }

    /// Whether `deadline` (if armed) has passed.
    pub fn deadline_passed(&self, deadline: Option<u64>) -> bool {
        deadline.is_some_and(|d| self.now_ms >= d)
    }

    /// Wipe everything tied to the current provisioning cycle. Called on
    /// factory reset before the FSM is forced back to Unprovisioned.
    pub fn reset_provisioning(&mut self) {
        self.connect_requested = false;
        self.identity_present = false;
        self.register_outcome = None;
        self.status = ProvisioningStatus::Idle;
        self.wifi_deadline_ms = None;
        self.next_register_ms = None;
        self.next_poll_ms = None;
        self.next_heartbeat_ms = None;
        self.commands.clear();
    }
}
