//! Agent service — the hexagonal core.
//!
//! [`AgentService`] owns the FSM, the display model, and the shared
//! context. It exposes a clean, hardware-agnostic API. All I/O flows
//! through port traits injected at call sites, making the entire service
//! testable with mock adapters.
//!
//! ```text
//!  RadioPort ────▶ ┌─────────────────────────┐ ──▶ EventSink
//!  ConnectivityPort│      AgentService       │
//!  BackendPort ◀───│  FSM · RedrawGate · ctx │──▶ DisplayPort
//!  StoragePort ◀───└─────────────────────────┘
//! ```
//!
//! Per tick: collect inputs (staged credentials, link state) → FSM tick
//! (pure state logic) → execute the I/O commands the handlers raised →
//! publish status if it moved → refresh the panel through the redraw
//! gate.

use log::{debug, info, warn};

use crate::config::AgentConfig;
use crate::display::{DisplayState, RedrawGate, UiMode};
use crate::events::Event;
use crate::fsm::context::{FsmContext, IoCommands, RegisterOutcome};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::protocol::{ProvisioningStatus, SETUP_NAME, WifiCredentials};

use super::events::AgentEvent;
use super::ports::{
    BackendPort, ConnectivityPort, DeviceIdentity, DisplayPort, EventSink, PollResponse,
    ProvisioningScreen, RadioPort, StoragePort,
};

/// Everything the agent touches on the platform side. One value
/// implements all five ports — this avoids a fistful of mutable borrows
/// at every call site while keeping each boundary explicit.
pub trait Platform:
    RadioPort + ConnectivityPort + BackendPort + DisplayPort + StoragePort
{
}

impl<T> Platform for T where
    T: RadioPort + ConnectivityPort + BackendPort + DisplayPort + StoragePort
{
}

// ───────────────────────────────────────────────────────────────
// AgentService
// ───────────────────────────────────────────────────────────────

/// The agent service orchestrates all domain logic on the appliance.
pub struct AgentService {
    fsm: Fsm,
    ctx: FsmContext,
    /// Stable hardware identifier sent at registration (MAC-derived).
    hardware_id: String,
    identity: Option<DeviceIdentity>,
    credentials: Option<WifiCredentials>,
    /// Credentials received but not yet proven by a successful connect.
    /// Persisting only proven credentials keeps a bad write from being
    /// retried silently forever across reboots.
    credentials_dirty: bool,
    content: DisplayState,
    gate: RedrawGate,
    /// Provisioning screen currently on glass, `None` when content is up.
    last_screen: Option<ProvisioningScreen>,
    tick_count: u64,
}

impl AgentService {
    /// Construct the service. Does **not** start the FSM — call
    /// [`start`](Self::start) next.
    pub fn new(config: AgentConfig, hardware_id: String) -> Self {
        let ctx = FsmContext::new(config);
        let fsm = Fsm::new(build_state_table(), StateId::Unprovisioned);
        Self {
            fsm,
            ctx,
            hardware_id,
            identity: None,
            credentials: None,
            credentials_dirty: false,
            content: DisplayState::default(),
            gate: RedrawGate::new(),
            last_screen: None,
            tick_count: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Load persisted state, bring up the radio link, and start the FSM.
    ///
    /// A device with persisted credentials reconnects on its own; a
    /// device with a persisted identity skips registration entirely.
    pub fn start(&mut self, platform: &mut impl Platform, sink: &mut impl EventSink) {
        match platform.load_identity() {
            Ok(identity) => self.identity = identity,
            Err(e) => warn!("identity load failed: {e}"),
        }
        match platform.load_credentials() {
            Ok(creds) => self.credentials = creds,
            Err(e) => warn!("credentials load failed: {e}"),
        }

        self.ctx.identity_present = self.identity.is_some();
        if self.credentials.is_some() {
            self.ctx.connect_requested = true;
        }

        if let Err(e) = platform.start_advertising(self.advertised_name()) {
            warn!("advertising start failed: {e}");
        }
        if let Some(identity) = &self.identity {
            platform.publish_pairing_info(Some(&identity.pairing_info()));
        }
        platform.publish_status(self.ctx.status);

        self.fsm.start(&mut self.ctx);
        sink.emit(&AgentEvent::Started(self.fsm.current_state()));
        info!(
            "agent started in {:?} (identity: {}, credentials: {})",
            self.fsm.current_state(),
            self.identity.is_some(),
            self.credentials.is_some()
        );
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full control cycle.
    ///
    /// * `now_ms` — monotonic milliseconds since boot.
    /// * `wall_hhmm` — timezone-adjusted wall clock, once time is synced.
    pub fn tick(
        &mut self,
        now_ms: u64,
        wall_hhmm: Option<&str>,
        platform: &mut impl Platform,
        sink: &mut impl EventSink,
    ) {
        self.tick_count += 1;
        self.ctx.now_ms = now_ms;
        let prev_state = self.fsm.current_state();
        let prev_status = self.ctx.status;

        // 1. Collect inputs.
        if let Some(creds) = platform.take_pending_credentials() {
            self.accept_credentials(creds, sink);
        }
        self.ctx.wifi_up = platform.is_up();
        if let Some(hhmm) = wall_hhmm {
            self.content.clock_hhmm = heapless::String::try_from(hhmm).unwrap_or_default();
        }

        // 2. FSM tick (pure state logic).
        self.fsm.tick(&mut self.ctx);

        // 3. Execute the I/O commands the handlers raised.
        let cmds = self.ctx.commands;
        self.ctx.commands.clear();
        self.execute_commands(cmds, platform, sink);

        // 4. Publish status if it moved.
        if self.ctx.status != prev_status {
            platform.publish_status(self.ctx.status);
            sink.emit(&AgentEvent::StatusChanged(self.ctx.status));
        }

        // 5. Panel refresh through the redraw gate.
        self.refresh_display(now_ms, platform, sink);

        // 6. Emit state change if the FSM moved.
        let new_state = self.fsm.current_state();
        if new_state != prev_state {
            // Leaving ConnectingWifi forward means the join succeeded;
            // only now are the credentials worth persisting.
            if prev_state == StateId::ConnectingWifi
                && new_state == StateId::Registering
                && self.credentials_dirty
            {
                if let Some(creds) = &self.credentials {
                    match platform.save_credentials(creds) {
                        Ok(()) => self.credentials_dirty = false,
                        Err(e) => warn!("credentials persist failed: {e}"),
                    }
                }
            }
            sink.emit(&AgentEvent::StateChanged {
                from: prev_state,
                to: new_state,
            });
        }
    }

    // ── Input events ──────────────────────────────────────────

    /// Process a queued input event (buttons, link callbacks that need
    /// more than a flag).
    pub fn handle_event(
        &mut self,
        event: Event,
        platform: &mut impl Platform,
        sink: &mut impl EventSink,
    ) {
        match event {
            Event::ModeButtonPress => {
                let target = self.content.mode.toggled();
                let target_has_content = match target {
                    UiMode::Calendar => !self.content.calendar.is_empty(),
                    UiMode::Email => !self.content.emails.is_empty(),
                };
                if target_has_content {
                    self.content.mode = target;
                    info!("mode toggled to {}", target.as_str());
                    // The signature change gets it on glass next tick.
                } else {
                    debug!("mode toggle ignored, {} panel is empty", target.as_str());
                }
            }
            Event::FactoryResetRequested => self.factory_reset(platform, sink),
            // Link flags are polled each tick; the queue entries only
            // serve to wake the loop early.
            Event::CredentialsWritten
            | Event::RadioConnected
            | Event::RadioDisconnected
            | Event::WifiGotIp
            | Event::WifiLost
            | Event::ControlTick => {}
        }
    }

    /// Erase everything and return to the out-of-box state.
    pub fn factory_reset(&mut self, platform: &mut impl Platform, sink: &mut impl EventSink) {
        warn!("factory reset requested");
        if let Err(e) = platform.wipe() {
            // Keep going: an unprovisioned device with stale flash is
            // still better than one stuck provisioned.
            warn!("storage wipe failed: {e}");
        }
        platform.disconnect();

        self.identity = None;
        self.credentials = None;
        self.credentials_dirty = false;
        self.content = DisplayState::default();
        self.gate.invalidate();
        self.last_screen = None;
        self.ctx.reset_provisioning();
        self.fsm.force_transition(StateId::Unprovisioned, &mut self.ctx);

        platform.publish_pairing_info(None);
        platform.publish_status(self.ctx.status);
        if let Err(e) = platform.start_advertising(SETUP_NAME) {
            warn!("advertising restart failed: {e}");
        }
        sink.emit(&AgentEvent::FactoryReset);
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn status(&self) -> ProvisioningStatus {
        self.ctx.status
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Name currently advertised over the radio link.
    pub fn advertised_name(&self) -> &str {
        self.identity
            .as_ref()
            .map_or(SETUP_NAME, |id| id.bluetooth_name.as_str())
    }

    // ── Internal ──────────────────────────────────────────────

    /// Stage freshly written credentials and request a connection
    /// attempt. Persistence waits for the connect to succeed. The
    /// identity is deliberately kept — moving a claimed device to a new
    /// network must not force a re-claim.
    fn accept_credentials(&mut self, creds: WifiCredentials, sink: &mut impl EventSink) {
        info!("credentials received for SSID '{}'", creds.ssid);
        self.credentials = Some(creds);
        self.credentials_dirty = true;
        self.ctx.connect_requested = true;
        sink.emit(&AgentEvent::CredentialsReceived);
    }

    fn execute_commands(
        &mut self,
        cmds: IoCommands,
        platform: &mut impl Platform,
        sink: &mut impl EventSink,
    ) {
        if cmds.disconnect_wifi {
            platform.disconnect();
        }
        if cmds.connect_wifi {
            match &self.credentials {
                Some(creds) => {
                    if let Err(e) = platform.connect(creds) {
                        // The attempt deadline will fire and report
                        // wifi_failed; nothing to do here.
                        warn!("Wi-Fi connect failed to start: {e}");
                    }
                }
                None => warn!("connect requested without credentials"),
            }
        }
        if cmds.register {
            self.do_register(platform, sink);
        }
        if cmds.poll {
            self.do_poll(platform, sink);
        }
        if cmds.heartbeat {
            if let Some(identity) = &self.identity {
                if let Err(e) = platform.heartbeat(identity) {
                    // Best-effort by contract.
                    debug!("heartbeat failed: {e}");
                }
            }
        }
    }

    /// Registration is idempotent and cached: an identity already on
    /// flash short-circuits the network call entirely.
    fn do_register(&mut self, platform: &mut impl Platform, sink: &mut impl EventSink) {
        if self.identity.is_some() {
            self.ctx.register_outcome = Some(RegisterOutcome::Registered);
            self.ctx.identity_present = true;
            return;
        }

        match platform.register(&self.hardware_id) {
            Ok(identity) => {
                info!("registered as {}", identity.device_id);
                if let Err(e) = platform.save_identity(&identity) {
                    warn!("identity persist failed: {e}");
                }
                platform.publish_pairing_info(Some(&identity.pairing_info()));
                if let Err(e) = platform.start_advertising(&identity.bluetooth_name) {
                    warn!("advertising rename failed: {e}");
                }
                sink.emit(&AgentEvent::Registered {
                    device_id: identity.device_id.clone(),
                });
                self.identity = Some(identity);
                self.ctx.identity_present = true;
                self.ctx.register_outcome = Some(RegisterOutcome::Registered);
            }
            Err(e) => {
                warn!("registration failed: {e}");
                self.ctx.register_outcome = Some(RegisterOutcome::Retry);
            }
        }
    }

    fn do_poll(&mut self, platform: &mut impl Platform, sink: &mut impl EventSink) {
        let Some(identity) = &self.identity else {
            warn!("poll requested without identity");
            return;
        };

        match platform.poll_state(identity) {
            Ok(PollResponse::Ready(payload)) => {
                let payload = payload.truncated();
                self.content.calendar.clear();
                for item in payload.calendar.items {
                    let _ = self.content.calendar.push(item);
                }
                self.content.emails.clear();
                for item in payload.email.items {
                    let _ = self.content.emails.push(item);
                }
                self.ctx.status = ProvisioningStatus::Ready;
            }
            Ok(PollResponse::WaitingForClaim) => {
                self.ctx.status = ProvisioningStatus::WaitingForClaim;
            }
            Err(e) => {
                // Soft failure: keep the previous status and content,
                // retry at the next scheduled poll.
                warn!("poll failed: {e}");
                sink.emit(&AgentEvent::PollFailed);
            }
        }
    }

    fn refresh_display(
        &mut self,
        now_ms: u64,
        platform: &mut impl Platform,
        sink: &mut impl EventSink,
    ) {
        let screen = match (self.fsm.current_state(), self.ctx.status) {
            (StateId::Polling, ProvisioningStatus::Ready) => None,
            (StateId::Polling, _) => Some(ProvisioningScreen::WaitingForClaim),
            (StateId::ConnectingWifi | StateId::Registering, _) => {
                Some(ProvisioningScreen::Connecting)
            }
            (StateId::Unprovisioned, ProvisioningStatus::WifiFailed) => {
                Some(ProvisioningScreen::WifiFailed)
            }
            (StateId::Unprovisioned, _) => Some(ProvisioningScreen::SetupHint),
        };

        // A different screen must show right away; the cadence only
        // governs refreshes of the same screen.
        if screen != self.last_screen {
            self.gate.invalidate();
            self.last_screen = screen;
        }

        let drew = match screen {
            None => {
                if self.gate.check_content(&self.content) {
                    if let Err(e) = platform.draw_content(&self.content) {
                        warn!("content draw failed: {e}");
                        self.gate.invalidate();
                        false
                    } else {
                        true
                    }
                } else {
                    false
                }
            }
            Some(screen) => {
                if self
                    .gate
                    .check_provisioning(now_ms, self.ctx.config.provisioning_redraw_secs)
                {
                    let name = self.advertised_name();
                    if let Err(e) = platform.draw_provisioning(screen, name) {
                        warn!("provisioning draw failed: {e}");
                        self.gate.invalidate();
                        false
                    } else {
                        true
                    }
                } else {
                    false
                }
            }
        };

        if drew {
            sink.emit(&AgentEvent::Redraw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertised_name_falls_back_to_setup() {
        let service = AgentService::new(AgentConfig::default(), "hw-01".into());
        assert_eq!(service.advertised_name(), SETUP_NAME);
    }

    #[test]
    fn starts_unprovisioned_idle() {
        let service = AgentService::new(AgentConfig::default(), "hw-01".into());
        assert_eq!(service.state(), StateId::Unprovisioned);
        assert_eq!(service.status(), ProvisioningStatus::Idle);
    }
}
