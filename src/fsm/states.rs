//! Concrete state handler functions and table builder.
//!
//! Each state is defined by three plain `fn` pointers — no closures, no
//! dynamic dispatch, no heap. This is the classic embedded C FSM pattern
//! expressed in safe Rust.
//!
//! ```text
//!  UNPROVISIONED ──[credentials received]──▶ CONNECTING_WIFI
//!        ▲                                        │      │
//!        │                                 [got IP]      [20s deadline]
//!        │                                        ▼      │
//!        │                                  REGISTERING  │
//!        │                                        │      │
//!        │                              [identity stored]│
//!        │                                        ▼      │
//!        └──────[factory reset / wifi_failed]── POLLING ◀┘ (via reconnect)
//!
//!  New credentials from any connected state restart CONNECTING_WIFI.
//! ```

use super::context::{FsmContext, RegisterOutcome};
use super::{StateDescriptor, StateId};
use crate::protocol::ProvisioningStatus;
use log::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table. Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0 — Unprovisioned
        StateDescriptor {
            id: StateId::Unprovisioned,
            name: "Unprovisioned",
            on_enter: None,
            on_exit: None,
            on_update: unprovisioned_update,
        },
        // Index 1 — ConnectingWifi
        StateDescriptor {
            id: StateId::ConnectingWifi,
            name: "ConnectingWifi",
            on_enter: Some(connecting_enter),
            on_exit: None,
            on_update: connecting_update,
        },
        // Index 2 — Registering
        StateDescriptor {
            id: StateId::Registering,
            name: "Registering",
            on_enter: Some(registering_enter),
            on_exit: None,
            on_update: registering_update,
        },
        // Index 3 — Polling
        StateDescriptor {
            id: StateId::Polling,
            name: "Polling",
            on_enter: Some(polling_enter),
            on_exit: Some(polling_exit),
            on_update: polling_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  UNPROVISIONED — advertising, waiting for credentials
// ═══════════════════════════════════════════════════════════════════════════

fn unprovisioned_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.connect_requested {
        return Some(StateId::ConnectingWifi);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTING_WIFI — one bounded join attempt
// ═══════════════════════════════════════════════════════════════════════════

fn connecting_enter(ctx: &mut FsmContext) {
    ctx.connect_requested = false;
    ctx.status = ProvisioningStatus::Connecting;
    ctx.wifi_deadline_ms = Some(ctx.now_ms + u64::from(ctx.config.wifi_connect_timeout_ms));
    ctx.commands.connect_wifi = true;
    info!(
        "CONNECTING_WIFI: attempt bounded at {}ms",
        ctx.config.wifi_connect_timeout_ms
    );
}

fn connecting_update(ctx: &mut FsmContext) -> Option<StateId> {
    // Fresh credentials supersede the in-flight attempt: tear it down and
    // restart the state so the deadline re-arms for the new network.
    if ctx.connect_requested {
        info!("CONNECTING_WIFI: new credentials received, restarting attempt");
        ctx.commands.disconnect_wifi = true;
        return Some(StateId::ConnectingWifi);
    }

    if ctx.wifi_up {
        ctx.status = ProvisioningStatus::WifiConnected;
        ctx.wifi_deadline_ms = None;
        return Some(StateId::Registering);
    }

    if ctx.deadline_passed(ctx.wifi_deadline_ms) {
        warn!("CONNECTING_WIFI: deadline passed without an IP");
        ctx.status = ProvisioningStatus::WifiFailed;
        ctx.wifi_deadline_ms = None;
        ctx.commands.disconnect_wifi = true;
        return Some(StateId::Unprovisioned);
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  REGISTERING — idempotent backend registration
// ═══════════════════════════════════════════════════════════════════════════

fn registering_enter(ctx: &mut FsmContext) {
    ctx.next_register_ms = None;
    ctx.commands.register = true;
    info!("REGISTERING: requesting device registration");
}

fn registering_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.connect_requested {
        ctx.commands.disconnect_wifi = true;
        return Some(StateId::ConnectingWifi);
    }

    if !ctx.wifi_up {
        warn!("REGISTERING: Wi-Fi dropped, reconnecting");
        ctx.connect_requested = true;
        return Some(StateId::ConnectingWifi);
    }

    match ctx.register_outcome.take() {
        Some(RegisterOutcome::Registered) => {
            ctx.status = ProvisioningStatus::Registered;
            return Some(StateId::Polling);
        }
        Some(RegisterOutcome::Retry) => {
            ctx.next_register_ms = Some(ctx.now_ms + FsmContext::REGISTER_RETRY_MS);
        }
        None => {}
    }

    if ctx.deadline_passed(ctx.next_register_ms) {
        ctx.next_register_ms = None;
        ctx.commands.register = true;
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  POLLING — steady state: scheduled polls and heartbeats
// ═══════════════════════════════════════════════════════════════════════════

fn polling_enter(ctx: &mut FsmContext) {
    // Immediate poll on entry so a freshly claimed device flips to ready
    // without waiting a full interval.
    ctx.commands.poll = true;
    ctx.next_poll_ms = Some(ctx.now_ms + u64::from(ctx.config.poll_interval_secs) * 1000);
    ctx.next_heartbeat_ms =
        Some(ctx.now_ms + u64::from(ctx.config.heartbeat_interval_secs) * 1000);
    info!(
        "POLLING: poll every {}s, heartbeat every {}s",
        ctx.config.poll_interval_secs, ctx.config.heartbeat_interval_secs
    );
}

fn polling_exit(ctx: &mut FsmContext) {
    ctx.next_poll_ms = None;
    ctx.next_heartbeat_ms = None;
}

fn polling_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.connect_requested {
        info!("POLLING: re-provisioning with new credentials");
        ctx.commands.disconnect_wifi = true;
        return Some(StateId::ConnectingWifi);
    }

    if !ctx.wifi_up {
        warn!("POLLING: Wi-Fi dropped, reconnecting");
        ctx.connect_requested = true;
        return Some(StateId::ConnectingWifi);
    }

    if ctx.deadline_passed(ctx.next_poll_ms) {
        ctx.commands.poll = true;
        ctx.next_poll_ms = Some(ctx.now_ms + u64::from(ctx.config.poll_interval_secs) * 1000);
    }

    if ctx.deadline_passed(ctx.next_heartbeat_ms) {
        ctx.commands.heartbeat = true;
        ctx.next_heartbeat_ms =
            Some(ctx.now_ms + u64::from(ctx.config.heartbeat_interval_secs) * 1000);
    }

    None
}
