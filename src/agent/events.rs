//! Outbound agent events.
//!
//! The [`AgentService`](super::service::AgentService) emits these through
//! the [`EventSink`](super::ports::EventSink) port. Adapters on the other
//! side decide what to do with them — log to serial, feed a test
//! recorder, etc.

use crate::fsm::StateId;
use crate::protocol::ProvisioningStatus;

/// Structured events emitted by the agent core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// The agent service has started (carries initial state).
    Started(StateId),

    /// The FSM transitioned between lifecycle states.
    StateChanged { from: StateId, to: StateId },

    /// The radio-visible provisioning status changed.
    StatusChanged(ProvisioningStatus),

    /// New Wi-Fi credentials were received over the radio link.
    CredentialsReceived,

    /// Registration completed and an identity was stored.
    Registered { device_id: String },

    /// A state poll failed; the previous content stays on glass.
    PollFailed,

    /// A frame was pushed to the panel.
    Redraw,

    /// Factory reset executed: storage wiped, back to Unprovisioned.
    FactoryReset,
}
