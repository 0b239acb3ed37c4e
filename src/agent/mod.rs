//! Device-agent core (hexagonal architecture).
//!
//! - [`ports`] — traits the platform adapters implement
//! - [`service`] — the orchestrating [`AgentService`](service::AgentService)
//! - [`events`] — structured events emitted through the sink port

pub mod events;
pub mod ports;
pub mod service;

pub use events::AgentEvent;
pub use ports::{
    BackendPort, ConnectivityPort, ContentPayload, DeviceIdentity, DisplayPort, EventSink,
    FeedPanel, PollResponse, ProvisioningScreen, RadioPort, StoragePort,
};
pub use service::{AgentService, Platform};
