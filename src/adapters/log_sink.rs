//! Logging event sink.
//!
//! Default [`EventSink`] for the device: every domain event lands in the
//! serial log at a level matching its severity. Tests use their own
//! recording sinks instead.

use log::{debug, info, warn};

use crate::agent::events::AgentEvent;
use crate::agent::ports::EventSink;

#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogSink {
    fn emit(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::Started(state) => info!("event: agent started in {state:?}"),
            AgentEvent::StateChanged { from, to } => {
                info!("event: state {from:?} -> {to:?}");
            }
            AgentEvent::StatusChanged(status) => info!("event: status -> {status}"),
            AgentEvent::CredentialsReceived => info!("event: credentials received"),
            AgentEvent::Registered { device_id } => {
                info!("event: registered as {device_id}");
            }
            AgentEvent::PollFailed => warn!("event: state poll failed"),
            AgentEvent::Redraw => debug!("event: panel redraw"),
            AgentEvent::FactoryReset => warn!("event: factory reset"),
        }
    }
}
