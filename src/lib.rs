//! Zenboard firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.
//!
//! The crate covers both halves of the provisioning handshake: the
//! device agent that runs on the appliance (`agent`, `fsm`, `adapters`)
//! and the pairing-controller core the companion app embeds (`pairing`).
//! Both share the radio-link wire definitions in `protocol`.

#![deny(unused_must_use)]

pub mod agent;
pub mod config;
pub mod display;
pub mod events;
pub mod fsm;
pub mod pairing;
pub mod protocol;

mod error;
pub mod pins;

pub use error::{CommsError, Error, ProtocolError, Result, StorageError};

// Re-export the ESP-IDF-only modules so the crate compiles on the host;
// the platform implementations are guarded by cfg attributes inside.
pub mod adapters;
pub mod drivers;
