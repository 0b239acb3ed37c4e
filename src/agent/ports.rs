//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AgentService (domain)
//! ```
//!
//! Driven adapters (radio stack, Wi-Fi driver, HTTP client, e-ink panel,
//! NVS) implement these traits. The [`AgentService`](super::service::AgentService)
//! consumes them via generics, so the domain core never touches hardware
//! directly.
//!
//! ## Security notes
//!
//! - The device secret never crosses [`RadioPort`]; it lives only in
//!   [`StoragePort`] and outbound [`BackendPort`] request headers.
//! - **StoragePort** implementations SHOULD use the encrypted NVS
//!   partition for credentials and identity.
//! - All port errors are typed — callers must handle every variant
//!   explicitly.

use serde::{Deserialize, Serialize};

use crate::display::{CalendarItem, EmailItem, MAX_ITEMS};
use crate::error::{CommsError, StorageError};
use crate::protocol::{PairingInfo, ProvisioningStatus, WifiCredentials};

// ───────────────────────────────────────────────────────────────
// Backend data types
// ───────────────────────────────────────────────────────────────

/// Identity minted by the backend at registration. Persisted across
/// reboots; erased only by factory reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub device_id: String,
    /// Authenticates every backend call after registration.
    /// Never exposed over the radio link.
    pub device_secret: String,
    /// Short-lived token the companion app exchanges for a claim.
    pub pairing_token: String,
    /// Advertised name assigned by the backend (`Zen-XXXX`).
    pub bluetooth_name: String,
}

impl DeviceIdentity {
    /// The pairing-info document exposed on the radio link.
    /// Deliberately excludes the device secret.
    pub fn pairing_info(&self) -> PairingInfo {
        PairingInfo {
            device_id: self.device_id.clone(),
            token: self.pairing_token.clone(),
        }
    }
}

/// Outcome of a device-state poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResponse {
    /// Device is claimed; payload carries the content to render.
    Ready(ContentPayload),
    /// Registered but not yet claimed by a user account (HTTP 409).
    WaitingForClaim,
}

/// One feed section of the state response: whether the upstream account
/// is connected, plus its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPanel<T> {
    #[serde(default)]
    pub connected: bool,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> Default for FeedPanel<T> {
    fn default() -> Self {
        Self {
            connected: false,
            items: Vec::new(),
        }
    }
}

/// Renderable content from a successful poll (`GET /devices/state`, 200).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPayload {
    #[serde(default)]
    pub calendar: FeedPanel<CalendarItem>,
    #[serde(default)]
    pub email: FeedPanel<EmailItem>,
}

impl ContentPayload {
    /// At most [`MAX_ITEMS`] of each feed fit the panel layout.
    pub fn truncated(mut self) -> Self {
        self.calendar.items.truncate(MAX_ITEMS);
        self.email.items.truncate(MAX_ITEMS);
        self
    }
}

/// Provisioning screens the panel can show before content is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningScreen {
    /// Boot screen: setup instructions plus the advertised name.
    SetupHint,
    /// Wi-Fi attempt in progress.
    Connecting,
    /// Last Wi-Fi attempt failed; waiting for new credentials.
    WifiFailed,
    /// Registered, waiting for the companion app to claim.
    WaitingForClaim,
}

// ───────────────────────────────────────────────────────────────
// Radio port (driven adapter: GATT stack ↔ domain)
// ───────────────────────────────────────────────────────────────

/// The provisioning radio link. Write callbacks run in the stack's own
/// task, so implementations stage incoming payloads internally; the
/// domain collects them from the main loop via
/// [`take_pending_credentials`](RadioPort::take_pending_credentials).
pub trait RadioPort {
    /// Start (or restart) advertising under `name`.
    fn start_advertising(&mut self, name: &str) -> Result<(), CommsError>;

    /// Credentials written by a central since the last call, if any.
    /// Malformed payloads are dropped by the adapter, not surfaced here.
    fn take_pending_credentials(&mut self) -> Option<WifiCredentials>;

    /// Update the status characteristic (and notify subscribers).
    fn publish_status(&mut self, status: ProvisioningStatus);

    /// Update the pairing-info characteristic. `None` clears it
    /// (factory reset).
    fn publish_pairing_info(&mut self, info: Option<&PairingInfo>);
}

// ───────────────────────────────────────────────────────────────
// Connectivity port (driven adapter: Wi-Fi driver ↔ domain)
// ───────────────────────────────────────────────────────────────

/// Station-mode Wi-Fi. `connect` only starts the attempt; the domain
/// watches [`is_up`](ConnectivityPort::is_up) against its own deadline
/// rather than blocking in the driver.
pub trait ConnectivityPort {
    fn connect(&mut self, creds: &WifiCredentials) -> Result<(), CommsError>;
    fn disconnect(&mut self);
    fn is_up(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Backend port (driven adapter: HTTPS client ↔ domain)
// ───────────────────────────────────────────────────────────────

/// The provisioning/content backend over HTTPS.
pub trait BackendPort {
    /// Register this hardware. Idempotent: replaying the same
    /// `hardware_id` returns the same identity.
    fn register(&mut self, hardware_id: &str) -> Result<DeviceIdentity, CommsError>;

    /// Poll device state. Maps HTTP 200 → `Ready`, 409 → `WaitingForClaim`;
    /// everything else is an error.
    fn poll_state(&mut self, identity: &DeviceIdentity) -> Result<PollResponse, CommsError>;

    /// Best-effort liveness ping. Callers ignore failures.
    fn heartbeat(&mut self, identity: &DeviceIdentity) -> Result<(), CommsError>;
}

// ───────────────────────────────────────────────────────────────
// Display port (driven adapter: domain → e-ink panel)
// ───────────────────────────────────────────────────────────────

/// The e-ink panel. Every call is a full refresh; the domain's redraw
/// gate decides when calls happen, the adapter just draws.
pub trait DisplayPort {
    fn draw_content(&mut self, state: &crate::display::DisplayState) -> Result<(), crate::Error>;
    fn draw_provisioning(&mut self, screen: ProvisioningScreen, advertised_name: &str)
    -> Result<(), crate::Error>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent storage for identity and credentials.
///
/// # Security
///
/// - Write operations MUST be atomic — no partial records on power
///   loss. The ESP-IDF NVS API guarantees this natively; in-memory
///   simulation achieves it trivially.
/// - `wipe` MUST remove every record, including the device secret.
pub trait StoragePort {
    fn load_identity(&mut self) -> Result<Option<DeviceIdentity>, StorageError>;
    fn save_identity(&mut self, identity: &DeviceIdentity) -> Result<(), StorageError>;

    fn load_credentials(&mut self) -> Result<Option<WifiCredentials>, StorageError>;
    fn save_credentials(&mut self, creds: &WifiCredentials) -> Result<(), StorageError>;

    /// Factory reset: erase identity, credentials, everything.
    fn wipe(&mut self) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AgentEvent`](super::events::AgentEvent)s
/// through this port. Adapters decide where they go (serial log, debug
/// characteristic, test recorder).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AgentEvent);
}
