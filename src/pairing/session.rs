//! Tick-driven pairing session.
//!
//! One [`PairingSession`] walks the full companion-app flow against a
//! single device:
//!
//! ```text
//!  SCANNING ──[window close, list shown]──▶ AWAITING_SELECTION
//!     ▲  │                                          │
//!     │  └───────────[user choose]──────────────────┤
//!     │                                             ▼
//!     │                                        CONNECTING
//!     │                                             │
//!     │                              [link up: write credentials]
//!     │                                             ▼
//!  COMPLETE ◀──[claimable status + suffix ok]── WAITING_CLAIMABLE
//!     ▲                                             │
//!     └─────[timeout / wifi_failed / suffix mismatch]
//!            (disconnect, record the failure, rescan)
//! ```
//!
//! Connecting always requires an explicit [`choose`](PairingSession::choose):
//! several provisionable devices can sit within radio range, and the
//! suffix guard cannot tell an honest stranger's device from the user's
//! own, so the session never binds one on its own.
//!
//! Protocol aborts (connect timeout, claim timeout, Wi-Fi rejection,
//! suffix mismatch, rejected claim) are not terminal: the session
//! disconnects, records the failure for the UI, and resumes scanning so
//! the user can retry without restarting the app. Only scan
//! unavailability, an empty scan window, and an explicit cancel end the
//! session.
//!
//! The session never blocks: the host app calls [`tick`](PairingSession::tick)
//! from its run loop with monotonic time, and every radio/backend
//! operation goes through the port traits. Status is polled, not pushed,
//! so the flow survives stacks with unreliable notifications.

use log::{debug, info, warn};

use crate::protocol::{
    ProvisioningStatus, PairingInfo, WifiCredentials, encode_credentials, is_provisionable_name,
    name_matches_device,
};

use super::ports::{CentralPort, ClaimPort, DiscoveredDevice};

/// Scan window before the candidate list is frozen for selection.
pub const SCAN_TIMEOUT_MS: u64 = 30_000;
/// Bound on establishing the radio connection.
pub const CONNECT_TIMEOUT_MS: u64 = 12_000;
/// Status characteristic poll cadence.
pub const STATUS_POLL_INTERVAL_MS: u64 = 500;
/// Ceiling on the whole credentials→claimable wait.
pub const CLAIM_DEADLINE_MS: u64 = 120_000;

/// Where the session currently is. Deadlines are absolute monotonic
/// milliseconds, compared against the `now_ms` passed to `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Scanning { deadline_ms: u64 },
    /// Scan window closed with candidates on the list; waiting for the
    /// user to pick one.
    AwaitingSelection,
    Connecting { deadline_ms: u64 },
    WaitingClaimable { deadline_ms: u64, next_poll_ms: u64 },
    Complete,
    Failed(FailReason),
}

/// Failure causes, mapped to user-facing copy by
/// [`PairingSession::user_message`]. Only the first two and `Cancelled`
/// are terminal; the rest resume scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    ScanFailed,
    NoDeviceFound,
    ConnectFailed,
    ConnectTimeout,
    /// Device reported `wifi_failed`: the credentials were rejected.
    WifiRejected,
    /// Pairing info named a different device than the one connected.
    /// The claim was never attempted.
    DeviceMismatch,
    /// Device never reached a claimable status inside the ceiling.
    ClaimTimeout,
    /// Backend rejected the claim call.
    ClaimFailed,
    Cancelled,
}

/// One pairing attempt: scan, connect, deliver credentials, wait for a
/// claimable status, verify, claim.
pub struct PairingSession {
    phase: SessionPhase,
    credentials: WifiCredentials,
    /// Marker-filtered candidates, strongest first.
    candidates: Vec<DiscoveredDevice>,
    target: Option<DiscoveredDevice>,
    /// Most recent protocol abort, shown while scanning has resumed.
    last_failure: Option<FailReason>,
}

impl PairingSession {
    /// Create a session and start scanning.
    pub fn start(
        credentials: WifiCredentials,
        now_ms: u64,
        central: &mut impl CentralPort,
    ) -> Self {
        let phase = match central.start_scan() {
            Ok(()) => SessionPhase::Scanning {
                deadline_ms: now_ms + SCAN_TIMEOUT_MS,
            },
            Err(e) => {
                warn!("scan start failed: {e}");
                SessionPhase::Failed(FailReason::ScanFailed)
            }
        };
        Self {
            phase,
            credentials,
            candidates: Vec::new(),
            target: None,
            last_failure: None,
        }
    }

    /// Advance the session. Call at the host app's tick rate (anything
    /// at or under the status poll cadence works).
    pub fn tick(
        &mut self,
        now_ms: u64,
        central: &mut impl CentralPort,
        claim: &mut impl ClaimPort,
    ) -> SessionPhase {
        match self.phase {
            SessionPhase::Scanning { deadline_ms } => {
                self.collect_candidates(central);
                if now_ms >= deadline_ms {
                    central.stop_scan();
                    if self.candidates.is_empty() {
                        self.phase = SessionPhase::Failed(FailReason::NoDeviceFound);
                    } else {
                        // Never connect on our own: with several devices
                        // in range only the user knows which one is on
                        // their desk.
                        info!(
                            "scan window closed with {} candidate(s), awaiting selection",
                            self.candidates.len()
                        );
                        self.phase = SessionPhase::AwaitingSelection;
                    }
                }
            }

            SessionPhase::AwaitingSelection => {}

            SessionPhase::Connecting { deadline_ms } => {
                if central.is_connected() {
                    self.deliver_credentials(now_ms, central);
                } else if now_ms >= deadline_ms {
                    warn!("connect attempt timed out");
                    self.resume_scanning(FailReason::ConnectTimeout, now_ms, central);
                }
            }

            SessionPhase::WaitingClaimable {
                deadline_ms,
                next_poll_ms,
            } => {
                if now_ms >= deadline_ms {
                    warn!("device never became claimable");
                    self.resume_scanning(FailReason::ClaimTimeout, now_ms, central);
                } else if now_ms >= next_poll_ms {
                    self.phase = SessionPhase::WaitingClaimable {
                        deadline_ms,
                        next_poll_ms: now_ms + STATUS_POLL_INTERVAL_MS,
                    };
                    self.poll_status(now_ms, central, claim);
                }
            }

            SessionPhase::Complete | SessionPhase::Failed(_) => {}
        }
        self.phase
    }

    /// Connect to the candidate the user picked, either mid-scan or once
    /// the window has closed. This is the only path into `Connecting`.
    pub fn choose(
        &mut self,
        device: DiscoveredDevice,
        now_ms: u64,
        central: &mut impl CentralPort,
    ) {
        if matches!(
            self.phase,
            SessionPhase::Scanning { .. } | SessionPhase::AwaitingSelection
        ) {
            self.connect_to(device, now_ms, central);
        }
    }

    /// Abort the session. Terminal phases are left as they are.
    pub fn cancel(&mut self, central: &mut impl CentralPort) {
        match self.phase {
            SessionPhase::Complete | SessionPhase::Failed(_) => {}
            SessionPhase::Scanning { .. } => {
                central.stop_scan();
                self.phase = SessionPhase::Failed(FailReason::Cancelled);
            }
            // Scan already stopped; there is nothing to tear down.
            SessionPhase::AwaitingSelection => {
                self.phase = SessionPhase::Failed(FailReason::Cancelled);
            }
            _ => {
                central.disconnect();
                self.phase = SessionPhase::Failed(FailReason::Cancelled);
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, SessionPhase::Complete | SessionPhase::Failed(_))
    }

    /// The most recent protocol abort, if scanning resumed after one.
    pub fn last_failure(&self) -> Option<FailReason> {
        self.last_failure
    }

    /// Candidates seen so far, strongest signal first.
    pub fn candidates(&self) -> &[DiscoveredDevice] {
        &self.candidates
    }

    /// Copy for the host app's progress UI. After a protocol abort the
    /// scanning phase shows the failure, not the generic progress line.
    pub fn user_message(&self) -> &'static str {
        match self.phase {
            SessionPhase::Scanning { .. } => match self.last_failure {
                Some(reason) => Self::failure_copy(reason),
                None => "Looking for your Zenboard…",
            },
            SessionPhase::AwaitingSelection => "Select your Zenboard to continue.",
            SessionPhase::Connecting { .. } => "Connecting to your Zenboard…",
            SessionPhase::WaitingClaimable { .. } => "Setting up Wi-Fi on your Zenboard…",
            SessionPhase::Complete => "All set! Your Zenboard is ready.",
            SessionPhase::Failed(reason) => Self::failure_copy(reason),
        }
    }

    const fn failure_copy(reason: FailReason) -> &'static str {
        match reason {
            FailReason::ScanFailed => "Bluetooth isn't available. Check permissions.",
            FailReason::NoDeviceFound => "No Zenboard found nearby. Is it plugged in?",
            FailReason::ConnectFailed | FailReason::ConnectTimeout => {
                "Couldn't connect. Move closer to your Zenboard and retry."
            }
            FailReason::WifiRejected => {
                "Your Zenboard couldn't join that Wi-Fi network. Check the password."
            }
            FailReason::DeviceMismatch => {
                "That device doesn't match its pairing info. Try again near your own Zenboard."
            }
            FailReason::ClaimTimeout => "Setup timed out. Check your Wi-Fi details and try again.",
            FailReason::ClaimFailed => "Couldn't link the device to your account. Try again.",
            FailReason::Cancelled => "Setup cancelled.",
        }
    }

    // ── Internal ──────────────────────────────────────────────

    /// Merge freshly discovered peripherals into the candidate list:
    /// marker filter, dedupe by address (strongest reading wins), sort
    /// strongest first.
    fn collect_candidates(&mut self, central: &mut impl CentralPort) {
        for device in central.take_discovered() {
            if !is_provisionable_name(&device.name) {
                continue;
            }
            match self
                .candidates
                .iter_mut()
                .find(|c| c.address == device.address)
            {
                Some(existing) => {
                    if device.rssi > existing.rssi {
                        *existing = device;
                    }
                }
                None => {
                    debug!("candidate: {} ({} dBm)", device.name, device.rssi);
                    self.candidates.push(device);
                }
            }
        }
        self.candidates.sort_by(|a, b| b.rssi.cmp(&a.rssi));
    }

    /// Disconnect, remember why the attempt died, and go back to a
    /// fresh scan window so the user can retry in place.
    fn resume_scanning(
        &mut self,
        reason: FailReason,
        now_ms: u64,
        central: &mut impl CentralPort,
    ) {
        central.disconnect();
        self.target = None;
        self.last_failure = Some(reason);
        match central.start_scan() {
            Ok(()) => {
                self.phase = SessionPhase::Scanning {
                    deadline_ms: now_ms + SCAN_TIMEOUT_MS,
                };
            }
            Err(e) => {
                warn!("rescan start failed: {e}");
                self.phase = SessionPhase::Failed(FailReason::ScanFailed);
            }
        }
    }

    fn connect_to(
        &mut self,
        device: DiscoveredDevice,
        now_ms: u64,
        central: &mut impl CentralPort,
    ) {
        if matches!(self.phase, SessionPhase::Scanning { .. }) {
            central.stop_scan();
        }
        self.last_failure = None;
        match central.connect(&device.address) {
            Ok(()) => {
                self.target = Some(device);
                self.phase = SessionPhase::Connecting {
                    deadline_ms: now_ms + CONNECT_TIMEOUT_MS,
                };
            }
            Err(e) => {
                warn!("connect to {} failed: {e}", device.name);
                self.resume_scanning(FailReason::ConnectFailed, now_ms, central);
            }
        }
    }

    /// Fire-and-forget credentials write. The device may tear down the
    /// link while joining Wi-Fi, so delivery is confirmed through the
    /// status characteristic, never the write acknowledgement.
    fn deliver_credentials(&mut self, now_ms: u64, central: &mut impl CentralPort) {
        let payload = encode_credentials(&self.credentials);
        if let Err(e) = central.write_credentials(payload.as_bytes()) {
            debug!("credentials write unacknowledged ({e}), continuing");
        }
        info!("credentials delivered, waiting for claimable status");
        self.phase = SessionPhase::WaitingClaimable {
            deadline_ms: now_ms + CLAIM_DEADLINE_MS,
            next_poll_ms: now_ms + STATUS_POLL_INTERVAL_MS,
        };
    }

    fn poll_status(
        &mut self,
        now_ms: u64,
        central: &mut impl CentralPort,
        claim: &mut impl ClaimPort,
    ) {
        let raw = match central.read_status() {
            Ok(raw) => raw,
            Err(e) => {
                // The device may be mid-Wi-Fi-join with the radio busy.
                debug!("status read failed ({e}), will retry");
                return;
            }
        };

        let token = raw.trim_end_matches('\0');
        let status = match ProvisioningStatus::parse(token) {
            Ok(status) => status,
            Err(_) => {
                // Closed protocol: never act on a token we don't know.
                warn!("unknown status token '{token}', ignoring");
                return;
            }
        };
        debug!("device status: {status}");

        if status == ProvisioningStatus::WifiFailed {
            self.resume_scanning(FailReason::WifiRejected, now_ms, central);
            return;
        }
        if status.is_claimable() {
            self.attempt_claim(now_ms, central, claim);
        }
    }

    fn attempt_claim(
        &mut self,
        now_ms: u64,
        central: &mut impl CentralPort,
        claim: &mut impl ClaimPort,
    ) {
        let raw = match central.read_pairing_info() {
            Ok(raw) => raw,
            Err(e) => {
                debug!("pairing info read failed ({e}), will retry");
                return;
            }
        };
        let info = match PairingInfo::from_json(&raw) {
            Ok(info) => info,
            Err(e) => {
                warn!("pairing info malformed ({e}), will retry");
                return;
            }
        };

        // Anti-impersonation: the identity the device hands out must
        // match the name it advertised under. A mismatch means we are
        // talking to something other than the device the user picked —
        // never forward its token to the backend.
        let advertised = self.target.as_ref().map_or("", |t| t.name.as_str());
        if !name_matches_device(advertised, &info.device_id) {
            warn!(
                "pairing info names device {} but peripheral advertised '{advertised}'",
                info.device_id
            );
            self.resume_scanning(FailReason::DeviceMismatch, now_ms, central);
            return;
        }

        match claim.claim(&info.device_id, &info.token) {
            Ok(()) => {
                info!("device {} claimed", info.device_id);
                central.disconnect();
                self.phase = SessionPhase::Complete;
            }
            Err(e) => {
                warn!("claim failed: {e}");
                self.resume_scanning(FailReason::ClaimFailed, now_ms, central);
            }
        }
    }
}
