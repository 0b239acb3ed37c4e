//! Companion-app pairing flow against scripted central/claim mocks.
//!
//! Exercises the full scan → connect → credentials → claimable → claim
//! walk, every failure exit, and the anti-impersonation check.

use zenboard::CommsError;
use zenboard::pairing::{
    CLAIM_DEADLINE_MS, CONNECT_TIMEOUT_MS, CentralPort, ClaimPort, DiscoveredDevice, FailReason,
    PairingSession, SCAN_TIMEOUT_MS, STATUS_POLL_INTERVAL_MS, SessionPhase,
};
use zenboard::protocol::{MAX_PAIRING_INFO_LEN, WifiCredentials};

// ───────────────────────────────────────────────────────────────
// Mocks
// ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct MockCentral {
    scan_fails: bool,
    stop_scan_calls: u32,
    /// Drained on the next `take_discovered`.
    discovered: Vec<DiscoveredDevice>,
    connect_fails: bool,
    connect_calls: Vec<String>,
    /// When set, `connect` immediately reports the link as up.
    auto_connect: bool,
    connected: bool,
    disconnect_calls: u32,
    written: Vec<Vec<u8>>,
    /// Raw status characteristic; `None` simulates a failed read.
    status: Option<&'static str>,
    /// Raw pairing-info characteristic; `None` simulates a failed read.
    pairing_json: Option<String>,
    pairing_reads: u32,
}

impl CentralPort for MockCentral {
    fn start_scan(&mut self) -> Result<(), CommsError> {
        if self.scan_fails {
            Err(CommsError::RadioInitFailed)
        } else {
            Ok(())
        }
    }
    fn stop_scan(&mut self) {
        self.stop_scan_calls += 1;
    }
    fn take_discovered(&mut self) -> Vec<DiscoveredDevice> {
        std::mem::take(&mut self.discovered)
    }
    fn connect(&mut self, address: &str) -> Result<(), CommsError> {
        self.connect_calls.push(address.to_string());
        if self.connect_fails {
            return Err(CommsError::RadioInitFailed);
        }
        if self.auto_connect {
            self.connected = true;
        }
        Ok(())
    }
    fn is_connected(&self) -> bool {
        self.connected
    }
    fn disconnect(&mut self) {
        self.disconnect_calls += 1;
        self.connected = false;
    }
    fn write_credentials(&mut self, payload: &[u8]) -> Result<(), CommsError> {
        self.written.push(payload.to_vec());
        Ok(())
    }
    fn read_status(&mut self) -> Result<heapless::String<32>, CommsError> {
        let raw = self.status.ok_or(CommsError::BadResponse)?;
        heapless::String::try_from(raw).map_err(|()| CommsError::BadResponse)
    }
    fn read_pairing_info(&mut self) -> Result<heapless::Vec<u8, MAX_PAIRING_INFO_LEN>, CommsError> {
        self.pairing_reads += 1;
        let json = self.pairing_json.as_ref().ok_or(CommsError::BadResponse)?;
        heapless::Vec::from_slice(json.as_bytes()).map_err(|()| CommsError::BadResponse)
    }
}

#[derive(Default)]
struct MockClaim {
    fails: bool,
    calls: Vec<(String, String)>,
}

impl ClaimPort for MockClaim {
    fn claim(&mut self, device_id: &str, token: &str) -> Result<(), CommsError> {
        self.calls.push((device_id.to_string(), token.to_string()));
        if self.fails {
            Err(CommsError::HttpStatus(403))
        } else {
            Ok(())
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Harness
// ───────────────────────────────────────────────────────────────

fn dev(name: &str, address: &str, rssi: i8) -> DiscoveredDevice {
    DiscoveredDevice {
        name: name.to_string(),
        address: address.to_string(),
        rssi,
    }
}

fn creds() -> WifiCredentials {
    WifiCredentials::new("HomeWiFi", "hunter2hunter2").unwrap()
}

fn pairing_json(device_id: &str, token: &str) -> String {
    format!(r#"{{"deviceId":"{device_id}","token":"{token}"}}"#)
}

/// A central that will walk the happy path once driven.
fn ready_central() -> MockCentral {
    MockCentral {
        discovered: vec![dev("Zen-23EF", "aa:bb", -50)],
        auto_connect: true,
        status: Some("waiting_for_claim"),
        pairing_json: Some(pairing_json("abc123ef", "tok-1")),
        ..Default::default()
    }
}

/// Drive the session from `from_ms` (exclusive) to `to_ms` (inclusive)
/// at the status poll cadence, stopping early on a terminal phase.
fn run_until(
    session: &mut PairingSession,
    central: &mut MockCentral,
    claim: &mut MockClaim,
    from_ms: u64,
    to_ms: u64,
) -> SessionPhase {
    let mut t = from_ms + STATUS_POLL_INTERVAL_MS;
    loop {
        let phase = session.tick(t, central, claim);
        if session.is_terminal() || t >= to_ms {
            return phase;
        }
        t += STATUS_POLL_INTERVAL_MS;
    }
}

// ───────────────────────────────────────────────────────────────
// Scenarios
// ───────────────────────────────────────────────────────────────

#[test]
fn happy_path_claims_the_device() {
    let mut central = ready_central();
    let mut claim = MockClaim::default();
    let mut session = PairingSession::start(creds(), 0, &mut central);
    assert!(matches!(session.phase(), SessionPhase::Scanning { .. }));

    // The window closes with the device on the list; nothing connects
    // until the user picks it.
    let phase = run_until(&mut session, &mut central, &mut claim, 0, SCAN_TIMEOUT_MS);
    assert_eq!(phase, SessionPhase::AwaitingSelection);
    assert!(central.connect_calls.is_empty());

    let candidate = session.candidates()[0].clone();
    session.choose(candidate, SCAN_TIMEOUT_MS, &mut central);
    let phase = run_until(
        &mut session,
        &mut central,
        &mut claim,
        SCAN_TIMEOUT_MS,
        SCAN_TIMEOUT_MS + 5_000,
    );
    assert_eq!(phase, SessionPhase::Complete);

    // One scan stop (at window close), credentials framed as
    // ssid\npassword, exactly one claim with the token from the pairing
    // characteristic.
    assert_eq!(central.stop_scan_calls, 1);
    assert_eq!(central.written, vec![b"HomeWiFi\nhunter2hunter2".to_vec()]);
    assert_eq!(claim.calls, vec![("abc123ef".to_string(), "tok-1".to_string())]);
    assert_eq!(central.disconnect_calls, 1);
}

#[test]
fn scan_window_close_never_connects_without_selection() {
    // Two provisionable devices in range and no user pick: the session
    // must not bind either one, let alone hand it the Wi-Fi password.
    let mut central = MockCentral {
        discovered: vec![dev("Zen-AAAA", "AA", -40), dev("Zen-BBBB", "BB", -60)],
        auto_connect: true,
        status: Some("waiting_for_claim"),
        pairing_json: Some(pairing_json("xxxxaaaa", "tok-x")),
        ..Default::default()
    };
    let mut claim = MockClaim::default();
    let mut session = PairingSession::start(creds(), 0, &mut central);

    let phase = run_until(
        &mut session,
        &mut central,
        &mut claim,
        0,
        SCAN_TIMEOUT_MS + 10_000,
    );
    assert_eq!(phase, SessionPhase::AwaitingSelection);
    assert!(central.connect_calls.is_empty());
    assert!(central.written.is_empty());
    assert!(claim.calls.is_empty());
    assert_eq!(session.candidates().len(), 2);
}

#[test]
fn choose_skips_the_scan_window() {
    let mut central = ready_central();
    let mut claim = MockClaim::default();
    let mut session = PairingSession::start(creds(), 0, &mut central);

    session.tick(100, &mut central, &mut claim);
    let candidate = session.candidates()[0].clone();
    session.choose(candidate, 200, &mut central);
    assert!(matches!(session.phase(), SessionPhase::Connecting { .. }));
    assert_eq!(central.connect_calls, vec!["aa:bb"]);

    let phase = run_until(&mut session, &mut central, &mut claim, 200, 5_000);
    assert_eq!(phase, SessionPhase::Complete);
}

#[test]
fn impersonating_device_is_never_claimed() {
    let mut central = ready_central();
    // The pairing payload names a different device than the peripheral
    // advertised under. Its token must never reach the backend.
    central.pairing_json = Some(pairing_json("zzzz99aa", "stolen-token"));
    let mut claim = MockClaim::default();
    let mut session = PairingSession::start(creds(), 0, &mut central);

    session.tick(100, &mut central, &mut claim);
    let candidate = session.candidates()[0].clone();
    session.choose(candidate, 200, &mut central);
    session.tick(300, &mut central, &mut claim); // link up, credentials written
    session.tick(900, &mut central, &mut claim); // first status poll

    // The abort disconnects and resumes scanning; the stolen token was
    // never forwarded.
    assert!(matches!(session.phase(), SessionPhase::Scanning { .. }));
    assert_eq!(session.last_failure(), Some(FailReason::DeviceMismatch));
    assert!(claim.calls.is_empty());
    assert_eq!(central.disconnect_calls, 1);
}

#[test]
fn ready_device_is_never_reclaimed() {
    let mut central = ready_central();
    // A device someone already claimed (say, re-provisioned onto a new
    // network) reports ready; the token on its characteristic is stale.
    central.status = Some("ready");
    let mut claim = MockClaim::default();
    let mut session = PairingSession::start(creds(), 0, &mut central);

    session.tick(100, &mut central, &mut claim);
    let candidate = session.candidates()[0].clone();
    session.choose(candidate, 200, &mut central);
    run_until(&mut session, &mut central, &mut claim, 200, 10_000);

    assert!(matches!(session.phase(), SessionPhase::WaitingClaimable { .. }));
    assert_eq!(central.pairing_reads, 0);
    assert!(claim.calls.is_empty());
}

#[test]
fn multibyte_pairing_id_is_rejected_cleanly() {
    let mut central = ready_central();
    // A quirky or hostile peripheral can put any UTF-8 in its pairing
    // payload; the suffix check must reject it, not crash on it.
    central.pairing_json = Some(pairing_json("€€", "tok-1"));
    let mut claim = MockClaim::default();
    let mut session = PairingSession::start(creds(), 0, &mut central);

    session.tick(100, &mut central, &mut claim);
    let candidate = session.candidates()[0].clone();
    session.choose(candidate, 200, &mut central);
    session.tick(300, &mut central, &mut claim);
    session.tick(900, &mut central, &mut claim); // first status poll

    assert!(matches!(session.phase(), SessionPhase::Scanning { .. }));
    assert_eq!(session.last_failure(), Some(FailReason::DeviceMismatch));
    assert!(claim.calls.is_empty());
}

#[test]
fn connect_attempt_is_bounded() {
    let mut central = ready_central();
    central.auto_connect = false;
    let mut claim = MockClaim::default();
    let mut session = PairingSession::start(creds(), 0, &mut central);

    session.tick(100, &mut central, &mut claim);
    let candidate = session.candidates()[0].clone();
    session.choose(candidate, 1_000, &mut central);

    // One millisecond short of the deadline: still trying.
    session.tick(1_000 + CONNECT_TIMEOUT_MS - 1, &mut central, &mut claim);
    assert!(matches!(session.phase(), SessionPhase::Connecting { .. }));

    let phase = session.tick(1_000 + CONNECT_TIMEOUT_MS, &mut central, &mut claim);
    assert!(matches!(phase, SessionPhase::Scanning { .. }));
    assert_eq!(session.last_failure(), Some(FailReason::ConnectTimeout));
    assert_eq!(central.disconnect_calls, 1);
}

#[test]
fn claim_window_expires_without_token_read() {
    let mut central = ready_central();
    // Device stays stuck joining Wi-Fi; never claimable, never failed.
    central.status = Some("connecting");
    let mut claim = MockClaim::default();
    let mut session = PairingSession::start(creds(), 0, &mut central);

    session.tick(100, &mut central, &mut claim);
    let candidate = session.candidates()[0].clone();
    session.choose(candidate, 200, &mut central);

    let phase = run_until(
        &mut session,
        &mut central,
        &mut claim,
        200,
        200 + CLAIM_DEADLINE_MS + 1_000,
    );
    assert!(matches!(phase, SessionPhase::Scanning { .. }));
    assert_eq!(session.last_failure(), Some(FailReason::ClaimTimeout));
    assert_eq!(central.disconnect_calls, 1);
    // The pairing characteristic was never touched.
    assert_eq!(central.pairing_reads, 0);
    assert!(claim.calls.is_empty());
}

#[test]
fn wifi_rejection_resumes_scanning() {
    let mut central = ready_central();
    central.status = Some("wifi_failed");
    let mut claim = MockClaim::default();
    let mut session = PairingSession::start(creds(), 0, &mut central);

    session.tick(100, &mut central, &mut claim);
    let candidate = session.candidates()[0].clone();
    session.choose(candidate, 200, &mut central);
    session.tick(300, &mut central, &mut claim);
    session.tick(900, &mut central, &mut claim); // first status poll

    assert!(matches!(session.phase(), SessionPhase::Scanning { .. }));
    assert_eq!(session.last_failure(), Some(FailReason::WifiRejected));
    assert!(claim.calls.is_empty());
    assert_eq!(central.disconnect_calls, 1);
}

#[test]
fn empty_scan_window_reports_no_device() {
    let mut central = MockCentral::default();
    let mut claim = MockClaim::default();
    let mut session = PairingSession::start(creds(), 0, &mut central);

    session.tick(SCAN_TIMEOUT_MS - 1, &mut central, &mut claim);
    assert!(matches!(session.phase(), SessionPhase::Scanning { .. }));

    let phase = session.tick(SCAN_TIMEOUT_MS, &mut central, &mut claim);
    assert_eq!(phase, SessionPhase::Failed(FailReason::NoDeviceFound));
    assert_eq!(central.stop_scan_calls, 1);
}

#[test]
fn scan_start_failure_is_terminal() {
    let mut central = MockCentral {
        scan_fails: true,
        ..Default::default()
    };
    let session = PairingSession::start(creds(), 0, &mut central);
    assert_eq!(session.phase(), SessionPhase::Failed(FailReason::ScanFailed));
}

#[test]
fn candidates_are_filtered_deduped_and_ranked() {
    let mut central = MockCentral::default();
    central.discovered = vec![
        dev("Zen-AAAA", "a", -70),
        dev("Kettle-1", "k", -30), // no marker, filtered
        dev("Zen-BBBB", "b", -55),
    ];
    let mut claim = MockClaim::default();
    let mut session = PairingSession::start(creds(), 0, &mut central);
    session.tick(100, &mut central, &mut claim);

    // A stronger reading for a known address replaces it.
    central.discovered = vec![dev("Zen-AAAA", "a", -40)];
    session.tick(200, &mut central, &mut claim);

    let names: Vec<&str> = session.candidates().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Zen-AAAA", "Zen-BBBB"]);
    assert_eq!(session.candidates()[0].rssi, -40);

    // The window close freezes the ranked list for the picker.
    session.tick(SCAN_TIMEOUT_MS, &mut central, &mut claim);
    assert_eq!(session.phase(), SessionPhase::AwaitingSelection);
    assert!(central.connect_calls.is_empty());

    // Choosing from the frozen list connects.
    central.auto_connect = true;
    let second = session.candidates()[1].clone();
    session.choose(second, SCAN_TIMEOUT_MS + 100, &mut central);
    assert_eq!(central.connect_calls, vec!["b"]);
}

#[test]
fn unknown_status_token_is_ignored() {
    let mut central = ready_central();
    central.status = Some("provisioned!");
    let mut claim = MockClaim::default();
    let mut session = PairingSession::start(creds(), 0, &mut central);

    session.tick(100, &mut central, &mut claim);
    let candidate = session.candidates()[0].clone();
    session.choose(candidate, 200, &mut central);
    run_until(&mut session, &mut central, &mut claim, 200, 10_000);

    // Closed protocol: an unknown token must neither claim nor fail.
    assert!(matches!(session.phase(), SessionPhase::WaitingClaimable { .. }));
    assert_eq!(central.pairing_reads, 0);

    // Once a known claimable token appears the flow resumes.
    central.status = Some("registered");
    let phase = run_until(&mut session, &mut central, &mut claim, 10_000, 15_000);
    assert_eq!(phase, SessionPhase::Complete);
}

#[test]
fn status_read_errors_are_retried() {
    let mut central = ready_central();
    central.status = None; // radio busy mid-join
    let mut claim = MockClaim::default();
    let mut session = PairingSession::start(creds(), 0, &mut central);

    session.tick(100, &mut central, &mut claim);
    let candidate = session.candidates()[0].clone();
    session.choose(candidate, 200, &mut central);
    run_until(&mut session, &mut central, &mut claim, 200, 5_000);
    assert!(matches!(session.phase(), SessionPhase::WaitingClaimable { .. }));

    central.status = Some("waiting_for_claim");
    let phase = run_until(&mut session, &mut central, &mut claim, 5_000, 10_000);
    assert_eq!(phase, SessionPhase::Complete);
}

#[test]
fn rejected_claim_resumes_scanning_for_retry() {
    let mut central = ready_central();
    let mut claim = MockClaim {
        fails: true,
        ..Default::default()
    };
    let mut session = PairingSession::start(creds(), 0, &mut central);

    session.tick(100, &mut central, &mut claim);
    let candidate = session.candidates()[0].clone();
    session.choose(candidate, 200, &mut central);
    session.tick(300, &mut central, &mut claim);
    session.tick(900, &mut central, &mut claim); // poll → claim → rejected

    assert!(matches!(session.phase(), SessionPhase::Scanning { .. }));
    assert_eq!(session.last_failure(), Some(FailReason::ClaimFailed));
    assert_eq!(claim.calls.len(), 1);
    assert_eq!(central.disconnect_calls, 1);

    // A later attempt — rediscover, re-pick, claim accepted — clears
    // the recorded failure.
    claim.fails = false;
    central.discovered = vec![dev("Zen-23EF", "aa:bb", -50)];
    session.tick(1_400, &mut central, &mut claim);
    let candidate = session.candidates()[0].clone();
    session.choose(candidate, 1_500, &mut central);
    let phase = run_until(&mut session, &mut central, &mut claim, 1_500, 6_000);
    assert_eq!(phase, SessionPhase::Complete);
    assert!(session.last_failure().is_none());
}

#[test]
fn cancel_during_scan_stops_scanning() {
    let mut central = MockCentral::default();
    let mut session = PairingSession::start(creds(), 0, &mut central);
    session.cancel(&mut central);
    assert_eq!(session.phase(), SessionPhase::Failed(FailReason::Cancelled));
    assert_eq!(central.stop_scan_calls, 1);
}

#[test]
fn cancel_while_connected_disconnects() {
    let mut central = ready_central();
    let mut claim = MockClaim::default();
    let mut session = PairingSession::start(creds(), 0, &mut central);
    session.tick(100, &mut central, &mut claim);
    let candidate = session.candidates()[0].clone();
    session.choose(candidate, 200, &mut central);
    session.tick(300, &mut central, &mut claim);
    assert!(matches!(session.phase(), SessionPhase::WaitingClaimable { .. }));

    session.cancel(&mut central);
    assert_eq!(session.phase(), SessionPhase::Failed(FailReason::Cancelled));
    assert_eq!(central.disconnect_calls, 1);
}

#[test]
fn cancel_while_awaiting_selection_ends_the_session() {
    let mut central = ready_central();
    let mut claim = MockClaim::default();
    let mut session = PairingSession::start(creds(), 0, &mut central);
    run_until(&mut session, &mut central, &mut claim, 0, SCAN_TIMEOUT_MS);
    assert_eq!(session.phase(), SessionPhase::AwaitingSelection);

    session.cancel(&mut central);
    assert_eq!(session.phase(), SessionPhase::Failed(FailReason::Cancelled));
    // The scan was already stopped at the window close.
    assert_eq!(central.stop_scan_calls, 1);
    assert_eq!(central.disconnect_calls, 0);
}

#[test]
fn cancel_after_completion_is_a_no_op() {
    let mut central = ready_central();
    let mut claim = MockClaim::default();
    let mut session = PairingSession::start(creds(), 0, &mut central);
    session.tick(100, &mut central, &mut claim);
    let candidate = session.candidates()[0].clone();
    session.choose(candidate, 200, &mut central);
    run_until(&mut session, &mut central, &mut claim, 200, 5_000);
    assert_eq!(session.phase(), SessionPhase::Complete);

    session.cancel(&mut central);
    assert_eq!(session.phase(), SessionPhase::Complete);
}
