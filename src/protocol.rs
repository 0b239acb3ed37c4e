//! Radio-link provisioning protocol shared by both sides.
//!
//! The device agent exposes one GATT service with three characteristics;
//! the pairing controller is the only client. Everything that crosses
//! that boundary — UUIDs, payload framing, status tokens, advertised-name
//! derivation — lives here so firmware and controller cannot drift apart.
//!
//! ## GATT Service Layout
//!
//! | Characteristic | UUID                                   | Perms       |
//! |----------------|----------------------------------------|-------------|
//! | Credentials    | `7e120002-43c6-4d91-9d4b-2a61f3e8c05d` | Write       |
//! | Pairing Info   | `7e120003-43c6-4d91-9d4b-2a61f3e8c05d` | Read+Notify |
//! | Status         | `7e120004-43c6-4d91-9d4b-2a61f3e8c05d` | Read+Notify |
//!
//! Credentials are written as `"<ssid>\n<password>"` UTF-8 in a single
//! payload. Pairing info is a JSON document `{"deviceId":"…","token":"…"}`.
//! Status is the exact ASCII token of [`ProvisioningStatus::as_str`],
//! matched by full equality — never by substring.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0x7e120001_43c6_4d91_9d4b_2a61f3e8c05d;
pub const CHAR_CREDENTIALS: u128 = 0x7e120002_43c6_4d91_9d4b_2a61f3e8c05d;
pub const CHAR_PAIRING: u128 = 0x7e120003_43c6_4d91_9d4b_2a61f3e8c05d;
pub const CHAR_STATUS: u128 = 0x7e120004_43c6_4d91_9d4b_2a61f3e8c05d;

/// Fixed advertised-name prefix; the scan filter matches it
/// case-insensitively.
pub const DEVICE_NAME_PREFIX: &str = "Zen";

/// Advertised name before the backend has assigned one at registration.
pub const SETUP_NAME: &str = "Zen-Setup";

/// Hex characters of the `deviceId` suffix embedded in the advertised name.
pub const NAME_SUFFIX_LEN: usize = 4;

pub const MAX_SSID_LEN: usize = 32;
pub const MAX_PASSWORD_LEN: usize = 64;
/// SSID + separator + password.
pub const MAX_CREDENTIALS_LEN: usize = MAX_SSID_LEN + 1 + MAX_PASSWORD_LEN;
pub const MAX_PAIRING_INFO_LEN: usize = 192;

// ───────────────────────────────────────────────────────────────
// Provisioning status — closed enumeration
// ───────────────────────────────────────────────────────────────

/// Device-owned provisioning status, mirrored over the status
/// characteristic. A closed set with an explicit serialization mapping:
/// `waiting_for_claim` and `wifi_connected` would both substring-match
/// shorter tokens, so both sides compare whole tokens only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvisioningStatus {
    #[default]
    Idle,
    Connecting,
    WifiConnected,
    WifiFailed,
    Registered,
    WaitingForClaim,
    Ready,
}

impl ProvisioningStatus {
    /// All values, in wire order. Used by the codec property tests.
    pub const ALL: [Self; 7] = [
        Self::Idle,
        Self::Connecting,
        Self::WifiConnected,
        Self::WifiFailed,
        Self::Registered,
        Self::WaitingForClaim,
        Self::Ready,
    ];

    /// Exact wire token for this status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::WifiConnected => "wifi_connected",
            Self::WifiFailed => "wifi_failed",
            Self::Registered => "registered",
            Self::WaitingForClaim => "waiting_for_claim",
            Self::Ready => "ready",
        }
    }

    /// Parse an exact wire token. Unknown tokens are an error, not a
    /// fallback — the controller must never act on a status it does not
    /// understand.
    pub fn parse(token: &str) -> Result<Self, ProtocolError> {
        match token {
            "idle" => Ok(Self::Idle),
            "connecting" => Ok(Self::Connecting),
            "wifi_connected" => Ok(Self::WifiConnected),
            "wifi_failed" => Ok(Self::WifiFailed),
            "registered" => Ok(Self::Registered),
            "waiting_for_claim" => Ok(Self::WaitingForClaim),
            "ready" => Ok(Self::Ready),
            _ => Err(ProtocolError::UnknownStatus),
        }
    }

    /// Whether the controller may read the pairing token in this status.
    /// `ready` is excluded: a device that already reached content (e.g.
    /// re-provisioned onto a new network) carries a stale token, and a
    /// claim against it can only fail.
    pub const fn is_claimable(self) -> bool {
        matches!(self, Self::Registered | Self::WaitingForClaim)
    }
}

impl fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ───────────────────────────────────────────────────────────────
// Wi-Fi credentials framing
// ───────────────────────────────────────────────────────────────

/// Wi-Fi credentials as staged by the radio adapter and applied by the
/// main loop. Fixed-capacity so the payload never heap-allocates in the
/// GATT callback path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredentials {
    pub ssid: heapless::String<MAX_SSID_LEN>,
    pub password: heapless::String<MAX_PASSWORD_LEN>,
}

impl WifiCredentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, ProtocolError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        let mut s = heapless::String::new();
        s.push_str(ssid).map_err(|()| ProtocolError::TooLong)?;
        let mut p = heapless::String::new();
        p.push_str(password).map_err(|()| ProtocolError::TooLong)?;
        Ok(Self { ssid: s, password: p })
    }
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ProtocolError> {
    if ssid.is_empty() || ssid.len() > MAX_SSID_LEN || !is_printable_ascii(ssid) {
        return Err(ProtocolError::MalformedCredentials);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ProtocolError> {
    // Empty password = open network. WPA2 minimum is enforced by the AP,
    // not here; the agent reports wifi_failed if the join is rejected.
    if password.len() > MAX_PASSWORD_LEN {
        return Err(ProtocolError::MalformedCredentials);
    }
    Ok(())
}

/// Frame credentials for the write characteristic: `"<ssid>\n<password>"`.
pub fn encode_credentials(creds: &WifiCredentials) -> heapless::String<MAX_CREDENTIALS_LEN> {
    let mut out = heapless::String::new();
    // Capacity is MAX_SSID_LEN + 1 + MAX_PASSWORD_LEN; cannot overflow.
    let _ = out.push_str(creds.ssid.as_str());
    let _ = out.push('\n');
    let _ = out.push_str(creds.password.as_str());
    out
}

/// Parse a credentials payload received on the write characteristic.
///
/// The first `\n` splits SSID from password; the password may itself be
/// empty (open network). A payload with no separator is treated as an
/// SSID-only write for an open network.
pub fn parse_credentials(raw: &[u8]) -> Result<WifiCredentials, ProtocolError> {
    if raw.len() > MAX_CREDENTIALS_LEN {
        return Err(ProtocolError::TooLong);
    }
    let text = core::str::from_utf8(raw).map_err(|_| ProtocolError::InvalidUtf8)?;
    let (ssid, password) = match text.split_once('\n') {
        Some((s, p)) => (s, p),
        None => (text, ""),
    };
    WifiCredentials::new(ssid, password)
}

// ───────────────────────────────────────────────────────────────
// Pairing info
// ───────────────────────────────────────────────────────────────

/// Payload of the pairing-info characteristic: the backend-assigned
/// device id and the short-lived pairing token minted at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingInfo {
    pub device_id: String,
    pub token: String,
}

impl PairingInfo {
    pub fn to_json(&self) -> String {
        // Serialization of two plain strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(raw: &[u8]) -> Result<Self, ProtocolError> {
        if raw.len() > MAX_PAIRING_INFO_LEN {
            return Err(ProtocolError::TooLong);
        }
        serde_json::from_slice(raw).map_err(|_| ProtocolError::MalformedPairingInfo)
    }
}

// ───────────────────────────────────────────────────────────────
// Advertised-name derivation
// ───────────────────────────────────────────────────────────────

/// Uppercase 4-hex-char suffix of a backend device id, as embedded in the
/// advertised name. Device ids shorter than four characters are used
/// whole. Ids carrying non-ASCII text have no derivable suffix and
/// return an empty string; both inputs to the suffix check arrive over
/// the radio, so nothing here may assume byte offsets are char
/// boundaries.
pub fn name_suffix(device_id: &str) -> heapless::String<NAME_SUFFIX_LEN> {
    let mut out = heapless::String::new();
    if !device_id.is_ascii() {
        return out;
    }
    let tail_start = device_id.len().saturating_sub(NAME_SUFFIX_LEN);
    for c in device_id[tail_start..].chars() {
        let _ = out.push(c.to_ascii_uppercase());
    }
    out
}

/// Full advertised name for a registered device: `Zen-XXXX`.
pub fn advertised_name(device_id: &str) -> heapless::String<24> {
    let mut name = heapless::String::new();
    use core::fmt::Write;
    let _ = write!(name, "{}-{}", DEVICE_NAME_PREFIX, name_suffix(device_id));
    name
}

/// Scan filter: does an advertised name look like a provisionable
/// device? Matches the `Zen-` marker case-insensitively; everything
/// after it is the device suffix (or `Setup` before registration).
pub fn is_provisionable_name(name: &str) -> bool {
    name.get(..DEVICE_NAME_PREFIX.len() + 1)
        .is_some_and(|head| head.eq_ignore_ascii_case("zen-"))
}

/// Anti-impersonation check: does the advertised name of the connected
/// peripheral end with the suffix derived from `device_id`?
/// Case-insensitive, full-suffix comparison. Ids with no derivable
/// suffix (empty or non-ASCII) never match, and a name whose tail is
/// not a char boundary cannot end in a hex suffix.
pub fn name_matches_device(advertised: &str, device_id: &str) -> bool {
    let expected = name_suffix(device_id);
    if expected.is_empty() {
        return false;
    }
    let Some(tail_start) = advertised.len().checked_sub(expected.len()) else {
        return false;
    };
    advertised
        .get(tail_start..)
        .is_some_and(|tail| tail.eq_ignore_ascii_case(expected.as_str()))
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_tokens_roundtrip() {
        for status in ProvisioningStatus::ALL {
            assert_eq!(ProvisioningStatus::parse(status.as_str()), Ok(status));
        }
    }

    #[test]
    fn status_rejects_substrings() {
        // The old substring protocol would have accepted these.
        assert!(ProvisioningStatus::parse("wifi").is_err());
        assert!(ProvisioningStatus::parse("registered_extra").is_err());
        assert!(ProvisioningStatus::parse("waiting").is_err());
        assert!(ProvisioningStatus::parse("").is_err());
    }

    #[test]
    fn claimable_statuses() {
        assert!(ProvisioningStatus::Registered.is_claimable());
        assert!(ProvisioningStatus::WaitingForClaim.is_claimable());
        assert!(!ProvisioningStatus::Connecting.is_claimable());
        assert!(!ProvisioningStatus::WifiFailed.is_claimable());
        // Already claimed elsewhere: the token on the characteristic is
        // stale, so ready must not invite a claim.
        assert!(!ProvisioningStatus::Ready.is_claimable());
    }

    #[test]
    fn credentials_roundtrip() {
        let creds = WifiCredentials::new("HomeWiFi", "hunter2hunter2").unwrap();
        let framed = encode_credentials(&creds);
        assert_eq!(framed.as_str(), "HomeWiFi\nhunter2hunter2");
        let parsed = parse_credentials(framed.as_bytes()).unwrap();
        assert_eq!(parsed, creds);
    }

    #[test]
    fn credentials_without_separator_is_open_network() {
        let parsed = parse_credentials(b"OpenCafe").unwrap();
        assert_eq!(parsed.ssid.as_str(), "OpenCafe");
        assert!(parsed.password.is_empty());
    }

    #[test]
    fn credentials_reject_empty_ssid() {
        assert_eq!(
            parse_credentials(b"\npassword1"),
            Err(ProtocolError::MalformedCredentials)
        );
    }

    #[test]
    fn credentials_reject_oversize() {
        let raw = vec![b'A'; MAX_CREDENTIALS_LEN + 1];
        assert_eq!(parse_credentials(&raw), Err(ProtocolError::TooLong));
    }

    #[test]
    fn credentials_reject_bad_utf8() {
        assert_eq!(
            parse_credentials(&[0xFF, 0xFE, b'\n', b'x']),
            Err(ProtocolError::InvalidUtf8)
        );
    }

    #[test]
    fn pairing_info_json_roundtrip() {
        let info = PairingInfo {
            device_id: "abc123ef".into(),
            token: "tok-1".into(),
        };
        let json = info.to_json();
        assert!(json.contains("\"deviceId\""));
        let back = PairingInfo::from_json(json.as_bytes()).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn pairing_info_rejects_garbage() {
        assert!(PairingInfo::from_json(b"not json").is_err());
        assert!(PairingInfo::from_json(b"{\"deviceId\":1}").is_err());
    }

    #[test]
    fn suffix_derivation_matches_backend_scenario() {
        // Registration scenario from the backend contract: deviceId
        // "abc123ef" advertises as "Zen-23EF".
        assert_eq!(name_suffix("abc123ef").as_str(), "23EF");
        assert_eq!(advertised_name("abc123ef").as_str(), "Zen-23EF");
    }

    #[test]
    fn name_match_accepts_own_device() {
        assert!(name_matches_device("Zen-23EF", "abc123ef"));
        assert!(name_matches_device("zen-23ef", "ABC123EF"));
    }

    #[test]
    fn name_match_rejects_other_device() {
        // A different device advertising nearby must never validate.
        assert!(!name_matches_device("Zen-23EF", "zzzz99aa"));
        assert!(!name_matches_device("Zen", "abc123ef"));
    }

    #[test]
    fn scan_filter_matches_marker_case_insensitively() {
        assert!(is_provisionable_name("Zen-23EF"));
        assert!(is_provisionable_name("zen-23ef"));
        assert!(is_provisionable_name("ZEN-Setup"));
        assert!(!is_provisionable_name("Zen"));
        assert!(!is_provisionable_name("Zenith-23EF"));
        assert!(!is_provisionable_name("LivingRoomTV"));
        assert!(!is_provisionable_name(""));
    }

    #[test]
    fn short_device_id_uses_whole_id() {
        assert_eq!(name_suffix("ab").as_str(), "AB");
        assert!(name_matches_device("Zen-AB", "ab"));
    }

    #[test]
    fn non_ascii_device_id_has_no_suffix() {
        assert!(name_suffix("€€").is_empty());
        assert!(name_suffix("abc1€").is_empty());
    }

    #[test]
    fn name_match_survives_multibyte_inputs() {
        // Both strings arrive over the radio; hostile peripherals get a
        // clean rejection, never a slice at a non-boundary offset.
        assert!(!name_matches_device("Zen-23EF", "€€"));
        assert!(!name_matches_device("Zen-€€", "abc123ef"));
        assert!(!name_matches_device("Zen-€EF", "abc123ef"));
        assert!(!name_matches_device("", ""));
    }
}
