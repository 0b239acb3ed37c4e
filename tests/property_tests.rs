//! Property tests for the wire protocol and the display signature.
//!
//! Runs on host (x86_64) only — proptest is not available for ESP32
//! targets. On ESP32, these tests are compiled out.

#![cfg(not(target_os = "espidf"))]

use proptest::prelude::*;
use zenboard::display::{CalendarItem, DisplayState, EmailItem, UiMode};
use zenboard::protocol::{
    MAX_PASSWORD_LEN, MAX_SSID_LEN, PairingInfo, ProvisioningStatus, WifiCredentials,
    advertised_name, encode_credentials, name_matches_device, parse_credentials,
};

// ── Status codec ──────────────────────────────────────────────

proptest! {
    /// Arbitrary tokens never panic the parser, and acceptance implies
    /// the token is exactly one of the seven canonical serializations.
    #[test]
    fn status_parse_is_total_and_exact(token in ".*") {
        match ProvisioningStatus::parse(&token) {
            Ok(status) => prop_assert_eq!(token, status.as_str()),
            Err(_) => prop_assert!(
                ProvisioningStatus::ALL.iter().all(|s| s.as_str() != token)
            ),
        }
    }
}

// ── Credentials framing ───────────────────────────────────────

proptest! {
    /// Every valid credential pair survives encode → parse unchanged.
    /// SSIDs are printable ASCII per the validator; passwords stay clear
    /// of `\n` so the first separator is unambiguous.
    #[test]
    fn credentials_roundtrip(
        ssid in "[A-Za-z0-9 _-]{1,32}",
        password in "[A-Za-z0-9!@#$%^&*()_+ .-]{0,64}",
    ) {
        let creds = WifiCredentials::new(&ssid, &password).unwrap();
        let framed = encode_credentials(&creds);
        let parsed = parse_credentials(framed.as_bytes()).unwrap();
        prop_assert_eq!(parsed, creds);
    }

    /// The parser never panics and only accepts in-bounds payloads.
    #[test]
    fn credentials_parse_is_total(raw in proptest::collection::vec(any::<u8>(), 0..256)) {
        if let Ok(creds) = parse_credentials(&raw) {
            prop_assert!(!creds.ssid.is_empty());
            prop_assert!(creds.ssid.len() <= MAX_SSID_LEN);
            prop_assert!(creds.password.len() <= MAX_PASSWORD_LEN);
        }
    }
}

// ── Pairing info ──────────────────────────────────────────────

proptest! {
    #[test]
    fn pairing_info_roundtrip(
        device_id in "[a-f0-9]{8,32}",
        token in "[A-Za-z0-9-]{1,64}",
    ) {
        let info = PairingInfo { device_id, token };
        let json = info.to_json();
        let parsed = PairingInfo::from_json(json.as_bytes()).unwrap();
        prop_assert_eq!(parsed, info);
    }

    /// The advertised name derived from any device id always passes the
    /// anti-impersonation check against that same id.
    #[test]
    fn derived_name_always_matches_its_device(device_id in "[a-f0-9]{4,32}") {
        let name = advertised_name(&device_id);
        prop_assert!(name_matches_device(&name, &device_id));
    }

    /// Changing the suffix breaks the match.
    #[test]
    fn name_with_wrong_suffix_never_matches(device_id in "[a-f0-9]{8,32}") {
        prop_assert!(!name_matches_device("Zen-ZZZZ", &device_id));
    }

    /// Both sides of the check are radio-supplied; any Unicode garbage
    /// must be rejected without panicking.
    #[test]
    fn name_match_is_total(advertised in ".{0,24}", device_id in ".{0,16}") {
        let matched = name_matches_device(&advertised, &device_id);
        if matched {
            prop_assert!(device_id.is_ascii());
        }
    }
}

// ── Display signature ─────────────────────────────────────────

fn arb_calendar_item() -> impl Strategy<Value = CalendarItem> {
    ("[A-Za-z0-9:TZ+-]{0,25}", "[A-Za-z ]{1,20}", "[A-Za-z0-9 ]{0,12}").prop_map(
        |(start, summary, location)| CalendarItem {
            start,
            summary,
            location,
        },
    )
}

fn arb_email_item() -> impl Strategy<Value = EmailItem> {
    ("[a-z]{1,8}@[a-z]{1,8}", "[A-Za-z ]{1,20}", "[A-Za-z ]{0,20}").prop_map(
        |(from, subject, snippet)| EmailItem {
            from,
            subject,
            snippet,
        },
    )
}

fn arb_display_state() -> impl Strategy<Value = DisplayState> {
    (
        any::<bool>(),
        "[0-2][0-9]:[0-5][0-9]",
        proptest::collection::vec(arb_calendar_item(), 0..=3),
        proptest::collection::vec(arb_email_item(), 0..=3),
    )
        .prop_map(|(email_mode, clock, calendar, emails)| {
            let mut state = DisplayState {
                mode: if email_mode { UiMode::Email } else { UiMode::Calendar },
                clock_hhmm: heapless::String::try_from(clock.as_str()).unwrap(),
                ..Default::default()
            };
            for item in calendar {
                let _ = state.calendar.push(item);
            }
            for item in emails {
                let _ = state.emails.push(item);
            }
            state
        })
}

proptest! {
    /// The signature is a pure function of the state.
    #[test]
    fn signature_is_deterministic(state in arb_display_state()) {
        prop_assert_eq!(state.signature(), state.signature());
    }

    /// Items on the hidden panel never influence the signature, so they
    /// can never flash the e-ink panel.
    #[test]
    fn hidden_panel_is_invisible_to_signature(
        state in arb_display_state(),
        extra in arb_email_item(),
    ) {
        prop_assume!(state.mode == UiMode::Calendar);
        let mut changed = state.clone();
        changed.emails.clear();
        let _ = changed.emails.push(extra);
        prop_assert_eq!(state.signature(), changed.signature());
    }

    /// Any visible difference produces a different signature.
    #[test]
    fn visible_items_are_always_distinguished(
        state in arb_display_state(),
        summary in "[A-Za-z ]{1,20}",
    ) {
        prop_assume!(state.mode == UiMode::Calendar);
        prop_assume!(!state.calendar.is_empty());
        prop_assume!(state.calendar[0].summary != summary);
        let mut changed = state.clone();
        changed.calendar[0].summary = summary;
        prop_assert_ne!(state.signature(), changed.signature());
    }
}
