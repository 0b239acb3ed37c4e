//! Fuzz target: `parse_credentials` (radio write characteristic)
//!
//! The credentials characteristic accepts arbitrary central-written
//! bytes, so the parser is the hostile-input surface of the peripheral.
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - Accepted payloads respect the SSID/password bounds
//! - Accepted payloads re-encode to a frame the parser accepts again
//!
//! cargo fuzz run fuzz_credentials

#![no_main]

use libfuzzer_sys::fuzz_target;
use zenboard::protocol::{
    MAX_CREDENTIALS_LEN, MAX_PASSWORD_LEN, MAX_SSID_LEN, encode_credentials, parse_credentials,
};

fuzz_target!(|data: &[u8]| {
    let Ok(creds) = parse_credentials(data) else {
        return;
    };

    // Anything the parser accepted must be inside the protocol bounds.
    assert!(!creds.ssid.is_empty(), "empty SSID must be rejected");
    assert!(creds.ssid.len() <= MAX_SSID_LEN);
    assert!(creds.password.len() <= MAX_PASSWORD_LEN);

    // And must survive a re-encode: the frame the companion app would
    // send for these credentials parses back to the same value.
    let framed = encode_credentials(&creds);
    assert!(framed.len() <= MAX_CREDENTIALS_LEN);
    let reparsed = parse_credentials(framed.as_bytes()).expect("re-encoded frame must parse");
    assert_eq!(reparsed, creds);
});
