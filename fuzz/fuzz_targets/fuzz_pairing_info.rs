//! Fuzz target: `PairingInfo::from_json` (pairing-info characteristic)
//!
//! The companion app reads this characteristic from an unauthenticated
//! peripheral, so the JSON decoder must hold up against arbitrary bytes.
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - Oversize payloads are rejected before parsing
//! - Accepted documents roundtrip through `to_json`
//!
//! cargo fuzz run fuzz_pairing_info

#![no_main]

use libfuzzer_sys::fuzz_target;
use zenboard::protocol::{MAX_PAIRING_INFO_LEN, PairingInfo};

fuzz_target!(|data: &[u8]| {
    let result = PairingInfo::from_json(data);

    if data.len() > MAX_PAIRING_INFO_LEN {
        assert!(result.is_err(), "oversize payload must be rejected");
        return;
    }

    let Ok(info) = result else {
        return;
    };

    let json = info.to_json();
    let reparsed = PairingInfo::from_json(json.as_bytes()).expect("roundtrip must parse");
    assert_eq!(reparsed.device_id, info.device_id);
    assert_eq!(reparsed.token, info.token);
});
