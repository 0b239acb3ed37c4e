//! Fuzz target: `ProvisioningStatus::parse` (status characteristic)
//!
//! The status protocol is a closed enumeration matched by whole-token
//! equality; the parser must accept exactly the seven known tokens and
//! nothing else.
//!
//! cargo fuzz run fuzz_status_token

#![no_main]

use libfuzzer_sys::fuzz_target;
use zenboard::protocol::ProvisioningStatus;

fuzz_target!(|data: &[u8]| {
    let Ok(token) = core::str::from_utf8(data) else {
        return;
    };

    match ProvisioningStatus::parse(token) {
        // Accepted tokens must be exactly the canonical serialization.
        Ok(status) => assert_eq!(token, status.as_str()),
        Err(_) => assert!(
            ProvisioningStatus::ALL.iter().all(|s| s.as_str() != token),
            "known token '{token}' was rejected"
        ),
    }
});
