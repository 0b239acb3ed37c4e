//! Stable hardware identifier.
//!
//! The registration call needs an identifier that survives factory reset
//! and reflash, so it comes from the base MAC burned into efuse rather
//! than anything in NVS. The simulation uses a fixed MAC so host tests
//! are deterministic.

use core::fmt::Write as _;

#[cfg(target_os = "espidf")]
fn read_mac() -> [u8; 6] {
    let mut mac = [0u8; 6];
    // SAFETY: esp_efuse_mac_get_default only writes the 6-byte buffer.
    let ret = unsafe { esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr()) };
    if ret != esp_idf_svc::sys::ESP_OK {
        log::warn!("device_id: efuse MAC read failed ({ret}), using zeros");
    }
    mac
}

#[cfg(not(target_os = "espidf"))]
fn read_mac() -> [u8; 6] {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Lowercase-hex MAC, sent as `hardwareId` at registration.
pub fn hardware_id() -> String {
    let mac = read_mac();
    let mut id = String::with_capacity(12);
    for byte in mac {
        let _ = write!(id, "{byte:02x}");
    }
    id
}
