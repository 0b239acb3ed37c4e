//! Radio-link provisioning adapter.
//!
//! Implements [`RadioPort`] — the hexagonal boundary for the GATT
//! provisioning service the companion app talks to.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via `esp_idf_svc::sys`.
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! Characteristic UUIDs and payload framing live in [`crate::protocol`];
//! this adapter only moves bytes. Writes arrive in the Bluedroid task,
//! get staged into a buffer, and are collected by the main loop via
//! `take_pending_credentials` — the stack task never touches domain
//! state.

use log::info;

use crate::agent::ports::RadioPort;
use crate::error::CommsError;
use crate::protocol::{self, PairingInfo, ProvisioningStatus, WifiCredentials};

#[cfg(target_os = "espidf")]
use crate::protocol::MAX_CREDENTIALS_LEN;
#[cfg(target_os = "espidf")]
use log::{error, warn};

// ───────────────────────────────────────────────────────────────
// Radio state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Idle,
    Advertising,
    Connected,
    Failed,
}

// ── ESP-IDF static state (callback bridge) ────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures. These statics bridge the callback context to the adapter.

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

#[cfg(target_os = "espidf")]
static GATTS_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static CONN_ID: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static CRED_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static PAIRING_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static STATUS_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static CHAR_STEP: AtomicU32 = AtomicU32::new(0);

// Credentials written by the central, staged for the main loop.
// GATTS callbacks run in the Bluedroid task (not ISR), so std Mutex is
// safe.
#[cfg(target_os = "espidf")]
static CRED_BUF: std::sync::Mutex<heapless::Vec<u8, MAX_CREDENTIALS_LEN>> =
    std::sync::Mutex::new(heapless::Vec::new());

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    unsafe {
        t.uuid.uuid128 = uuid.to_le_bytes();
    }
    t
}

#[cfg(target_os = "espidf")]
unsafe fn add_gatt_char(svc_handle: u16, uuid: u128, perm: u32, prop: u32) {
    use esp_idf_svc::sys::*;
    let mut char_uuid = uuid128_to_esp(uuid);
    esp_ble_gatts_add_char(
        svc_handle,
        &mut char_uuid,
        perm as esp_gatt_perm_t,
        prop as esp_gatt_char_prop_t,
        core::ptr::null_mut(),
        core::ptr::null_mut(),
    );
}

/// Consume raw credential bytes written by a central.
#[cfg(target_os = "espidf")]
fn take_credentials_data() -> Option<heapless::Vec<u8, MAX_CREDENTIALS_LEN>> {
    CRED_BUF.lock().ok().and_then(|mut buf| {
        if buf.is_empty() {
            return None;
        }
        let data = buf.clone();
        buf.clear();
        Some(data)
    })
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    _param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            log::info!("radio GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            log::info!("radio GAP: advertising stopped");
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;

    GATTS_IF.store(gatts_if as u32, AtomicOrdering::Relaxed);

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            log::info!("radio GATTS: app registered (if={})", gatts_if);
            let svc_uuid = uuid128_to_esp(protocol::SERVICE_UUID);
            let mut svc_id = esp_gatt_srvc_id_t {
                id: esp_gatt_id_t {
                    uuid: svc_uuid,
                    inst_id: 0,
                },
                is_primary: true,
            };
            esp_ble_gatts_create_service(gatts_if, &mut svc_id, 10);
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
            let p = &(*param).create;
            let svc_handle = p.service_handle;
            SVC_HANDLE.store(svc_handle as u32, AtomicOrdering::Relaxed);
            esp_ble_gatts_start_service(svc_handle);
            CHAR_STEP.store(1, AtomicOrdering::Relaxed);
            add_gatt_char(
                svc_handle,
                protocol::CHAR_CREDENTIALS,
                ESP_GATT_PERM_WRITE,
                ESP_GATT_CHAR_PROP_BIT_WRITE,
            );
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
            let p = &(*param).add_char;
            let handle = p.attr_handle;
            let svc_handle = SVC_HANDLE.load(AtomicOrdering::Relaxed) as u16;
            match CHAR_STEP.load(AtomicOrdering::Relaxed) {
                1 => {
                    CRED_CHAR_HANDLE.store(handle as u32, AtomicOrdering::Relaxed);
                    CHAR_STEP.store(2, AtomicOrdering::Relaxed);
                    add_gatt_char(
                        svc_handle,
                        protocol::CHAR_PAIRING,
                        ESP_GATT_PERM_READ,
                        ESP_GATT_CHAR_PROP_BIT_READ | ESP_GATT_CHAR_PROP_BIT_NOTIFY,
                    );
                }
                2 => {
                    PAIRING_CHAR_HANDLE.store(handle as u32, AtomicOrdering::Relaxed);
                    CHAR_STEP.store(3, AtomicOrdering::Relaxed);
                    add_gatt_char(
                        svc_handle,
                        protocol::CHAR_STATUS,
                        ESP_GATT_PERM_READ,
                        ESP_GATT_CHAR_PROP_BIT_READ | ESP_GATT_CHAR_PROP_BIT_NOTIFY,
                    );
                }
                3 => {
                    STATUS_CHAR_HANDLE.store(handle as u32, AtomicOrdering::Relaxed);
                    CHAR_STEP.store(4, AtomicOrdering::Relaxed);
                    log::info!("radio GATTS: all characteristics registered");
                }
                _ => {}
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            let p = &(*param).connect;
            CONN_ID.store(p.conn_id as u32, AtomicOrdering::Relaxed);
            crate::events::push_event(crate::events::Event::RadioConnected);
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            CONN_ID.store(0, AtomicOrdering::Relaxed);
            crate::events::push_event(crate::events::Event::RadioDisconnected);
            // Keep advertising so the app can always re-provision.
            let mut adv_params = esp_ble_adv_params_t {
                adv_int_min: 0x20,
                adv_int_max: 0x40,
                adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
                own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
                channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
                adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
                ..core::mem::zeroed()
            };
            esp_ble_gap_start_advertising(&mut adv_params);
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
            let p = &(*param).write;
            if p.handle as u32 == CRED_CHAR_HANDLE.load(AtomicOrdering::Relaxed) {
                let data = core::slice::from_raw_parts(p.value, p.len as usize);
                if let Ok(mut buf) = CRED_BUF.lock() {
                    buf.clear();
                    let _ = buf.extend_from_slice(data);
                }
                crate::events::push_event(crate::events::Event::CredentialsWritten);
            }
        }
        _ => {}
    }
}

// ───────────────────────────────────────────────────────────────
// Radio adapter
// ───────────────────────────────────────────────────────────────

pub struct RadioGattAdapter {
    state: RadioState,
    device_name: heapless::String<24>,
    status: ProvisioningStatus,
    /// Host sim: credentials staged by `sim_write_credentials`.
    #[cfg(not(target_os = "espidf"))]
    sim_pending: Option<WifiCredentials>,
    /// Host sim: last pairing-info JSON published.
    #[cfg(not(target_os = "espidf"))]
    sim_pairing_json: Option<String>,
}

impl RadioGattAdapter {
    pub fn new() -> Self {
        Self {
            state: RadioState::Idle,
            device_name: heapless::String::new(),
            status: ProvisioningStatus::Idle,
            #[cfg(not(target_os = "espidf"))]
            sim_pending: None,
            #[cfg(not(target_os = "espidf"))]
            sim_pairing_json: None,
        }
    }

    pub fn state(&self) -> RadioState {
        self.state
    }

    pub fn status(&self) -> ProvisioningStatus {
        self.status
    }

    // ── Host simulation hooks ─────────────────────────────────

    /// Stage a raw credentials write, as a central would. Malformed
    /// payloads are rejected the same way the write callback drops them.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_write_credentials(&mut self, raw: &[u8]) -> Result<(), crate::ProtocolError> {
        let creds = protocol::parse_credentials(raw)?;
        self.sim_pending = Some(creds);
        Ok(())
    }

    /// Pairing-info JSON as a central would read it.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_pairing_json(&self) -> Option<&str> {
        self.sim_pairing_json.as_deref()
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self) -> Result<(), CommsError> {
        use esp_idf_svc::sys::*;
        unsafe {
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            if esp_bt_controller_init(&mut bt_cfg) != ESP_OK {
                error!("radio: controller init failed");
                self.state = RadioState::Failed;
                return Err(CommsError::RadioInitFailed);
            }
            if esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE) != ESP_OK
                || esp_bluedroid_init() != ESP_OK
                || esp_bluedroid_enable() != ESP_OK
            {
                error!("radio: stack bring-up failed");
                self.state = RadioState::Failed;
                return Err(CommsError::RadioInitFailed);
            }

            esp_ble_gap_register_callback(Some(gap_event_handler));
            esp_ble_gatts_register_callback(Some(gatts_event_handler));
            esp_ble_gatts_app_register(0);
        }
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_advertise(&mut self) {
        use esp_idf_svc::sys::*;
        unsafe {
            esp_ble_gap_set_device_name(self.device_name.as_ptr() as *const _);
            let mut adv_params = esp_ble_adv_params_t {
                adv_int_min: 0x20,
                adv_int_max: 0x40,
                adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
                own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
                channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
                adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
                ..core::mem::zeroed()
            };
            esp_ble_gap_start_advertising(&mut adv_params);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_advertise(&mut self) {
        info!(
            "radio(sim): advertising '{}' (service {:032x})",
            self.device_name,
            protocol::SERVICE_UUID
        );
    }

    #[cfg(target_os = "espidf")]
    fn platform_set_char(&mut self, handle: &AtomicU32, payload: &[u8]) {
        use esp_idf_svc::sys::*;
        let handle = handle.load(AtomicOrdering::Relaxed);
        if handle == 0 {
            return;
        }
        unsafe {
            esp_ble_gatts_set_attr_value(handle as u16, payload.len() as u16, payload.as_ptr());
            let conn = CONN_ID.load(AtomicOrdering::Relaxed);
            if conn != 0 {
                esp_ble_gatts_send_indicate(
                    GATTS_IF.load(AtomicOrdering::Relaxed) as u8,
                    conn as u16,
                    handle as u16,
                    payload.len() as u16,
                    payload.as_ptr() as *mut u8,
                    false,
                );
            }
        }
    }
}

impl Default for RadioGattAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// RadioPort implementation
// ───────────────────────────────────────────────────────────────

impl RadioPort for RadioGattAdapter {
    fn start_advertising(&mut self, name: &str) -> Result<(), CommsError> {
        self.device_name.clear();
        self.device_name
            .push_str(name)
            .map_err(|()| CommsError::RadioInitFailed)?;

        #[cfg(target_os = "espidf")]
        if self.state == RadioState::Idle {
            self.platform_start()?;
        }

        self.platform_advertise();
        if self.state != RadioState::Connected {
            self.state = RadioState::Advertising;
        }
        info!("radio: advertising as '{name}'");
        Ok(())
    }

    fn take_pending_credentials(&mut self) -> Option<WifiCredentials> {
        #[cfg(target_os = "espidf")]
        {
            let raw = take_credentials_data()?;
            match protocol::parse_credentials(&raw) {
                Ok(creds) => Some(creds),
                Err(e) => {
                    // Drop malformed writes here; the domain only ever
                    // sees validated credentials.
                    warn!("radio: dropping malformed credentials write: {e}");
                    None
                }
            }
        }

        #[cfg(not(target_os = "espidf"))]
        self.sim_pending.take()
    }

    fn publish_status(&mut self, status: ProvisioningStatus) {
        self.status = status;
        let token = status.as_str();
        info!("radio: status -> {token}");

        #[cfg(target_os = "espidf")]
        self.platform_set_char(&STATUS_CHAR_HANDLE, token.as_bytes());
    }

    fn publish_pairing_info(&mut self, info: Option<&PairingInfo>) {
        let json = info.map(PairingInfo::to_json).unwrap_or_default();

        #[cfg(target_os = "espidf")]
        self.platform_set_char(&PAIRING_CHAR_HANDLE, json.as_bytes());

        #[cfg(not(target_os = "espidf"))]
        {
            self.sim_pairing_json = if json.is_empty() { None } else { Some(json) };
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertising_lifecycle() {
        let mut radio = RadioGattAdapter::new();
        assert_eq!(radio.state(), RadioState::Idle);
        radio.start_advertising("Zen-Setup").unwrap();
        assert_eq!(radio.state(), RadioState::Advertising);
    }

    #[test]
    fn staged_credentials_are_taken_once() {
        let mut radio = RadioGattAdapter::new();
        assert!(radio.take_pending_credentials().is_none());

        radio.sim_write_credentials(b"HomeWiFi\nhunter2hunter2").unwrap();
        let creds = radio.take_pending_credentials().unwrap();
        assert_eq!(creds.ssid.as_str(), "HomeWiFi");
        assert_eq!(creds.password.as_str(), "hunter2hunter2");
        assert!(radio.take_pending_credentials().is_none());
    }

    #[test]
    fn malformed_write_is_rejected() {
        let mut radio = RadioGattAdapter::new();
        assert!(radio.sim_write_credentials(&[0xFF, 0xFE]).is_err());
        assert!(radio.take_pending_credentials().is_none());
    }

    #[test]
    fn pairing_info_publish_and_clear() {
        let mut radio = RadioGattAdapter::new();
        let info = PairingInfo {
            device_id: "abc123ef".into(),
            token: "tok-1".into(),
        };
        radio.publish_pairing_info(Some(&info));
        assert!(radio.sim_pairing_json().unwrap().contains("abc123ef"));

        radio.publish_pairing_info(None);
        assert!(radio.sim_pairing_json().is_none());
    }

    #[test]
    fn status_publish_updates_mirror() {
        let mut radio = RadioGattAdapter::new();
        radio.publish_status(ProvisioningStatus::Connecting);
        assert_eq!(radio.status(), ProvisioningStatus::Connecting);
    }
}
