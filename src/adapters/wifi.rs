//! Wi-Fi station-mode adapter.
//!
//! Implements [`ConnectivityPort`] — the hexagonal boundary for network
//! connectivity.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: ESP-IDF Wi-Fi driver calls via
//!   `esp_idf_svc::wifi`.
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! ## Non-blocking model
//!
//! `connect` only configures the station and starts the join; it returns
//! before association completes. Link state surfaces through `is_up`,
//! which the control loop samples every tick against its own deadline.
//! The driver's IP event flips the link flag; this adapter never sleeps.

use log::{info, warn};

use crate::agent::ports::ConnectivityPort;
use crate::error::CommsError;
use crate::protocol::WifiCredentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connecting,
    Connected,
}

// Link flag written by the IP event handler (driver task), read from the
// control loop.
#[cfg(target_os = "espidf")]
static LINK_UP: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(false);

pub struct WifiStation {
    state: WifiState,
    ssid: heapless::String<32>,
    /// Simulation: link level, settable by tests.
    #[cfg(not(target_os = "espidf"))]
    sim_link_up: bool,
    /// Simulation: when set, the link comes up on the tick after connect.
    #[cfg(not(target_os = "espidf"))]
    sim_auto_link: bool,
}

impl WifiStation {
    pub fn new() -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_link_up: false,
            #[cfg(not(target_os = "espidf"))]
            sim_auto_link: true,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    /// SSID of the current join, for heartbeat telemetry.
    pub fn ssid(&self) -> Option<&str> {
        if self.ssid.is_empty() {
            None
        } else {
            Some(self.ssid.as_str())
        }
    }

    /// Signal strength of the associated AP; `None` while the link is
    /// down.
    pub fn rssi(&self) -> Option<i8> {
        self.platform_rssi()
    }

    // ── Host simulation hooks ─────────────────────────────────

    /// Drive the simulated link level directly (test control).
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_link(&mut self, up: bool) {
        self.sim_link_up = up;
        self.sim_auto_link = false;
        if up {
            self.state = WifiState::Connected;
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self, _creds: &WifiCredentials) -> Result<(), CommsError> {
        // ESP-IDF STA join.
        //
        // The full wiring requires:
        // 1. EspWifi::new(peripherals.modem, sysloop, Some(nvs))
        // 2. wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        //        ssid: creds.ssid.as_str().try_into()?,
        //        password: creds.password.as_str().try_into()?,
        //        auth_method: if creds.password.is_empty() {
        //            AuthMethod::None
        //        } else {
        //            AuthMethod::WPA2Personal
        //        },
        //        ..Default::default()
        //    }))
        // 3. wifi.start() then wifi.connect() — both return before the
        //    join completes; IP_EVENT_STA_GOT_IP / WIFI_EVENT_STA_DISCONNECTED
        //    subscriptions store into LINK_UP and push WifiGotIp/WifiLost.
        //
        // The EspWifi handle is threaded in from main.rs; the modem
        // peripheral is shared with the radio stack, so coexistence mode
        // must be enabled in sdkconfig.
        info!("WiFi(espidf): STA join deferred until peripheral wiring");
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self, _creds: &WifiCredentials) -> Result<(), CommsError> {
        if self.sim_auto_link {
            self.sim_link_up = true;
        }
        info!("WiFi(sim): join started for '{}'", self.ssid);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        // wifi.disconnect().ok(); wifi.stop().ok();
        LINK_UP.store(false, core::sync::atomic::Ordering::Release);
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        self.sim_link_up = false;
        info!("WiFi(sim): disconnected");
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_up(&self) -> bool {
        LINK_UP.load(core::sync::atomic::Ordering::Acquire)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_up(&self) -> bool {
        self.sim_link_up
    }

    #[cfg(target_os = "espidf")]
    fn platform_rssi(&self) -> Option<i8> {
        if !self.platform_is_up() {
            return None;
        }
        let mut ap: esp_idf_svc::sys::wifi_ap_record_t = unsafe { core::mem::zeroed() };
        // SAFETY: esp_wifi_sta_get_ap_info only writes the record.
        let ret = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap) };
        if ret == esp_idf_svc::sys::ESP_OK {
            Some(ap.rssi)
        } else {
            None
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_rssi(&self) -> Option<i8> {
        self.sim_link_up.then_some(-50)
    }
}

impl Default for WifiStation {
    fn default() -> Self {
        Self::new()
    }
}

/// IP event bridge — call from the driver's got-IP / disconnected
/// subscriptions.
#[cfg(target_os = "espidf")]
pub fn on_link_event(up: bool) {
    LINK_UP.store(up, core::sync::atomic::Ordering::Release);
    crate::events::push_event(if up {
        crate::events::Event::WifiGotIp
    } else {
        crate::events::Event::WifiLost
    });
}

impl ConnectivityPort for WifiStation {
    fn connect(&mut self, creds: &WifiCredentials) -> Result<(), CommsError> {
        self.ssid.clear();
        // Source string shares the capacity bound; cannot overflow.
        let _ = self.ssid.push_str(creds.ssid.as_str());

        info!("WiFi: joining '{}'", self.ssid);
        self.state = WifiState::Connecting;

        match self.platform_connect(creds) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("WiFi: join start failed: {e}");
                self.state = WifiState::Disconnected;
                Err(CommsError::WifiConnectFailed)
            }
        }
    }

    fn disconnect(&mut self) {
        self.platform_disconnect();
        self.state = WifiState::Disconnected;
        info!("WiFi: disconnected");
    }

    fn is_up(&self) -> bool {
        self.platform_is_up()
    }
}
