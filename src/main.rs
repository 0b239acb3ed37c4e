//! Zenboard firmware — main entry point.
//!
//! Hexagonal wiring: the adapters on the outer ring implement the port
//! traits, `AgentService` in the middle owns all provisioning and
//! display logic, and this file only assembles the two and runs the
//! control loop.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 Adapters (outer ring)                    │
//! │                                                          │
//! │  RadioGattAdapter  WifiStation   BackendClient           │
//! │  (RadioPort)       (Connectivity)(BackendPort)           │
//! │  EinkPanel         NvsStorage    LogSink   Clock         │
//! │  (DisplayPort)     (StoragePort) (EventSink)             │
//! │                                                          │
//! │  ───────────── Port Trait Boundary ─────────────         │
//! │                                                          │
//! │  ┌────────────────────────────────────────────────┐      │
//! │  │           AgentService (pure logic)            │      │
//! │  │  FSM · RedrawGate · poll/heartbeat timers      │      │
//! │  └────────────────────────────────────────────────┘      │
//! └──────────────────────────────────────────────────────────┘
//! ```

#![deny(unused_must_use)]

use anyhow::Result;
use log::{info, warn};

use zenboard::adapters::{BackendClient, Clock, EinkPanel, LogSink, NvsStorage, RadioGattAdapter, WifiStation};
use zenboard::adapters::device_id;
use zenboard::agent::ports::{
    BackendPort, ConnectivityPort, DeviceIdentity, DisplayPort, PollResponse, RadioPort,
    StoragePort,
};
use zenboard::agent::AgentService;
use zenboard::config::AgentConfig;
use zenboard::display::DisplayState;
use zenboard::drivers::{ButtonDriver, ButtonEvent, ButtonId};
use zenboard::events::{self, Event, push_event};
use zenboard::pins;
use zenboard::protocol::{PairingInfo, ProvisioningStatus, WifiCredentials};
use zenboard::{CommsError, StorageError};

const BACKEND_URL: &str = "https://api.zenboard.io";

// ── Composite platform ────────────────────────────────────────
//
// AgentService consumes one value implementing all five ports; this
// struct is that value, delegating each port to its adapter.

struct DevicePlatform {
    radio: RadioGattAdapter,
    wifi: WifiStation,
    backend: BackendClient,
    panel: EinkPanel,
    storage: NvsStorage,
}

impl RadioPort for DevicePlatform {
    fn start_advertising(&mut self, name: &str) -> Result<(), CommsError> {
        self.radio.start_advertising(name)
    }
    fn take_pending_credentials(&mut self) -> Option<WifiCredentials> {
        self.radio.take_pending_credentials()
    }
    fn publish_status(&mut self, status: ProvisioningStatus) {
        self.radio.publish_status(status);
    }
    fn publish_pairing_info(&mut self, pairing_info: Option<&PairingInfo>) {
        self.radio.publish_pairing_info(pairing_info);
    }
}

impl ConnectivityPort for DevicePlatform {
    fn connect(&mut self, creds: &WifiCredentials) -> Result<(), CommsError> {
        self.wifi.connect(creds)
    }
    fn disconnect(&mut self) {
        self.wifi.disconnect();
    }
    fn is_up(&self) -> bool {
        self.wifi.is_up()
    }
}

impl BackendPort for DevicePlatform {
    fn register(&mut self, hardware_id: &str) -> Result<DeviceIdentity, CommsError> {
        self.backend.register(hardware_id)
    }
    fn poll_state(&mut self, identity: &DeviceIdentity) -> Result<PollResponse, CommsError> {
        self.backend.poll_state(identity)
    }
    fn heartbeat(&mut self, identity: &DeviceIdentity) -> Result<(), CommsError> {
        self.backend.heartbeat(identity)
    }
}

impl DisplayPort for DevicePlatform {
    fn draw_content(&mut self, state: &DisplayState) -> Result<(), zenboard::Error> {
        self.panel.draw_content(state)
    }
    fn draw_provisioning(
        &mut self,
        screen: zenboard::agent::ports::ProvisioningScreen,
        advertised_name: &str,
    ) -> Result<(), zenboard::Error> {
        self.panel.draw_provisioning(screen, advertised_name)
    }
}

impl StoragePort for DevicePlatform {
    fn load_identity(&mut self) -> Result<Option<DeviceIdentity>, StorageError> {
        self.storage.load_identity()
    }
    fn save_identity(&mut self, identity: &DeviceIdentity) -> Result<(), StorageError> {
        self.storage.save_identity(identity)
    }
    fn load_credentials(&mut self) -> Result<Option<WifiCredentials>, StorageError> {
        self.storage.load_credentials()
    }
    fn save_credentials(&mut self, creds: &WifiCredentials) -> Result<(), StorageError> {
        self.storage.save_credentials(creds)
    }
    fn wipe(&mut self) -> Result<(), StorageError> {
        self.storage.wipe()
    }
}

// ── Button ISR wiring ─────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn install_button_isrs(clock: &'static Clock) -> Result<()> {
    use esp_idf_svc::sys::*;

    unsafe extern "C" fn mode_isr(arg: *mut core::ffi::c_void) {
        let clock = unsafe { &*(arg as *const Clock) };
        zenboard::drivers::button_isr_handler(ButtonId::Mode, clock.now_ms() as u32);
    }
    unsafe extern "C" fn reset_isr(arg: *mut core::ffi::c_void) {
        let clock = unsafe { &*(arg as *const Clock) };
        zenboard::drivers::button_isr_handler(ButtonId::Reset, clock.now_ms() as u32);
    }

    let buttons: [(i32, unsafe extern "C" fn(*mut core::ffi::c_void)); 2] = [
        (pins::BUTTON_MODE_GPIO, mode_isr),
        (pins::BUTTON_RESET_GPIO, reset_isr),
    ];

    // SAFETY: pins are configured once before the ISR service starts
    // dispatching; the clock reference is 'static.
    unsafe {
        esp!(gpio_install_isr_service(0))?;
        for (gpio, handler) in buttons {
            esp!(gpio_set_direction(gpio, gpio_mode_t_GPIO_MODE_INPUT))?;
            esp!(gpio_set_pull_mode(gpio, gpio_pull_mode_t_GPIO_PULLUP_ONLY))?;
            esp!(gpio_set_intr_type(gpio, gpio_int_type_t_GPIO_INTR_NEGEDGE))?;
            esp!(gpio_isr_handler_add(
                gpio,
                Some(handler),
                clock as *const Clock as *mut core::ffi::c_void,
            ))?;
        }
    }
    Ok(())
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }

    info!("Zenboard v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Storage + identity + config ────────────────────────
    let mut storage = match NvsStorage::new() {
        Ok(s) => s,
        Err(e) => {
            warn!("NVS init failed ({e}), running without persistence");
            NvsStorage::default()
        }
    };
    // A validated NVS override wins; anything invalid or corrupted
    // falls back to the defaults inside load_config.
    let config: AgentConfig = storage.load_config().unwrap_or_default();
    let hardware_id = device_id::hardware_id();
    info!("hardware id: {hardware_id}");

    // ── 3. Time source (leaked: the ISRs need 'static) ────────
    let clock: &'static Clock = Box::leak(Box::new(Clock::new()));

    // ── 4. Adapters + platform composite ──────────────────────
    let panel = match EinkPanel::new() {
        Ok(p) => p,
        Err(e) => {
            log::error!("panel init failed: {e} — halting");
            #[allow(clippy::empty_loop)]
            loop {}
        }
    };
    let mut platform = DevicePlatform {
        radio: RadioGattAdapter::new(),
        wifi: WifiStation::new(),
        backend: BackendClient::new(BACKEND_URL, config.http_timeout_ms),
        panel,
        storage,
    };
    let mut sink = LogSink::new();

    // ── 5. Buttons ────────────────────────────────────────────
    let mut mode_button = ButtonDriver::momentary(ButtonId::Mode, pins::BUTTON_MODE_GPIO);
    let mut reset_button =
        ButtonDriver::hold(ButtonId::Reset, pins::BUTTON_RESET_GPIO, config.reset_hold_ms);
    #[cfg(target_os = "espidf")]
    install_button_isrs(clock)?;

    // ── 6. Agent service ──────────────────────────────────────
    let mut agent = AgentService::new(config.clone(), hardware_id);
    agent.start(&mut platform, &mut sink);

    info!("system ready, entering control loop");

    // ── 7. Control loop ───────────────────────────────────────
    let mut time_sync_started = false;

    loop {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(
            config.control_loop_interval_ms,
        )));
        push_event(Event::ControlTick);

        let now_ms = clock.now_ms();

        // Button gesture detection feeds the same queue the ISRs do.
        if let Some(ButtonEvent::ShortPress) = mode_button.tick(now_ms as u32) {
            push_event(Event::ModeButtonPress);
        }
        if let Some(ButtonEvent::Hold) = reset_button.tick(now_ms as u32) {
            push_event(Event::FactoryResetRequested);
        }

        // Kick SNTP once the station has an address.
        if platform.wifi.is_up() && !time_sync_started {
            clock.start_sync();
            time_sync_started = true;
        }

        // Heartbeats carry the current link telemetry.
        platform
            .backend
            .set_link_info(platform.wifi.ssid(), platform.wifi.rssi());

        let wall = clock.wall_hhmm();
        events::drain_events(|event| match event {
            Event::ControlTick => {
                agent.tick(now_ms, wall.as_deref(), &mut platform, &mut sink);
            }
            Event::ModeButtonPress | Event::FactoryResetRequested => {
                agent.handle_event(event, &mut platform, &mut sink);
            }
            // Link and radio callbacks only wake the loop; their state
            // is sampled inside agent.tick().
            Event::CredentialsWritten
            | Event::RadioConnected
            | Event::RadioDisconnected
            | Event::WifiGotIp
            | Event::WifiLost => {}
        });
    }
}
