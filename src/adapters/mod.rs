//! Platform adapters — the outside of the hexagon.
//!
//! Each adapter implements one or more port traits from
//! [`crate::agent::ports`], with `#[cfg(target_os = "espidf")]` real
//! implementations and host-side simulations behind the same API.
//!
//! | Adapter | Port(s) | Platform backing |
//! |---------|---------|------------------|
//! | [`radio`] | `RadioPort` | Bluedroid GATT server |
//! | [`wifi`] | `ConnectivityPort` | ESP-IDF Wi-Fi STA |
//! | [`backend`] | `BackendPort` | ESP-IDF HTTP client (TLS) |
//! | [`nvs`] | `StoragePort` | NVS flash, postcard blobs |
//! | [`display`] | `DisplayPort` | SPI e-paper panel |
//! | [`log_sink`] | `EventSink` | `log` facade |
//! | [`time`] | — | esp_timer + SNTP |
//! | [`device_id`] | — | efuse base MAC |

pub mod backend;
pub mod device_id;
pub mod display;
pub mod log_sink;
pub mod nvs;
pub mod radio;
pub mod time;
pub mod wifi;

pub use backend::BackendClient;
pub use display::EinkPanel;
pub use log_sink::LogSink;
pub use nvs::NvsStorage;
pub use radio::RadioGattAdapter;
pub use time::Clock;
pub use wifi::WifiStation;

/// Raw GPIO level read, used by the button driver's debounce check.
#[cfg(target_os = "espidf")]
pub fn gpio_read(gpio: i32) -> bool {
    // SAFETY: gpio_get_level is a read-only register access.
    unsafe { esp_idf_svc::sys::gpio_get_level(gpio) != 0 }
}
