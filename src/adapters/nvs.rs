//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`]: the device identity and Wi-Fi credentials
//! as postcard blobs in flash.
//!
//! # Security
//!
//! - Namespace isolation: identity and credentials live in separate
//!   namespaces so a factory reset can erase them wholesale.
//! - Encrypted NVS: on ESP32, both namespaces live on the encrypted NVS
//!   partition (nvs_key partition + flash encryption in production).
//!   The simulation backend is plaintext, dev/test only.
//! - Atomic writes: ESP-IDF NVS commits are atomic per nvs_commit(), so
//!   a power cut never leaves a partial identity record.

use log::{info, warn};

use crate::agent::ports::{DeviceIdentity, StoragePort};
use crate::config::AgentConfig;
use crate::error::StorageError;
use crate::protocol::WifiCredentials;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const IDENTITY_NAMESPACE: &str = "identity";
const IDENTITY_KEY: &[u8] = b"device\0";
const AUTH_NAMESPACE: &str = "auth";
const WIFI_KEY: &[u8] = b"wifi\0";
const CONFIG_NAMESPACE: &str = "config";
const CONFIG_KEY: &[u8] = b"agent\0";

#[allow(dead_code)]
const MAX_BLOB_SIZE: usize = 1024;

pub struct NvsStorage {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsStorage {
    /// Create the adapter and initialise NVS flash.
    ///
    /// On first boot or after an NVS version mismatch the partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase run from the single
            // main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsStorage: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsStorage: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &[u8]) -> String {
        let key = core::str::from_utf8(key)
            .unwrap_or("")
            .trim_end_matches('\0');
        format!("{}::{}", namespace, key)
    }

    /// Open an NVS namespace, run a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = namespace.as_bytes();
        let len = ns_bytes.len().min(15);
        ns_buf[..len].copy_from_slice(&ns_bytes[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    fn read_blob(&self, namespace: &str, key: &'static [u8]) -> Result<Option<Vec<u8>>, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            Ok(self.store.borrow().get(&composite).cloned())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut size: usize = 0;
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key.as_ptr() as *const _,
                        core::ptr::null_mut(),
                        &mut size,
                    )
                };
                if ret == ESP_ERR_NVS_NOT_FOUND {
                    return Err(ESP_ERR_NVS_NOT_FOUND);
                }
                if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ret);
                }

                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(buf)
            });

            match result {
                Ok(bytes) => Ok(Some(bytes)),
                // Missing namespace and missing key both mean "never written".
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(None),
                Err(e) => {
                    warn!("NvsStorage: NVS read error {e}");
                    Err(StorageError::IoError)
                }
            }
        }
    }

    fn write_blob(
        &mut self,
        namespace: &str,
        key: &'static [u8],
        data: &[u8],
    ) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|e| {
                warn!("NvsStorage: NVS write error {e}");
                StorageError::IoError
            })
        }
    }

    /// Load a persisted config override. Corrupted or out-of-range
    /// records are discarded so a bad write can never wedge the boot
    /// path; the caller falls back to the defaults.
    pub fn load_config(&mut self) -> Option<AgentConfig> {
        let bytes = self.read_blob(CONFIG_NAMESPACE, CONFIG_KEY).ok()??;
        let config: AgentConfig = match postcard::from_bytes(&bytes) {
            Ok(config) => config,
            Err(_) => {
                warn!("NvsStorage: config blob corrupted, using defaults");
                return None;
            }
        };
        if let Err(reason) = config.validate() {
            warn!("NvsStorage: persisted config invalid ({reason}), using defaults");
            return None;
        }
        info!("NvsStorage: loaded config override");
        Some(config)
    }

    /// Persist a config override. Validated first: nothing out of range
    /// ever reaches flash.
    pub fn save_config(&mut self, config: &AgentConfig) -> Result<(), StorageError> {
        if let Err(reason) = config.validate() {
            warn!("NvsStorage: rejecting config write ({reason})");
            return Err(StorageError::IoError);
        }
        let bytes = postcard::to_allocvec(config).map_err(|_| StorageError::IoError)?;
        self.write_blob(CONFIG_NAMESPACE, CONFIG_KEY, &bytes)
    }

    fn erase_namespace(&mut self, namespace: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let prefix = format!("{}::", namespace);
            self.store
                .borrow_mut()
                .retain(|k: &String, _: &mut Vec<u8>| !k.starts_with(&prefix));
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let ret = unsafe { nvs_erase_all(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => Ok(()),
                // Nothing was ever written under this namespace.
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(()),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }
}

impl StoragePort for NvsStorage {
    fn load_identity(&mut self) -> Result<Option<DeviceIdentity>, StorageError> {
        match self.read_blob(IDENTITY_NAMESPACE, IDENTITY_KEY)? {
            Some(bytes) => {
                let identity: DeviceIdentity =
                    postcard::from_bytes(&bytes).map_err(|_| StorageError::Corrupted)?;
                info!("NvsStorage: loaded identity for {}", identity.device_id);
                Ok(Some(identity))
            }
            None => Ok(None),
        }
    }

    fn save_identity(&mut self, identity: &DeviceIdentity) -> Result<(), StorageError> {
        let bytes = postcard::to_allocvec(identity).map_err(|_| StorageError::IoError)?;
        self.write_blob(IDENTITY_NAMESPACE, IDENTITY_KEY, &bytes)?;
        info!("NvsStorage: identity saved ({} bytes)", bytes.len());
        Ok(())
    }

    fn load_credentials(&mut self) -> Result<Option<WifiCredentials>, StorageError> {
        match self.read_blob(AUTH_NAMESPACE, WIFI_KEY)? {
            Some(bytes) => {
                let creds: WifiCredentials =
                    postcard::from_bytes(&bytes).map_err(|_| StorageError::Corrupted)?;
                info!("NvsStorage: loaded Wi-Fi credentials for '{}'", creds.ssid);
                Ok(Some(creds))
            }
            None => Ok(None),
        }
    }

    fn save_credentials(&mut self, creds: &WifiCredentials) -> Result<(), StorageError> {
        let bytes = postcard::to_allocvec(creds).map_err(|_| StorageError::IoError)?;
        self.write_blob(AUTH_NAMESPACE, WIFI_KEY, &bytes)
    }

    fn wipe(&mut self) -> Result<(), StorageError> {
        self.erase_namespace(IDENTITY_NAMESPACE)?;
        self.erase_namespace(AUTH_NAMESPACE)?;
        info!("NvsStorage: wiped identity and credentials");
        Ok(())
    }
}

impl Default for NvsStorage {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_identity() -> DeviceIdentity {
        DeviceIdentity {
            device_id: "abc123ef".into(),
            device_secret: "s3cr3t".into(),
            pairing_token: "tok-1".into(),
            bluetooth_name: "Zen-23EF".into(),
        }
    }

    #[test]
    fn identity_roundtrip() {
        let mut nvs = NvsStorage::new().unwrap();
        assert_eq!(nvs.load_identity().unwrap(), None);

        let identity = sample_identity();
        nvs.save_identity(&identity).unwrap();
        assert_eq!(nvs.load_identity().unwrap(), Some(identity));
    }

    #[test]
    fn credentials_roundtrip() {
        let mut nvs = NvsStorage::new().unwrap();
        assert_eq!(nvs.load_credentials().unwrap(), None);

        let creds = WifiCredentials::new("HomeWiFi", "hunter2hunter2").unwrap();
        nvs.save_credentials(&creds).unwrap();
        assert_eq!(nvs.load_credentials().unwrap(), Some(creds));
    }

    #[test]
    fn open_network_credentials_survive_storage() {
        let mut nvs = NvsStorage::new().unwrap();
        let creds = WifiCredentials::new("OpenCafe", "").unwrap();
        nvs.save_credentials(&creds).unwrap();
        let loaded = nvs.load_credentials().unwrap().unwrap();
        assert!(loaded.password.is_empty());
    }

    #[test]
    fn save_overwrites_previous_record() {
        let mut nvs = NvsStorage::new().unwrap();
        nvs.save_credentials(&WifiCredentials::new("Old", "oldpass123").unwrap())
            .unwrap();
        nvs.save_credentials(&WifiCredentials::new("New", "newpass123").unwrap())
            .unwrap();
        assert_eq!(
            nvs.load_credentials().unwrap().unwrap().ssid.as_str(),
            "New"
        );
    }

    #[test]
    fn wipe_clears_everything() {
        let mut nvs = NvsStorage::new().unwrap();
        nvs.save_identity(&sample_identity()).unwrap();
        nvs.save_credentials(&WifiCredentials::new("HomeWiFi", "pw12345678").unwrap())
            .unwrap();

        nvs.wipe().unwrap();
        assert_eq!(nvs.load_identity().unwrap(), None);
        assert_eq!(nvs.load_credentials().unwrap(), None);
    }

    #[test]
    fn config_override_roundtrips_when_valid() {
        let mut nvs = NvsStorage::new().unwrap();
        assert!(nvs.load_config().is_none());

        let mut config = AgentConfig::default();
        config.poll_interval_secs = 120;
        nvs.save_config(&config).unwrap();
        assert_eq!(nvs.load_config().unwrap().poll_interval_secs, 120);
    }

    #[test]
    fn invalid_config_never_reaches_flash() {
        let mut nvs = NvsStorage::new().unwrap();
        let mut config = AgentConfig::default();
        config.poll_interval_secs = 0;
        assert!(nvs.save_config(&config).is_err());
        assert!(nvs.load_config().is_none());
    }

    #[test]
    fn corrupted_config_blob_falls_back_to_defaults() {
        let mut nvs = NvsStorage::new().unwrap();
        nvs.store
            .borrow_mut()
            .insert("config::agent".into(), vec![0xFF; 4]);
        assert!(nvs.load_config().is_none());
    }

    #[test]
    fn corrupted_identity_is_reported() {
        let mut nvs = NvsStorage::new().unwrap();
        nvs.store
            .borrow_mut()
            .insert("identity::device".into(), vec![0xFF; 3]);
        assert_eq!(nvs.load_identity(), Err(StorageError::Corrupted));
    }
}
