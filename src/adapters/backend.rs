//! Backend REST client.
//!
//! Implements [`BackendPort`] against the provisioning/content API:
//!
//! - `POST /devices/register` — body `{hardwareId, firmwareVersion}`,
//!   201 returns the minted [`DeviceIdentity`].
//! - `GET /devices/state` — headers `X-Device-Id`/`X-Device-Secret`,
//!   200 returns a [`ContentPayload`], 409 means registered-but-unclaimed.
//! - `POST /devices/heartbeat` — same headers, telemetry body; responses
//!   ignored.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::http::client` over TLS.
//! - **all other targets**: scriptable simulation for host-side tests.
//!
//! The device secret travels only in the `X-Device-Secret` header of
//! these outbound calls; it has no other egress path.

use log::{debug, info};
use serde::Serialize;

#[cfg(target_os = "espidf")]
use log::warn;

use crate::agent::ports::{BackendPort, ContentPayload, DeviceIdentity, PollResponse};
use crate::error::CommsError;

#[cfg(not(target_os = "espidf"))]
use std::collections::VecDeque;

const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    hardware_id: &'a str,
    firmware_version: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HeartbeatRequest<'a> {
    firmware_version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    wifi_ssid: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wifi_rssi: Option<i8>,
}

pub struct BackendClient {
    base_url: String,
    #[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
    timeout_ms: u32,
    /// SSID/RSSI attached to heartbeats, refreshed by the main loop.
    link_ssid: Option<String>,
    link_rssi: Option<i8>,
    #[cfg(not(target_os = "espidf"))]
    sim: SimBackend,
}

/// Scriptable canned responses for host-side tests. When a queue is
/// empty the default behaviour applies: register mints an identity from
/// the hardware id, polls answer 409.
#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
struct SimBackend {
    register_responses: VecDeque<Result<DeviceIdentity, CommsError>>,
    poll_responses: VecDeque<Result<PollResponse, CommsError>>,
    heartbeats_sent: u32,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout_ms: u32) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_ms,
            link_ssid: None,
            link_rssi: None,
            #[cfg(not(target_os = "espidf"))]
            sim: SimBackend::default(),
        }
    }

    /// Attach current link telemetry to subsequent heartbeats.
    pub fn set_link_info(&mut self, ssid: Option<&str>, rssi: Option<i8>) {
        self.link_ssid = ssid.map(str::to_string);
        self.link_rssi = rssi;
    }

    // ── Host simulation hooks ─────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_push_register(&mut self, response: Result<DeviceIdentity, CommsError>) {
        self.sim.register_responses.push_back(response);
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_push_poll(&mut self, response: Result<PollResponse, CommsError>) {
        self.sim.poll_responses.push_back(response);
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_heartbeats_sent(&self) -> u32 {
        self.sim.heartbeats_sent
    }

    // ── Platform-specific transport ───────────────────────────

    /// One HTTP exchange: returns status code and response body.
    #[cfg(target_os = "espidf")]
    fn request(
        &mut self,
        method: esp_idf_svc::http::Method,
        path: &str,
        headers: &[(&str, &str)],
        body: Option<&[u8]>,
    ) -> Result<(u16, Vec<u8>), CommsError> {
        use esp_idf_svc::http::client::{Configuration, EspHttpConnection};

        let url = format!("{}{}", self.base_url, path);
        let config = Configuration {
            timeout: Some(core::time::Duration::from_millis(u64::from(self.timeout_ms))),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let mut conn = EspHttpConnection::new(&config).map_err(|e| {
            warn!("backend: connection setup failed: {e}");
            CommsError::HttpTransport
        })?;

        let mut all_headers: Vec<(&str, &str)> = vec![("Content-Type", "application/json")];
        all_headers.extend_from_slice(headers);

        use embedded_svc::io::{Read, Write};

        conn.initiate_request(method, &url, &all_headers)
            .map_err(|_| CommsError::HttpTransport)?;
        if let Some(body) = body {
            conn.write_all(body).map_err(|_| CommsError::HttpTransport)?;
        }
        conn.initiate_response().map_err(|_| CommsError::HttpTransport)?;

        let status = conn.status();
        let mut response = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            match conn.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => response.extend_from_slice(&chunk[..n]),
                Err(_) => return Err(CommsError::HttpTransport),
            }
        }
        Ok((status, response))
    }
}

impl BackendPort for BackendClient {
    fn register(&mut self, hardware_id: &str) -> Result<DeviceIdentity, CommsError> {
        let request = RegisterRequest {
            hardware_id,
            firmware_version: FIRMWARE_VERSION,
        };
        debug!("backend: registering hardware {hardware_id}");

        #[cfg(target_os = "espidf")]
        {
            let body = serde_json::to_vec(&request).map_err(|_| CommsError::BadResponse)?;
            let (status, response) = self.request(
                esp_idf_svc::http::Method::Post,
                "/devices/register",
                &[],
                Some(&body),
            )?;
            if status != 201 {
                return Err(CommsError::HttpStatus(status));
            }
            let identity: DeviceIdentity =
                serde_json::from_slice(&response).map_err(|_| CommsError::BadResponse)?;
            info!("backend: registered as {}", identity.device_id);
            Ok(identity)
        }

        #[cfg(not(target_os = "espidf"))]
        {
            let _ = &request;
            match self.sim.register_responses.pop_front() {
                Some(response) => response,
                None => {
                    let identity = DeviceIdentity {
                        device_id: hardware_id.to_string(),
                        device_secret: format!("secret-{hardware_id}"),
                        pairing_token: format!("token-{hardware_id}"),
                        bluetooth_name: crate::protocol::advertised_name(hardware_id)
                            .as_str()
                            .to_string(),
                    };
                    info!("backend(sim): registered as {}", identity.device_id);
                    Ok(identity)
                }
            }
        }
    }

    fn poll_state(&mut self, identity: &DeviceIdentity) -> Result<PollResponse, CommsError> {
        #[cfg(target_os = "espidf")]
        {
            let headers = [
                ("X-Device-Id", identity.device_id.as_str()),
                ("X-Device-Secret", identity.device_secret.as_str()),
            ];
            let (status, response) = self.request(
                esp_idf_svc::http::Method::Get,
                "/devices/state",
                &headers,
                None,
            )?;
            match status {
                200 => {
                    let payload: ContentPayload =
                        serde_json::from_slice(&response).map_err(|_| CommsError::BadResponse)?;
                    Ok(PollResponse::Ready(payload))
                }
                409 => Ok(PollResponse::WaitingForClaim),
                other => Err(CommsError::HttpStatus(other)),
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            let _ = identity;
            match self.sim.poll_responses.pop_front() {
                Some(response) => response,
                None => Ok(PollResponse::WaitingForClaim),
            }
        }
    }

    fn heartbeat(&mut self, identity: &DeviceIdentity) -> Result<(), CommsError> {
        let request = HeartbeatRequest {
            firmware_version: FIRMWARE_VERSION,
            wifi_ssid: self.link_ssid.as_deref(),
            wifi_rssi: self.link_rssi,
        };

        #[cfg(target_os = "espidf")]
        {
            let body = serde_json::to_vec(&request).map_err(|_| CommsError::BadResponse)?;
            let headers = [
                ("X-Device-Id", identity.device_id.as_str()),
                ("X-Device-Secret", identity.device_secret.as_str()),
            ];
            // Telemetry only: the status code is irrelevant as long as
            // the exchange completed.
            let _ = self.request(
                esp_idf_svc::http::Method::Post,
                "/devices/heartbeat",
                &headers,
                Some(&body),
            )?;
            Ok(())
        }

        #[cfg(not(target_os = "espidf"))]
        {
            let _ = (identity, &request);
            self.sim.heartbeats_sent += 1;
            debug!("backend(sim): heartbeat {}", self.sim.heartbeats_sent);
            Ok(())
        }
    }
}
