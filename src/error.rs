//! Unified error types for the Zenboard firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping
//! the main loop's error handling uniform. All variants are `Copy` so
//! they can be threaded through the FSM without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A communication subsystem failed (Wi-Fi, radio, backend HTTP).
    Comms(CommsError),
    /// Persistent storage failed.
    Storage(StorageError),
    /// A wire payload violated the provisioning protocol.
    Protocol(ProtocolError),
    /// Peripheral initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comms(e) => write!(f, "comms: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Communications errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsError {
    /// Wi-Fi association/DHCP did not complete within the bounded timeout.
    WifiConnectTimeout,
    /// Wi-Fi driver rejected the attempt (bad credentials, no AP).
    WifiConnectFailed,
    /// The station dropped off the network.
    WifiDisconnected,
    /// Outbound HTTP request failed at the transport level.
    HttpTransport,
    /// Backend answered with an unexpected HTTP status.
    HttpStatus(u16),
    /// Response body could not be parsed.
    BadResponse,
    /// Radio-link stack failed to initialise.
    RadioInitFailed,
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WifiConnectTimeout => write!(f, "Wi-Fi connect timed out"),
            Self::WifiConnectFailed => write!(f, "Wi-Fi connect failed"),
            Self::WifiDisconnected => write!(f, "Wi-Fi disconnected"),
            Self::HttpTransport => write!(f, "HTTP transport error"),
            Self::HttpStatus(code) => write!(f, "unexpected HTTP status {code}"),
            Self::BadResponse => write!(f, "malformed backend response"),
            Self::RadioInitFailed => write!(f, "radio stack init failed"),
        }
    }
}

impl From<CommsError> for Error {
    fn from(e: CommsError) -> Self {
        Self::Comms(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested record does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Stored blob failed deserialization.
    Corrupted,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "record not found"),
            Self::Full => write!(f, "storage full"),
            Self::Corrupted => write!(f, "stored record corrupted"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload is not valid UTF-8.
    InvalidUtf8,
    /// Payload exceeds the characteristic's maximum length.
    TooLong,
    /// Credentials payload is missing the SSID/password separator or
    /// carries an empty SSID.
    MalformedCredentials,
    /// Pairing-info payload is not the expected JSON document.
    MalformedPairingInfo,
    /// Status token is not one of the closed enumeration values.
    UnknownStatus,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUtf8 => write!(f, "payload is not valid UTF-8"),
            Self::TooLong => write!(f, "payload exceeds characteristic length"),
            Self::MalformedCredentials => write!(f, "malformed credentials payload"),
            Self::MalformedPairingInfo => write!(f, "malformed pairing-info payload"),
            Self::UnknownStatus => write!(f, "unknown status token"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
