// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the grip controller.
//!
//! The hierarchy mirrors the layers of the driver: transport failures
//! (retried locally), protocol violations (propagated), firmware flashing
//! failures (carrying diagnostics) and value/configuration validation.
//!
//! Fault escalation is deliberately absent here: a faulted device is
//! reported through [`DeviceState`](crate::state::DeviceState) and a
//! [`GripEvent::Fault`](crate::event::GripEvent::Fault), not as an error.

use thiserror::Error;

use crate::types::{Channel, Checksum};

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Register transfer failed after exhausting retries.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The device answered with something the protocol does not allow.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Firmware flashing failed.
    #[error("flash error: {0}")]
    Flash(#[from] FlashError),

    /// Firmware image could not be loaded or parsed.
    #[error("firmware error: {0}")]
    Firmware(#[from] FirmwareError),

    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Configuration could not be parsed or is inconsistent.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The power collaborator refused a request.
    #[error("power error: {0}")]
    Power(#[from] PowerError),

    /// The controller is suspended; the operation was not started.
    #[error("controller is suspended")]
    Suspended,

    /// The device is in the terminal fault state.
    #[error("device is faulted")]
    Faulted,

    /// The requested channel is not present on this device.
    #[error("channel {0} is not available on this device")]
    ChannelUnavailable(Channel),

    /// The operation requires a capability this device does not have.
    #[error("device does not support {capability}")]
    UnsupportedCapability {
        /// The capability that is not supported.
        capability: String,
    },
}

/// Errors raised by a [`Transport`](crate::protocol::Transport) implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The device did not acknowledge the transfer.
    #[error("no acknowledge from device")]
    Nack,

    /// Bus-level failure reported by the host.
    #[error("bus error: {0}")]
    Bus(String),

    /// Fewer bytes were transferred than requested.
    #[error("short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer {
        /// Requested length.
        expected: usize,
        /// Transferred length.
        actual: usize,
    },

    /// All retry attempts failed; carries the last underlying failure.
    #[error("register {addr:#04x} failed after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        /// Register address of the failed operation.
        addr: u8,
        /// Number of attempts made.
        attempts: u8,
        /// The last failure observed.
        last: Box<TransportError>,
    },
}

impl TransportError {
    /// Returns how many failed transfer attempts this error represents.
    #[must_use]
    pub fn attempts(&self) -> u8 {
        match self {
            Self::RetriesExhausted { attempts, .. } => *attempts,
            _ => 1,
        }
    }
}

/// Unexpected device responses.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Bootloader mode entry returned the wrong acknowledgement byte.
    #[error("bootloader ack mismatch: expected {expected:#04x}, got {actual:#04x}")]
    BootloaderAck {
        /// Configured acknowledgement byte.
        expected: u8,
        /// Byte echoed by the device.
        actual: u8,
    },

    /// Flash checksum read back differs from the image.
    #[error("checksum mismatch: expected {expected}, device reports {actual}")]
    ChecksumMismatch {
        /// Checksum embedded in the image.
        expected: Checksum,
        /// Checksum read from the device.
        actual: Checksum,
    },

    /// Firmware version after flashing differs from the image.
    #[error("version mismatch: expected {expected:#04x}, device reports {actual:#04x}")]
    VersionMismatch {
        /// Version declared by the image.
        expected: u8,
        /// Version read from the device.
        actual: u8,
    },

    /// A mode register did not echo the value written to it.
    #[error("register {register:#04x} echoed {actual:#04x}, expected {expected:#04x}")]
    UnexpectedEcho {
        /// Register address.
        register: u8,
        /// Value written.
        expected: u8,
        /// Value read back.
        actual: u8,
    },

    /// The firmware running on the device does not support tuning maps.
    #[error("tuning map requires logic firmware (device {device}, image {image})")]
    TuningUnsupported {
        /// Version reported by the device.
        device: String,
        /// Version of the loaded image.
        image: String,
    },
}

/// Firmware flashing failure with diagnostics from the last attempt.
#[derive(Debug, Error)]
#[error(
    "flash failed after {attempts} attempt(s) (checksum {}, version {}): {cause}",
    describe_checksum(.last_checksum),
    describe_version(.last_version)
)]
pub struct FlashError {
    /// Number of complete flash attempts made.
    pub attempts: u8,
    /// Checksum read back during the last attempt, if any.
    pub last_checksum: Option<Checksum>,
    /// Firmware version read after the last attempt, if any.
    pub last_version: Option<u8>,
    /// Why the last attempt failed.
    #[source]
    pub cause: FlashFailure,
}

fn describe_checksum(checksum: &Option<Checksum>) -> String {
    checksum.map_or_else(|| "n/a".to_string(), |c| c.to_string())
}

fn describe_version(version: &Option<u8>) -> String {
    version.map_or_else(|| "n/a".to_string(), |v| format!("{v:#04x}"))
}

/// Cause of a [`FlashError`].
#[derive(Debug, Error)]
pub enum FlashFailure {
    /// A transfer failed mid-flash.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The device violated the bootloader protocol or verification failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Errors related to firmware images and their sources.
#[derive(Debug, Error)]
pub enum FirmwareError {
    /// Image is smaller than one header block plus one payload block.
    #[error("firmware image too short: {0} bytes")]
    TooShort(usize),

    /// Image length is not a multiple of the block size.
    #[error("firmware image length {0} is not a multiple of 32")]
    Misaligned(usize),

    /// Reading the image from its source failed.
    #[error("failed to read firmware {path}: {source}")]
    Io {
        /// Path that was requested.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// No image was supplied for an external update.
    #[error("no firmware image available")]
    Unavailable,
}

/// Errors related to value validation and constraints.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A channel index that does not name a channel.
    #[error("invalid channel index: {0}")]
    InvalidChannel(u8),
}

/// Errors related to configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A field holds a value that cannot work.
    #[error("invalid {field}: {message}")]
    InvalidValue {
        /// The offending field.
        field: String,
        /// Description of the problem.
        message: String,
    },
}

/// Errors reported by a [`PowerSupply`](crate::hal::PowerSupply).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("regulator {regulator}: {message}")]
pub struct PowerError {
    /// Regulator name.
    pub regulator: String,
    /// What went wrong.
    pub message: String,
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_error_display() {
        assert_eq!(
            ValueError::InvalidChannel(4).to_string(),
            "invalid channel index: 4"
        );
    }

    #[test]
    fn retries_exhausted_reports_attempts() {
        let err = TransportError::RetriesExhausted {
            addr: 0x00,
            attempts: 3,
            last: Box::new(TransportError::Nack),
        };
        assert_eq!(err.attempts(), 3);
        assert_eq!(TransportError::Nack.attempts(), 1);
        assert_eq!(
            err.to_string(),
            "register 0x00 failed after 3 attempt(s): no acknowledge from device"
        );
    }

    #[test]
    fn error_from_protocol_error() {
        let err: Error = ProtocolError::BootloaderAck {
            expected: 0x00,
            actual: 0x5b,
        }
        .into();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::BootloaderAck { actual: 0x5b, .. })
        ));
    }

    #[test]
    fn flash_error_display_includes_diagnostics() {
        let err = FlashError {
            attempts: 3,
            last_checksum: Some(Checksum::new(0x12, 0x34)),
            last_version: Some(0x10),
            cause: FlashFailure::Protocol(ProtocolError::VersionMismatch {
                expected: 0x12,
                actual: 0x10,
            }),
        };
        let text = err.to_string();
        assert!(text.contains("3 attempt(s)"));
        assert!(text.contains("1234"));
        assert!(text.contains("0x10"));
    }
}
