// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Status and notification value types.

use std::fmt;

/// Outcome of the most recent firmware update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum UpdateStatus {
    /// The last update succeeded, or none was attempted.
    #[default]
    Pass,
    /// An update is in progress.
    Downloading,
    /// The last update failed.
    Fail,
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("PASS"),
            Self::Downloading => f.write_str("Downloading"),
            Self::Fail => f.write_str("Fail"),
        }
    }
}

/// What made the controller enter unknown mode.
///
/// The discriminant is the value reported to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum UnknownTrigger {
    /// USB cable attached or detached.
    Usb = 1,
    /// Hall sensor (flip cover) changed.
    Hall = 2,
    /// Notifications were enabled at boot.
    Boot = 3,
    /// Forced by the host or by a fault.
    Force = 4,
    /// Accessory cover changed.
    Cover = 5,
}

impl UnknownTrigger {
    /// Returns the numeric code reported to listeners.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Gating of press/release reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum EventReporting {
    /// Suppress press/release events and report a release on every channel.
    Skip,
    /// Report press/release events again.
    Resume,
}

/// USB connector change delivered by the power-delivery stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsbAttach {
    /// A cable is attached.
    pub attached: bool,
    /// The phone acts as USB host (OTG).
    pub host: bool,
}

impl UsbAttach {
    /// A cable attached with the phone as device.
    #[must_use]
    pub const fn attached() -> Self {
        Self {
            attached: true,
            host: false,
        }
    }

    /// A cable attached with the phone as host.
    #[must_use]
    pub const fn attached_as_host() -> Self {
        Self {
            attached: true,
            host: true,
        }
    }

    /// No cable.
    #[must_use]
    pub const fn detached() -> Self {
        Self {
            attached: false,
            host: false,
        }
    }
}

/// The hall sensor that reported a cover change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HallSensor {
    /// The main flip-cover sensor.
    Flip,
    /// The certification cover sensor.
    Certify,
    /// The pen (wacom) cover sensor.
    Wacom,
}

impl HallSensor {
    /// Returns `true` for the accessory sensors that trigger a reset on
    /// tablets.
    #[must_use]
    pub const fn is_accessory(self) -> bool {
        matches!(self, Self::Certify | Self::Wacom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_status_display() {
        assert_eq!(UpdateStatus::Pass.to_string(), "PASS");
        assert_eq!(UpdateStatus::Downloading.to_string(), "Downloading");
        assert_eq!(UpdateStatus::Fail.to_string(), "Fail");
        assert_eq!(UpdateStatus::default(), UpdateStatus::Pass);
    }

    #[test]
    fn trigger_codes() {
        assert_eq!(UnknownTrigger::Usb.code(), 1);
        assert_eq!(UnknownTrigger::Force.code(), 4);
        assert_eq!(UnknownTrigger::Cover.code(), 5);
    }

    #[test]
    fn accessory_hall_sensors() {
        assert!(!HallSensor::Flip.is_accessory());
        assert!(HallSensor::Certify.is_accessory());
        assert!(HallSensor::Wacom.is_accessory());
    }
}
