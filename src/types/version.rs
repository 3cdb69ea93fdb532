// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Firmware identification types.

use std::fmt;

/// Model and firmware version bytes reported by the IC or declared by an
/// image.
///
/// Displayed the way factory tooling expects it: `0x` followed by the
/// model byte and the firmware byte.
///
/// # Examples
///
/// ```
/// use grip_ctl::types::FirmwareVersion;
///
/// let version = FirmwareVersion::new(0xAC, 0x12);
/// assert_eq!(version.to_string(), "0xac12");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct FirmwareVersion {
    /// Model number byte.
    pub model: u8,
    /// Firmware version byte.
    pub firmware: u8,
}

impl FirmwareVersion {
    /// Firmware versions above this value are engineering test builds and
    /// always get replaced by the released image.
    pub const TEST_FIRMWARE_THRESHOLD: u8 = 0xA0;

    /// Creates a version from its model and firmware bytes.
    #[must_use]
    pub const fn new(model: u8, firmware: u8) -> Self {
        Self { model, firmware }
    }

    /// Returns `true` if this is an engineering test build.
    #[must_use]
    pub const fn is_test_firmware(&self) -> bool {
        self.firmware > Self::TEST_FIRMWARE_THRESHOLD
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}{:02x}", self.model, self.firmware)
    }
}

/// Two-byte flash checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Checksum {
    /// Most significant byte.
    pub msb: u8,
    /// Least significant byte.
    pub lsb: u8,
}

impl Checksum {
    /// Creates a checksum from its two bytes.
    #[must_use]
    pub const fn new(msb: u8, lsb: u8) -> Self {
        Self { msb, lsb }
    }

    /// Returns the checksum as a big-endian 16-bit value.
    #[must_use]
    pub const fn value(&self) -> u16 {
        u16::from_be_bytes([self.msb, self.lsb])
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:02x}", self.msb, self.lsb)
    }
}

/// Result of a user-mode checksum comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcReport {
    /// Whether the device checksum matches the image.
    pub ok: bool,
    /// Checksum reported by the device.
    pub device: Checksum,
}

impl fmt::Display for CrcReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.ok { "OK" } else { "NG" };
        write!(f, "{verdict},{}", self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firmware_detection() {
        assert!(!FirmwareVersion::new(0xAC, 0xA0).is_test_firmware());
        assert!(FirmwareVersion::new(0xAC, 0xA1).is_test_firmware());
    }

    #[test]
    fn checksum_value_and_display() {
        let sum = Checksum::new(0xBE, 0xEF);
        assert_eq!(sum.value(), 0xBEEF);
        assert_eq!(sum.to_string(), "beef");
    }

    #[test]
    fn crc_report_display() {
        let report = CrcReport {
            ok: false,
            device: Checksum::new(0x00, 0x10),
        };
        assert_eq!(report.to_string(), "NG,0010");
    }
}
