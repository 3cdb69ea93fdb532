// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fault reasons and the accumulated fault bitmask.

use std::fmt;

/// Why the device entered the faulted state.
///
/// The discriminant is the bit position used in [`FaultBits`] and the
/// value factory tooling reads back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum FaultReason {
    /// Sensing was re-enabled while the device was already faulted.
    UpdatePrevState = 1,
    /// Probe-time firmware setup failed.
    SetupRegister = 2,
    /// The enable command could not be written.
    I2cEnable = 3,
    /// Three consecutive transport failures.
    I2cFailures = 4,
    /// Sensor data stopped changing.
    DataStuck = 5,
    /// Device reset failed.
    Reset = 6,
    /// Host-requested reset failed.
    MccReset = 7,
    /// Interrupt-reported state disagreed with polled state three times.
    IrqMismatch = 8,
}

impl FaultReason {
    /// Returns the bit position of this reason.
    #[must_use]
    pub const fn bit_position(self) -> u8 {
        self as u8
    }

    /// Returns the mask of this reason within [`FaultBits`].
    #[must_use]
    pub const fn mask(self) -> u32 {
        1 << (self as u8)
    }

    const ALL: [Self; 8] = [
        Self::UpdatePrevState,
        Self::SetupRegister,
        Self::I2cEnable,
        Self::I2cFailures,
        Self::DataStuck,
        Self::Reset,
        Self::MccReset,
        Self::IrqMismatch,
    ];
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UpdatePrevState => "update previous state",
            Self::SetupRegister => "setup register",
            Self::I2cEnable => "i2c enable",
            Self::I2cFailures => "i2c failures",
            Self::DataStuck => "data stuck",
            Self::Reset => "reset",
            Self::MccReset => "mcc reset",
            Self::IrqMismatch => "irq mismatch",
        };
        f.write_str(name)
    }
}

/// Every [`FaultReason`] ever recorded on this device.
///
/// Bits are only ever added; re-arming the device keeps them.
///
/// # Examples
///
/// ```
/// use grip_ctl::types::{FaultBits, FaultReason};
///
/// let mut bits = FaultBits::empty();
/// bits.insert(FaultReason::IrqMismatch);
/// assert!(bits.contains(FaultReason::IrqMismatch));
/// assert_eq!(bits.bits(), 1 << 8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct FaultBits(u32);

impl FaultBits {
    /// A mask with no reasons recorded.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Records a reason.
    pub fn insert(&mut self, reason: FaultReason) {
        self.0 |= reason.mask();
    }

    /// Returns `true` if the reason was ever recorded.
    #[must_use]
    pub const fn contains(self, reason: FaultReason) -> bool {
        self.0 & reason.mask() != 0
    }

    /// Returns `true` if no reason was recorded.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns the raw mask.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Iterates over the recorded reasons in bit order.
    pub fn iter(self) -> impl Iterator<Item = FaultReason> {
        FaultReason::ALL
            .into_iter()
            .filter(move |reason| self.contains(*reason))
    }
}

impl fmt::Display for FaultBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Fail-safe behaviour applied when the device faults.
///
/// Bit 0 reports an abnormal condition on every channel. With bit 0 set
/// and bit 1 clear the IC is also powered off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct FailSafePolicy(u8);

impl FailSafePolicy {
    const REPORT_ABNORMAL: u8 = 0x01;
    const KEEP_POWER: u8 = 0x02;

    /// Creates a policy from its raw bits.
    #[must_use]
    pub const fn new(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns `true` if faults are reported as abnormal on every channel.
    #[must_use]
    pub const fn reports_abnormal(self) -> bool {
        self.0 & Self::REPORT_ABNORMAL != 0
    }

    /// Returns `true` if the IC is powered off when it faults.
    #[must_use]
    pub const fn powers_off(self) -> bool {
        self.reports_abnormal() && self.0 & Self::KEEP_POWER == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_masks_follow_bit_positions() {
        assert_eq!(FaultReason::UpdatePrevState.mask(), 0x02);
        assert_eq!(FaultReason::I2cFailures.mask(), 0x10);
        assert_eq!(FaultReason::IrqMismatch.mask(), 0x100);
    }

    #[test]
    fn bits_accumulate() {
        let mut bits = FaultBits::empty();
        assert!(bits.is_empty());

        bits.insert(FaultReason::I2cFailures);
        bits.insert(FaultReason::IrqMismatch);
        bits.insert(FaultReason::I2cFailures);

        assert_eq!(bits.bits(), 0x110);
        let reasons: Vec<_> = bits.iter().collect();
        assert_eq!(
            reasons,
            vec![FaultReason::I2cFailures, FaultReason::IrqMismatch]
        );
    }

    #[test]
    fn fail_safe_policy_bits() {
        assert!(!FailSafePolicy::new(0).reports_abnormal());
        assert!(!FailSafePolicy::new(0).powers_off());
        assert!(FailSafePolicy::new(1).powers_off());
        assert!(FailSafePolicy::new(3).reports_abnormal());
        assert!(!FailSafePolicy::new(3).powers_off());
        // Keep-power alone does nothing
        assert!(!FailSafePolicy::new(2).powers_off());
    }
}
