// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Detection threshold type.

use std::fmt;

/// A 16-bit detection threshold as stored in the grip IC.
///
/// Thresholds occupy two consecutive registers, most significant byte
/// first.
///
/// # Examples
///
/// ```
/// use grip_ctl::types::Threshold;
///
/// let thd = Threshold::new(0x0123);
/// assert_eq!(thd.to_be_bytes(), [0x01, 0x23]);
/// assert_eq!(Threshold::from_be_bytes([0x01, 0x23]), thd);
///
/// // Out-of-range requests clamp instead of wrapping
/// assert_eq!(Threshold::clamped(-5).value(), 0);
/// assert_eq!(Threshold::clamped(70_000).value(), 0xFFFF);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Threshold(u16);

impl Threshold {
    /// Lowest threshold.
    pub const MIN: Self = Self(0);

    /// Highest threshold.
    pub const MAX: Self = Self(u16::MAX);

    /// Creates a threshold from its raw value.
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Creates a threshold from a signed request, clamping to `0..=0xFFFF`.
    #[must_use]
    pub fn clamped(value: i64) -> Self {
        Self(u16::try_from(value.clamp(0, i64::from(u16::MAX))).unwrap_or(u16::MAX))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Returns the register encoding (MSB, LSB).
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// Decodes the register encoding (MSB, LSB).
    #[must_use]
    pub const fn from_be_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_be_bytes(bytes))
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for Threshold {
    fn from(value: u16) -> Self {
        Self(value)
    }
}
