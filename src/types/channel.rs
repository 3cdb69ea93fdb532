// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sensing channel addressing.

use std::fmt;

use crate::error::ValueError;

/// A sensing channel of the grip IC.
///
/// Single-channel parts only have [`Channel::Primary`]. Dual-channel parts
/// add [`Channel::Secondary`], whose state shares the status register with
/// the primary channel (bit 0 and bit 1 respectively).
///
/// # Examples
///
/// ```
/// use grip_ctl::types::Channel;
///
/// assert_eq!(Channel::Primary.status_mask(), 0x01);
/// assert_eq!(Channel::Secondary.status_mask(), 0x02);
/// assert_eq!(Channel::try_from(1).unwrap(), Channel::Secondary);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum Channel {
    /// First channel (always present).
    Primary,
    /// Second channel (dual-channel parts only).
    Secondary,
}

impl Channel {
    /// All channels in register order.
    pub const ALL: [Self; 2] = [Self::Primary, Self::Secondary];

    /// Returns the zero-based channel index.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
        }
    }

    /// Returns the bit of the status register carrying this channel's state.
    #[must_use]
    pub const fn status_mask(self) -> u8 {
        match self {
            Self::Primary => 0x01,
            Self::Secondary => 0x02,
        }
    }

    /// Extracts this channel's press state (0 or 1) from a raw status byte.
    #[must_use]
    pub const fn pressed_bit(self, status: u8) -> u8 {
        (status & self.status_mask()) >> self.index()
    }

    /// Returns the register offset of this channel within a paired block.
    ///
    /// Paired registers hold the primary value at `base` and the secondary
    /// value at `base + 2`.
    #[must_use]
    pub const fn register_offset(self) -> u8 {
        match self {
            Self::Primary => 0,
            Self::Secondary => 2,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "1ch"),
            Self::Secondary => write!(f, "2ch"),
        }
    }
}

impl TryFrom<u8> for Channel {
    type Error = ValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Primary),
            1 => Ok(Self::Secondary),
            other => Err(ValueError::InvalidChannel(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pressed_bit_extracts_each_channel() {
        assert_eq!(Channel::Primary.pressed_bit(0b11), 1);
        assert_eq!(Channel::Secondary.pressed_bit(0b11), 1);
        assert_eq!(Channel::Primary.pressed_bit(0b10), 0);
        assert_eq!(Channel::Secondary.pressed_bit(0b01), 0);
    }

    #[test]
    fn invalid_index_rejected() {
        assert_eq!(Channel::try_from(2), Err(ValueError::InvalidChannel(2)));
    }

    #[test]
    fn display() {
        assert_eq!(Channel::Primary.to_string(), "1ch");
        assert_eq!(Channel::Secondary.to_string(), "2ch");
    }
}
