// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-channel readings and flags.

use crate::types::Threshold;

/// Press, release and noise thresholds of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Thresholds {
    /// Diff above which the channel reports a press.
    pub press: Threshold,
    /// Diff below which the channel reports a release.
    pub release: Threshold,
    /// Noise floor.
    pub noise: Threshold,
}

/// State of one sensing channel.
///
/// # Examples
///
/// ```
/// use grip_ctl::state::ChannelState;
///
/// let channel = ChannelState::default();
/// assert!(!channel.is_pressed());
/// assert!(!channel.is_unknown());
/// assert_eq!(channel.diff(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct ChannelState {
    pub(crate) thresholds: Thresholds,
    pub(crate) origin_press_threshold: Option<Threshold>,
    pub(crate) baseline: u16,
    pub(crate) raw: u16,
    pub(crate) diff: u16,
    pub(crate) diff_d: u16,
    pub(crate) total_cap: u16,
    pub(crate) pressed: bool,
    pub(crate) unknown: bool,
    pub(crate) first_working: bool,
    pub(crate) notifications: bool,
    pub(crate) irq_count: u32,
    pub(crate) max_diff: u16,
    pub(crate) max_normal_diff: u16,
}

impl ChannelState {
    /// Returns the thresholds last read from or written to the IC.
    #[must_use]
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Returns the press threshold read at attach, restored when
    /// low-temperature compensation ends.
    #[must_use]
    pub fn origin_press_threshold(&self) -> Option<Threshold> {
        self.origin_press_threshold
    }

    /// Returns the last baseline reading.
    #[must_use]
    pub fn baseline(&self) -> u16 {
        self.baseline
    }

    /// Returns the last raw count.
    #[must_use]
    pub fn raw(&self) -> u16 {
        self.raw
    }

    /// Returns the last diff reading.
    #[must_use]
    pub fn diff(&self) -> u16 {
        self.diff
    }

    /// Returns the last secondary diff reading.
    #[must_use]
    pub fn diff_d(&self) -> u16 {
        self.diff_d
    }

    /// Returns the last total capacitance reading, unscaled.
    #[must_use]
    pub fn total_cap(&self) -> u16 {
        self.total_cap
    }

    /// Returns `true` if the last reported event was a press.
    #[must_use]
    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Returns `true` while the channel is in unknown mode.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.unknown
    }

    /// Returns `true` once a grip was seen while in unknown mode.
    #[must_use]
    pub fn is_first_working(&self) -> bool {
        self.first_working
    }

    /// Returns `true` if this channel follows unknown-mode notifications.
    #[must_use]
    pub fn notifications_enabled(&self) -> bool {
        self.notifications
    }

    /// Returns the number of press interrupts counted in factory mode.
    #[must_use]
    pub fn irq_count(&self) -> u32 {
        self.irq_count
    }

    /// Returns the largest diff seen on a counted interrupt.
    #[must_use]
    pub fn max_diff(&self) -> u16 {
        self.max_diff
    }

    /// Returns the largest diff seen by the diagnostic poll in factory
    /// mode.
    #[must_use]
    pub fn max_normal_diff(&self) -> u16 {
        self.max_normal_diff
    }

    pub(crate) fn reset_irq_counters(&mut self) {
        self.irq_count = 0;
        self.max_diff = 0;
        self.max_normal_diff = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_reset_together() {
        let mut channel = ChannelState {
            irq_count: 4,
            max_diff: 900,
            max_normal_diff: 120,
            diff: 77,
            ..ChannelState::default()
        };

        channel.reset_irq_counters();

        assert_eq!(channel.irq_count(), 0);
        assert_eq!(channel.max_diff(), 0);
        assert_eq!(channel.max_normal_diff(), 0);
        assert_eq!(channel.diff(), 77);
    }
}
