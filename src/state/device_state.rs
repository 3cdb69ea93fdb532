// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state tracking.

use crate::health::HealthMonitor;
use crate::types::{Channel, FaultBits, UsbAttach};

use super::ChannelState;

/// Tracked state of a grip device.
///
/// # Examples
///
/// ```
/// use grip_ctl::state::DeviceState;
/// use grip_ctl::types::Channel;
///
/// let state = DeviceState::new();
/// assert!(!state.is_enabled());
/// assert!(state.first_event_pending());
/// assert!(state.motion());
/// assert!(!state.channel(Channel::Primary).is_pressed());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
// Mirrors independent device flags; grouping them would only rename them.
#[allow(clippy::struct_excessive_bools)]
pub struct DeviceState {
    pub(crate) enabled: bool,
    pub(crate) first_event_pending: bool,
    pub(crate) last_raw_status: u8,
    pub(crate) irq_active: bool,
    pub(crate) irq_enable_count: u32,
    pub(crate) skip_events: bool,
    pub(crate) motion: bool,
    pub(crate) ready: bool,
    pub(crate) resume_pending: bool,
    pub(crate) wake_armed: bool,
    pub(crate) tick_count: u32,
    pub(crate) low_temp_active: bool,
    pub(crate) tuning_mode: bool,
    pub(crate) irq_counting: bool,
    pub(crate) last_usb: Option<UsbAttach>,
    pub(crate) otg_host: bool,
    pub(crate) health: HealthMonitor,
    pub(crate) channels: [ChannelState; 2],
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceState {
    /// Creates the state of a freshly attached, disabled device.
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: false,
            first_event_pending: true,
            last_raw_status: 0,
            irq_active: false,
            irq_enable_count: 0,
            skip_events: false,
            motion: true,
            ready: false,
            resume_pending: false,
            wake_armed: false,
            tick_count: 0,
            low_temp_active: false,
            tuning_mode: false,
            irq_counting: false,
            last_usb: None,
            otg_host: false,
            health: HealthMonitor::new(),
            channels: Default::default(),
        }
    }

    // ========== Sensing ==========

    /// Returns `true` while sensing is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns `true` if the next interrupt reports every channel.
    #[must_use]
    pub fn first_event_pending(&self) -> bool {
        self.first_event_pending
    }

    /// Returns the status byte of the last handled interrupt.
    #[must_use]
    pub fn last_raw_status(&self) -> u8 {
        self.last_raw_status
    }

    /// Returns `true` while interrupt delivery is unmasked.
    #[must_use]
    pub fn irq_active(&self) -> bool {
        self.irq_active
    }

    /// Returns how many times interrupt delivery was enabled.
    #[must_use]
    pub fn irq_enable_count(&self) -> u32 {
        self.irq_enable_count
    }

    /// Returns `true` while press and release events are suppressed.
    #[must_use]
    pub fn events_skipped(&self) -> bool {
        self.skip_events
    }

    /// Returns the motion flag that keeps unknown mode resolvable.
    #[must_use]
    pub fn motion(&self) -> bool {
        self.motion
    }

    /// Returns `true` when the IC is attached and not being reset or
    /// flashed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Returns `true` while low-temperature thresholds are applied.
    #[must_use]
    pub fn low_temp_active(&self) -> bool {
        self.low_temp_active
    }

    /// Returns `true` after a tuning map was applied.
    #[must_use]
    pub fn tuning_mode(&self) -> bool {
        self.tuning_mode
    }

    /// Returns `true` while factory interrupt counting is on.
    #[must_use]
    pub fn irq_counting(&self) -> bool {
        self.irq_counting
    }

    /// Returns `true` if the phone was last seen as USB host.
    #[must_use]
    pub fn otg_host(&self) -> bool {
        self.otg_host
    }

    // ========== Health ==========

    /// Returns `true` once the device has faulted.
    #[must_use]
    pub fn is_faulted(&self) -> bool {
        self.health.is_faulted()
    }

    /// Returns every fault reason recorded so far.
    #[must_use]
    pub fn fault_bits(&self) -> FaultBits {
        self.health.fault_bits()
    }

    /// Returns the number of consecutive transport failures.
    #[must_use]
    pub fn i2c_fail_count(&self) -> u8 {
        self.health.i2c_fail_count()
    }

    /// Returns the health monitor.
    #[must_use]
    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    // ========== Channels ==========

    /// Returns the state of a channel.
    #[must_use]
    pub fn channel(&self, channel: Channel) -> &ChannelState {
        &self.channels[channel.index()]
    }

    pub(crate) fn channel_mut(&mut self, channel: Channel) -> &mut ChannelState {
        &mut self.channels[channel.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FaultReason;

    #[test]
    fn new_state_waits_for_first_event() {
        let state = DeviceState::new();
        assert!(state.first_event_pending());
        assert!(!state.is_ready());
        assert!(!state.is_faulted());
        assert_eq!(state.irq_enable_count(), 0);
    }

    #[test]
    fn health_is_exposed() {
        let mut state = DeviceState::new();
        state.health.escalate(FaultReason::Reset);

        assert!(state.is_faulted());
        assert!(state.fault_bits().contains(FaultReason::Reset));
    }

    #[test]
    fn channel_mut_targets_channel() {
        let mut state = DeviceState::new();
        state.channel_mut(Channel::Secondary).pressed = true;

        assert!(state.channel(Channel::Secondary).is_pressed());
        assert!(!state.channel(Channel::Primary).is_pressed());
    }
}
