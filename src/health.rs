// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device health tracking and fault escalation.
//!
//! The [`HealthMonitor`] decides when the grip IC can no longer be trusted.
//! Two independent conditions escalate to the faulted state:
//!
//! - the press state seen by the periodic poll disagrees with the last
//!   recorded state three times without an interrupt confirming it
//! - three consecutive register transfers fail
//!
//! Escalation happens exactly once. While faulted the monitor ignores
//! further input; only [`HealthMonitor::rearm`] (after a successful
//! firmware-version read) clears the faulted flag. The accumulated
//! [`FaultBits`] are never cleared.
//!
//! The monitor only keeps score. Side effects of a fault (masking the
//! interrupt, unknown mode, notifications, fail-safe power-off) are
//! performed by the [`DeviceController`](crate::controller::DeviceController).

use crate::types::{Channel, FaultBits, FaultReason};

/// Number of consecutive failures or mismatches that fault the device.
pub const FAULT_THRESHOLD: u8 = 3;

/// Where a press state observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckSource {
    /// The interrupt handler; the state is authoritative.
    Interrupt,
    /// Sensing was just enabled; the state is recorded without comparison.
    Enable,
    /// The periodic diagnostic poll; the state is compared.
    Poll,
}

/// Consistency counters of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelHealth {
    prev_state: u8,
    mismatch_count: u8,
}

impl ChannelHealth {
    /// Returns the last recorded press state (0 or 1).
    #[must_use]
    pub const fn recorded_state(&self) -> u8 {
        self.prev_state
    }

    /// Returns the number of poll mismatches since the last interrupt.
    #[must_use]
    pub const fn mismatch_count(&self) -> u8 {
        self.mismatch_count
    }
}

/// Tracks interrupt consistency and transport failures.
///
/// # Examples
///
/// ```
/// use grip_ctl::health::{CheckSource, HealthMonitor};
/// use grip_ctl::types::{Channel, FaultReason};
///
/// let mut health = HealthMonitor::new();
///
/// // The interrupt said "released"; the poll keeps seeing a different state
/// health.check_irq_consistency(Channel::Primary, 0, CheckSource::Interrupt, true);
/// assert_eq!(health.check_irq_consistency(Channel::Primary, 1, CheckSource::Poll, true), None);
/// assert_eq!(health.check_irq_consistency(Channel::Primary, 0, CheckSource::Poll, true), None);
/// assert_eq!(
///     health.check_irq_consistency(Channel::Primary, 1, CheckSource::Poll, true),
///     Some(FaultReason::IrqMismatch)
/// );
/// assert!(health.is_faulted());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HealthMonitor {
    faulted: bool,
    fault_bits: FaultBits,
    i2c_fail_count: u8,
    channels: [ChannelHealth; 2],
}

impl HealthMonitor {
    /// Creates a monitor in the normal state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once the device has faulted.
    #[must_use]
    pub const fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Returns every fault reason ever recorded.
    #[must_use]
    pub const fn fault_bits(&self) -> FaultBits {
        self.fault_bits
    }

    /// Returns the number of consecutive transport failures (at most 3).
    #[must_use]
    pub const fn i2c_fail_count(&self) -> u8 {
        self.i2c_fail_count
    }

    /// Returns the consistency counters of a channel.
    #[must_use]
    pub const fn channel(&self, channel: Channel) -> &ChannelHealth {
        &self.channels[channel.index()]
    }

    /// Feeds an observed press state into the consistency check.
    ///
    /// Observations are ignored while interrupt delivery is inactive or the
    /// monitor is already faulted. Returns the reason when this call faulted
    /// the device.
    pub fn check_irq_consistency(
        &mut self,
        channel: Channel,
        observed: u8,
        source: CheckSource,
        irq_active: bool,
    ) -> Option<FaultReason> {
        if !irq_active || self.faulted {
            return None;
        }

        let health = &mut self.channels[channel.index()];
        match source {
            CheckSource::Interrupt => {
                health.mismatch_count = 0;
                health.prev_state = observed;
            }
            CheckSource::Enable => health.prev_state = observed,
            CheckSource::Poll if health.prev_state != observed => {
                tracing::info!(
                    %channel,
                    prev = health.prev_state,
                    observed,
                    count = health.mismatch_count,
                    "Polled state disagrees with interrupt state"
                );
                health.mismatch_count = health.mismatch_count.saturating_add(1);
                health.prev_state = observed;
            }
            CheckSource::Poll => {}
        }

        if health.mismatch_count >= FAULT_THRESHOLD {
            self.escalate(FaultReason::IrqMismatch);
            return Some(FaultReason::IrqMismatch);
        }
        None
    }

    /// Records a successful register transfer.
    pub fn record_success(&mut self) {
        self.i2c_fail_count = 0;
    }

    /// Records `attempts` failed register transfer attempts.
    ///
    /// Returns the reason when this call faulted the device.
    pub fn record_failures(&mut self, attempts: u8) -> Option<FaultReason> {
        if self.faulted {
            return None;
        }
        self.i2c_fail_count = self
            .i2c_fail_count
            .saturating_add(attempts)
            .min(FAULT_THRESHOLD);
        tracing::info!(count = self.i2c_fail_count, "Transport failure recorded");

        if self.i2c_fail_count >= FAULT_THRESHOLD {
            self.escalate(FaultReason::I2cFailures);
            return Some(FaultReason::I2cFailures);
        }
        None
    }

    /// Marks the device faulted for `reason`.
    ///
    /// Unlike the automatic checks this always records the reason, even when
    /// already faulted.
    pub fn escalate(&mut self, reason: FaultReason) {
        self.faulted = true;
        self.fault_bits.insert(reason);
        tracing::warn!(%reason, bits = %self.fault_bits, "Device faulted");
    }

    /// Stops all further checks without recording a reason.
    ///
    /// Used on shutdown so nothing touches the powered-down IC.
    pub fn halt(&mut self) {
        self.faulted = true;
    }

    /// Leaves the faulted state after a successful firmware-version read.
    ///
    /// Counters restart from zero; fault bits are kept. Returns `true` if
    /// the device was faulted.
    pub fn rearm(&mut self) -> bool {
        let was_faulted = self.faulted;
        self.faulted = false;
        self.i2c_fail_count = 0;
        for health in &mut self.channels {
            health.mismatch_count = 0;
        }
        if was_faulted {
            tracing::info!(bits = %self.fault_bits, "Fault re-armed");
        }
        was_faulted
    }
}
