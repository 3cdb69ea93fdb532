// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Grip event types.

use crate::types::{Channel, FaultBits, FaultReason, UnknownTrigger};

/// Notifications emitted by the [`DeviceController`](crate::controller::DeviceController).
///
/// # Examples
///
/// ```
/// use grip_ctl::event::GripEvent;
/// use grip_ctl::types::{Channel, UnknownTrigger};
///
/// let release = GripEvent::Release { channel: Channel::Secondary, unknown: true };
/// assert_eq!(release.channel(), Some(Channel::Secondary));
/// assert!(release.is_grip());
///
/// let trigger = GripEvent::UnknownTrigger(UnknownTrigger::Hall);
/// assert_eq!(trigger.channel(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum GripEvent {
    /// A channel detected a grip.
    Press {
        /// The channel that changed.
        channel: Channel,
        /// Whether the channel was in unknown mode.
        unknown: bool,
    },

    /// A channel stopped detecting a grip.
    Release {
        /// The channel that changed.
        channel: Channel,
        /// Whether the channel was in unknown mode.
        unknown: bool,
    },

    /// A channel entered or left unknown mode.
    UnknownMode {
        /// The channel that changed.
        channel: Channel,
        /// `true` when entering unknown mode.
        active: bool,
    },

    /// Unknown mode was entered for the given reason.
    UnknownTrigger(UnknownTrigger),

    /// The device faulted.
    Fault {
        /// The reason of this escalation.
        reason: FaultReason,
        /// Every fault reason recorded so far.
        bits: FaultBits,
    },

    /// The fail-safe policy reports a channel as not working.
    Abnormal {
        /// The affected channel.
        channel: Channel,
    },

    /// The IC registers may have been lost and should be restored with
    /// [`DeviceController::recover_registers`](crate::controller::DeviceController::recover_registers).
    RegisterRecoveryRequested,
}

impl GripEvent {
    /// Returns the channel this event refers to, if any.
    #[must_use]
    pub fn channel(&self) -> Option<Channel> {
        match self {
            Self::Press { channel, .. }
            | Self::Release { channel, .. }
            | Self::UnknownMode { channel, .. }
            | Self::Abnormal { channel } => Some(*channel),
            Self::UnknownTrigger(_) | Self::Fault { .. } | Self::RegisterRecoveryRequested => {
                None
            }
        }
    }

    /// Returns `true` for press and release events.
    #[must_use]
    pub fn is_grip(&self) -> bool {
        matches!(self, Self::Press { .. } | Self::Release { .. })
    }

    /// Returns `true` for fault-related events.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault { .. } | Self::Abnormal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let press = GripEvent::Press {
            channel: Channel::Primary,
            unknown: false,
        };
        assert!(press.is_grip());
        assert!(!press.is_fault());

        let mut bits = FaultBits::empty();
        bits.insert(FaultReason::I2cFailures);
        let fault = GripEvent::Fault {
            reason: FaultReason::I2cFailures,
            bits,
        };
        assert!(fault.is_fault());
        assert_eq!(fault.channel(), None);

        assert!(GripEvent::Abnormal { channel: Channel::Primary }.is_fault());
    }

    #[test]
    fn serializes_with_variant_name() {
        let event = GripEvent::UnknownMode {
            channel: Channel::Secondary,
            active: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("UnknownMode"));
        assert_eq!(serde_json::from_str::<GripEvent>(&json).unwrap(), event);
    }
}
