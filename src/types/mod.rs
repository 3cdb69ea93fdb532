// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types for grip sensor control.
//!
//! This module provides type-safe representations of the values exchanged
//! with the grip IC and reported to listeners.
//!
//! # Types
//!
//! - [`Channel`] - Sensing channel (primary or secondary)
//! - [`Threshold`] - 16-bit detection threshold
//! - [`FirmwareVersion`] / [`Checksum`] - Firmware identification
//! - [`FaultReason`] / [`FaultBits`] - Why and how often the device faulted
//! - [`FailSafePolicy`] - What happens when the device faults
//! - [`UpdateStatus`] - Outcome of the last firmware update
//! - [`UnknownTrigger`] - Why unknown mode was entered

mod channel;
mod fault;
mod status;
mod threshold;
mod version;

pub use channel::Channel;
pub use fault::{FailSafePolicy, FaultBits, FaultReason};
pub use status::{EventReporting, HallSensor, UnknownTrigger, UpdateStatus, UsbAttach};
pub use threshold::Threshold;
pub use version::{Checksum, CrcReport, FirmwareVersion};
