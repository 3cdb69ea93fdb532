// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state tracking.
//!
//! [`DeviceState`] holds everything the controller knows about the IC:
//! enable and interrupt bookkeeping, unknown-mode flags, health counters and
//! the per-channel readings in [`ChannelState`]. The controller owns it
//! behind its device lock; [`DeviceController::state`] hands out clones.
//!
//! Readings are refreshed whenever the controller reads them and are never
//! persisted.
//!
//! [`DeviceController::state`]: crate::controller::DeviceController::state

mod channel_state;
mod device_state;

pub use channel_state::{ChannelState, Thresholds};
pub use device_state::DeviceState;
