// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Delays required by the grip IC.

use std::time::Duration;

/// Backoff between register transfer attempts.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(10);
/// Power-off time during a power cycle.
pub const POWER_CYCLE: Duration = Duration::from_millis(50);
/// Settle time after a power cycle or boot-mode exit.
pub const RESET: Duration = Duration::from_millis(150);
/// Delay between power-up and the boot-mode entry command.
pub const BOOT: Duration = Duration::from_millis(45);
/// Delay after boot-mode entry before erasing.
pub const BOOT_ENTERED: Duration = Duration::from_millis(5);
/// Flash erase time.
pub const ERASE: Duration = Duration::from_millis(1400);
/// Delay after each block write before polling for busy.
pub const BLOCK_WRITE: Duration = Duration::from_millis(3);
/// Delay between checksum request steps.
pub const CHECKSUM_STEP: Duration = Duration::from_millis(5);
/// Settle time after switching always-active mode.
pub const ALWAYS_ACTIVE: Duration = Duration::from_millis(20);
/// Time for the user-mode checksum to be computed.
pub const USER_CRC: Duration = Duration::from_millis(160);
/// Delay between the diff log and the software reset command.
pub const SW_RESET_PREPARE: Duration = Duration::from_millis(10);
/// Time the software reset takes.
pub const SW_RESET: Duration = Duration::from_millis(35);
/// Wait before polling for software reset completion.
pub const SW_RESET_READY: Duration = Duration::from_secs(1);
/// Interval between software reset completion polls.
pub const SW_RESET_POLL: Duration = Duration::from_millis(100);
/// Attempts when polling for software reset completion.
pub const SW_RESET_POLL_ATTEMPTS: u8 = 5;
/// Settle time after switching between register and tuning maps.
pub const TUNING_SWITCH: Duration = Duration::from_millis(20);
/// Time for the tuning checksum to be computed.
pub const TUNING_CHECKSUM: Duration = Duration::from_millis(10);
