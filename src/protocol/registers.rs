// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register map and command bytes.
//!
//! Paired registers hold the primary channel at the listed address and the
//! secondary channel two bytes further (see
//! [`Channel::register_offset`](crate::types::Channel::register_offset)).
//! 16-bit values are stored most significant byte first.

// ========== User-mode registers ==========

/// Press state of every channel, one bit per channel.
pub const BTN_STATUS: u8 = 0x00;
/// Firmware version byte.
pub const FW_VER: u8 = 0x01;
/// Model number byte.
pub const MODEL_NO: u8 = 0x02;
/// Charger (TA) attach state.
pub const TSPTA: u8 = 0x03;
/// Always-active mode switch.
pub const ALWAYS_ACTIVE: u8 = 0x05;
/// Software reset command and completion flag.
pub const SW_RESET: u8 = 0x06;
/// User-mode checksum result (two bytes).
pub const CRC: u8 = 0x0A;
/// Total capacitance of the primary channel.
pub const TOTAL_CAP: u8 = 0x10;
/// Raw data (raw, raw_d).
pub const RAW: u8 = 0x14;
/// Baseline.
pub const BASELINE: u8 = 0x18;
/// Diff data (diff, diff_d) of the primary channel.
pub const DIFF: u8 = 0x1C;
/// Diff data of the secondary channel.
pub const DIFF_2CH: u8 = 0x20;
/// Sensing enable.
pub const SAR_ENABLE: u8 = 0x24;
/// Press threshold; reading four bytes returns both channels.
pub const PRESS_THRESHOLD: u8 = 0x28;
/// Release threshold.
pub const RELEASE_THRESHOLD: u8 = 0x2C;
/// Noise threshold.
pub const NOISE_THRESHOLD: u8 = 0x30;
/// Reference capacitance.
pub const REF_CAP: u8 = 0x34;
/// Gain data of the primary channel (reset gain, integration gain at +3).
pub const GAIN: u8 = 0x38;
/// Gain data of the secondary channel.
pub const GAIN_2CH: u8 = 0x3C;
/// Gain data of the reference channel.
pub const REF_GAIN: u8 = 0x40;
/// Offset of the integration gain from a gain block.
pub const GAIN_INT_OFFSET: u8 = 3;

// ========== Tuning map ==========

/// Register/tuning map selector.
pub const TUNING_STATE: u8 = 0xF1;
/// Tuning checksum MSB (the LSB follows).
pub const TUNING_CHECKSUM: u8 = 0xF2;
/// Request switch to the tuning map.
pub const TUNING_MAP_CMD: u8 = 0x01;
/// Switch to the tuning map completed.
pub const TUNING_MAP_DONE: u8 = 0x02;
/// Request switch back to the register map.
pub const REGISTER_MAP_CMD: u8 = 0x03;
/// Switch back to the register map completed.
pub const REGISTER_MAP_DONE: u8 = 0x00;
/// Bytes written to start a tuning checksum computation.
pub const TUNING_CHECKSUM_REQUEST: [u8; 2] = [0x00, 0x10];

// ========== Command bytes ==========

/// Sensing on; also "charger detached" for [`TSPTA`].
pub const CMD_ON: u8 = 0x20;
/// Sensing off; also "charger attached" for [`TSPTA`].
pub const CMD_OFF: u8 = 0x10;
/// Software reset request.
pub const CMD_SW_RESET: u8 = 0x10;
/// Software reset finished.
pub const SW_RESET_DONE: u8 = 0x20;
/// Software reset still running.
pub const SW_RESET_IN_PROGRESS: u8 = 0x11;
/// Always-active mode on.
pub const ALWAYS_ACTIVE_ON: u8 = 0x01;
/// Always-active mode off.
pub const ALWAYS_ACTIVE_OFF: u8 = 0x00;
/// Raw command starting a user-mode checksum computation.
pub const USER_CRC_REQUEST: [u8; 3] = [CRC, 0x00, 0x10];

// ========== Register dump ==========

/// Registers dumped in register-map mode.
pub const DUMP_LEN: u8 = 0x91;
/// Registers dumped in tuning-map mode.
pub const DUMP_LEN_TUNING: u8 = 0x80;
/// Maximum registers returned by a single debug read.
pub const MAX_DEBUG_READ: usize = 6;

// ========== Bootloader ==========

/// Flash address of the first payload block.
pub const USER_CODE_ADDRESS: u16 = 0x0400;
/// Size of one firmware block.
pub const BLOCK_SIZE: usize = 32;
/// Model number of parts that support a tuning map.
pub const TUNING_MODEL: u8 = 0xAC;

/// Enter boot mode; the device answers with one acknowledgement byte.
pub const BOOT_ENTER: [u8; 2] = [0xAC, 0x5B];
/// Erase user flash.
pub const BOOT_ERASE: [u8; 2] = [0xAC, 0x2D];
/// Prefix of a block write, followed by the address and 32 bytes.
pub const BOOT_WRITE: [u8; 2] = [0xAC, 0x7A];
/// Request the flash checksum over the user code area.
pub const BOOT_CHECKSUM: [u8; 6] = [0xAC, 0x9E, 0x04, 0x00, 0x37, 0xFF];
/// Follow-up byte that latches the checksum.
pub const BOOT_CHECKSUM_LATCH: [u8; 1] = [0x00];
/// Length of the checksum response; the checksum is in the last two bytes.
pub const BOOT_CHECKSUM_LEN: usize = 6;
/// Leave boot mode.
pub const BOOT_EXIT: [u8; 2] = [0xAC, 0xE1];
