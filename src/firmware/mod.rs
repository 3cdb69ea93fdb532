// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Firmware images and the flashing protocol.
//!
//! - [`FirmwareImage`]: a parsed binary (header plus 32-byte payload blocks)
//! - [`FirmwareSource`]: loads binaries by path; [`FsFirmwareSource`] reads
//!   them from disk
//! - [`FirmwareUpdater`]: decides whether an update is needed and runs the
//!   bootloader protocol

mod image;
mod source;
mod updater;

pub use image::{Block, FirmwareImage};
pub use source::{FirmwareOrigin, FirmwareSource, FsFirmwareSource, MemoryFirmwareSource, NoFirmware};
pub use updater::{FirmwareUpdater, FlashSettings, UpdateReason};
