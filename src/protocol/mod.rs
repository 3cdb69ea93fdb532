// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register protocol for talking to the grip IC.
//!
//! The IC exposes a flat 8-bit register map in user mode and a raw
//! command/response bootloader in boot mode. Both are reached through a
//! [`Transport`] supplied by the host (an I2C adapter in production, a
//! [`SimulatedGrip`](crate::sim::SimulatedGrip) in tests).
//!
//! # Layers
//!
//! - [`Transport`]: single-attempt byte transfers, implemented by the host
//! - [`RegisterIo`]: bounded retry with backoff and 16-bit helpers
//! - [`registers`]: register addresses and command bytes
//! - [`timing`]: delays the IC needs between steps

mod register_io;
pub mod registers;
pub mod timing;

pub use register_io::RegisterIo;

use crate::error::TransportError;

/// Byte-level access to the grip IC.
///
/// Every method performs exactly one bus transaction; retrying is the job
/// of [`RegisterIo`].
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Reads `buf.len()` consecutive registers starting at `addr`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the transaction fails.
    async fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), TransportError>;

    /// Writes a single register.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the transaction fails.
    async fn write(&mut self, addr: u8, value: u8) -> Result<(), TransportError>;

    /// Sends raw bytes without a register address (bootloader commands).
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if fewer bytes than requested were sent.
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Receives raw bytes without a register address.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the transaction fails.
    async fn receive(&mut self, buf: &mut [u8]) -> Result<(), TransportError>;
}
