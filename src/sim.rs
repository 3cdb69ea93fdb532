// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory model of the grip IC.
//!
//! [`SimulatedGrip`] implements [`Transport`] and [`PowerSupply`] over a
//! 256-byte register file and a small bootloader model. It is what the
//! crate's tests run against, and hosts can use it to exercise the
//! controller without hardware.
//!
//! Clones share the same simulated device, so a test can keep one handle to
//! inspect and poke registers while the controller owns another.
//!
//! # Behaviour
//!
//! - Register reads and writes address the register file directly.
//! - Writing `CMD_SW_RESET` to `SW_RESET` completes the reset at once
//!   (the register then reads `SW_RESET_DONE`).
//! - The user-CRC request latches the installed flash checksum at `CRC`.
//! - `BOOT_ENTER` switches to boot mode and queues the acknowledgement;
//!   erase, block writes, checksum read-back and exit follow the
//!   bootloader protocol. Exit installs the flashed blocks and, if set, the
//!   version configured with [`SimulatedGrip::set_flashed_version`].
//! - Powering the IC off makes every transfer fail; powering it on again
//!   resets the volatile registers (`SAR_ENABLE` reads `CMD_OFF`).

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{PowerError, TransportError};
use crate::firmware::Block;
use crate::hal::PowerSupply;
use crate::protocol::Transport;
use crate::protocol::registers::{self, BLOCK_SIZE};
use crate::types::{Checksum, FirmwareVersion};

/// Returns the checksum the simulated bootloader computes over `blocks`:
/// the wrapping 16-bit sum of every payload byte.
#[must_use]
pub fn payload_checksum(blocks: &[Block]) -> Checksum {
    let sum = blocks
        .iter()
        .flatten()
        .fold(0u16, |acc, byte| acc.wrapping_add(u16::from(*byte)));
    let [msb, lsb] = sum.to_be_bytes();
    Checksum::new(msb, lsb)
}

#[derive(Debug)]
struct SimState {
    regs: [u8; 256],
    powered: bool,
    unresponsive: bool,
    pending_failures: u32,
    rejected_write: Option<(u8, u8)>,
    boot_entry_failures: u32,
    boot_mode: bool,
    bootloader_ack: u8,
    busy_polls: u32,
    rx: VecDeque<u8>,
    flash: Vec<(u16, Block)>,
    installed_checksum: Checksum,
    checksum_override: Option<Checksum>,
    flashed_version: Option<u8>,
    tuning_checksum: Checksum,
    writes: Vec<(u8, u8)>,
    erase_count: usize,
    boot_entries: usize,
    power_cycles: usize,
    sw_resets: usize,
}

impl SimState {
    fn new(version: FirmwareVersion) -> Self {
        let mut regs = [0; 256];
        regs[usize::from(registers::MODEL_NO)] = version.model;
        regs[usize::from(registers::FW_VER)] = version.firmware;
        regs[usize::from(registers::SAR_ENABLE)] = registers::CMD_OFF;
        Self {
            regs,
            powered: true,
            unresponsive: false,
            pending_failures: 0,
            rejected_write: None,
            boot_entry_failures: 0,
            boot_mode: false,
            bootloader_ack: 0x00,
            busy_polls: 0,
            rx: VecDeque::new(),
            flash: Vec::new(),
            installed_checksum: Checksum::default(),
            checksum_override: None,
            flashed_version: None,
            tuning_checksum: Checksum::default(),
            writes: Vec::new(),
            erase_count: 0,
            boot_entries: 0,
            power_cycles: 0,
            sw_resets: 0,
        }
    }

    /// Fails the transfer if the device cannot answer.
    fn check_link(&mut self) -> Result<(), TransportError> {
        if !self.powered || self.unresponsive {
            return Err(TransportError::Nack);
        }
        if self.pending_failures > 0 {
            self.pending_failures -= 1;
            return Err(TransportError::Nack);
        }
        Ok(())
    }

    fn reg(&self, addr: u8) -> u8 {
        self.regs[usize::from(addr)]
    }

    fn set_reg(&mut self, addr: u8, value: u8) {
        self.regs[usize::from(addr)] = value;
    }

    fn write_register(&mut self, addr: u8, value: u8) {
        self.writes.push((addr, value));
        match (addr, value) {
            (registers::SW_RESET, registers::CMD_SW_RESET) => {
                self.sw_resets += 1;
                self.set_reg(addr, registers::SW_RESET_DONE);
            }
            (registers::TUNING_STATE, registers::TUNING_MAP_CMD) => {
                self.set_reg(addr, registers::TUNING_MAP_DONE);
            }
            (registers::TUNING_STATE, registers::REGISTER_MAP_CMD) => {
                self.set_reg(addr, registers::REGISTER_MAP_DONE);
            }
            _ => self.set_reg(addr, value),
        }

        let [request_msb, request_lsb] = registers::TUNING_CHECKSUM_REQUEST;
        if addr == registers::TUNING_CHECKSUM + 1
            && value == request_lsb
            && self.reg(registers::TUNING_CHECKSUM) == request_msb
        {
            let checksum = self.tuning_checksum;
            self.set_reg(registers::TUNING_CHECKSUM, checksum.msb);
            self.set_reg(registers::TUNING_CHECKSUM + 1, checksum.lsb);
        }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.rx.clear();

        if bytes == registers::BOOT_ENTER {
            if self.boot_entry_failures > 0 {
                self.boot_entry_failures -= 1;
                return Err(TransportError::Nack);
            }
            self.boot_mode = true;
            self.boot_entries += 1;
            self.rx.push_back(self.bootloader_ack);
            return Ok(());
        }

        if self.boot_mode {
            self.bootloader_command(bytes);
            return Ok(());
        }

        if bytes == registers::USER_CRC_REQUEST {
            let checksum = self.installed_checksum;
            self.set_reg(registers::CRC, checksum.msb);
            self.set_reg(registers::CRC + 1, checksum.lsb);
            return Ok(());
        }

        // Plain burst write: register address followed by data
        if let Some((&addr, data)) = bytes.split_first() {
            for (offset, value) in (0u8..).zip(data) {
                self.write_register(addr.wrapping_add(offset), *value);
            }
        }
        Ok(())
    }

    fn bootloader_command(&mut self, bytes: &[u8]) {
        if bytes == registers::BOOT_ERASE {
            self.flash.clear();
            self.erase_count += 1;
        } else if bytes.starts_with(&registers::BOOT_WRITE) && bytes.len() == 4 + BLOCK_SIZE {
            let address = u16::from_be_bytes([bytes[2], bytes[3]]);
            let mut block = [0; BLOCK_SIZE];
            block.copy_from_slice(&bytes[4..]);
            self.flash.push((address, block));
            let busy = usize::try_from(self.busy_polls).unwrap_or(usize::MAX);
            self.rx.extend(std::iter::repeat_n(0x01, busy));
            self.rx.push_back(0x00);
        } else if bytes == registers::BOOT_CHECKSUM_LATCH {
            let checksum = self.checksum_override.unwrap_or_else(|| self.flash_checksum());
            self.rx.extend([0, 0, 0, 0, checksum.msb, checksum.lsb]);
        } else if bytes == registers::BOOT_EXIT {
            self.boot_mode = false;
            if !self.flash.is_empty() {
                self.installed_checksum = self.flash_checksum();
                if let Some(version) = self.flashed_version {
                    self.set_reg(registers::FW_VER, version);
                }
            }
        }
    }

    fn flash_checksum(&self) -> Checksum {
        let blocks: Vec<Block> = self.flash.iter().map(|(_, block)| *block).collect();
        payload_checksum(&blocks)
    }

    fn power_on_reset(&mut self) {
        self.boot_mode = false;
        self.rx.clear();
        self.set_reg(registers::BTN_STATUS, 0);
        self.set_reg(registers::SAR_ENABLE, registers::CMD_OFF);
        self.set_reg(registers::ALWAYS_ACTIVE, registers::ALWAYS_ACTIVE_OFF);
        self.set_reg(registers::TUNING_STATE, registers::REGISTER_MAP_DONE);
    }
}

/// A simulated grip IC.
///
/// # Examples
///
/// ```
/// use grip_ctl::protocol::RegisterIo;
/// use grip_ctl::protocol::registers;
/// use grip_ctl::sim::SimulatedGrip;
///
/// # tokio_test_block_on(async {
/// let sim = SimulatedGrip::new();
/// sim.set_register(registers::FW_VER, 0x12);
///
/// let mut io = RegisterIo::new(sim.clone(), 1);
/// assert_eq!(io.read_u8(registers::FW_VER).await.unwrap(), 0x12);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SimulatedGrip {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedGrip {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedGrip {
    /// Default model byte of the simulated IC.
    pub const MODEL: u8 = 0xAC;

    /// Default firmware version of the simulated IC.
    pub const FIRMWARE: u8 = 0x12;

    /// Creates a powered IC running the default model and firmware.
    #[must_use]
    pub fn new() -> Self {
        Self::with_version(FirmwareVersion::new(Self::MODEL, Self::FIRMWARE))
    }

    /// Creates a powered IC reporting `version`.
    #[must_use]
    pub fn with_version(version: FirmwareVersion) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new(version))),
        }
    }

    // ========== Registers ==========

    /// Returns the current value of a register.
    #[must_use]
    pub fn register(&self, addr: u8) -> u8 {
        self.state.lock().reg(addr)
    }

    /// Sets a register without recording a write.
    pub fn set_register(&self, addr: u8, value: u8) {
        self.state.lock().set_reg(addr, value);
    }

    /// Sets a big-endian 16-bit value at `addr` and `addr + 1`.
    pub fn set_register_u16(&self, addr: u8, value: u16) {
        let [msb, lsb] = value.to_be_bytes();
        let mut state = self.state.lock();
        state.set_reg(addr, msb);
        state.set_reg(addr.wrapping_add(1), lsb);
    }

    /// Sets the button status register.
    pub fn set_status(&self, status: u8) {
        self.set_register(registers::BTN_STATUS, status);
    }

    /// Returns every register write made through the transport, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<(u8, u8)> {
        self.state.lock().writes.clone()
    }

    /// Returns the writes made to one register, in order.
    #[must_use]
    pub fn writes_to(&self, addr: u8) -> Vec<u8> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|(a, _)| *a == addr)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Forgets the recorded writes.
    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// Returns how many software resets were requested.
    #[must_use]
    pub fn sw_resets(&self) -> usize {
        self.state.lock().sw_resets
    }

    /// Sets the checksum reported after a tuning map is written.
    pub fn set_tuning_checksum(&self, checksum: Checksum) {
        self.state.lock().tuning_checksum = checksum;
    }

    // ========== Failure injection ==========

    /// Makes the next `count` transfers fail with a NACK.
    pub fn fail_next_transfers(&self, count: u32) {
        self.state.lock().pending_failures = count;
    }

    /// Returns how many injected failures are still pending.
    #[must_use]
    pub fn pending_failures(&self) -> u32 {
        self.state.lock().pending_failures
    }

    /// Makes every write of `value` to `addr` fail with a NACK.
    pub fn reject_write(&self, addr: u8, value: u8) {
        self.state.lock().rejected_write = Some((addr, value));
    }

    /// Makes every transfer fail while `true`.
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.state.lock().unresponsive = unresponsive;
    }

    /// Returns `true` while the IC is powered.
    #[must_use]
    pub fn is_powered(&self) -> bool {
        self.state.lock().powered
    }

    /// Returns how many off-to-on power transitions happened.
    #[must_use]
    pub fn power_cycles(&self) -> usize {
        self.state.lock().power_cycles
    }

    // ========== Bootloader ==========

    /// Sets the byte the bootloader answers the entry command with.
    pub fn set_bootloader_ack(&self, ack: u8) {
        self.state.lock().bootloader_ack = ack;
    }

    /// Makes the next `count` boot-mode entry commands fail.
    pub fn fail_boot_entries(&self, count: u32) {
        self.state.lock().boot_entry_failures = count;
    }

    /// Sets how many busy polls each block write reports before idle.
    pub fn set_busy_polls(&self, polls: u32) {
        self.state.lock().busy_polls = polls;
    }

    /// Sets the firmware version the IC reports after a completed flash.
    pub fn set_flashed_version(&self, version: u8) {
        self.state.lock().flashed_version = Some(version);
    }

    /// Makes the bootloader report `checksum` regardless of the flash
    /// contents.
    pub fn corrupt_flash_checksum(&self, checksum: Checksum) {
        self.state.lock().checksum_override = Some(checksum);
    }

    /// Sets the checksum the running firmware reports for its flash.
    pub fn set_flash_checksum(&self, checksum: Checksum) {
        self.state.lock().installed_checksum = checksum;
    }

    /// Returns the blocks written since the last erase, in write order.
    #[must_use]
    pub fn flashed_blocks(&self) -> Vec<(u16, Block)> {
        self.state.lock().flash.clone()
    }

    /// Returns how many times the flash was erased.
    #[must_use]
    pub fn erase_count(&self) -> usize {
        self.state.lock().erase_count
    }

    /// Returns how many times boot mode was entered.
    #[must_use]
    pub fn boot_entries(&self) -> usize {
        self.state.lock().boot_entries
    }

    /// Returns `true` while the IC is in boot mode.
    #[must_use]
    pub fn in_boot_mode(&self) -> bool {
        self.state.lock().boot_mode
    }
}

impl Transport for SimulatedGrip {
    async fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.check_link()?;
        for (offset, byte) in (0u8..).zip(buf.iter_mut()) {
            *byte = state.reg(addr.wrapping_add(offset));
        }
        Ok(())
    }

    async fn write(&mut self, addr: u8, value: u8) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.check_link()?;
        if state.rejected_write == Some((addr, value)) {
            return Err(TransportError::Nack);
        }
        state.write_register(addr, value);
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.check_link()?;
        state.send(bytes)
    }

    async fn receive(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.check_link()?;
        for byte in buf.iter_mut() {
            *byte = state.rx.pop_front().unwrap_or(0);
        }
        Ok(())
    }
}

impl PowerSupply for SimulatedGrip {
    fn set_power(&mut self, on: bool) -> Result<(), PowerError> {
        let mut state = self.state.lock();
        if on && !state.powered {
            state.power_cycles += 1;
            state.power_on_reset();
        }
        state.powered = on;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unpowered_device_does_not_answer() {
        let mut sim = SimulatedGrip::new();
        sim.set_power(false).unwrap();

        let mut buf = [0; 1];
        assert_eq!(sim.read(registers::FW_VER, &mut buf).await, Err(TransportError::Nack));

        sim.set_power(true).unwrap();
        assert!(sim.read(registers::FW_VER, &mut buf).await.is_ok());
        assert_eq!(buf[0], SimulatedGrip::FIRMWARE);
        assert_eq!(sim.power_cycles(), 1);
    }

    #[tokio::test]
    async fn power_on_clears_enable() {
        let mut sim = SimulatedGrip::new();
        sim.write(registers::SAR_ENABLE, registers::CMD_ON).await.unwrap();

        sim.set_power(false).unwrap();
        sim.set_power(true).unwrap();

        assert_eq!(sim.register(registers::SAR_ENABLE), registers::CMD_OFF);
    }

    #[tokio::test]
    async fn software_reset_completes() {
        let mut sim = SimulatedGrip::new();
        sim.write(registers::SW_RESET, registers::CMD_SW_RESET).await.unwrap();

        assert_eq!(sim.register(registers::SW_RESET), registers::SW_RESET_DONE);
        assert_eq!(sim.sw_resets(), 1);
    }

    #[tokio::test]
    async fn user_crc_reports_installed_checksum() {
        let mut sim = SimulatedGrip::new();
        sim.set_flash_checksum(Checksum::new(0x12, 0x34));

        sim.send(&registers::USER_CRC_REQUEST).await.unwrap();

        assert_eq!(sim.register(registers::CRC), 0x12);
        assert_eq!(sim.register(registers::CRC + 1), 0x34);
    }

    #[tokio::test]
    async fn bootloader_installs_flashed_blocks() {
        let mut sim = SimulatedGrip::new();
        sim.set_flashed_version(0x20);
        let block = [0x01; BLOCK_SIZE];

        sim.send(&registers::BOOT_ENTER).await.unwrap();
        let mut ack = [0xFF; 1];
        sim.receive(&mut ack).await.unwrap();
        assert_eq!(ack[0], 0x00);

        sim.send(&registers::BOOT_ERASE).await.unwrap();
        let mut frame = registers::BOOT_WRITE.to_vec();
        frame.extend_from_slice(&[0x04, 0x00]);
        frame.extend_from_slice(&block);
        sim.send(&frame).await.unwrap();
        sim.send(&registers::BOOT_EXIT).await.unwrap();

        assert!(!sim.in_boot_mode());
        assert_eq!(sim.flashed_blocks(), vec![(0x0400, block)]);
        assert_eq!(sim.register(registers::FW_VER), 0x20);
    }

    #[tokio::test]
    async fn tuning_state_switches() {
        let mut sim = SimulatedGrip::new();
        sim.set_tuning_checksum(Checksum::new(0xAB, 0xCD));

        sim.write(registers::TUNING_STATE, registers::TUNING_MAP_CMD).await.unwrap();
        assert_eq!(sim.register(registers::TUNING_STATE), registers::TUNING_MAP_DONE);

        sim.write(registers::TUNING_CHECKSUM, 0x00).await.unwrap();
        sim.write(registers::TUNING_CHECKSUM + 1, 0x10).await.unwrap();
        assert_eq!(sim.register(registers::TUNING_CHECKSUM), 0xAB);
        assert_eq!(sim.register(registers::TUNING_CHECKSUM + 1), 0xCD);
    }

    #[test]
    fn payload_checksum_wraps() {
        let blocks = vec![[0xFF; BLOCK_SIZE]; 3];
        // 96 * 0xFF = 0x5F A0
        assert_eq!(payload_checksum(&blocks), Checksum::new(0x5F, 0xA0));
    }
}
