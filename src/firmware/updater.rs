// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bootloader flashing protocol.

use std::fmt;

use crate::config::GripConfig;
use crate::error::{FlashError, FlashFailure, ProtocolError, TransportError};
use crate::firmware::FirmwareImage;
use crate::hal::PowerSupply;
use crate::protocol::registers::{self, BLOCK_SIZE};
use crate::protocol::{RegisterIo, Transport, timing};
use crate::types::{Checksum, FirmwareVersion};

/// Attempts made when reading the user-mode checksum during the update
/// decision.
const USER_CRC_ATTEMPTS: u8 = 2;

/// Bounds of the flashing protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashSettings {
    /// Additional whole-sequence attempts after a checksum or version
    /// mismatch.
    pub flash_retries: u8,
    /// Power cycles tried to get the bootloader to accept the entry command.
    pub boot_entry_attempts: u8,
    /// Busy polls after each block write before moving on.
    pub busy_poll_limit: u32,
    /// Byte the bootloader must answer the entry command with.
    pub bootloader_ack: u8,
}

impl Default for FlashSettings {
    fn default() -> Self {
        Self::from(&GripConfig::default())
    }
}

impl From<&GripConfig> for FlashSettings {
    fn from(config: &GripConfig) -> Self {
        Self {
            flash_retries: config.flash_retries,
            boot_entry_attempts: config.boot_entry_attempts,
            busy_poll_limit: config.busy_poll_limit,
            bootloader_ack: config.bootloader_ack,
        }
    }
}

/// Why the installed firmware has to be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateReason {
    /// The device model differs from the image model.
    ModelMismatch,
    /// Same version, but the flash contents do not match the image.
    ChecksumMismatch,
    /// The device runs an older version.
    Outdated,
    /// The device runs an engineering test build.
    TestFirmware,
}

impl fmt::Display for UpdateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelMismatch => f.write_str("model mismatch"),
            Self::ChecksumMismatch => f.write_str("checksum mismatch"),
            Self::Outdated => f.write_str("outdated firmware"),
            Self::TestFirmware => f.write_str("test firmware"),
        }
    }
}

/// Result of a single flash attempt that did not succeed.
struct AttemptFailure {
    cause: FlashFailure,
    retryable: bool,
}

impl AttemptFailure {
    fn fatal(cause: impl Into<FlashFailure>) -> Self {
        Self {
            cause: cause.into(),
            retryable: false,
        }
    }

    fn retry(cause: impl Into<FlashFailure>) -> Self {
        Self {
            cause: cause.into(),
            retryable: true,
        }
    }
}

/// Drives the bootloader of the grip IC.
///
/// The updater borrows the register interface and the power supply for the
/// duration of an operation; the caller holds the device lock meanwhile.
///
/// A flash runs the whole sequence (power cycle, boot-mode entry, erase,
/// block writes, checksum read-back, version check) up to
/// `1 + flash_retries` times. Checksum and version mismatches are retried;
/// a wrong bootloader acknowledgement or a failed block transfer ends the
/// flash immediately.
pub struct FirmwareUpdater<'a, T> {
    io: &'a mut RegisterIo<T>,
    power: &'a mut (dyn PowerSupply + Send),
    settings: FlashSettings,
}

impl<'a, T: Transport> FirmwareUpdater<'a, T> {
    /// Creates an updater over the given device access.
    pub fn new(
        io: &'a mut RegisterIo<T>,
        power: &'a mut (dyn PowerSupply + Send),
        settings: FlashSettings,
    ) -> Self {
        Self {
            io,
            power,
            settings,
        }
    }

    // ========== User mode ==========

    /// Reads the model and firmware version with the IC in always-active
    /// mode.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if a register transfer fails.
    pub async fn read_version(&mut self) -> Result<FirmwareVersion, TransportError> {
        self.set_always_active(true).await?;
        let version = self.read_version_raw().await;
        self.restore_always_active().await;
        version
    }

    /// Reads the checksum the firmware computes over its own flash.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the request or the read fails.
    pub async fn user_checksum(&mut self) -> Result<Checksum, TransportError> {
        self.io.send(&registers::USER_CRC_REQUEST).await?;
        tokio::time::sleep(timing::USER_CRC).await;
        let bytes = self.io.read(registers::CRC, 2).await?;
        Ok(Checksum::new(bytes[0], bytes[1]))
    }

    /// Decides whether the installed firmware must be replaced by `image`.
    ///
    /// A failed version read counts as model and version zero.
    pub async fn update_reason(&mut self, image: &FirmwareImage) -> Option<UpdateReason> {
        let target = image.version();

        let installed = match self.set_always_active(true).await {
            Ok(()) => self.read_version_raw().await,
            Err(e) => Err(e),
        };
        let installed = installed.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not read firmware version");
            FirmwareVersion::default()
        });

        let mut reason = None;
        if installed.model != target.model {
            reason = Some(UpdateReason::ModelMismatch);
        } else if installed.firmware == target.firmware
            && !self.user_checksum_matches(image.checksum()).await
        {
            reason = Some(UpdateReason::ChecksumMismatch);
        }
        self.restore_always_active().await;

        if reason.is_none() {
            if installed.firmware < target.firmware {
                reason = Some(UpdateReason::Outdated);
            } else if installed.is_test_firmware() {
                reason = Some(UpdateReason::TestFirmware);
            }
        }

        tracing::info!(
            %installed,
            image = %target,
            reason = ?reason,
            "Firmware check"
        );
        reason
    }

    // ========== Flashing ==========

    /// Flashes `image` and returns the version the device reports
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`FlashError`] with the diagnostics of the last attempt when
    /// the flash could not be completed and verified.
    pub async fn flash(&mut self, image: FirmwareImage) -> Result<FirmwareVersion, FlashError> {
        let total_attempts = self.settings.flash_retries.saturating_add(1);
        let mut last_checksum = None;
        let mut last_version = None;
        let mut attempt = 0;

        loop {
            attempt += 1;
            tracing::info!(
                attempt,
                total_attempts,
                blocks = image.block_count(),
                version = %image.version(),
                "Flashing firmware"
            );

            let failure = match self
                .flash_once(&image, &mut last_checksum, &mut last_version)
                .await
            {
                Ok(version) => {
                    tracing::info!(%version, attempt, "Firmware flashed");
                    return Ok(version);
                }
                Err(failure) => failure,
            };

            if !failure.retryable || attempt >= total_attempts {
                tracing::error!(attempt, cause = %failure.cause, "Firmware flash failed");
                return Err(FlashError {
                    attempts: attempt,
                    last_checksum,
                    last_version,
                    cause: failure.cause,
                });
            }
            tracing::warn!(attempt, cause = %failure.cause, "Firmware flash attempt failed, retrying");
        }
    }

    async fn flash_once(
        &mut self,
        image: &FirmwareImage,
        last_checksum: &mut Option<Checksum>,
        last_version: &mut Option<u8>,
    ) -> Result<FirmwareVersion, AttemptFailure> {
        self.enter_boot_mode().await?;
        tokio::time::sleep(timing::BOOT_ENTERED).await;

        self.io
            .send(&registers::BOOT_ERASE)
            .await
            .map_err(AttemptFailure::fatal)?;
        tokio::time::sleep(timing::ERASE).await;

        for (address, block) in image.addressed_blocks() {
            self.write_block(address, block)
                .await
                .map_err(AttemptFailure::fatal)?;
        }

        let checksum = self.read_flash_checksum().await;
        self.exit_boot_mode().await;

        let checksum = checksum.map_err(AttemptFailure::retry)?;
        *last_checksum = Some(checksum);
        if checksum != image.checksum() {
            return Err(AttemptFailure::retry(ProtocolError::ChecksumMismatch {
                expected: image.checksum(),
                actual: checksum,
            }));
        }

        self.power_cycle().await;
        tokio::time::sleep(timing::RESET).await;

        let version = self
            .read_version()
            .await
            .map_err(AttemptFailure::retry)?;
        *last_version = Some(version.firmware);
        if version.firmware == 0 || version.firmware != image.version().firmware {
            return Err(AttemptFailure::retry(ProtocolError::VersionMismatch {
                expected: image.version().firmware,
                actual: version.firmware,
            }));
        }

        Ok(version)
    }

    async fn enter_boot_mode(&mut self) -> Result<(), AttemptFailure> {
        let mut entry = 0;
        let ack = loop {
            entry += 1;
            self.power_cycle().await;
            tokio::time::sleep(timing::BOOT).await;

            match self.send_boot_enter().await {
                Ok(ack) => break ack,
                Err(e) if entry < self.settings.boot_entry_attempts => {
                    tracing::warn!(entry, error = %e, "Boot mode entry failed, power cycling");
                }
                Err(e) => return Err(AttemptFailure::fatal(e)),
            }
        };

        if ack != self.settings.bootloader_ack {
            return Err(AttemptFailure::fatal(ProtocolError::BootloaderAck {
                expected: self.settings.bootloader_ack,
                actual: ack,
            }));
        }
        tracing::debug!(entry, "Boot mode entered");
        Ok(())
    }

    async fn send_boot_enter(&mut self) -> Result<u8, TransportError> {
        self.io.send(&registers::BOOT_ENTER).await?;
        let mut ack = [0; 1];
        self.io.receive(&mut ack).await?;
        Ok(ack[0])
    }

    async fn write_block(&mut self, address: u16, block: &[u8; BLOCK_SIZE]) -> Result<(), TransportError> {
        let [addr_hi, addr_lo] = address.to_be_bytes();
        let mut frame = Vec::with_capacity(4 + BLOCK_SIZE);
        frame.extend_from_slice(&registers::BOOT_WRITE);
        frame.extend_from_slice(&[addr_hi, addr_lo]);
        frame.extend_from_slice(block);

        self.io.send(&frame).await?;
        tokio::time::sleep(timing::BLOCK_WRITE).await;
        self.wait_not_busy(address).await
    }

    async fn wait_not_busy(&mut self, address: u16) -> Result<(), TransportError> {
        let mut polls = 0u32;
        let mut status = [0; 1];
        loop {
            self.io.receive(&mut status).await?;
            if status[0] == 0 {
                return Ok(());
            }
            polls += 1;
            if polls > self.settings.busy_poll_limit {
                tracing::warn!(address, polls, "Bootloader still busy, continuing");
                return Ok(());
            }
        }
    }

    async fn read_flash_checksum(&mut self) -> Result<Checksum, TransportError> {
        self.io.send(&registers::BOOT_CHECKSUM).await?;
        tokio::time::sleep(timing::CHECKSUM_STEP).await;
        self.io.send(&registers::BOOT_CHECKSUM_LATCH).await?;
        tokio::time::sleep(timing::CHECKSUM_STEP).await;

        let mut response = [0; registers::BOOT_CHECKSUM_LEN];
        self.io.receive(&mut response).await?;
        let checksum = Checksum::new(response[4], response[5]);
        tracing::debug!(%checksum, "Flash checksum read back");
        Ok(checksum)
    }

    async fn exit_boot_mode(&mut self) {
        if let Err(e) = self.io.send(&registers::BOOT_EXIT).await {
            tracing::warn!(error = %e, "Boot mode exit failed");
        }
        tokio::time::sleep(timing::RESET).await;
    }

    // ========== Helpers ==========

    async fn power_cycle(&mut self) {
        if let Err(e) = self.power.set_power(false) {
            tracing::warn!(error = %e, "Power off failed");
        }
        tokio::time::sleep(timing::POWER_CYCLE).await;
        if let Err(e) = self.power.set_power(true) {
            tracing::warn!(error = %e, "Power on failed");
        }
    }

    /// Switches always-active mode and checks the echo.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the write or the echo read fails.
    pub async fn set_always_active(&mut self, on: bool) -> Result<(), TransportError> {
        let value = if on {
            registers::ALWAYS_ACTIVE_ON
        } else {
            registers::ALWAYS_ACTIVE_OFF
        };
        self.io.write(registers::ALWAYS_ACTIVE, value).await?;
        tokio::time::sleep(timing::ALWAYS_ACTIVE).await;

        let echo = self.io.read_u8(registers::ALWAYS_ACTIVE).await?;
        if echo != value {
            tracing::warn!(expected = value, actual = echo, "Always-active mode not confirmed");
        }
        Ok(())
    }

    async fn restore_always_active(&mut self) {
        if let Err(e) = self.set_always_active(false).await {
            tracing::warn!(error = %e, "Could not leave always-active mode");
        }
    }

    /// Reads the model and firmware version registers as they are.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if either read fails.
    pub async fn read_version_raw(&mut self) -> Result<FirmwareVersion, TransportError> {
        let firmware = self.io.read_u8(registers::FW_VER).await?;
        let model = self.io.read_u8(registers::MODEL_NO).await?;
        Ok(FirmwareVersion::new(model, firmware))
    }

    async fn user_checksum_matches(&mut self, expected: Checksum) -> bool {
        for attempt in 1..=USER_CRC_ATTEMPTS {
            match self.user_checksum().await {
                Ok(checksum) if checksum == expected => return true,
                Ok(checksum) => {
                    tracing::info!(attempt, %checksum, %expected, "User checksum differs");
                }
                Err(e) => tracing::warn!(attempt, error = %e, "User checksum read failed"),
            }
        }
        false
    }
}
