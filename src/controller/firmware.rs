// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Firmware update, version and checksum operations.

use std::sync::atomic::Ordering;

use crate::controller::DeviceController;
use crate::controller::inner::Inner;
use crate::error::{Error, FirmwareError, FlashError, ProtocolError, TransportError};
use crate::event::GripEvent;
use crate::firmware::{FirmwareImage, FirmwareOrigin, UpdateReason};
use crate::protocol::registers::{self, PRESS_THRESHOLD, SAR_ENABLE};
use crate::protocol::{Transport, timing};
use crate::types::{Channel, Checksum, CrcReport, FaultReason, FirmwareVersion, Threshold, UpdateStatus};

impl<T: Transport> DeviceController<T> {
    // ========== Update ==========

    /// Flashes the built-in or a caller-supplied firmware image.
    ///
    /// The update status reads [`UpdateStatus::Downloading`] until the
    /// flash ends, then `Pass` or `Fail`. Interrupt delivery and sensing are
    /// restored afterwards either way.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Firmware`] if the image cannot be loaded and
    /// [`Error::Flash`] if flashing fails.
    pub async fn update_firmware(&self, origin: FirmwareOrigin) -> Result<FirmwareVersion, Error> {
        let mut inner = self.lock().await?;
        *self.update_status.write() = UpdateStatus::Downloading;
        self.flashing.store(true, Ordering::Release);

        let result = match inner.load_image(origin) {
            Ok(image) => {
                inner.image = Some(image.clone());
                inner.flash_image(image).await.map_err(Error::from)
            }
            Err(e) => {
                tracing::error!(error = %e, "Firmware image unavailable");
                Err(Error::from(e))
            }
        };

        self.flashing.store(false, Ordering::Release);
        *self.update_status.write() = if result.is_ok() {
            UpdateStatus::Pass
        } else {
            UpdateStatus::Fail
        };
        result
    }

    /// Returns the status of the last firmware update.
    #[must_use]
    pub fn update_status(&self) -> UpdateStatus {
        *self.update_status.read()
    }

    /// Checks the installed firmware against the built-in image and flashes
    /// it if needed, then reads the press thresholds of both channels.
    ///
    /// Returns why the firmware was replaced, or `None` if it was current.
    /// A failed flash escalates the device fault.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Firmware`] if the built-in image cannot be loaded
    /// and [`Error::Flash`] if flashing fails. The thresholds are read in
    /// both cases.
    pub async fn check_firmware(&self) -> Result<Option<UpdateReason>, Error> {
        let mut inner = self.lock().await?;

        let result = match inner.load_image(FirmwareOrigin::BuiltIn) {
            Ok(image) => {
                inner.image = Some(image.clone());
                match inner.updater().update_reason(&image).await {
                    Some(reason) => {
                        tracing::info!(%reason, "Firmware update required");
                        self.flashing.store(true, Ordering::Release);
                        let flashed = inner.flash_image(image).await;
                        self.flashing.store(false, Ordering::Release);
                        match flashed {
                            Ok(_) => Ok(Some(reason)),
                            Err(e) => {
                                inner.escalate(FaultReason::SetupRegister);
                                Err(Error::from(e))
                            }
                        }
                    }
                    None => Ok(None),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Built-in firmware unavailable");
                Err(Error::from(e))
            }
        };

        inner.read_origin_thresholds().await;
        result
    }

    // ========== Version and checksum ==========

    /// Reads the installed model and firmware version.
    ///
    /// If the read fails the IC is reset and the read is tried once more.
    /// A successful read re-arms a faulted device; a failed one leaves the
    /// fault in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the retry fails as well.
    pub async fn firmware_version(&self) -> Result<FirmwareVersion, Error> {
        let mut inner = self.lock().await?;

        let version = match inner.read_version().await {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!(error = %e, "Version read failed, resetting");
                inner.reset_device().await;
                inner.read_version().await?
            }
        };
        inner.state.health.rearm();
        tracing::info!(%version, "Firmware version");
        Ok(version)
    }

    /// Returns the model and version of the built-in image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Firmware`] if no image was loaded and the built-in
    /// image cannot be loaded.
    pub async fn image_version(&self) -> Result<FirmwareVersion, Error> {
        let mut inner = self.lock().await?;
        Ok(inner.image()?.version())
    }

    /// Compares the checksum computed by the running firmware with the
    /// checksum of the loaded image.
    ///
    /// A failed read is reported as a mismatch against `0000`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Firmware`] if no image is available to compare
    /// against.
    pub async fn crc_check(&self) -> Result<CrcReport, Error> {
        let mut inner = self.lock().await?;
        let expected = inner.image()?.checksum();

        let result = inner.updater().user_checksum().await;
        inner.track(&result);
        let report = match result {
            Ok(device) => CrcReport {
                ok: device == expected,
                device,
            },
            Err(e) => {
                tracing::warn!(error = %e, "User checksum read failed");
                CrcReport {
                    ok: false,
                    device: Checksum::default(),
                }
            }
        };
        tracing::info!(%report, %expected, "CRC check");
        Ok(report)
    }

    // ========== Tuning map ==========

    /// Writes the configured tuning map into the IC.
    ///
    /// Only logic firmware supports tuning maps: the installed version must
    /// equal the image version on a model `0xAC` part. Every register is
    /// verified after writing and rewritten on mismatch, then the checksum
    /// the IC computes over the map is compared with the configured one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCapability`] if no tuning map is
    /// configured, [`Error::Protocol`] if the firmware does not support
    /// tuning maps or the IC does not confirm a step, and
    /// [`Error::Transport`] if a transfer fails.
    pub async fn apply_tuning_map(&self) -> Result<(), Error> {
        let mut inner = self.lock().await?;
        let Some(tuning) = inner.config.tuning.clone() else {
            return Err(Error::UnsupportedCapability {
                capability: "tuning map".to_string(),
            });
        };

        let image = inner.image()?.version();
        let device = inner.read_version().await?;
        if device != image || device.model != registers::TUNING_MODEL {
            tracing::warn!(%device, %image, "Tuning map needs logic firmware");
            return Err(ProtocolError::TuningUnsupported {
                device: device.to_string(),
                image: image.to_string(),
            }
            .into());
        }

        inner
            .switch_tuning_state(registers::TUNING_MAP_CMD, registers::TUNING_MAP_DONE)
            .await?;

        for &(register, value) in &tuning.registers {
            inner.write(register, value).await?;
        }
        for &(register, value) in &tuning.registers {
            let actual = inner.read_u8(register).await?;
            if actual != value {
                tracing::warn!(register, expected = value, actual, "Tuning register mismatch, rewriting");
                inner.write(register, value).await?;
            }
        }

        let [request_msb, request_lsb] = registers::TUNING_CHECKSUM_REQUEST;
        inner.write(registers::TUNING_CHECKSUM, request_msb).await?;
        inner.write(registers::TUNING_CHECKSUM + 1, request_lsb).await?;
        tokio::time::sleep(timing::TUNING_CHECKSUM).await;
        let bytes = inner.read(registers::TUNING_CHECKSUM, 2).await?;
        let actual = Checksum::new(bytes[0], bytes[1]);
        if actual != tuning.checksum {
            return Err(ProtocolError::ChecksumMismatch {
                expected: tuning.checksum,
                actual,
            }
            .into());
        }

        inner
            .switch_tuning_state(registers::REGISTER_MAP_CMD, registers::REGISTER_MAP_DONE)
            .await?;
        inner.state.tuning_mode = true;
        tracing::info!(registers = tuning.registers.len(), checksum = %actual, "Tuning map applied");
        Ok(())
    }
}

impl<T: Transport> Inner<T> {
    /// Returns the loaded image, loading the built-in one if needed.
    fn image(&mut self) -> Result<&FirmwareImage, Error> {
        if self.image.is_none() {
            self.image = Some(self.load_image(FirmwareOrigin::BuiltIn)?);
        }
        self.image
            .as_ref()
            .ok_or(Error::Firmware(FirmwareError::Unavailable))
    }

    /// Flashes `image` with interrupts masked and restores sensing after.
    async fn flash_image(&mut self, image: FirmwareImage) -> Result<FirmwareVersion, FlashError> {
        self.mask_irq();
        self.state.ready = false;

        let result = self.updater().flash(image).await;

        self.state.ready = true;
        if self.state.is_faulted() {
            tracing::info!("Device faulted, sensing stays off after flash");
        } else if self.state.enabled {
            self.unmask_irq();
            if let Err(e) = self.write(SAR_ENABLE, registers::CMD_ON).await {
                tracing::warn!(error = %e, "Enable command after flash failed");
            }
            self.state.first_event_pending = true;
        }
        if self.capabilities.ldo_share {
            self.events.publish(GripEvent::RegisterRecoveryRequested);
        }
        result
    }

    /// Reads the model and firmware version in always-active mode.
    ///
    /// Each step is tracked on its own. A failed return to normal mode
    /// counts against the device but does not discard the version.
    pub(crate) async fn read_version(&mut self) -> Result<FirmwareVersion, TransportError> {
        let entered = self.updater().set_always_active(true).await;
        self.track(&entered);
        entered?;

        let version = self.updater().read_version_raw().await;
        self.track(&version);

        let restored = self.updater().set_always_active(false).await;
        self.track(&restored);
        if let Err(e) = restored {
            tracing::warn!(error = %e, "Could not leave always-active mode");
        }
        version
    }

    /// Reads the press thresholds of both channels and keeps them as the
    /// values restored after low-temperature compensation.
    async fn read_origin_thresholds(&mut self) {
        let bytes = match self.read(PRESS_THRESHOLD, 4).await {
            Ok(bytes) => [bytes[0], bytes[1], bytes[2], bytes[3]],
            Err(e) => {
                tracing::warn!(error = %e, "Threshold read failed");
                [0; 4]
            }
        };

        let thresholds = [
            (Channel::Primary, Threshold::from_be_bytes([bytes[0], bytes[1]])),
            (Channel::Secondary, Threshold::from_be_bytes([bytes[2], bytes[3]])),
        ];
        for (channel, threshold) in thresholds {
            let ch = self.state.channel_mut(channel);
            ch.thresholds.press = threshold;
            ch.origin_press_threshold = Some(threshold);
            tracing::info!(%channel, %threshold, "Press threshold");
        }
    }

    async fn switch_tuning_state(&mut self, command: u8, expected: u8) -> Result<(), Error> {
        self.write(registers::TUNING_STATE, command).await?;
        tokio::time::sleep(timing::TUNING_SWITCH).await;
        let actual = self.read_u8(registers::TUNING_STATE).await?;
        if actual != expected {
            return Err(ProtocolError::UnexpectedEcho {
                register: registers::TUNING_STATE,
                expected,
                actual,
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{GripConfig, TuningMap};
    use crate::controller::DeviceController;
    use crate::error::{Error, ProtocolError};
    use crate::firmware::{Block, FirmwareImage, FirmwareOrigin, MemoryFirmwareSource};
    use crate::protocol::registers;
    use crate::sim::{SimulatedGrip, payload_checksum};
    use crate::types::{Checksum, FirmwareVersion, UpdateStatus};

    fn image_bytes(version: u8, payload: &[Block]) -> Vec<u8> {
        FirmwareImage::from_parts(
            FirmwareVersion::new(SimulatedGrip::MODEL, version),
            payload_checksum(payload),
            payload.to_vec(),
        )
        .unwrap()
        .to_bytes()
    }

    fn controller_with_image(sim: &SimulatedGrip, bytes: Vec<u8>, config: GripConfig) -> DeviceController<SimulatedGrip> {
        let path = config.firmware_path.clone();
        DeviceController::builder(sim.clone())
            .with_power(sim.clone())
            .with_config(config)
            .with_firmware_source(MemoryFirmwareSource::new().with_image(path, bytes))
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn current_firmware_is_kept() {
        let sim = SimulatedGrip::with_version(FirmwareVersion::new(0xAC, 0x12));
        let payload = [[0x11; 32], [0x22; 32]];
        sim.set_flash_checksum(payload_checksum(&payload));
        let controller = controller_with_image(&sim, image_bytes(0x12, &payload), GripConfig::default());
        controller.attach().await.unwrap();

        assert_eq!(controller.check_firmware().await.unwrap(), None);
        assert_eq!(sim.erase_count(), 0);
        assert_eq!(
            controller.image_version().await.unwrap(),
            FirmwareVersion::new(0xAC, 0x12)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_update_reports_fail_and_restores_sensing() {
        let sim = SimulatedGrip::with_version(FirmwareVersion::new(0xAC, 0x10));
        sim.set_bootloader_ack(0x55);
        let controller = controller_with_image(&sim, image_bytes(0x12, &[[0x33; 32]]), GripConfig::default());
        controller.attach().await.unwrap();
        controller.set_enabled(true).await.unwrap();

        let result = controller.update_firmware(FirmwareOrigin::BuiltIn).await;

        assert!(matches!(result, Err(Error::Flash(_))));
        assert_eq!(controller.update_status(), UpdateStatus::Fail);
        assert!(!controller.is_flashing());
        let state = controller.state().await;
        assert!(state.is_ready());
        assert!(state.irq_active());
        assert!(state.first_event_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_external_image_fails() {
        let sim = SimulatedGrip::new();
        let controller = controller_with_image(&sim, Vec::new(), GripConfig::default());
        controller.attach().await.unwrap();

        let result = controller.update_firmware(FirmwareOrigin::External(vec![0; 10])).await;

        assert!(matches!(result, Err(Error::Firmware(_))));
        assert_eq!(controller.update_status(), UpdateStatus::Fail);
    }

    #[tokio::test(start_paused = true)]
    async fn version_read_rearms_fault() {
        let sim = SimulatedGrip::with_version(FirmwareVersion::new(0xAC, 0x12));
        let controller = controller_with_image(&sim, Vec::new(), GripConfig::default());
        controller.attach().await.unwrap();
        sim.set_unresponsive(true);
        controller.set_enabled(true).await.unwrap();
        assert!(controller.state().await.is_faulted());

        sim.set_unresponsive(false);
        let version = controller.firmware_version().await.unwrap();

        assert_eq!(version, FirmwareVersion::new(0xAC, 0x12));
        assert!(!controller.state().await.is_faulted());
    }

    #[tokio::test(start_paused = true)]
    async fn crc_check_compares_with_image() {
        let sim = SimulatedGrip::new();
        let payload = [[0x44; 32]];
        let controller = controller_with_image(&sim, image_bytes(0x12, &payload), GripConfig::default());
        controller.attach().await.unwrap();

        sim.set_flash_checksum(payload_checksum(&payload));
        let report = controller.crc_check().await.unwrap();
        assert!(report.ok);

        sim.set_flash_checksum(Checksum::new(0xDE, 0xAD));
        let report = controller.crc_check().await.unwrap();
        assert!(!report.ok);
        assert_eq!(report.to_string(), "NG,dead");
    }

    #[tokio::test(start_paused = true)]
    async fn tuning_map_requires_configuration() {
        let sim = SimulatedGrip::new();
        let controller = controller_with_image(&sim, image_bytes(0x12, &[[0; 32]]), GripConfig::default());
        controller.attach().await.unwrap();

        assert!(matches!(
            controller.apply_tuning_map().await,
            Err(Error::UnsupportedCapability { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn tuning_map_is_written_and_verified() {
        let sim = SimulatedGrip::with_version(FirmwareVersion::new(0xAC, 0x12));
        let tuning = TuningMap {
            registers: vec![(0x50, 0x0A), (0x51, 0x0B)],
            checksum: Checksum::new(0x12, 0x34),
        };
        sim.set_tuning_checksum(tuning.checksum);
        let config = GripConfig::default().with_tuning(tuning);
        let controller = controller_with_image(&sim, image_bytes(0x12, &[[0; 32]]), config);
        controller.attach().await.unwrap();

        controller.apply_tuning_map().await.unwrap();

        assert_eq!(sim.register(0x50), 0x0A);
        assert_eq!(sim.register(0x51), 0x0B);
        assert_eq!(
            sim.writes_to(registers::TUNING_STATE),
            vec![registers::TUNING_MAP_CMD, registers::REGISTER_MAP_CMD]
        );
        assert!(controller.state().await.tuning_mode());
    }

    #[tokio::test(start_paused = true)]
    async fn tuning_map_rejects_other_firmware() {
        let sim = SimulatedGrip::with_version(FirmwareVersion::new(0xAC, 0x10));
        let config = GripConfig::default().with_tuning(TuningMap::default());
        let controller = controller_with_image(&sim, image_bytes(0x12, &[[0; 32]]), config);
        controller.attach().await.unwrap();

        assert!(matches!(
            controller.apply_tuning_map().await,
            Err(Error::Protocol(ProtocolError::TuningUnsupported { .. }))
        ));
    }
}
