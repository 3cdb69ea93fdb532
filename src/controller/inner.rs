// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device access and state machine behind the controller lock.

use crate::capabilities::Capabilities;
use crate::config::GripConfig;
use crate::error::{FirmwareError, TransportError};
use crate::event::{EventBus, GripEvent};
use crate::firmware::{FirmwareImage, FirmwareOrigin, FirmwareSource, FirmwareUpdater, FlashSettings};
use crate::hal::{InterruptLine, PowerSupply, TemperatureProbe};
use crate::health::CheckSource;
use crate::protocol::registers::{self, SAR_ENABLE};
use crate::protocol::{RegisterIo, Transport, timing};
use crate::state::DeviceState;
use crate::types::{Channel, FaultReason, UnknownTrigger};

/// Everything guarded by the controller's device lock.
pub(crate) struct Inner<T> {
    pub(crate) io: RegisterIo<T>,
    pub(crate) power: Box<dyn PowerSupply + Send>,
    pub(crate) irq: Box<dyn InterruptLine + Send>,
    pub(crate) thermometer: Option<Box<dyn TemperatureProbe + Send>>,
    pub(crate) firmware_source: Box<dyn FirmwareSource + Send + Sync>,
    pub(crate) image: Option<FirmwareImage>,
    pub(crate) state: DeviceState,
    pub(crate) config: GripConfig,
    pub(crate) capabilities: Capabilities,
    pub(crate) events: EventBus,
}

impl<T: Transport> Inner<T> {
    // ========== Tracked register access ==========

    /// Feeds the outcome of a transfer into the health monitor.
    pub(crate) fn track<V>(&mut self, result: &Result<V, TransportError>) {
        match result {
            Ok(_) => self.state.health.record_success(),
            Err(e) => {
                if let Some(reason) = self.state.health.record_failures(e.attempts()) {
                    self.enter_error_mode(reason);
                }
            }
        }
    }

    pub(crate) async fn read(&mut self, addr: u8, len: usize) -> Result<Vec<u8>, TransportError> {
        let result = self.io.read(addr, len).await;
        self.track(&result);
        result
    }

    pub(crate) async fn read_u8(&mut self, addr: u8) -> Result<u8, TransportError> {
        let result = self.io.read_u8(addr).await;
        self.track(&result);
        result
    }

    pub(crate) async fn read_u16(&mut self, addr: u8) -> Result<u16, TransportError> {
        let result = self.io.read_u16(addr).await;
        self.track(&result);
        result
    }

    pub(crate) async fn write(&mut self, addr: u8, value: u8) -> Result<(), TransportError> {
        let result = self.io.write(addr, value).await;
        self.track(&result);
        result
    }

    pub(crate) async fn write_u16(&mut self, addr: u8, value: u16) -> Result<(), TransportError> {
        let result = self.io.write_u16(addr, value).await;
        self.track(&result);
        result
    }

    pub(crate) async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let result = self.io.send(bytes).await;
        self.track(&result);
        result
    }

    /// Reads the button status register, retrying with fresh transfers.
    pub(crate) async fn read_status(&mut self) -> Result<u8, TransportError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.read_u8(registers::BTN_STATUS).await {
                Ok(status) => return Ok(status),
                Err(e) if attempt < self.config.status_read_attempts => {
                    tracing::debug!(attempt, error = %e, "Status read failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Returns an updater borrowing the register interface and power supply.
    pub(crate) fn updater(&mut self) -> FirmwareUpdater<'_, T> {
        let settings = FlashSettings::from(&self.config);
        FirmwareUpdater::new(&mut self.io, self.power.as_mut(), settings)
    }

    pub(crate) fn load_image(&self, origin: FirmwareOrigin) -> Result<FirmwareImage, FirmwareError> {
        let bytes = match origin {
            FirmwareOrigin::BuiltIn => self.firmware_source.load(&self.config.firmware_path)?,
            FirmwareOrigin::External(bytes) => bytes,
        };
        FirmwareImage::from_bytes(&bytes)
    }

    // ========== Faults ==========

    /// Escalates to the faulted state and applies every fault side effect,
    /// even if the device was already faulted.
    pub(crate) fn escalate(&mut self, reason: FaultReason) {
        self.state.health.escalate(reason);
        self.enter_error_mode(reason);
    }

    /// Applies the side effects of a fault the health monitor just
    /// recorded.
    pub(crate) fn enter_error_mode(&mut self, reason: FaultReason) {
        self.mask_irq();
        tracing::error!(%reason, bits = %self.state.fault_bits(), "Entering error mode");
        self.events.publish(GripEvent::Fault {
            reason,
            bits: self.state.fault_bits(),
        });
        self.enter_unknown_mode(UnknownTrigger::Force);
    }

    pub(crate) fn mask_irq(&mut self) {
        if self.state.irq_active {
            self.irq.disable();
            self.state.irq_active = false;
        }
    }

    pub(crate) fn unmask_irq(&mut self) {
        if !self.state.irq_active {
            self.irq.enable();
            self.state.irq_active = true;
        }
    }

    // ========== Unknown mode ==========

    /// Puts every channel that follows notifications into unknown mode.
    ///
    /// When the device is faulted the fail-safe policy is applied as well.
    pub(crate) fn enter_unknown_mode(&mut self, trigger: UnknownTrigger) {
        let skip = self.state.skip_events;
        let mut entered = false;

        for channel in self.capabilities.channels() {
            if skip || !self.state.channel(channel).notifications {
                continue;
            }
            self.state.motion = false;
            let ch = self.state.channel_mut(channel);
            ch.first_working = false;
            if !ch.unknown {
                ch.unknown = true;
                self.events.publish(GripEvent::UnknownMode {
                    channel,
                    active: true,
                });
            }
            entered = true;
        }

        if entered {
            tracing::info!(trigger = trigger.code(), "Unknown mode entered");
            self.events.publish(GripEvent::UnknownTrigger(trigger));
        }

        if self.state.is_faulted() && !skip && self.config.fail_safe.reports_abnormal() {
            for channel in self.capabilities.channels() {
                self.events.publish(GripEvent::Abnormal { channel });
            }
            if self.config.fail_safe.powers_off() && !self.capabilities.ldo_share {
                tracing::warn!("Fail-safe power off");
                if let Err(e) = self.power.set_power(false) {
                    tracing::warn!(error = %e, "Fail-safe power off failed");
                }
            }
        }
    }

    /// Takes `channel` out of unknown mode.
    pub(crate) fn leave_unknown_mode(&mut self, channel: Channel) {
        let ch = self.state.channel_mut(channel);
        if ch.unknown {
            ch.unknown = false;
            tracing::info!(%channel, "Unknown mode left");
            self.events.publish(GripEvent::UnknownMode {
                channel,
                active: false,
            });
        }
    }

    /// Leaves unknown mode on a channel once it has proven to work.
    ///
    /// A diff above the press threshold marks the channel as working; once
    /// it drops back below, unknown mode ends.
    pub(crate) fn check_first_working(&mut self, channel: Channel) {
        let ch = self.state.channel_mut(channel);
        if ch.diff > ch.thresholds.press.value() {
            ch.first_working = true;
            tracing::debug!(%channel, diff = ch.diff, "First grip seen in unknown mode");
        } else if ch.first_working {
            self.leave_unknown_mode(channel);
        }
    }

    // ========== Events ==========

    /// Reports a press or release on `channel`.
    pub(crate) fn report_event(&mut self, channel: Channel, pressed: bool) {
        if self.state.skip_events {
            tracing::info!(%channel, pressed, "Event reporting skipped");
            return;
        }

        let motion = self.state.motion;
        let ch = self.state.channel_mut(channel);
        if pressed {
            if ch.unknown && motion {
                ch.first_working = true;
            }
        } else if ch.unknown && motion && ch.first_working {
            self.leave_unknown_mode(channel);
        }

        let ch = self.state.channel_mut(channel);
        ch.pressed = pressed;
        let unknown = ch.unknown;
        tracing::info!(%channel, pressed, unknown, "Grip event");
        self.events.publish(if pressed {
            GripEvent::Press { channel, unknown }
        } else {
            GripEvent::Release { channel, unknown }
        });
    }

    // ========== Sensing ==========

    /// Applies an enable request, honoring idempotency and the fault state.
    pub(crate) async fn set_enabled(&mut self, on: bool) {
        if self.state.is_faulted() {
            tracing::info!(on, "Device faulted, recording requested state only");
            self.state.enabled = on;
            if on {
                self.escalate(FaultReason::UpdatePrevState);
            }
            return;
        }

        if self.state.enabled == on {
            tracing::debug!(on, "Sensing already in requested state");
            return;
        }

        if on {
            self.start_sensing().await;
        } else {
            self.stop_sensing().await;
        }
        self.state.enabled = on;
    }

    /// Runs the enable sequence unconditionally.
    pub(crate) async fn start_sensing(&mut self) {
        self.state.last_raw_status = 0;
        self.state.first_event_pending = true;

        if let Err(e) = self.write(SAR_ENABLE, registers::CMD_ON).await {
            tracing::warn!(error = %e, "Enable command failed");
        }
        if self.state.is_faulted() {
            return;
        }

        self.unmask_irq();
        self.state.irq_enable_count = self.state.irq_enable_count.saturating_add(1);
        tracing::info!(count = self.state.irq_enable_count, "Sensing enabled");

        if let Err(e) = self.check_status(CheckSource::Enable).await {
            tracing::warn!(error = %e, "Status read after enable failed");
        }
    }

    pub(crate) async fn stop_sensing(&mut self) {
        self.mask_irq();
        if let Err(e) = self.write(SAR_ENABLE, registers::CMD_OFF).await {
            tracing::warn!(error = %e, "Disable command failed");
        }
        tracing::info!("Sensing disabled");
    }

    /// Reads the status register and feeds every channel's press state into
    /// the consistency check.
    pub(crate) async fn check_status(&mut self, source: CheckSource) -> Result<(), TransportError> {
        let status = self.read_status().await?;
        for channel in self.capabilities.channels() {
            let observed = channel.pressed_bit(status);
            let irq_active = self.state.irq_active;
            if let Some(reason) =
                self.state
                    .health
                    .check_irq_consistency(channel, observed, source, irq_active)
            {
                self.enter_error_mode(reason);
            }
        }
        Ok(())
    }

    // ========== Reset ==========

    /// Power-cycles the IC and restores sensing.
    ///
    /// Skipped while the device is not ready or faulted.
    pub(crate) async fn reset_device(&mut self) {
        if !self.state.ready {
            tracing::debug!("Device not ready, reset skipped");
            return;
        }
        if self.state.is_faulted() {
            tracing::info!("Device faulted, reset skipped");
            return;
        }

        tracing::info!(enabled = self.state.enabled, "Resetting device");
        self.mask_irq();
        self.state.ready = false;

        self.power_cycle().await;
        tokio::time::sleep(timing::RESET).await;

        if self.state.enabled {
            self.start_sensing().await;
        }
        self.state.ready = true;
    }

    pub(crate) async fn power_cycle(&mut self) {
        if let Err(e) = self.power.set_power(false) {
            tracing::warn!(error = %e, "Power off failed");
        }
        tokio::time::sleep(timing::POWER_CYCLE).await;
        if let Err(e) = self.power.set_power(true) {
            tracing::warn!(error = %e, "Power on failed");
        }
    }

    /// Soft-resets the IC through its reset register.
    pub(crate) async fn sw_reset(&mut self) -> Result<(), TransportError> {
        if self.state.is_faulted() {
            tracing::info!("Device faulted, software reset skipped");
            return Ok(());
        }

        for channel in self.capabilities.channels() {
            self.state.channel_mut(channel).pressed = false;
        }
        self.log_cap_and_diff().await;

        tokio::time::sleep(timing::SW_RESET_PREPARE).await;
        self.write(registers::SW_RESET, registers::CMD_SW_RESET).await?;
        tokio::time::sleep(timing::SW_RESET).await;
        tracing::info!("Software reset issued");
        Ok(())
    }

    /// Waits for a software reset to finish.
    pub(crate) async fn sw_reset_ready(&mut self) -> bool {
        if self.state.is_faulted() {
            return false;
        }

        tokio::time::sleep(timing::SW_RESET_READY).await;
        let mut done = false;
        for poll in 1..=timing::SW_RESET_POLL_ATTEMPTS {
            match self.read_u8(registers::SW_RESET).await {
                Ok(registers::SW_RESET_DONE) => {
                    done = true;
                    break;
                }
                Ok(registers::SW_RESET_IN_PROGRESS) => {
                    tracing::info!(poll, "Software reset in progress");
                }
                Ok(value) => tracing::debug!(poll, value, "Unexpected reset state"),
                Err(e) => {
                    tracing::warn!(error = %e, "Reset state read failed");
                    return false;
                }
            }
            tokio::time::sleep(timing::SW_RESET_POLL).await;
        }

        if done {
            self.log_cap_and_diff().await;
        } else {
            tracing::warn!("Software reset did not complete");
        }
        done
    }

    // ========== Readings ==========

    /// Reads the primary and secondary diff of `channel` into the state.
    pub(crate) async fn refresh_diff(&mut self, channel: Channel) -> Result<(u16, u16), TransportError> {
        let addr = match channel {
            Channel::Primary => registers::DIFF,
            Channel::Secondary => registers::DIFF_2CH,
        };
        let bytes = self.read(addr, 4).await?;
        let diff = u16::from_be_bytes([bytes[0], bytes[1]]);
        let diff_d = u16::from_be_bytes([bytes[2], bytes[3]]);

        let ch = self.state.channel_mut(channel);
        ch.diff = diff;
        ch.diff_d = diff_d;
        Ok((diff, diff_d))
    }

    pub(crate) async fn refresh_total_cap(&mut self, channel: Channel) -> Result<u16, TransportError> {
        let total = self
            .read_u16(registers::TOTAL_CAP + channel.register_offset())
            .await?;
        self.state.channel_mut(channel).total_cap = total;
        Ok(total)
    }

    async fn log_cap_and_diff(&mut self) {
        for channel in self.capabilities.channels() {
            let total_cap = self.refresh_total_cap(channel).await.map(|cap| cap / 100);
            let diff = self.refresh_diff(channel).await.map(|(diff, _)| diff);
            match (total_cap, diff) {
                (Ok(total_cap), Ok(diff)) => {
                    tracing::info!(%channel, total_cap, diff, "Capacitance");
                }
                _ => tracing::warn!(%channel, "Capacitance read failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::NoFirmware;
    use crate::hal::SoftInterruptLine;
    use crate::sim::SimulatedGrip;
    use crate::types::{FailSafePolicy, FirmwareVersion};

    fn inner(sim: &SimulatedGrip, config: GripConfig, capabilities: Capabilities) -> Inner<SimulatedGrip> {
        let mut state = DeviceState::new();
        state.ready = true;
        Inner {
            io: RegisterIo::new(sim.clone(), config.transport_retries),
            power: Box::new(sim.clone()),
            irq: Box::new(SoftInterruptLine::new()),
            thermometer: None,
            firmware_source: Box::new(NoFirmware),
            image: None,
            state,
            config,
            capabilities,
            events: EventBus::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn every_failed_attempt_counts() {
        let sim = SimulatedGrip::new();
        let mut inner = inner(&sim, GripConfig::default(), Capabilities::default());
        sim.fail_next_transfers(2);

        assert!(inner.read_status().await.is_ok());
        // Success after failures resets the count
        assert_eq!(inner.state.i2c_fail_count(), 0);

        sim.set_unresponsive(true);
        assert!(inner.read_status().await.is_err());
        assert!(inner.state.is_faulted());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_mode_follows_notifications() {
        let sim = SimulatedGrip::new();
        let mut inner = inner(&sim, GripConfig::default(), Capabilities::dual_channel());
        let mut rx = inner.events.subscribe();
        inner.state.channel_mut(Channel::Secondary).notifications = true;

        inner.enter_unknown_mode(UnknownTrigger::Usb);

        assert!(!inner.state.channel(Channel::Primary).is_unknown());
        assert!(inner.state.channel(Channel::Secondary).is_unknown());
        assert!(!inner.state.motion());
        assert_eq!(
            rx.try_recv().unwrap(),
            GripEvent::UnknownMode {
                channel: Channel::Secondary,
                active: true
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            GripEvent::UnknownTrigger(UnknownTrigger::Usb)
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn fail_safe_reports_abnormal_and_powers_off() {
        let sim = SimulatedGrip::new();
        let config = GripConfig::default().with_fail_safe(FailSafePolicy::new(0x01));
        let mut inner = inner(&sim, config, Capabilities::default());
        let mut rx = inner.events.subscribe();

        inner.escalate(FaultReason::Reset);

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(events.contains(&GripEvent::Abnormal {
            channel: Channel::Primary
        }));
        assert!(!sim.is_powered());
    }

    #[tokio::test(start_paused = true)]
    async fn shared_regulator_keeps_power() {
        let sim = SimulatedGrip::new();
        let config = GripConfig::default().with_fail_safe(FailSafePolicy::new(0x01));
        let caps = Capabilities::builder().ldo_share().build();
        let mut inner = inner(&sim, config, caps);

        inner.escalate(FaultReason::Reset);

        assert!(sim.is_powered());
    }

    #[tokio::test(start_paused = true)]
    async fn first_working_release_leaves_unknown_mode() {
        let sim = SimulatedGrip::new();
        let mut inner = inner(&sim, GripConfig::default(), Capabilities::default());
        inner.state.channel_mut(Channel::Primary).unknown = true;

        inner.report_event(Channel::Primary, true);
        assert!(inner.state.channel(Channel::Primary).is_first_working());
        assert!(inner.state.channel(Channel::Primary).is_unknown());

        inner.report_event(Channel::Primary, false);
        assert!(!inner.state.channel(Channel::Primary).is_unknown());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_skipped_when_faulted() {
        let sim = SimulatedGrip::new();
        let mut inner = inner(&sim, GripConfig::default(), Capabilities::default());
        inner.state.health.escalate(FaultReason::I2cEnable);

        inner.reset_device().await;

        assert_eq!(sim.power_cycles(), 0);
        assert!(inner.state.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn version_read_tracks_each_step() {
        let sim = SimulatedGrip::new();
        let mut inner = inner(&sim, GripConfig::default(), Capabilities::default());
        sim.reject_write(registers::ALWAYS_ACTIVE, registers::ALWAYS_ACTIVE_OFF);

        let version = inner.read_version().await.unwrap();

        assert_eq!(version, FirmwareVersion::new(SimulatedGrip::MODEL, SimulatedGrip::FIRMWARE));
        // Only the failed return to normal mode counts
        assert_eq!(inner.state.i2c_fail_count(), 1);
        assert!(!inner.state.is_faulted());
    }
}
