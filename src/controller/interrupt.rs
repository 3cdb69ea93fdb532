// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interrupt handling and the periodic diagnostic poll.

use crate::controller::DeviceController;
use crate::controller::inner::Inner;
use crate::error::Error;
use crate::health::CheckSource;
use crate::protocol::Transport;
use crate::protocol::registers::PRESS_THRESHOLD;
use crate::types::{Channel, Threshold};

impl<T: Transport> DeviceController<T> {
    /// Handles an interrupt from the IC.
    ///
    /// Reads the status register and reports a press or release for every
    /// channel whose state changed. The first interrupt after enabling
    /// reports every channel. If the status cannot be read the device is
    /// reset. Does nothing while faulted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Suspended`] while suspended.
    pub async fn handle_interrupt(&self) -> Result<(), Error> {
        let mut inner = self.lock().await?;
        inner.handle_interrupt().await;
        Ok(())
    }

    /// Runs one diagnostic poll.
    ///
    /// Hosts call this periodically. The poll cross-checks the interrupt
    /// state, applies low-temperature compensation, tracks factory
    /// statistics and resolves unknown mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Suspended`] while suspended.
    pub async fn diagnostic_tick(&self) -> Result<(), Error> {
        let mut inner = self.lock().await?;
        inner.diagnostic_tick().await;
        Ok(())
    }
}

impl<T: Transport> Inner<T> {
    pub(crate) async fn handle_interrupt(&mut self) {
        if self.state.is_faulted() {
            tracing::debug!("Device faulted, interrupt ignored");
            return;
        }
        if !self.state.ready {
            tracing::debug!("Device not ready, interrupt ignored");
            return;
        }

        let status = match self.read_status().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "Status read failed, resetting");
                self.reset_device().await;
                return;
            }
        };

        let first = self.state.first_event_pending;
        let last = self.state.last_raw_status;
        if !first && status == last {
            tracing::debug!(status, "Same data, nothing to report");
            return;
        }

        for channel in self.capabilities.channels() {
            let bit = channel.pressed_bit(status);
            if !first && bit == channel.pressed_bit(last) {
                continue;
            }

            self.report_event(channel, bit != 0);
            let diff = match self.refresh_diff(channel).await {
                Ok((diff, _)) => diff,
                Err(e) => {
                    tracing::debug!(%channel, error = %e, "Diff read failed");
                    self.state.channel(channel).diff
                }
            };
            tracing::debug!(%channel, diff, "Interrupt diff");

            if self.state.irq_counting && bit != 0 {
                let ch = self.state.channel_mut(channel);
                ch.irq_count = ch.irq_count.saturating_add(1);
                ch.max_diff = ch.max_diff.max(diff);
            }

            let irq_active = self.state.irq_active;
            if let Some(reason) = self.state.health.check_irq_consistency(
                channel,
                bit,
                CheckSource::Interrupt,
                irq_active,
            ) {
                self.enter_error_mode(reason);
            }
        }

        self.state.first_event_pending = false;
        self.state.last_raw_status = status;
    }

    pub(crate) async fn diagnostic_tick(&mut self) {
        if self.state.is_faulted() {
            return;
        }
        if self.state.resume_pending {
            self.state.resume_pending = false;
            tracing::debug!("First tick after resume skipped");
            return;
        }
        if !self.state.enabled || !self.state.ready {
            return;
        }

        if let Err(e) = self.check_status(CheckSource::Poll).await {
            tracing::warn!(error = %e, "Status poll failed, resetting");
            self.reset_device().await;
            return;
        }
        if self.state.is_faulted() {
            return;
        }

        self.compensate_low_temp().await;

        if self.state.irq_counting {
            for channel in self.capabilities.channels() {
                if let Ok((diff, _)) = self.refresh_diff(channel).await {
                    let ch = self.state.channel_mut(channel);
                    ch.max_normal_diff = ch.max_normal_diff.max(diff);
                }
            }
        } else if self.state.tick_count >= self.config.log_period_ticks {
            for channel in self.capabilities.channels() {
                match self.refresh_diff(channel).await {
                    Ok((diff, diff_d)) => {
                        let ch = self.state.channel(channel);
                        tracing::info!(
                            %channel,
                            diff,
                            diff_d,
                            pressed = ch.pressed,
                            unknown = ch.unknown,
                            "Periodic diff"
                        );
                        if ch.unknown && self.state.motion {
                            self.check_first_working(channel);
                        }
                    }
                    Err(e) => tracing::debug!(%channel, error = %e, "Diff read failed"),
                }
            }
            self.state.tick_count = 0;
        } else if self.state.motion {
            for channel in self.capabilities.channels() {
                if self.state.channel(channel).unknown
                    && self.refresh_diff(channel).await.is_ok()
                {
                    self.check_first_working(channel);
                }
            }
        }

        self.state.tick_count = self.state.tick_count.saturating_add(1);
    }

    /// Swaps press thresholds when the battery crosses the low-temperature
    /// limits.
    async fn compensate_low_temp(&mut self) {
        let Some(low_temp) = self.config.low_temp else {
            return;
        };
        let Some(temperature) = self.thermometer.as_ref().and_then(|probe| probe.temperature())
        else {
            return;
        };

        if !self.state.low_temp_active && temperature <= low_temp.enter_at {
            tracing::info!(temperature, "Entering low-temperature compensation");
            self.write_press_thresholds(low_temp.press_threshold, low_temp.press_threshold_2ch)
                .await;
            self.state.low_temp_active = true;
        } else if self.state.low_temp_active && temperature >= low_temp.release_at {
            tracing::info!(temperature, "Leaving low-temperature compensation");
            let primary = self
                .state
                .channel(Channel::Primary)
                .origin_press_threshold
                .unwrap_or_default();
            let secondary = self
                .state
                .channel(Channel::Secondary)
                .origin_press_threshold
                .unwrap_or_default();
            self.write_press_thresholds(primary, secondary).await;
            self.state.low_temp_active = false;
        }
    }

    async fn write_press_thresholds(&mut self, primary: Threshold, secondary: Threshold) {
        for (channel, threshold) in [(Channel::Primary, primary), (Channel::Secondary, secondary)] {
            if !self.capabilities.has_channel(channel) {
                continue;
            }
            let addr = PRESS_THRESHOLD + channel.register_offset();
            match self.write_u16(addr, threshold.value()).await {
                Ok(()) => self.state.channel_mut(channel).thresholds.press = threshold,
                Err(e) => tracing::warn!(%channel, error = %e, "Press threshold write failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{GripConfig, LowTempCompensation};
    use crate::controller::DeviceController;
    use crate::event::GripEvent;
    use crate::hal::FixedTemperature;
    use crate::protocol::registers;
    use crate::sim::SimulatedGrip;
    use crate::types::{Channel, Threshold};

    async fn enabled(sim: &SimulatedGrip, config: GripConfig) -> DeviceController<SimulatedGrip> {
        let controller = DeviceController::builder(sim.clone())
            .with_power(sim.clone())
            .with_config(config)
            .build()
            .unwrap();
        controller.attach().await.unwrap();
        controller.set_enabled(true).await.unwrap();
        controller
    }

    #[tokio::test(start_paused = true)]
    async fn same_status_is_not_reported_twice() {
        let sim = SimulatedGrip::new();
        let controller = enabled(&sim, GripConfig::default()).await;
        let mut rx = controller.subscribe();

        sim.set_status(0x01);
        controller.handle_interrupt().await.unwrap();
        controller.handle_interrupt().await.unwrap();

        assert!(matches!(rx.try_recv().unwrap(), GripEvent::Press { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_status_resets_device() {
        let sim = SimulatedGrip::new();
        let controller = enabled(&sim, GripConfig::default()).await;

        sim.fail_next_transfers(2);
        controller.handle_interrupt().await.unwrap();
        assert_eq!(sim.power_cycles(), 0);

        sim.fail_next_transfers(3);
        controller.handle_interrupt().await.unwrap();
        // Third failure faults the device, so the reset is skipped
        assert!(controller.state().await.is_faulted());
        assert_eq!(sim.power_cycles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_skipped_after_resume() {
        let sim = SimulatedGrip::new();
        let controller = enabled(&sim, GripConfig::default()).await;
        controller.suspend().await;
        controller.resume().await;
        sim.clear_writes();

        controller.diagnostic_tick().await.unwrap();
        assert_eq!(controller.inner.lock().await.state.tick_count, 0);

        controller.diagnostic_tick().await.unwrap();
        assert_eq!(controller.inner.lock().await.state.tick_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn low_temperature_swaps_press_thresholds() {
        let sim = SimulatedGrip::new();
        let probe = FixedTemperature::new(250);
        let low_temp = LowTempCompensation {
            press_threshold: Threshold::new(800),
            press_threshold_2ch: Threshold::new(900),
            enter_at: -100,
            release_at: -50,
        };
        sim.set_register_u16(registers::PRESS_THRESHOLD, 400);
        let controller = DeviceController::builder(sim.clone())
            .with_power(sim.clone())
            .with_config(GripConfig::default().with_low_temp(low_temp))
            .with_thermometer(probe.clone())
            .build()
            .unwrap();
        controller.attach().await.unwrap();
        controller.check_firmware().await.ok();
        controller.set_enabled(true).await.unwrap();

        probe.set(Some(-150));
        controller.diagnostic_tick().await.unwrap();
        assert_eq!(sim.register(registers::PRESS_THRESHOLD), 0x03);
        assert_eq!(sim.register(registers::PRESS_THRESHOLD + 1), 0x20);
        assert!(controller.state().await.low_temp_active());

        probe.set(Some(-70));
        controller.diagnostic_tick().await.unwrap();
        assert!(controller.state().await.low_temp_active());

        probe.set(Some(-50));
        controller.diagnostic_tick().await.unwrap();
        let state = controller.state().await;
        assert!(!state.low_temp_active());
        assert_eq!(
            state.channel(Channel::Primary).thresholds().press,
            Threshold::new(400)
        );
        assert_eq!(sim.register(registers::PRESS_THRESHOLD + 1), 0x90);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_resolves_unknown_mode() {
        let sim = SimulatedGrip::new();
        let controller = enabled(&sim, GripConfig::default()).await;
        controller.set_notifications_enabled(true).await.unwrap();
        controller.set_motion(true).await.unwrap();
        controller.set_press_threshold(Channel::Primary, Threshold::new(100)).await.unwrap();

        sim.set_register_u16(registers::DIFF, 150);
        controller.diagnostic_tick().await.unwrap();
        let state = controller.state().await;
        assert!(state.channel(Channel::Primary).is_first_working());
        assert!(state.channel(Channel::Primary).is_unknown());

        sim.set_register_u16(registers::DIFF, 20);
        controller.diagnostic_tick().await.unwrap();
        assert!(!controller.state().await.channel(Channel::Primary).is_unknown());
    }
}
