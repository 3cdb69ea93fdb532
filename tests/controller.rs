// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the device controller against the simulated IC.

use grip_ctl::hal::SoftInterruptLine;
use grip_ctl::protocol::registers;
use grip_ctl::sim::{SimulatedGrip, payload_checksum};
use grip_ctl::types::{Channel, FaultReason, HallSensor, Threshold, UnknownTrigger, UsbAttach};
use grip_ctl::{
    Capabilities, DeviceController, Error, FirmwareImage, FirmwareOrigin, FirmwareVersion,
    GripConfig, GripEvent,
};
use tokio::sync::broadcast::Receiver;

/// Builds an attached controller with a shared interrupt line.
async fn attached(
    sim: &SimulatedGrip,
    capabilities: Capabilities,
) -> (DeviceController<SimulatedGrip>, SoftInterruptLine) {
    let irq = SoftInterruptLine::new();
    let controller = DeviceController::builder(sim.clone())
        .with_power(sim.clone())
        .with_interrupt_line(irq.clone())
        .with_capabilities(capabilities)
        .build()
        .unwrap();
    controller.attach().await.unwrap();
    (controller, irq)
}

fn drain(rx: &mut Receiver<GripEvent>) -> Vec<GripEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

// ============================================================================
// Enable / Disable
// ============================================================================

mod sensing {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn repeated_enable_writes_once() {
        let sim = SimulatedGrip::new();
        let (controller, irq) = attached(&sim, Capabilities::default()).await;

        controller.set_enabled(true).await.unwrap();
        controller.set_enabled(true).await.unwrap();

        assert_eq!(sim.writes_to(registers::SAR_ENABLE), vec![registers::CMD_ON]);
        assert!(irq.is_enabled());
        assert_eq!(controller.state().await.irq_enable_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disable_masks_before_writing() {
        let sim = SimulatedGrip::new();
        let (controller, irq) = attached(&sim, Capabilities::default()).await;
        controller.set_enabled(true).await.unwrap();

        controller.set_enabled(false).await.unwrap();

        assert!(!irq.is_enabled());
        assert_eq!(
            sim.writes_to(registers::SAR_ENABLE),
            vec![registers::CMD_ON, registers::CMD_OFF]
        );
        assert!(!controller.state().await.is_enabled());
    }
}

// ============================================================================
// Interrupt Handling
// ============================================================================

mod interrupts {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_event_reports_unchanged_status() {
        let sim = SimulatedGrip::new();
        let (controller, _irq) = attached(&sim, Capabilities::dual_channel()).await;
        controller.set_enabled(true).await.unwrap();
        let mut rx = controller.subscribe();

        // Status equals the last recorded status (zero)
        controller.handle_interrupt().await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                GripEvent::Release {
                    channel: Channel::Primary,
                    unknown: false
                },
                GripEvent::Release {
                    channel: Channel::Secondary,
                    unknown: false
                },
            ]
        );
        assert!(!controller.state().await.first_event_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn only_changed_bits_are_reported() {
        let sim = SimulatedGrip::new();
        let (controller, _irq) = attached(&sim, Capabilities::dual_channel()).await;
        controller.set_enabled(true).await.unwrap();
        controller.handle_interrupt().await.unwrap();
        let mut rx = controller.subscribe();

        controller.handle_interrupt().await.unwrap();
        assert!(drain(&mut rx).is_empty());

        sim.set_status(0x02);
        controller.handle_interrupt().await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![GripEvent::Press {
                channel: Channel::Secondary,
                unknown: false
            }]
        );
        assert!(controller.state().await.channel(Channel::Secondary).is_pressed());
    }

    #[tokio::test(start_paused = true)]
    async fn line_stays_masked_until_enabled() {
        let sim = SimulatedGrip::new();
        let (controller, irq) = attached(&sim, Capabilities::default()).await;

        assert!(!irq.is_enabled());
        assert_eq!(controller.irq_level().await.unwrap(), None);
    }
}

// ============================================================================
// Thresholds
// ============================================================================

mod thresholds {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn boundary_values_round_trip() {
        let sim = SimulatedGrip::new();
        let (controller, _irq) = attached(&sim, Capabilities::dual_channel()).await;

        for value in [0, 0xFF, 0x100, 0xFFFF] {
            for channel in [Channel::Primary, Channel::Secondary] {
                controller
                    .set_press_threshold(channel, Threshold::new(value))
                    .await
                    .unwrap();
                controller
                    .set_release_threshold(channel, Threshold::new(value))
                    .await
                    .unwrap();

                let read = controller.thresholds(channel).await.unwrap();
                assert_eq!(read.press.value(), value);
                assert_eq!(read.release.value(), value);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn thresholds_are_big_endian() {
        let sim = SimulatedGrip::new();
        let (controller, _irq) = attached(&sim, Capabilities::default()).await;

        controller
            .set_press_threshold(Channel::Primary, Threshold::new(0x1234))
            .await
            .unwrap();

        assert_eq!(sim.register(registers::PRESS_THRESHOLD), 0x12);
        assert_eq!(sim.register(registers::PRESS_THRESHOLD + 1), 0x34);
    }
}

// ============================================================================
// Health Monitoring
// ============================================================================

mod health {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn three_transport_failures_fault_the_device() {
        let sim = SimulatedGrip::new();
        let (controller, irq) = attached(&sim, Capabilities::default()).await;
        controller.set_enabled(true).await.unwrap();
        let mut rx = controller.subscribe();

        sim.set_unresponsive(true);
        for _ in 0..3 {
            assert!(matches!(
                controller.diff(Channel::Primary).await,
                Err(Error::Transport(_))
            ));
        }

        let state = controller.state().await;
        assert!(state.is_faulted());
        assert!(state.fault_bits().contains(FaultReason::I2cFailures));
        assert!(!irq.is_enabled());
        assert!(drain(&mut rx).iter().any(|event| matches!(
            event,
            GripEvent::Fault {
                reason: FaultReason::I2cFailures,
                ..
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failure_count() {
        let sim = SimulatedGrip::new();
        let (controller, _irq) = attached(&sim, Capabilities::default()).await;

        for _ in 0..2 {
            sim.fail_next_transfers(1);
            assert!(controller.baseline(Channel::Primary).await.is_err());
            controller.baseline(Channel::Primary).await.unwrap();
        }
        sim.fail_next_transfers(1);
        assert!(controller.baseline(Channel::Primary).await.is_err());

        assert!(!controller.state().await.is_faulted());
    }

    #[tokio::test(start_paused = true)]
    async fn polled_mismatches_escalate_once() {
        let sim = SimulatedGrip::new();
        let (controller, irq) = attached(&sim, Capabilities::default()).await;
        controller.set_enabled(true).await.unwrap();
        let mut rx = controller.subscribe();

        for status in [0x01, 0x00, 0x01, 0x00, 0x01] {
            sim.set_status(status);
            controller.diagnostic_tick().await.unwrap();
        }

        let faults = drain(&mut rx)
            .into_iter()
            .filter(|event| matches!(event, GripEvent::Fault { .. }))
            .count();
        assert_eq!(faults, 1);
        let state = controller.state().await;
        assert!(state.fault_bits().contains(FaultReason::IrqMismatch));
        assert!(!irq.is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_resets_mismatch_count() {
        let sim = SimulatedGrip::new();
        let (controller, _irq) = attached(&sim, Capabilities::default()).await;
        controller.set_enabled(true).await.unwrap();

        for status in [0x01, 0x00] {
            sim.set_status(status);
            controller.diagnostic_tick().await.unwrap();
        }
        sim.set_status(0x01);
        controller.handle_interrupt().await.unwrap();
        for status in [0x00, 0x01] {
            sim.set_status(status);
            controller.diagnostic_tick().await.unwrap();
        }

        assert!(!controller.state().await.is_faulted());
    }

    #[tokio::test(start_paused = true)]
    async fn enabling_while_faulted_escalates() {
        let sim = SimulatedGrip::new();
        let (controller, _irq) = attached(&sim, Capabilities::default()).await;
        sim.set_unresponsive(true);
        for _ in 0..3 {
            let _ = controller.raw(Channel::Primary).await;
        }
        sim.set_unresponsive(false);
        sim.clear_writes();
        let mut rx = controller.subscribe();

        controller.set_enabled(true).await.unwrap();

        assert!(sim.writes().is_empty());
        let state = controller.state().await;
        assert!(state.is_enabled());
        assert!(state.fault_bits().contains(FaultReason::UpdatePrevState));
        assert!(drain(&mut rx).iter().any(|event| matches!(
            event,
            GripEvent::Fault {
                reason: FaultReason::UpdatePrevState,
                ..
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn version_read_rearms_but_keeps_bits() {
        let sim = SimulatedGrip::new();
        let (controller, _irq) = attached(&sim, Capabilities::default()).await;
        sim.set_unresponsive(true);
        for _ in 0..3 {
            let _ = controller.raw(Channel::Primary).await;
        }
        sim.set_unresponsive(false);

        controller.firmware_version().await.unwrap();

        let state = controller.state().await;
        assert!(!state.is_faulted());
        assert!(state.fault_bits().contains(FaultReason::I2cFailures));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_version_read_keeps_fault() {
        let sim = SimulatedGrip::new();
        let (controller, _irq) = attached(&sim, Capabilities::default()).await;
        sim.set_unresponsive(true);
        for _ in 0..3 {
            let _ = controller.raw(Channel::Primary).await;
        }

        assert!(matches!(
            controller.firmware_version().await,
            Err(Error::Transport(_))
        ));

        assert!(controller.state().await.is_faulted());
        assert_eq!(sim.power_cycles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn faulted_device_receives_no_writes() {
        let sim = SimulatedGrip::new();
        sim.set_flashed_version(0x20);
        let (controller, irq) = attached(&sim, Capabilities::default()).await;
        sim.set_unresponsive(true);
        for _ in 0..3 {
            let _ = controller.raw(Channel::Primary).await;
        }
        sim.set_unresponsive(false);
        controller.set_enabled(true).await.unwrap();
        sim.set_register(registers::SAR_ENABLE, registers::CMD_OFF);
        sim.clear_writes();

        assert!(matches!(controller.recover_registers().await, Err(Error::Faulted)));
        controller.sw_reset().await.unwrap();
        controller.on_usb_changed(UsbAttach::attached()).await.unwrap();
        controller.on_hall_changed(true, HallSensor::Flip).await.unwrap();
        assert!(matches!(controller.write_register(0x70, 1).await, Err(Error::Faulted)));

        assert!(sim.writes().is_empty());
        assert!(!irq.is_enabled());

        let blocks = vec![[0x5A; 32]; 2];
        let external = FirmwareImage::from_parts(
            FirmwareVersion::new(SimulatedGrip::MODEL, 0x20),
            payload_checksum(&blocks),
            blocks,
        )
        .unwrap();
        controller
            .update_firmware(FirmwareOrigin::External(external.to_bytes()))
            .await
            .unwrap();

        assert!(sim.writes_to(registers::SAR_ENABLE).is_empty());
        assert!(!irq.is_enabled());
        let state = controller.state().await;
        assert!(state.is_faulted());
        assert!(!state.irq_active());
    }
}

// ============================================================================
// Unknown Mode
// ============================================================================

mod unknown_mode {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fault_enters_unknown_mode() {
        let sim = SimulatedGrip::new();
        let (controller, _irq) = attached(&sim, Capabilities::default()).await;
        controller.set_notifications_enabled(true).await.unwrap();
        controller.set_unknown_mode(false).await.unwrap();
        let mut rx = controller.subscribe();

        sim.set_unresponsive(true);
        for _ in 0..3 {
            let _ = controller.raw(Channel::Primary).await;
        }

        let events = drain(&mut rx);
        assert!(events.contains(&GripEvent::UnknownMode {
            channel: Channel::Primary,
            active: true
        }));
        assert!(events.contains(&GripEvent::UnknownTrigger(UnknownTrigger::Force)));
    }

    #[tokio::test(start_paused = true)]
    async fn press_and_release_with_motion_resolve_unknown_mode() {
        let sim = SimulatedGrip::new();
        let (controller, _irq) = attached(&sim, Capabilities::default()).await;
        controller.set_enabled(true).await.unwrap();
        controller.handle_interrupt().await.unwrap();
        controller.set_notifications_enabled(true).await.unwrap();
        controller.set_motion(true).await.unwrap();
        let mut rx = controller.subscribe();

        sim.set_status(0x01);
        controller.handle_interrupt().await.unwrap();
        sim.set_status(0x00);
        controller.handle_interrupt().await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                GripEvent::Press {
                    channel: Channel::Primary,
                    unknown: true
                },
                GripEvent::UnknownMode {
                    channel: Channel::Primary,
                    active: false
                },
                GripEvent::Release {
                    channel: Channel::Primary,
                    unknown: false
                },
            ]
        );
    }
}

// ============================================================================
// Configuration
// ============================================================================

mod configuration {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn json_config_drives_the_controller() {
        let config = GripConfig::from_json(r#"{ "transport_retries": 3 }"#).unwrap();
        let sim = SimulatedGrip::new();
        let controller = DeviceController::builder(sim.clone())
            .with_power(sim.clone())
            .with_config(config)
            .build()
            .unwrap();
        controller.attach().await.unwrap();

        // Two failures are absorbed by the retry bound
        sim.fail_next_transfers(2);
        controller.baseline(Channel::Primary).await.unwrap();

        // Three failures exhaust it and count toward the fault threshold
        sim.fail_next_transfers(3);
        assert!(controller.baseline(Channel::Primary).await.is_err());
        assert!(controller.state().await.is_faulted());
    }
}
