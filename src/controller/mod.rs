// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level controller for a grip-sensor IC.
//!
//! The [`DeviceController`] owns the transport and the board collaborators
//! and exposes every device operation as an async method. Interrupt
//! handling and the periodic diagnostic poll are not scheduled internally;
//! the host calls [`DeviceController::handle_interrupt`] when the line
//! fires and [`DeviceController::diagnostic_tick`] on its own timer.
//!
//! # Locking
//!
//! One async mutex guards the transport, the collaborators and the
//! [`DeviceState`]. Every operation holds it for its full duration, so a
//! firmware flash blocks other operations for several seconds. The run
//! state ([`RunState`]), the firmware update status and the flashing flag
//! live outside that lock and can be observed at any time.
//!
//! ```
//! use grip_ctl::{DeviceController, GripEvent};
//! use grip_ctl::sim::SimulatedGrip;
//! use grip_ctl::types::Channel;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> grip_ctl::Result<()> {
//! let sim = SimulatedGrip::new();
//! let controller = DeviceController::builder(sim.clone())
//!     .with_power(sim.clone())
//!     .build()?;
//! let mut events = controller.subscribe();
//!
//! controller.attach().await?;
//! controller.set_enabled(true).await?;
//!
//! sim.set_status(0x01);
//! controller.handle_interrupt().await?;
//!
//! assert_eq!(
//!     events.recv().await.unwrap(),
//!     GripEvent::Press { channel: Channel::Primary, unknown: false }
//! );
//! # Ok(())
//! # }
//! ```

mod builder;
mod firmware;
pub(crate) mod inner;
mod interrupt;
mod notifications;
mod telemetry;

pub use builder::DeviceControllerBuilder;
pub use telemetry::{Gain, IrqCountReport};

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio::sync::{MutexGuard, broadcast};

use crate::capabilities::Capabilities;
use crate::config::GripConfig;
use crate::error::Error;
use crate::event::{EventBus, GripEvent};
use crate::protocol::{Transport, timing};
use crate::state::DeviceState;
use crate::types::{Channel, UpdateStatus};

use inner::Inner;

/// Whether the controller accepts device operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// Operations run normally.
    #[default]
    Running,
    /// The host is suspended; operations fail with [`Error::Suspended`].
    Suspended,
}

/// Controller for one grip-sensor IC.
///
/// Create one with [`DeviceController::builder`].
pub struct DeviceController<T> {
    inner: tokio::sync::Mutex<Inner<T>>,
    run_state: RwLock<RunState>,
    update_status: RwLock<UpdateStatus>,
    flashing: AtomicBool,
    events: EventBus,
    capabilities: Capabilities,
    config: GripConfig,
}

impl<T> std::fmt::Debug for DeviceController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceController")
            .field("run_state", &*self.run_state.read())
            .field("update_status", &*self.update_status.read())
            .field("flashing", &self.flashing.load(Ordering::Acquire))
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> DeviceController<T> {
    /// Creates a builder for a controller talking over `transport`.
    pub fn builder(transport: T) -> DeviceControllerBuilder<T> {
        DeviceControllerBuilder::new(transport)
    }

    pub(crate) fn new(inner: Inner<T>) -> Self {
        Self {
            events: inner.events.clone(),
            capabilities: inner.capabilities,
            config: inner.config.clone(),
            inner: tokio::sync::Mutex::new(inner),
            run_state: RwLock::new(RunState::Running),
            update_status: RwLock::new(UpdateStatus::Pass),
            flashing: AtomicBool::new(false),
        }
    }

    /// Returns the device capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Returns the configuration the controller was built with.
    #[must_use]
    pub fn config(&self) -> &GripConfig {
        &self.config
    }

    /// Subscribes to grip events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GripEvent> {
        self.events.subscribe()
    }

    /// Returns the current run state.
    #[must_use]
    pub fn run_state(&self) -> RunState {
        *self.run_state.read()
    }

    /// Returns `true` while a firmware image is being flashed.
    #[must_use]
    pub fn is_flashing(&self) -> bool {
        self.flashing.load(Ordering::Acquire)
    }

    /// Returns a snapshot of the device state.
    ///
    /// Waits for the operation in progress, if any.
    pub async fn state(&self) -> DeviceState {
        self.inner.lock().await.state.clone()
    }

    /// Takes the device lock, failing fast while suspended.
    async fn lock(&self) -> Result<MutexGuard<'_, Inner<T>>, Error> {
        if self.run_state() == RunState::Suspended {
            tracing::debug!("Operation rejected while suspended");
            return Err(Error::Suspended);
        }
        Ok(self.inner.lock().await)
    }

    fn check_channel(&self, channel: Channel) -> Result<(), Error> {
        if self.capabilities.has_channel(channel) {
            Ok(())
        } else {
            Err(Error::ChannelUnavailable(channel))
        }
    }

    // ========== Lifecycle ==========

    /// Powers the IC and marks it ready.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Power`] if the supply cannot be switched on.
    pub async fn attach(&self) -> Result<(), Error> {
        let mut inner = self.lock().await?;
        inner.power.set_power(true)?;
        tokio::time::sleep(timing::RESET).await;
        inner.state.ready = true;
        tracing::info!(
            channels = self.capabilities.channel_count(),
            "Grip device attached"
        );
        Ok(())
    }

    /// Suspends the controller.
    ///
    /// New operations fail with [`Error::Suspended`] until
    /// [`resume`](Self::resume). An operation already in progress completes
    /// first. If sensing is on, the interrupt stays armed as a wake source.
    pub async fn suspend(&self) {
        *self.run_state.write() = RunState::Suspended;
        let mut inner = self.inner.lock().await;
        if inner.state.enabled && inner.state.irq_active {
            inner.state.wake_armed = true;
        }
        tracing::info!(enabled = inner.state.enabled, "Suspended");
    }

    /// Resumes the controller.
    ///
    /// The next diagnostic tick is skipped to let the IC settle.
    pub async fn resume(&self) {
        let mut inner = self.inner.lock().await;
        inner.state.resume_pending = true;
        inner.state.wake_armed = false;
        *self.run_state.write() = RunState::Running;
        tracing::info!(enabled = inner.state.enabled, "Resumed");
    }

    /// Masks the interrupt and powers the IC down for good.
    ///
    /// The device stays faulted afterwards; nothing touches it again
    /// until a firmware-version read re-arms it.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state.enabled {
            inner.mask_irq();
            if let Err(e) = inner.power.set_power(false) {
                tracing::warn!(error = %e, "Power off failed");
            }
        }
        inner.state.enabled = false;
        inner.state.ready = false;
        inner.state.health.halt();
        tracing::info!("Shut down");
    }

    // ========== Sensing ==========

    /// Turns sensing on or off.
    ///
    /// Requesting the current state does nothing. While faulted the request
    /// is only recorded, and enabling escalates the fault again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Suspended`] while suspended. Transfer failures are
    /// logged and fed to the health monitor.
    pub async fn set_enabled(&self, on: bool) -> Result<(), Error> {
        let mut inner = self.lock().await?;
        inner.set_enabled(on).await;
        Ok(())
    }

    /// Power-cycles the IC and restores sensing.
    ///
    /// Skipped while the device is not ready or faulted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Suspended`] while suspended.
    pub async fn reset(&self) -> Result<(), Error> {
        let mut inner = self.lock().await?;
        inner.reset_device().await;
        Ok(())
    }

    /// Triggers a software reset of the IC.
    ///
    /// Skipped while faulted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the reset command cannot be written.
    pub async fn sw_reset(&self) -> Result<(), Error> {
        let mut inner = self.lock().await?;
        inner.sw_reset().await?;
        Ok(())
    }

    /// Waits for a software reset to finish and returns whether it did.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Suspended`] while suspended.
    pub async fn sw_reset_ready(&self) -> Result<bool, Error> {
        let mut inner = self.lock().await?;
        Ok(inner.sw_reset_ready().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::SoftInterruptLine;
    use crate::protocol::registers;
    use crate::sim::SimulatedGrip;

    fn controller(sim: &SimulatedGrip) -> DeviceController<SimulatedGrip> {
        DeviceController::builder(sim.clone())
            .with_power(sim.clone())
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn attach_marks_ready() {
        let sim = SimulatedGrip::new();
        let controller = controller(&sim);
        assert!(!controller.state().await.is_ready());

        controller.attach().await.unwrap();

        assert!(controller.state().await.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn suspended_operations_fail_fast() {
        let sim = SimulatedGrip::new();
        let controller = controller(&sim);
        controller.attach().await.unwrap();

        controller.suspend().await;
        assert_eq!(controller.run_state(), RunState::Suspended);
        assert!(matches!(
            controller.set_enabled(true).await,
            Err(Error::Suspended)
        ));
        assert!(sim.writes().is_empty());

        controller.resume().await;
        controller.set_enabled(true).await.unwrap();
        assert!(controller.state().await.is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn suspend_arms_wake_when_sensing() {
        let sim = SimulatedGrip::new();
        let controller = controller(&sim);
        controller.attach().await.unwrap();
        controller.set_enabled(true).await.unwrap();

        controller.suspend().await;
        assert!(controller.inner.lock().await.state.wake_armed);

        controller.resume().await;
        let inner = controller.inner.lock().await;
        assert!(!inner.state.wake_armed);
        assert!(inner.state.resume_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_reapplies_enable() {
        let sim = SimulatedGrip::new();
        let controller = controller(&sim);
        controller.attach().await.unwrap();
        controller.set_enabled(true).await.unwrap();

        controller.reset().await.unwrap();

        assert_eq!(sim.power_cycles(), 1);
        assert_eq!(sim.register(registers::SAR_ENABLE), registers::CMD_ON);
        let state = controller.state().await;
        assert!(state.is_ready());
        assert!(state.irq_active());
        assert_eq!(state.irq_enable_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_powers_off() {
        let sim = SimulatedGrip::new();
        let irq = SoftInterruptLine::new();
        let controller = DeviceController::builder(sim.clone())
            .with_power(sim.clone())
            .with_interrupt_line(irq.clone())
            .build()
            .unwrap();
        controller.attach().await.unwrap();
        controller.set_enabled(true).await.unwrap();
        assert!(irq.is_enabled());

        controller.shutdown().await;

        assert!(!irq.is_enabled());
        assert!(!sim.is_powered());
        let state = controller.state().await;
        assert!(state.is_faulted());
        assert!(!state.is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn sw_reset_round_trip() {
        let sim = SimulatedGrip::new();
        let controller = controller(&sim);
        controller.attach().await.unwrap();

        controller.sw_reset().await.unwrap();

        assert_eq!(sim.sw_resets(), 1);
        assert!(controller.sw_reset_ready().await.unwrap());
    }
}
