// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device controller builder.

use crate::capabilities::Capabilities;
use crate::config::GripConfig;
use crate::controller::DeviceController;
use crate::controller::inner::Inner;
use crate::error::Error;
use crate::event::EventBus;
use crate::firmware::{FirmwareSource, NoFirmware};
use crate::hal::{DetachedPower, InterruptLine, PowerSupply, SoftInterruptLine, TemperatureProbe};
use crate::protocol::{RegisterIo, Transport};
use crate::state::DeviceState;

/// Builder for creating a [`DeviceController`].
///
/// Only the transport is required. Without further configuration the
/// controller drives a single-channel device with default settings, no
/// power control, a software interrupt line and no firmware source.
///
/// # Examples
///
/// ```
/// use grip_ctl::{Capabilities, DeviceController, GripConfig};
/// use grip_ctl::sim::SimulatedGrip;
///
/// # fn example() -> grip_ctl::Result<()> {
/// let sim = SimulatedGrip::new();
/// let controller = DeviceController::builder(sim.clone())
///     .with_capabilities(Capabilities::dual_channel())
///     .with_config(GripConfig::default().with_log_period_ticks(30))
///     .with_power(sim)
///     .build()?;
///
/// assert_eq!(controller.capabilities().channel_count(), 2);
/// # Ok(())
/// # }
/// ```
pub struct DeviceControllerBuilder<T> {
    transport: T,
    config: GripConfig,
    capabilities: Capabilities,
    power: Box<dyn PowerSupply + Send>,
    irq: Box<dyn InterruptLine + Send>,
    thermometer: Option<Box<dyn TemperatureProbe + Send>>,
    firmware_source: Box<dyn FirmwareSource + Send + Sync>,
    events: Option<EventBus>,
}

impl<T: Transport> DeviceControllerBuilder<T> {
    pub(crate) fn new(transport: T) -> Self {
        Self {
            transport,
            config: GripConfig::default(),
            capabilities: Capabilities::default(),
            power: Box::new(DetachedPower),
            irq: Box::new(SoftInterruptLine::new()),
            thermometer: None,
            firmware_source: Box::new(NoFirmware),
            events: None,
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: GripConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the device capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Sets the supply used for resets and flashing.
    #[must_use]
    pub fn with_power(mut self, power: impl PowerSupply + Send + 'static) -> Self {
        self.power = Box::new(power);
        self
    }

    /// Sets the interrupt line to mask and unmask.
    #[must_use]
    pub fn with_interrupt_line(mut self, irq: impl InterruptLine + Send + 'static) -> Self {
        self.irq = Box::new(irq);
        self
    }

    /// Sets the battery thermometer used for low-temperature compensation.
    #[must_use]
    pub fn with_thermometer(mut self, probe: impl TemperatureProbe + Send + 'static) -> Self {
        self.thermometer = Some(Box::new(probe));
        self
    }

    /// Sets where the built-in firmware image is loaded from.
    #[must_use]
    pub fn with_firmware_source(
        mut self,
        source: impl FirmwareSource + Send + Sync + 'static,
    ) -> Self {
        self.firmware_source = Box::new(source);
        self
    }

    /// Publishes events on an existing bus instead of a new one.
    #[must_use]
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Builds the controller.
    ///
    /// The device is not touched; call
    /// [`DeviceController::attach`] to bring it up.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn build(self) -> Result<DeviceController<T>, Error> {
        self.config.validate()?;
        let inner = Inner {
            io: RegisterIo::new(self.transport, self.config.transport_retries),
            power: self.power,
            irq: self.irq,
            thermometer: self.thermometer,
            firmware_source: self.firmware_source,
            image: None,
            state: DeviceState::new(),
            config: self.config,
            capabilities: self.capabilities,
            events: self.events.unwrap_or_default(),
        };
        Ok(DeviceController::new(inner))
    }
}

impl<T> std::fmt::Debug for DeviceControllerBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceControllerBuilder")
            .field("config", &self.config)
            .field("capabilities", &self.capabilities)
            .field("thermometer", &self.thermometer.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::sim::SimulatedGrip;

    #[test]
    fn builder_defaults() {
        let builder = DeviceControllerBuilder::new(SimulatedGrip::new());
        assert_eq!(builder.config, GripConfig::default());
        assert_eq!(builder.capabilities, Capabilities::default());
        assert!(builder.thermometer.is_none());
    }

    #[test]
    fn build_rejects_invalid_config() {
        let config = GripConfig {
            transport_retries: 0,
            ..GripConfig::default()
        };
        let result = DeviceControllerBuilder::new(SimulatedGrip::new())
            .with_config(config)
            .build();

        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn build_shares_event_bus() {
        let bus = EventBus::new();
        let controller = DeviceControllerBuilder::new(SimulatedGrip::new())
            .with_event_bus(bus.clone())
            .build()
            .unwrap();

        let _rx = controller.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }
}
