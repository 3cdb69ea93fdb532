// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Platform collaborators injected into the controller.
//!
//! The controller never touches regulators, GPIOs or the battery gauge
//! directly. Hosts implement these traits; the `Detached*` types are used
//! when a collaborator is not wired up.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::PowerError;

/// Supply rails of the grip IC.
pub trait PowerSupply {
    /// Switches the IC supply on or off.
    ///
    /// # Errors
    ///
    /// Returns `PowerError` if the regulator refuses the request.
    fn set_power(&mut self, on: bool) -> Result<(), PowerError>;
}

/// The interrupt line of the grip IC.
pub trait InterruptLine {
    /// Unmasks interrupt delivery.
    fn enable(&mut self);

    /// Masks interrupt delivery.
    fn disable(&mut self);

    /// Returns the current line level, if it can be read.
    fn level(&self) -> Option<bool> {
        None
    }
}

/// Source of the battery temperature used for low-temperature compensation.
pub trait TemperatureProbe {
    /// Returns the temperature in tenths of a degree Celsius.
    fn temperature(&self) -> Option<i32>;
}

/// A power supply that accepts every request and does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedPower;

impl PowerSupply for DetachedPower {
    fn set_power(&mut self, on: bool) -> Result<(), PowerError> {
        tracing::trace!(on, "No power supply attached");
        Ok(())
    }
}

/// An interrupt line that only remembers whether it is unmasked.
///
/// Clones share the same flag, which lets a host observe masking.
#[derive(Debug, Clone, Default)]
pub struct SoftInterruptLine {
    enabled: Arc<AtomicBool>,
}

impl SoftInterruptLine {
    /// Creates a masked line.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while interrupt delivery is unmasked.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl InterruptLine for SoftInterruptLine {
    fn enable(&mut self) {
        self.enabled.store(true, Ordering::Release);
    }

    fn disable(&mut self) {
        self.enabled.store(false, Ordering::Release);
    }
}

/// A temperature probe that returns a fixed reading.
///
/// Clones share the reading so tests can change it after handing the probe
/// to a controller.
#[derive(Debug, Clone, Default)]
pub struct FixedTemperature {
    value: Arc<parking_lot::Mutex<Option<i32>>>,
}

impl FixedTemperature {
    /// Creates a probe reporting `tenths` tenths of a degree Celsius.
    #[must_use]
    pub fn new(tenths: i32) -> Self {
        Self {
            value: Arc::new(parking_lot::Mutex::new(Some(tenths))),
        }
    }

    /// Changes the reported temperature.
    pub fn set(&self, tenths: Option<i32>) {
        *self.value.lock() = tenths;
    }
}

impl TemperatureProbe for FixedTemperature {
    fn temperature(&self) -> Option<i32> {
        *self.value.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_line_clones_share_state() {
        let line = SoftInterruptLine::new();
        let mut handle = line.clone();

        handle.enable();
        assert!(line.is_enabled());

        handle.disable();
        assert!(!line.is_enabled());
        assert_eq!(line.level(), None);
    }

    #[test]
    fn fixed_temperature_updates() {
        let probe = FixedTemperature::new(250);
        assert_eq!(probe.temperature(), Some(250));

        probe.clone().set(Some(-120));
        assert_eq!(probe.temperature(), Some(-120));

        probe.set(None);
        assert_eq!(probe.temperature(), None);
    }

    #[test]
    fn detached_power_accepts_requests() {
        let mut power = DetachedPower;
        assert!(power.set_power(false).is_ok());
        assert!(power.set_power(true).is_ok());
    }
}
