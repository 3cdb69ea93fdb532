// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event gating, unknown mode and dock notifications.

use crate::controller::DeviceController;
use crate::controller::inner::Inner;
use crate::error::Error;
use crate::event::GripEvent;
use crate::protocol::Transport;
use crate::protocol::registers::{self, TSPTA};
use crate::types::{EventReporting, HallSensor, UnknownTrigger, UsbAttach};

impl<T: Transport> DeviceController<T> {
    // ========== Event gating ==========

    /// Suppresses or resumes press and release events.
    ///
    /// [`EventReporting::Skip`] also takes every channel out of unknown
    /// mode and reports it released.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Suspended`] while suspended.
    pub async fn set_event_reporting(&self, mode: EventReporting) -> Result<(), Error> {
        let mut inner = self.lock().await?;
        inner.set_event_reporting(mode);
        Ok(())
    }

    // ========== Unknown mode ==========

    /// Turns unknown-mode notifications on or off for the channels selected
    /// by [`GripConfig::unknown_channel_selection`](crate::GripConfig::unknown_channel_selection).
    ///
    /// Turning them on enters unknown mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Suspended`] while suspended.
    pub async fn set_notifications_enabled(&self, on: bool) -> Result<(), Error> {
        let mut inner = self.lock().await?;
        let mut any = false;
        for channel in self.capabilities.channels() {
            if self.config.selects_channel(channel.index()) {
                inner.state.channel_mut(channel).notifications = on;
                any |= on;
            }
        }
        tracing::info!(on, "Unknown-mode notifications");
        if any {
            inner.enter_unknown_mode(UnknownTrigger::Boot);
        }
        Ok(())
    }

    /// Forces unknown mode on, or takes every channel out of it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Suspended`] while suspended.
    pub async fn set_unknown_mode(&self, on: bool) -> Result<(), Error> {
        let mut inner = self.lock().await?;
        if on {
            inner.enter_unknown_mode(UnknownTrigger::Force);
        } else {
            for channel in self.capabilities.channels() {
                inner.leave_unknown_mode(channel);
            }
        }
        Ok(())
    }

    /// Sets the motion flag that lets unknown mode resolve itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Suspended`] while suspended.
    pub async fn set_motion(&self, motion: bool) -> Result<(), Error> {
        let mut inner = self.lock().await?;
        inner.state.motion = motion;
        tracing::debug!(motion, "Motion flag");
        Ok(())
    }

    // ========== Dock notifications ==========

    /// Reports a USB cable change.
    ///
    /// The IC is told about attach and detach, and unknown mode is entered.
    /// Repeated reports of the same attach state are ignored, as are all
    /// reports on tablets, while flashing and while faulted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the IC cannot be told.
    pub async fn on_usb_changed(&self, usb: UsbAttach) -> Result<(), Error> {
        if self.capabilities.tablet {
            return Ok(());
        }
        if self.is_flashing() {
            tracing::debug!("Flashing, USB change ignored");
            return Ok(());
        }
        let mut inner = self.lock().await?;
        if inner.state.is_faulted() {
            return Ok(());
        }
        if inner.state.last_usb.map(|last| last.attached) == Some(usb.attached) {
            tracing::debug!(attached = usb.attached, "USB state unchanged");
            return Ok(());
        }

        let value = if usb.attached {
            registers::CMD_OFF
        } else {
            registers::CMD_ON
        };
        inner.write(TSPTA, value).await?;

        if usb.host {
            inner.state.otg_host = true;
        } else if inner.state.otg_host {
            inner.state.otg_host = false;
        }
        tracing::info!(attached = usb.attached, host = usb.host, "USB changed");

        inner.enter_unknown_mode(UnknownTrigger::Usb);
        inner.state.last_usb = Some(usb);
        Ok(())
    }

    /// Reports a hall sensor change.
    ///
    /// On phones a closed cover soft-resets the IC, and any change enters
    /// unknown mode. On tablets only closing an accessory cover resets the
    /// IC. Ignored while flashing and while faulted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the reset command cannot be written.
    pub async fn on_hall_changed(&self, closed: bool, sensor: HallSensor) -> Result<(), Error> {
        if self.is_flashing() {
            tracing::debug!("Flashing, hall change ignored");
            return Ok(());
        }
        let mut inner = self.lock().await?;
        if inner.state.is_faulted() {
            return Ok(());
        }
        tracing::info!(closed, ?sensor, "Hall changed");

        if self.capabilities.tablet {
            if closed && sensor.is_accessory() {
                inner.sw_reset().await?;
            }
            return Ok(());
        }

        if closed {
            inner.sw_reset().await?;
        }
        inner.enter_unknown_mode(UnknownTrigger::Hall);
        Ok(())
    }

    /// Reports a pogo keyboard change; attaching soft-resets the IC.
    ///
    /// Ignored while flashing and while faulted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the reset command cannot be written.
    pub async fn on_pogo_changed(&self, attached: bool) -> Result<(), Error> {
        if self.is_flashing() {
            return Ok(());
        }
        let mut inner = self.lock().await?;
        if inner.state.is_faulted() || !attached {
            return Ok(());
        }
        tracing::info!("Pogo attached");
        inner.sw_reset().await?;
        Ok(())
    }
}

impl<T: Transport> Inner<T> {
    fn set_event_reporting(&mut self, mode: EventReporting) {
        match mode {
            EventReporting::Skip => {
                self.state.skip_events = true;
                self.state.motion = true;
                for channel in self.capabilities.channels() {
                    self.leave_unknown_mode(channel);
                    let ch = self.state.channel_mut(channel);
                    ch.first_working = false;
                    ch.pressed = false;
                    self.events.publish(GripEvent::Release {
                        channel,
                        unknown: false,
                    });
                }
                tracing::info!("Event reporting skipped");
            }
            EventReporting::Resume => {
                self.state.skip_events = false;
                tracing::info!("Event reporting resumed");
            }
        }
    }
}
