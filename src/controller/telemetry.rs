// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Readings, thresholds, register access and factory diagnostics.

use crate::controller::DeviceController;
use crate::error::Error;
use crate::protocol::Transport;
use crate::protocol::registers::{self, GAIN_INT_OFFSET};
use crate::state::Thresholds;
use crate::types::{Channel, Threshold};

/// Gain settings of a channel and of the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Gain {
    /// Channel gain.
    pub channel: u8,
    /// Channel integration gain.
    pub channel_int: u8,
    /// Reference gain.
    pub reference: u8,
    /// Reference integration gain.
    pub reference_int: u8,
}

/// Factory interrupt statistics of one channel.
///
/// # Examples
///
/// ```
/// use grip_ctl::controller::IrqCountReport;
///
/// let report = IrqCountReport { result: -1, count: 3, max_diff: 812 };
/// assert!(report.counted());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct IrqCountReport {
    /// `-1` if at least one press interrupt was counted, `0` otherwise.
    pub result: i8,
    /// Number of press interrupts counted.
    pub count: u32,
    /// Largest diff on a counted interrupt, or the largest polled diff if
    /// none was counted.
    pub max_diff: u16,
}

impl IrqCountReport {
    /// Returns `true` if any press interrupt was counted.
    #[must_use]
    pub fn counted(&self) -> bool {
        self.result != 0
    }
}

impl<T: Transport> DeviceController<T> {
    // ========== Thresholds ==========

    /// Reads the press, release and noise thresholds of `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelUnavailable`] for a missing channel and
    /// [`Error::Transport`] if a read fails.
    pub async fn thresholds(&self, channel: Channel) -> Result<Thresholds, Error> {
        self.check_channel(channel)?;
        let mut inner = self.lock().await?;
        let offset = channel.register_offset();

        let thresholds = Thresholds {
            press: Threshold::new(inner.read_u16(registers::PRESS_THRESHOLD + offset).await?),
            release: Threshold::new(inner.read_u16(registers::RELEASE_THRESHOLD + offset).await?),
            noise: Threshold::new(inner.read_u16(registers::NOISE_THRESHOLD + offset).await?),
        };
        inner.state.channel_mut(channel).thresholds = thresholds;
        Ok(thresholds)
    }

    /// Writes the press threshold of `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Faulted`] while faulted, [`Error::ChannelUnavailable`]
    /// for a missing channel and [`Error::Transport`] if the write fails.
    pub async fn set_press_threshold(&self, channel: Channel, threshold: Threshold) -> Result<(), Error> {
        self.write_threshold(channel, registers::PRESS_THRESHOLD, threshold, |t| &mut t.press)
            .await
    }

    /// Writes the release threshold of `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Faulted`] while faulted, [`Error::ChannelUnavailable`]
    /// for a missing channel and [`Error::Transport`] if the write fails.
    pub async fn set_release_threshold(&self, channel: Channel, threshold: Threshold) -> Result<(), Error> {
        self.write_threshold(channel, registers::RELEASE_THRESHOLD, threshold, |t| &mut t.release)
            .await
    }

    async fn write_threshold(
        &self,
        channel: Channel,
        base: u8,
        threshold: Threshold,
        slot: fn(&mut Thresholds) -> &mut Threshold,
    ) -> Result<(), Error> {
        self.check_channel(channel)?;
        let mut inner = self.lock().await?;
        if inner.state.is_faulted() {
            return Err(Error::Faulted);
        }
        inner
            .write_u16(base + channel.register_offset(), threshold.value())
            .await?;
        *slot(&mut inner.state.channel_mut(channel).thresholds) = threshold;
        tracing::info!(%channel, base, %threshold, "Threshold written");
        Ok(())
    }

    // ========== Readings ==========

    /// Reads the primary and secondary diff of `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelUnavailable`] for a missing channel and
    /// [`Error::Transport`] if the read fails.
    pub async fn diff(&self, channel: Channel) -> Result<(u16, u16), Error> {
        self.check_channel(channel)?;
        let mut inner = self.lock().await?;
        Ok(inner.refresh_diff(channel).await?)
    }

    /// Reads the baseline of `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelUnavailable`] for a missing channel and
    /// [`Error::Transport`] if the read fails.
    pub async fn baseline(&self, channel: Channel) -> Result<u16, Error> {
        self.check_channel(channel)?;
        let mut inner = self.lock().await?;
        let baseline = inner
            .read_u16(registers::BASELINE + channel.register_offset())
            .await?;
        inner.state.channel_mut(channel).baseline = baseline;
        Ok(baseline)
    }

    /// Reads the raw count of `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelUnavailable`] for a missing channel and
    /// [`Error::Transport`] if the read fails.
    pub async fn raw(&self, channel: Channel) -> Result<u16, Error> {
        self.check_channel(channel)?;
        let mut inner = self.lock().await?;
        let raw = inner
            .read_u16(registers::RAW + channel.register_offset())
            .await?;
        inner.state.channel_mut(channel).raw = raw;
        Ok(raw)
    }

    /// Reads the total capacitance of `channel`, scaled down by 100.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelUnavailable`] for a missing channel and
    /// [`Error::Transport`] if the read fails.
    pub async fn total_cap(&self, channel: Channel) -> Result<u16, Error> {
        self.check_channel(channel)?;
        let mut inner = self.lock().await?;
        Ok(inner.refresh_total_cap(channel).await? / 100)
    }

    /// Reads the reference capacitance, scaled down by 100.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the read fails.
    pub async fn ref_cap(&self) -> Result<u16, Error> {
        let mut inner = self.lock().await?;
        Ok(inner.read_u16(registers::REF_CAP).await? / 100)
    }

    /// Reads the gain settings of `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelUnavailable`] for a missing channel and
    /// [`Error::Transport`] if a read fails.
    pub async fn gain(&self, channel: Channel) -> Result<Gain, Error> {
        self.check_channel(channel)?;
        let mut inner = self.lock().await?;
        let base = match channel {
            Channel::Primary => registers::GAIN,
            Channel::Secondary => registers::GAIN_2CH,
        };
        Ok(Gain {
            channel: inner.read_u8(base).await?,
            channel_int: inner.read_u8(base + GAIN_INT_OFFSET).await?,
            reference: inner.read_u8(registers::REF_GAIN).await?,
            reference_int: inner.read_u8(registers::REF_GAIN + GAIN_INT_OFFSET).await?,
        })
    }

    /// Returns how many times interrupt delivery was enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Suspended`] while suspended.
    pub async fn irq_enable_count(&self) -> Result<u32, Error> {
        Ok(self.lock().await?.state.irq_enable_count)
    }

    /// Returns the interrupt line level, if the line can report it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Suspended`] while suspended.
    pub async fn irq_level(&self) -> Result<Option<bool>, Error> {
        Ok(self.lock().await?.irq.level())
    }

    // ========== Register access ==========

    /// Reads up to six consecutive registers starting at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the read fails.
    pub async fn read_registers(&self, addr: u8, count: usize) -> Result<Vec<u8>, Error> {
        let count = count.min(registers::MAX_DEBUG_READ);
        let mut inner = self.lock().await?;
        let values = inner.read(addr, count).await?;
        tracing::debug!(addr, ?values, "Registers read");
        Ok(values)
    }

    /// Writes a single register.
    ///
    /// Reads stay available while faulted; writes do not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Faulted`] while faulted and [`Error::Transport`] if
    /// the write fails.
    pub async fn write_register(&self, addr: u8, value: u8) -> Result<(), Error> {
        let mut inner = self.lock().await?;
        if inner.state.is_faulted() {
            return Err(Error::Faulted);
        }
        inner.write(addr, value).await?;
        tracing::info!(addr, value, "Register written");
        Ok(())
    }

    /// Writes consecutive registers starting at `start` in one transfer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Faulted`] while faulted and [`Error::Transport`] if
    /// the transfer fails.
    pub async fn write_registers(&self, start: u8, values: &[u8]) -> Result<(), Error> {
        let mut frame = Vec::with_capacity(values.len() + 1);
        frame.push(start);
        frame.extend_from_slice(values);

        let mut inner = self.lock().await?;
        if inner.state.is_faulted() {
            return Err(Error::Faulted);
        }
        inner.send(&frame).await?;
        tracing::info!(start, count = values.len(), "Registers written");
        Ok(())
    }

    /// Reads the whole register map.
    ///
    /// After a tuning map was applied only the first 0x80 registers are
    /// read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the read fails.
    pub async fn dump_registers(&self) -> Result<Vec<u8>, Error> {
        let mut inner = self.lock().await?;
        let len = if inner.state.tuning_mode {
            registers::DUMP_LEN_TUNING
        } else {
            registers::DUMP_LEN
        };
        Ok(inner.read(0x00, usize::from(len)).await?)
    }

    /// Restores the enable register after the shared regulator glitched.
    ///
    /// If sensing is on but the IC reports it off, the enable command is
    /// written again and the next interrupt reports every channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Faulted`] while faulted and [`Error::Transport`] if
    /// a transfer fails.
    pub async fn recover_registers(&self) -> Result<(), Error> {
        let mut inner = self.lock().await?;
        if inner.state.is_faulted() {
            return Err(Error::Faulted);
        }
        let value = inner.read_u8(registers::SAR_ENABLE).await?;
        if inner.state.enabled && value == registers::CMD_OFF {
            tracing::info!("Enable register lost, restoring");
            inner.write(registers::SAR_ENABLE, registers::CMD_ON).await?;
            inner.state.first_event_pending = true;
        }
        Ok(())
    }

    // ========== Factory diagnostics ==========

    /// Starts or stops counting press interrupts.
    ///
    /// Starting resets the counters of every channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCapability`] without factory diagnostics
    /// and [`Error::Faulted`] while faulted.
    pub async fn set_irq_counting(&self, on: bool) -> Result<(), Error> {
        if !self.capabilities.factory_diagnostics {
            return Err(Error::UnsupportedCapability {
                capability: "factory diagnostics".to_string(),
            });
        }
        let mut inner = self.lock().await?;
        if inner.state.is_faulted() {
            return Err(Error::Faulted);
        }
        if on {
            for channel in self.capabilities.channels() {
                inner.state.channel_mut(channel).reset_irq_counters();
            }
        }
        inner.state.irq_counting = on;
        tracing::info!(on, "Interrupt counting");
        Ok(())
    }

    /// Returns the factory interrupt statistics of `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelUnavailable`] for a missing channel.
    pub async fn irq_count_report(&self, channel: Channel) -> Result<IrqCountReport, Error> {
        self.check_channel(channel)?;
        let inner = self.lock().await?;
        let ch = inner.state.channel(channel);
        Ok(if ch.irq_count > 0 {
            IrqCountReport {
                result: -1,
                count: ch.irq_count,
                max_diff: ch.max_diff,
            }
        } else {
            IrqCountReport {
                result: 0,
                count: 0,
                max_diff: ch.max_normal_diff,
            }
        })
    }
}
