// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Controller configuration.
//!
//! [`GripConfig`] carries the board-specific numbers of one grip IC: retry
//! bounds, the bootloader acknowledgement, fail-safe policy, firmware path
//! and the optional low-temperature and tuning-map settings. It can be
//! built in code or loaded from JSON; every field has a default, so a JSON
//! document only needs the fields that differ.
//!
//! # Examples
//!
//! ```
//! use grip_ctl::config::GripConfig;
//!
//! let config = GripConfig::from_json(r#"{
//!     "flash_retries": 1,
//!     "fail_safe": 1,
//!     "low_temp": { "press_threshold": 600, "enter_at": -120 }
//! }"#).unwrap();
//!
//! assert_eq!(config.flash_retries, 1);
//! assert_eq!(config.transport_retries, 1);
//! assert_eq!(config.low_temp.unwrap().release_at, -50);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{Checksum, FailSafePolicy, Threshold};

/// Board-specific configuration of a grip IC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GripConfig {
    /// Attempts per register transfer.
    pub transport_retries: u8,
    /// Attempts at reading the status register in the interrupt handler.
    pub status_read_attempts: u8,
    /// Additional whole-sequence flash attempts after a verification
    /// mismatch.
    pub flash_retries: u8,
    /// Power cycles tried to enter boot mode.
    pub boot_entry_attempts: u8,
    /// Busy polls after each flashed block.
    pub busy_poll_limit: u32,
    /// Byte the bootloader answers the entry command with.
    pub bootloader_ack: u8,
    /// Fail-safe behaviour on fault.
    pub fail_safe: FailSafePolicy,
    /// Channels (bit 0 primary, bit 1 secondary) that follow the
    /// notification enable and unknown mode.
    pub unknown_channel_selection: u8,
    /// Path of the built-in firmware, relative to the firmware source.
    pub firmware_path: String,
    /// Diagnostic ticks between diff log lines.
    pub log_period_ticks: u32,
    /// Low-temperature threshold compensation, if the board uses it.
    pub low_temp: Option<LowTempCompensation>,
    /// Tuning map applied by
    /// [`DeviceController::apply_tuning_map`](crate::controller::DeviceController::apply_tuning_map).
    pub tuning: Option<TuningMap>,
}

impl Default for GripConfig {
    fn default() -> Self {
        Self {
            transport_retries: 1,
            status_read_attempts: 3,
            flash_retries: 2,
            boot_entry_attempts: 3,
            busy_poll_limit: 1000,
            bootloader_ack: 0x00,
            fail_safe: FailSafePolicy::default(),
            unknown_channel_selection: 0b11,
            firmware_path: Self::DEFAULT_FIRMWARE_PATH.to_string(),
            log_period_ticks: 15,
            low_temp: None,
            tuning: None,
        }
    }
}

impl GripConfig {
    /// Default location of the built-in firmware.
    pub const DEFAULT_FIRMWARE_PATH: &'static str = "abov/a96t396.bin";

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed JSON and
    /// [`ConfigError::InvalidValue`] for values that cannot work.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration can drive a device.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &str, message: &str) -> ConfigError {
            ConfigError::InvalidValue {
                field: field.to_string(),
                message: message.to_string(),
            }
        }

        if self.transport_retries == 0 {
            return Err(invalid("transport_retries", "must be at least 1"));
        }
        if self.status_read_attempts == 0 {
            return Err(invalid("status_read_attempts", "must be at least 1"));
        }
        if self.boot_entry_attempts == 0 {
            return Err(invalid("boot_entry_attempts", "must be at least 1"));
        }
        if self.log_period_ticks == 0 {
            return Err(invalid("log_period_ticks", "must be at least 1"));
        }
        if self.unknown_channel_selection > 0b11 {
            return Err(invalid("unknown_channel_selection", "only bits 0 and 1 are valid"));
        }
        if let Some(low_temp) = &self.low_temp
            && low_temp.release_at < low_temp.enter_at
        {
            return Err(invalid("low_temp.release_at", "must not be below enter_at"));
        }
        Ok(())
    }

    /// Returns `true` if the channel with `index` follows unknown mode.
    #[must_use]
    pub fn selects_channel(&self, index: usize) -> bool {
        self.unknown_channel_selection & (1 << index) != 0
    }

    /// Sets the attempts per register transfer.
    #[must_use]
    pub fn with_transport_retries(mut self, attempts: u8) -> Self {
        self.transport_retries = attempts;
        self
    }

    /// Sets the additional flash attempts.
    #[must_use]
    pub fn with_flash_retries(mut self, retries: u8) -> Self {
        self.flash_retries = retries;
        self
    }

    /// Sets the expected bootloader acknowledgement byte.
    #[must_use]
    pub fn with_bootloader_ack(mut self, ack: u8) -> Self {
        self.bootloader_ack = ack;
        self
    }

    /// Sets the fail-safe policy.
    #[must_use]
    pub fn with_fail_safe(mut self, policy: FailSafePolicy) -> Self {
        self.fail_safe = policy;
        self
    }

    /// Sets the channels that follow unknown mode.
    #[must_use]
    pub fn with_unknown_channel_selection(mut self, bits: u8) -> Self {
        self.unknown_channel_selection = bits;
        self
    }

    /// Sets the built-in firmware path.
    #[must_use]
    pub fn with_firmware_path(mut self, path: impl Into<String>) -> Self {
        self.firmware_path = path.into();
        self
    }

    /// Sets the diagnostic ticks between diff log lines.
    #[must_use]
    pub fn with_log_period_ticks(mut self, ticks: u32) -> Self {
        self.log_period_ticks = ticks;
        self
    }

    /// Enables low-temperature compensation.
    #[must_use]
    pub fn with_low_temp(mut self, low_temp: LowTempCompensation) -> Self {
        self.low_temp = Some(low_temp);
        self
    }

    /// Sets the tuning map.
    #[must_use]
    pub fn with_tuning(mut self, tuning: TuningMap) -> Self {
        self.tuning = Some(tuning);
        self
    }
}

/// Press thresholds used while the battery is cold.
///
/// Temperatures are in tenths of a degree Celsius. Compensation starts at
/// or below `enter_at` and ends at or above `release_at`, when the
/// thresholds read at attach are restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LowTempCompensation {
    /// Press threshold of the primary channel while cold.
    pub press_threshold: Threshold,
    /// Press threshold of the secondary channel while cold.
    pub press_threshold_2ch: Threshold,
    /// Temperature at or below which compensation starts.
    pub enter_at: i32,
    /// Temperature at or above which compensation ends.
    pub release_at: i32,
}

impl Default for LowTempCompensation {
    fn default() -> Self {
        Self {
            press_threshold: Threshold::new(500),
            press_threshold_2ch: Threshold::new(500),
            enter_at: -100,
            release_at: -50,
        }
    }
}

/// Register values written in tuning-map mode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TuningMap {
    /// `(register, value)` pairs in write order.
    pub registers: Vec<(u8, u8)>,
    /// Checksum the IC reports once the map is written.
    pub checksum: Checksum,
}
