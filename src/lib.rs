// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `grip_ctl` - A host-testable controller for capacitive grip-sensor ICs.
//!
//! This library drives a grip (SAR proximity) sensor over a register bus:
//! it turns sensing on and off, turns interrupts into press and release
//! events, watches the device health and flashes new firmware through the
//! IC's bootloader.
//!
//! # Supported Features
//!
//! - **Register protocol**: retried register and bootloader transfers
//! - **Event reporting**: press, release and unknown-mode notifications
//! - **Health monitoring**: transfer failures and interrupt consistency
//!   checks with a configurable fail-safe policy
//! - **Firmware updates**: version checks, erase, block writes and
//!   checksum verification with retries
//! - **Diagnostics**: readings, thresholds, register dumps and factory
//!   interrupt counters
//!
//! # Quick Start
//!
//! The host supplies a [`Transport`](protocol::Transport) for the bus and,
//! optionally, a power supply, interrupt line and thermometer. Tests and
//! demos use [`SimulatedGrip`](sim::SimulatedGrip):
//!
//! ```
//! use grip_ctl::{Capabilities, DeviceController, GripConfig};
//! use grip_ctl::sim::SimulatedGrip;
//! use grip_ctl::types::{Channel, Threshold};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> grip_ctl::Result<()> {
//! let sim = SimulatedGrip::new();
//! let controller = DeviceController::builder(sim.clone())
//!     .with_power(sim.clone())
//!     .with_capabilities(Capabilities::dual_channel())
//!     .with_config(GripConfig::default().with_flash_retries(1))
//!     .build()?;
//!
//! controller.attach().await?;
//! controller.set_enabled(true).await?;
//! controller.set_press_threshold(Channel::Secondary, Threshold::new(500)).await?;
//!
//! let thresholds = controller.thresholds(Channel::Secondary).await?;
//! assert_eq!(thresholds.press.value(), 500);
//! # Ok(())
//! # }
//! ```
//!
//! ## Listening for Events
//!
//! ```
//! use grip_ctl::{DeviceController, GripEvent};
//! use grip_ctl::sim::SimulatedGrip;
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
//! controller.handle_interrupt().await?;
//!
//! // The first interrupt after enabling reports every channel
//! assert!(matches!(events.recv().await, Ok(GripEvent::Release { .. })));
//! # Ok(())
//! # }
//! ```

mod capabilities;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod firmware;
pub mod hal;
pub mod health;
pub mod protocol;
pub mod sim;
pub mod state;
pub mod types;

pub use capabilities::{Capabilities, CapabilitiesBuilder};
pub use config::GripConfig;
pub use controller::{DeviceController, DeviceControllerBuilder, RunState};
pub use error::{
    ConfigError, Error, FirmwareError, FlashError, ProtocolError, Result, TransportError,
    ValueError,
};
pub use event::{EventBus, GripEvent};
pub use firmware::{FirmwareImage, FirmwareOrigin};
pub use state::DeviceState;
pub use types::{Channel, FaultReason, FirmwareVersion, Threshold, UpdateStatus};
