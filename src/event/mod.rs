// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Grip notifications.
//!
//! The controller reports presses, unknown-mode transitions and faults as
//! [`GripEvent`]s on an [`EventBus`]. The bus uses tokio's broadcast
//! channel, so any number of listeners (input layer, SAR backoff, logging)
//! can subscribe.
//!
//! # Examples
//!
//! ```
//! use grip_ctl::event::{EventBus, GripEvent};
//! use grip_ctl::types::Channel;
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.publish(GripEvent::Press { channel: Channel::Primary, unknown: false });
//! assert!(rx.try_recv().unwrap().is_grip());
//! ```

mod event_bus;
mod grip_event;

pub use event_bus::EventBus;
pub use grip_event::GripEvent;
