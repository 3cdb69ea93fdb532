// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broadcast channel carrying [`GripEvent`]s.

use tokio::sync::broadcast;

use super::GripEvent;

/// Events buffered per listener before the oldest are dropped.
const EVENT_BACKLOG: usize = 256;

/// Fan-out of grip events to any number of listeners.
///
/// Clones publish into the same channel, so the controller and a host can
/// share one bus. A listener that falls more than 256 events behind
/// receives `RecvError::Lagged` and skips the oldest ones; the controller
/// never waits for listeners.
///
/// # Examples
///
/// ```
/// use grip_ctl::event::{EventBus, GripEvent};
/// use grip_ctl::types::UnknownTrigger;
///
/// let bus = EventBus::new();
/// let mut input = bus.subscribe();
/// let mut backoff = bus.clone().subscribe();
///
/// bus.publish(GripEvent::UnknownTrigger(UnknownTrigger::Usb));
///
/// assert_eq!(input.try_recv().unwrap(), backoff.try_recv().unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GripEvent>,
}

impl EventBus {
    /// Creates a bus with no listeners.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BACKLOG);
        Self { sender }
    }

    /// Registers a listener for events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GripEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Sends `event` to every listener.
    ///
    /// Events published while nobody listens are dropped.
    pub fn publish(&self, event: GripEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No event listeners");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Channel, FaultBits, FaultReason};

    #[test]
    fn unheard_events_are_dropped() {
        let bus = EventBus::new();
        bus.publish(GripEvent::RegisterRecoveryRequested);

        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn listeners_come_and_go() {
        let bus = EventBus::new();
        let first = bus.subscribe();
        let _second = bus.clone().subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(first);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn events_arrive_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let fault = GripEvent::Fault {
            reason: FaultReason::IrqMismatch,
            bits: FaultBits::empty(),
        };

        bus.publish(GripEvent::Abnormal {
            channel: Channel::Secondary,
        });
        bus.publish(fault.clone());

        assert_eq!(
            rx.recv().await.unwrap(),
            GripEvent::Abnormal {
                channel: Channel::Secondary
            }
        );
        assert_eq!(rx.recv().await.unwrap(), fault);
    }
}
