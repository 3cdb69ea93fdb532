// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register operations with bounded retry.

use crate::error::TransportError;
use crate::protocol::{Transport, timing};

/// Register-level access to the grip IC on top of a [`Transport`].
///
/// Each register operation is attempted up to `attempts` times with a
/// [`timing::RETRY_BACKOFF`] sleep between failures. When every attempt
/// fails the last error is wrapped in [`TransportError::RetriesExhausted`].
/// Raw `send`/`receive` transfers used by the bootloader are passed
/// through without retry.
///
/// This layer does not escalate failures; that is the job of
/// [`HealthMonitor`](crate::health::HealthMonitor).
#[derive(Debug)]
pub struct RegisterIo<T> {
    transport: T,
    attempts: u8,
}

impl<T: Transport> RegisterIo<T> {
    /// Creates a register interface making at most `attempts` tries per
    /// operation (at least one).
    #[must_use]
    pub fn new(transport: T, attempts: u8) -> Self {
        Self {
            transport,
            attempts: attempts.max(1),
        }
    }

    /// Returns the number of attempts per operation.
    #[must_use]
    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    /// Returns a reference to the underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns a mutable reference to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Reads `len` consecutive registers starting at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::RetriesExhausted`] if every attempt fails.
    pub async fn read(&mut self, addr: u8, len: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0; len];
        self.read_into(addr, &mut buf).await?;
        Ok(buf)
    }

    /// Reads consecutive registers starting at `addr` into `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::RetriesExhausted`] if every attempt fails.
    pub async fn read_into(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.read(addr, buf).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.attempts => {
                    tracing::debug!(addr, attempt, error = %e, "Register read failed, retrying");
                    tokio::time::sleep(timing::RETRY_BACKOFF).await;
                }
                Err(e) => return Err(self.exhausted(addr, attempt, e)),
            }
        }
    }

    /// Reads a single register.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::RetriesExhausted`] if every attempt fails.
    pub async fn read_u8(&mut self, addr: u8) -> Result<u8, TransportError> {
        let mut buf = [0; 1];
        self.read_into(addr, &mut buf).await?;
        Ok(buf[0])
    }

    /// Reads a big-endian 16-bit value from `addr` and `addr + 1`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::RetriesExhausted`] if every attempt fails.
    pub async fn read_u16(&mut self, addr: u8) -> Result<u16, TransportError> {
        let mut buf = [0; 2];
        self.read_into(addr, &mut buf).await?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Writes a single register.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::RetriesExhausted`] if every attempt fails.
    pub async fn write(&mut self, addr: u8, value: u8) -> Result<(), TransportError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.write(addr, value).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.attempts => {
                    tracing::debug!(addr, attempt, error = %e, "Register write failed, retrying");
                    tokio::time::sleep(timing::RETRY_BACKOFF).await;
                }
                Err(e) => return Err(self.exhausted(addr, attempt, e)),
            }
        }
    }

    /// Writes a big-endian 16-bit value as two byte writes: MSB at `addr`,
    /// LSB at `addr + 1`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::RetriesExhausted`] if either write fails.
    pub async fn write_u16(&mut self, addr: u8, value: u16) -> Result<(), TransportError> {
        let [msb, lsb] = value.to_be_bytes();
        self.write(addr, msb).await?;
        self.write(addr.wrapping_add(1), lsb).await
    }

    /// Sends raw bytes (single attempt).
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.transport.send(bytes).await
    }

    /// Receives raw bytes (single attempt).
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn receive(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        self.transport.receive(buf).await
    }

    fn exhausted(&self, addr: u8, attempts: u8, last: TransportError) -> TransportError {
        tracing::warn!(addr, attempts, error = %last, "Register transfer failed");
        TransportError::RetriesExhausted {
            addr,
            attempts,
            last: Box::new(last),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedGrip;

    #[tokio::test(start_paused = true)]
    async fn read_u16_is_big_endian() {
        let sim = SimulatedGrip::new();
        sim.set_register(0x28, 0x01);
        sim.set_register(0x29, 0x23);
        let mut io = RegisterIo::new(sim, 1);

        assert_eq!(io.read_u16(0x28).await.unwrap(), 0x0123);
    }

    #[tokio::test(start_paused = true)]
    async fn write_u16_writes_msb_first() {
        let sim = SimulatedGrip::new();
        let mut io = RegisterIo::new(sim.clone(), 1);

        io.write_u16(0x2C, 0xBEEF).await.unwrap();

        assert_eq!(sim.register(0x2C), 0xBE);
        assert_eq!(sim.register(0x2D), 0xEF);
        assert_eq!(sim.writes(), vec![(0x2C, 0xBE), (0x2D, 0xEF)]);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let sim = SimulatedGrip::new();
        sim.set_register(0x01, 0x12);
        sim.fail_next_transfers(2);
        let mut io = RegisterIo::new(sim.clone(), 3);

        assert_eq!(io.read_u8(0x01).await.unwrap(), 0x12);
        assert_eq!(sim.pending_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_attempts() {
        let sim = SimulatedGrip::new();
        sim.fail_next_transfers(5);
        let mut io = RegisterIo::new(sim.clone(), 2);

        let err = io.write(0x24, 0x20).await.unwrap_err();

        assert_eq!(err.attempts(), 2);
        assert!(matches!(
            err,
            TransportError::RetriesExhausted { addr: 0x24, .. }
        ));
        assert_eq!(sim.pending_failures(), 3);
    }

    #[test]
    fn attempts_are_at_least_one() {
        let io = RegisterIo::new(SimulatedGrip::new(), 0);
        assert_eq!(io.attempts(), 1);
    }
}
