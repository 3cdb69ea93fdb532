// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Firmware image parsing.

use crate::error::FirmwareError;
use crate::protocol::registers::{BLOCK_SIZE, USER_CODE_ADDRESS};
use crate::types::{Checksum, FirmwareVersion};

/// One 32-byte flash block.
pub type Block = [u8; BLOCK_SIZE];

const HEADER_MODEL: usize = 1;
const HEADER_VERSION: usize = 5;
const HEADER_CHECKSUM_MSB: usize = 8;
const HEADER_CHECKSUM_LSB: usize = 9;

/// A parsed firmware image.
///
/// The binary format is a sequence of 32-byte blocks. Block 0 is a header
/// carrying the model byte (offset 1), the firmware version (offset 5) and
/// the flash checksum (offsets 8 and 9). The remaining blocks are written
/// to flash starting at [`USER_CODE_ADDRESS`].
///
/// # Examples
///
/// ```
/// use grip_ctl::firmware::FirmwareImage;
///
/// let mut bytes = vec![0u8; 64];
/// bytes[1] = 0xAC;
/// bytes[5] = 0x12;
/// bytes[8] = 0x00;
/// bytes[9] = 0x20;
/// bytes[32..].fill(0x01);
///
/// let image = FirmwareImage::from_bytes(&bytes).unwrap();
/// assert_eq!(image.version().to_string(), "0xac12");
/// assert_eq!(image.block_count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    version: FirmwareVersion,
    checksum: Checksum,
    blocks: Vec<Block>,
}

impl FirmwareImage {
    /// Parses a raw firmware binary.
    ///
    /// # Errors
    ///
    /// Returns [`FirmwareError::Misaligned`] if the length is not a multiple
    /// of 32 and [`FirmwareError::TooShort`] if there is no payload block.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FirmwareError> {
        if bytes.len() % BLOCK_SIZE != 0 {
            return Err(FirmwareError::Misaligned(bytes.len()));
        }
        if bytes.len() < 2 * BLOCK_SIZE {
            return Err(FirmwareError::TooShort(bytes.len()));
        }

        let header = &bytes[..BLOCK_SIZE];
        let version = FirmwareVersion::new(header[HEADER_MODEL], header[HEADER_VERSION]);
        let checksum = Checksum::new(header[HEADER_CHECKSUM_MSB], header[HEADER_CHECKSUM_LSB]);

        let blocks = bytes[BLOCK_SIZE..]
            .chunks_exact(BLOCK_SIZE)
            .map(|chunk| {
                let mut block = [0; BLOCK_SIZE];
                block.copy_from_slice(chunk);
                block
            })
            .collect();

        tracing::debug!(%version, %checksum, size = bytes.len(), "Parsed firmware image");

        Ok(Self {
            version,
            checksum,
            blocks,
        })
    }

    /// Builds an image from already-separated parts.
    ///
    /// # Errors
    ///
    /// Returns [`FirmwareError::TooShort`] if `blocks` is empty.
    pub fn from_parts(
        version: FirmwareVersion,
        checksum: Checksum,
        blocks: Vec<Block>,
    ) -> Result<Self, FirmwareError> {
        if blocks.is_empty() {
            return Err(FirmwareError::TooShort(BLOCK_SIZE));
        }
        Ok(Self {
            version,
            checksum,
            blocks,
        })
    }

    /// Returns the model and firmware version declared by the header.
    #[must_use]
    pub fn version(&self) -> FirmwareVersion {
        self.version
    }

    /// Returns the flash checksum declared by the header.
    #[must_use]
    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    /// Returns the payload blocks in flash order.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Returns the number of payload blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Serializes the image back into the raw binary layout.
    ///
    /// Header bytes other than model, version and checksum are zero.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut header = [0; BLOCK_SIZE];
        header[HEADER_MODEL] = self.version.model;
        header[HEADER_VERSION] = self.version.firmware;
        header[HEADER_CHECKSUM_MSB] = self.checksum.msb;
        header[HEADER_CHECKSUM_LSB] = self.checksum.lsb;

        let mut bytes = Vec::with_capacity((self.blocks.len() + 1) * BLOCK_SIZE);
        bytes.extend_from_slice(&header);
        for block in &self.blocks {
            bytes.extend_from_slice(block);
        }
        bytes
    }

    /// Returns the payload blocks paired with their flash addresses.
    pub fn addressed_blocks(&self) -> impl Iterator<Item = (u16, &Block)> {
        (0u16..)
            .map(|i| USER_CODE_ADDRESS.wrapping_add(i.wrapping_mul(0x20)))
            .zip(self.blocks.iter())
    }
}
