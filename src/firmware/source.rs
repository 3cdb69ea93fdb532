// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Where firmware images come from.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::FirmwareError;

/// Which image an update should flash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareOrigin {
    /// The built-in image at the configured firmware path.
    BuiltIn,
    /// An image supplied by the caller.
    External(Vec<u8>),
}

/// Loads raw firmware binaries by name.
pub trait FirmwareSource {
    /// Returns the raw binary stored under `path`.
    ///
    /// # Errors
    ///
    /// Returns `FirmwareError` if the image cannot be read.
    fn load(&self, path: &str) -> Result<Vec<u8>, FirmwareError>;
}

/// Reads firmware binaries from a directory.
///
/// # Examples
///
/// ```no_run
/// use grip_ctl::firmware::{FirmwareSource, FsFirmwareSource};
///
/// let source = FsFirmwareSource::new("/lib/firmware");
/// let bytes = source.load("abov/a96t396.bin").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FsFirmwareSource {
    root: PathBuf,
}

impl FsFirmwareSource {
    /// Creates a source rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FirmwareSource for FsFirmwareSource {
    fn load(&self, path: &str) -> Result<Vec<u8>, FirmwareError> {
        let full = self.root.join(path);
        tracing::debug!(path = %full.display(), "Loading firmware");
        std::fs::read(&full).map_err(|source| FirmwareError::Io {
            path: full.display().to_string(),
            source,
        })
    }
}

/// Serves firmware binaries from memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryFirmwareSource {
    images: HashMap<String, Vec<u8>>,
}

impl MemoryFirmwareSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an image under `path`.
    #[must_use]
    pub fn with_image(mut self, path: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.images.insert(path.into(), bytes);
        self
    }
}

impl FirmwareSource for MemoryFirmwareSource {
    fn load(&self, path: &str) -> Result<Vec<u8>, FirmwareError> {
        self.images
            .get(path)
            .cloned()
            .ok_or(FirmwareError::Unavailable)
    }
}

/// A source with no images, used when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFirmware;

impl FirmwareSource for NoFirmware {
    fn load(&self, _path: &str) -> Result<Vec<u8>, FirmwareError> {
        Err(FirmwareError::Unavailable)
    }
}
