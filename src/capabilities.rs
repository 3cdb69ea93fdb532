// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Optional sub-components of a grip device.
//!
//! Board variants differ in channel count and in which extra behaviours
//! they carry. Instead of compiling variants separately, the controller is
//! given a [`Capabilities`] value and enables the matching code paths.

use crate::types::Channel;

/// Optional features of a grip device.
///
/// # Examples
///
/// ```
/// use grip_ctl::Capabilities;
///
/// // Default: one channel, no extras
/// let basic = Capabilities::default();
/// assert!(!basic.dual_channel);
///
/// // Two channels with factory counters
/// let factory = Capabilities::builder()
///     .dual_channel()
///     .factory_diagnostics()
///     .build();
/// assert_eq!(factory.channel_count(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
// Each boolean represents an independent board feature that cannot be
// meaningfully combined into an enum or state machine.
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    /// A second sensing channel is wired.
    pub dual_channel: bool,

    /// Factory interrupt counting and max-diff tracking are available.
    pub factory_diagnostics: bool,

    /// The IC shares its regulator; registers may need recovery after the
    /// supply glitches.
    pub ldo_share: bool,

    /// Tablet dock semantics: USB changes are ignored, only accessory
    /// covers reset the IC, and pogo attach resets it.
    pub tablet: bool,
}

impl Capabilities {
    /// Creates capabilities for a basic single-channel phone part.
    #[must_use]
    pub const fn single_channel() -> Self {
        Self {
            dual_channel: false,
            factory_diagnostics: false,
            ldo_share: false,
            tablet: false,
        }
    }

    /// Creates capabilities for a dual-channel phone part.
    #[must_use]
    pub const fn dual_channel() -> Self {
        Self {
            dual_channel: true,
            factory_diagnostics: false,
            ldo_share: false,
            tablet: false,
        }
    }

    /// Creates capabilities for a tablet part.
    #[must_use]
    pub const fn tablet() -> Self {
        Self {
            dual_channel: false,
            factory_diagnostics: false,
            ldo_share: false,
            tablet: true,
        }
    }

    /// Creates a builder starting from single-channel capabilities.
    #[must_use]
    pub fn builder() -> CapabilitiesBuilder {
        CapabilitiesBuilder::new()
    }

    /// Returns the number of sensing channels.
    #[must_use]
    pub const fn channel_count(&self) -> usize {
        if self.dual_channel { 2 } else { 1 }
    }

    /// Returns the channels present on this device.
    pub fn channels(&self) -> impl Iterator<Item = Channel> + use<> {
        Channel::ALL.into_iter().take(self.channel_count())
    }

    /// Returns `true` if `channel` is present on this device.
    #[must_use]
    pub const fn has_channel(&self, channel: Channel) -> bool {
        channel.index() < self.channel_count()
    }
}

/// Builder for creating custom capabilities.
#[derive(Debug, Default)]
pub struct CapabilitiesBuilder {
    capabilities: Capabilities,
}

impl CapabilitiesBuilder {
    /// Creates a new builder with single-channel capabilities.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the second sensing channel.
    #[must_use]
    pub fn dual_channel(mut self) -> Self {
        self.capabilities.dual_channel = true;
        self
    }

    /// Enables factory diagnostics.
    #[must_use]
    pub fn factory_diagnostics(mut self) -> Self {
        self.capabilities.factory_diagnostics = true;
        self
    }

    /// Enables register recovery for shared regulators.
    #[must_use]
    pub fn ldo_share(mut self) -> Self {
        self.capabilities.ldo_share = true;
        self
    }

    /// Enables tablet dock semantics.
    #[must_use]
    pub fn tablet(mut self) -> Self {
        self.capabilities.tablet = true;
        self
    }

    /// Builds the capabilities.
    #[must_use]
    pub fn build(self) -> Capabilities {
        self.capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_single_channel() {
        assert_eq!(Capabilities::default(), Capabilities::single_channel());
        assert_eq!(Capabilities::default().channel_count(), 1);
    }

    #[test]
    fn channels_follow_count() {
        let single: Vec<_> = Capabilities::single_channel().channels().collect();
        assert_eq!(single, vec![Channel::Primary]);

        let dual: Vec<_> = Capabilities::dual_channel().channels().collect();
        assert_eq!(dual, vec![Channel::Primary, Channel::Secondary]);
    }

    #[test]
    fn has_channel() {
        assert!(Capabilities::single_channel().has_channel(Channel::Primary));
        assert!(!Capabilities::single_channel().has_channel(Channel::Secondary));
        assert!(Capabilities::dual_channel().has_channel(Channel::Secondary));
    }

    #[test]
    fn builder_combines_features() {
        let caps = Capabilities::builder()
            .dual_channel()
            .ldo_share()
            .tablet()
            .build();

        assert!(caps.dual_channel);
        assert!(caps.ldo_share);
        assert!(caps.tablet);
        assert!(!caps.factory_diagnostics);
    }
}
