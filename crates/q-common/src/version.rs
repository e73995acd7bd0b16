// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Firmware version handling
//!
//! Versions are compared lexicographically (major, minor, patch, build)
//! and feed the anti-rollback policy: an update is only an upgrade if it
//! compares strictly greater than the running version.

use core::cmp::Ordering;
use core::fmt;

/// Semantic firmware version with build number
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Version {
    /// Major version (breaking changes)
    pub major: u16,
    /// Minor version (new features)
    pub minor: u16,
    /// Patch version (bug fixes)
    pub patch: u16,
    /// Build number (always incrementing)
    pub build: u32,
}

impl Version {
    /// Serialized size in bytes
    pub const SIZE: usize = 10;

    /// Version 0.0.0.0
    pub const ZERO: Self = Self::new(0, 0, 0, 0);

    /// Create a new version
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16, build: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            build,
        }
    }

    /// Parse from bytes (10 bytes: major(2) + minor(2) + patch(2) + build(4), little-endian)
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            major: u16::from_le_bytes([bytes[0], bytes[1]]),
            minor: u16::from_le_bytes([bytes[2], bytes[3]]),
            patch: u16::from_le_bytes([bytes[4], bytes[5]]),
            build: u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
        })
    }

    /// Serialize to bytes
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..2].copy_from_slice(&self.major.to_le_bytes());
        bytes[2..4].copy_from_slice(&self.minor.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.patch.to_le_bytes());
        bytes[6..10].copy_from_slice(&self.build.to_le_bytes());
        bytes
    }

    /// Parse a dotted version string: `"1.2.3"` or `"1.2.3.456"`
    ///
    /// The build component is optional and defaults to zero.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split('.');
        let major = parts.next()?.parse::<u16>().ok()?;
        let minor = parts.next()?.parse::<u16>().ok()?;
        let patch = parts.next()?.parse::<u16>().ok()?;
        let build = match parts.next() {
            Some(b) => b.parse::<u32>().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch, build))
    }

    /// Check if this version is strictly greater than another
    ///
    /// Used for rollback protection - updates must have higher versions.
    #[must_use]
    pub const fn is_greater_than(&self, other: &Self) -> bool {
        if self.major != other.major {
            return self.major > other.major;
        }
        if self.minor != other.minor {
            return self.minor > other.minor;
        }
        if self.patch != other.patch {
            return self.patch > other.patch;
        }
        self.build > other.build
    }

    /// Check if updating from `self` to `candidate` is an upgrade
    #[must_use]
    pub const fn is_upgrade_to(&self, candidate: &Self) -> bool {
        candidate.is_greater_than(self)
    }

    /// Check if updating from `self` to `candidate` is a downgrade
    #[must_use]
    pub const fn is_downgrade_to(&self, candidate: &Self) -> bool {
        self.is_greater_than(candidate)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.major.cmp(&other.major) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.minor.cmp(&other.minor) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.patch.cmp(&other.patch) {
            Ordering::Equal => {}
            ord => return ord,
        }
        self.build.cmp(&other.build)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Version({}.{}.{}.{})",
            self.major, self.minor, self.patch, self.build
        )
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.build
        )
    }
}
