// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Anti-rollback version policy
//!
//! A persisted [`RollbackInfo`] record carries the minimum firmware
//! version permitted to boot. The floor is monotonic: it advances when a
//! strictly newer firmware completes a successful boot and is never
//! lowered, not even across a legitimate rollback to an older slot. This
//! blocks reintroduction of known-vulnerable builds.

use q_common::constants::{DEVICE_ID_SIZE, ROLLBACK_MAGIC};
use q_common::{Error, Result, Version};

use crate::slots::FlashStore;

/// Flash offset of the persisted rollback record
pub const ROLLBACK_INFO_OFFSET: u32 = 0x0040;

/// Outcome of an anti-rollback version check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VersionCheck {
    /// Candidate is at or above the floor
    Allowed,
    /// Candidate is below the floor and must not boot
    Rejected,
}

/// Persisted anti-rollback state (48 bytes)
///
/// Layout:
/// ```text
/// Offset  Size   Field
/// 0x00    4      Magic number ("RLBS")
/// 0x04    10     Minimum permitted version
/// 0x0E    4      Total successful boots
/// 0x12    8      Last successful boot timestamp (Unix seconds)
/// 0x1A    16     Device unique ID
/// 0x2A    2      Reserved (zero)
/// 0x2C    4      CRC32 of bytes [0x00, 0x2C)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackInfo {
    /// Monotonic version floor
    pub min_version: Version,
    /// Total successful boots recorded on this device
    pub boot_count: u32,
    /// Timestamp of the last successful boot, Unix seconds
    pub last_boot_timestamp: u64,
    /// Device unique ID captured at first boot
    pub device_id: [u8; DEVICE_ID_SIZE],
}

impl RollbackInfo {
    /// Serialized record size in bytes
    pub const SIZE: usize = 48;

    const CRC_OFFSET: usize = Self::SIZE - 4;

    /// Initialize anti-rollback state on first boot
    ///
    /// The floor is set to the first verified version unconditionally.
    #[must_use]
    pub const fn first_boot(
        device_id: [u8; DEVICE_ID_SIZE],
        version: Version,
        timestamp: u64,
    ) -> Self {
        Self {
            min_version: version,
            boot_count: 0,
            last_boot_timestamp: timestamp,
            device_id,
        }
    }

    /// Serialize with a freshly computed CRC
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&ROLLBACK_MAGIC.to_le_bytes());
        bytes[4..14].copy_from_slice(&self.min_version.to_bytes());
        bytes[14..18].copy_from_slice(&self.boot_count.to_le_bytes());
        bytes[18..26].copy_from_slice(&self.last_boot_timestamp.to_le_bytes());
        bytes[26..42].copy_from_slice(&self.device_id);
        // bytes[42..44] reserved
        let crc = crc32fast::hash(&bytes[..Self::CRC_OFFSET]);
        bytes[Self::CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        bytes
    }

    /// Parse and validate a persisted record
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(Error::StorageCorrupted);
        }

        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != ROLLBACK_MAGIC {
            return Err(Error::StorageCorrupted);
        }

        let stored_crc = u32::from_le_bytes([
            bytes[Self::CRC_OFFSET],
            bytes[Self::CRC_OFFSET + 1],
            bytes[Self::CRC_OFFSET + 2],
            bytes[Self::CRC_OFFSET + 3],
        ]);
        if stored_crc != crc32fast::hash(&bytes[..Self::CRC_OFFSET]) {
            return Err(Error::StorageCorrupted);
        }

        let min_version = Version::from_bytes(&bytes[4..14]).ok_or(Error::StorageCorrupted)?;
        let mut device_id = [0u8; DEVICE_ID_SIZE];
        device_id.copy_from_slice(&bytes[26..42]);

        Ok(Self {
            min_version,
            boot_count: u32::from_le_bytes([bytes[14], bytes[15], bytes[16], bytes[17]]),
            last_boot_timestamp: u64::from_le_bytes([
                bytes[18], bytes[19], bytes[20], bytes[21], bytes[22], bytes[23], bytes[24],
                bytes[25],
            ]),
            device_id,
        })
    }

    /// Load the record from flash
    ///
    /// Returns `Ok(None)` when the record is absent or corrupt; the boot
    /// flow then reinitializes via [`Self::first_boot`] with the first
    /// verified version.
    pub fn load<F: FlashStore>(flash: &F) -> Result<Option<Self>> {
        let mut buf = [0u8; Self::SIZE];
        flash.read(ROLLBACK_INFO_OFFSET, &mut buf)?;
        match Self::from_bytes(&buf) {
            Ok(info) => Ok(Some(info)),
            Err(_) => Ok(None),
        }
    }

    /// Persist the record
    pub fn store<F: FlashStore>(&self, flash: &mut F) -> Result<()> {
        flash.write(ROLLBACK_INFO_OFFSET, &self.to_bytes())
    }

    /// Record a successful boot of `version`
    ///
    /// Advances the floor only when the version is strictly newer; an
    /// equal or older-but-allowed version leaves the floor untouched.
    pub fn record_successful_boot(&mut self, version: Version, timestamp: u64) {
        if version.is_greater_than(&self.min_version) {
            self.min_version = version;
        }
        self.boot_count = self.boot_count.saturating_add(1);
        self.last_boot_timestamp = timestamp;
    }
}

/// Check a candidate version against the anti-rollback floor
///
/// Equal to the floor is allowed; only strictly lower is rejected.
#[must_use]
pub fn check_version(candidate: Version, info: &RollbackInfo) -> VersionCheck {
    if candidate < info.min_version {
        VersionCheck::Rejected
    } else {
        VersionCheck::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RamFlash;

    fn info_at(major: u16, minor: u16, patch: u16) -> RollbackInfo {
        RollbackInfo::first_boot([0xAB; DEVICE_ID_SIZE], Version::new(major, minor, patch, 0), 1000)
    }

    #[test]
    fn test_floor_rejects_lower_versions() {
        let mut info = info_at(1, 2, 0);

        assert_eq!(
            check_version(Version::new(1, 1, 9, 0), &info),
            VersionCheck::Rejected
        );

        // Equal to the floor boots without advancing it
        assert_eq!(
            check_version(Version::new(1, 2, 0, 0), &info),
            VersionCheck::Allowed
        );
        info.record_successful_boot(Version::new(1, 2, 0, 0), 2000);
        assert_eq!(info.min_version, Version::new(1, 2, 0, 0));

        // Newer version advances the floor
        assert_eq!(
            check_version(Version::new(1, 3, 0, 0), &info),
            VersionCheck::Allowed
        );
        info.record_successful_boot(Version::new(1, 3, 0, 0), 3000);
        assert_eq!(info.min_version, Version::new(1, 3, 0, 0));

        // The old once-valid version is now below the floor
        assert_eq!(
            check_version(Version::new(1, 2, 5, 0), &info),
            VersionCheck::Rejected
        );
    }

    #[test]
    fn test_floor_never_lowers() {
        let mut info = info_at(2, 0, 0);
        info.record_successful_boot(Version::new(1, 9, 9, 0), 2000);
        assert_eq!(info.min_version, Version::new(2, 0, 0, 0));
        assert_eq!(info.boot_count, 1);
        assert_eq!(info.last_boot_timestamp, 2000);
    }

    #[test]
    fn test_roundtrip() {
        let mut info = info_at(1, 0, 0);
        info.record_successful_boot(Version::new(1, 0, 0, 0), 5000);

        let parsed = RollbackInfo::from_bytes(&info.to_bytes()).unwrap();
        assert_eq!(parsed, info);
    }

    #[test]
    fn test_magic_wire_bytes() {
        // "RLBS" stored little-endian
        let bytes = info_at(1, 0, 0).to_bytes();
        assert_eq!(&bytes[0..4], b"SBLR");
    }

    #[test]
    fn test_corruption_detected() {
        let mut bytes = info_at(1, 0, 0).to_bytes();
        bytes[5] ^= 0x01; // min_version
        assert_eq!(
            RollbackInfo::from_bytes(&bytes),
            Err(Error::StorageCorrupted)
        );
    }

    #[test]
    fn test_load_absent_record_is_first_boot() {
        let flash = RamFlash::new();
        assert_eq!(RollbackInfo::load(&flash).unwrap(), None);
    }

    #[test]
    fn test_store_then_load() {
        let mut flash = RamFlash::new();
        let info = info_at(1, 4, 2);
        info.store(&mut flash).unwrap();
        assert_eq!(RollbackInfo::load(&flash).unwrap(), Some(info));
    }
}
