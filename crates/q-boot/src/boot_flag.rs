// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Persisted boot flag record
//!
//! A single 32-byte flash record holding the active-slot selection and the
//! per-slot boot counters. The record carries an additive byte-sum
//! checksum rather than CRC32, keeping persisted-metadata validation
//! distinct from the image integrity CRC.

use q_common::constants::{BOOT_FLAG_MAGIC, SLOT_COUNT};
use q_common::{Error, Result};

use crate::slots::{Slot, SlotState};

/// Record format version
pub const BOOT_FLAG_VERSION: u16 = 1;

/// Persisted A/B boot state (32 bytes)
///
/// Layout:
/// ```text
/// Offset  Size   Field
/// 0x00    4      Magic number ("BTLG")
/// 0x04    2      Record version
/// 0x06    1      Active slot (0 = A, 1 = B)
/// 0x07    1      Slot of the current boot attempt
/// 0x08    8      Per-slot boot counts (2 x u32)
/// 0x10    8      Per-slot successful boots (2 x u32)
/// 0x18    2      Per-slot states
/// 0x1A    2      Reserved (zero)
/// 0x1C    4      Additive byte-sum checksum of bytes [0x00, 0x1C)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootFlag {
    /// Record format version
    pub version: u16,
    /// The slot selected for boot
    pub active_slot: Slot,
    /// The slot of the boot attempt in progress
    pub boot_slot: Slot,
    /// Boot attempts per slot since the last confirmed-good boot
    pub boot_count: [u32; SLOT_COUNT],
    /// Confirmed-good boots per slot
    pub successful_boots: [u32; SLOT_COUNT],
    /// Lifecycle state per slot
    pub slot_state: [SlotState; SLOT_COUNT],
}

impl BootFlag {
    /// Serialized record size in bytes
    pub const SIZE: usize = 32;

    const CHECKSUM_OFFSET: usize = Self::SIZE - 4;

    /// Factory-fresh record: slot A active, all counters zero
    #[must_use]
    pub const fn initial() -> Self {
        Self {
            version: BOOT_FLAG_VERSION,
            active_slot: Slot::A,
            boot_slot: Slot::A,
            boot_count: [0; SLOT_COUNT],
            successful_boots: [0; SLOT_COUNT],
            slot_state: [SlotState::Active, SlotState::Inactive],
        }
    }

    /// Serialize with a freshly computed checksum
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&BOOT_FLAG_MAGIC.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes[6] = self.active_slot as u8;
        bytes[7] = self.boot_slot as u8;
        bytes[8..12].copy_from_slice(&self.boot_count[0].to_le_bytes());
        bytes[12..16].copy_from_slice(&self.boot_count[1].to_le_bytes());
        bytes[16..20].copy_from_slice(&self.successful_boots[0].to_le_bytes());
        bytes[20..24].copy_from_slice(&self.successful_boots[1].to_le_bytes());
        bytes[24] = self.slot_state[0] as u8;
        bytes[25] = self.slot_state[1] as u8;
        // bytes[26..28] reserved
        let checksum = byte_sum(&bytes[..Self::CHECKSUM_OFFSET]);
        bytes[Self::CHECKSUM_OFFSET..].copy_from_slice(&checksum.to_le_bytes());
        bytes
    }

    /// Parse and validate a persisted record
    ///
    /// Magic or checksum failure reads as [`Error::StorageCorrupted`]; the
    /// caller recovers by reinitializing, never by propagating.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(Error::StorageCorrupted);
        }

        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != BOOT_FLAG_MAGIC {
            return Err(Error::StorageCorrupted);
        }

        let stored = u32::from_le_bytes([
            bytes[Self::CHECKSUM_OFFSET],
            bytes[Self::CHECKSUM_OFFSET + 1],
            bytes[Self::CHECKSUM_OFFSET + 2],
            bytes[Self::CHECKSUM_OFFSET + 3],
        ]);
        if stored != byte_sum(&bytes[..Self::CHECKSUM_OFFSET]) {
            return Err(Error::StorageCorrupted);
        }

        let active_slot = Slot::from_u8(bytes[6]).ok_or(Error::StorageCorrupted)?;
        let boot_slot = Slot::from_u8(bytes[7]).ok_or(Error::StorageCorrupted)?;

        Ok(Self {
            version: u16::from_le_bytes([bytes[4], bytes[5]]),
            active_slot,
            boot_slot,
            boot_count: [
                u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
                u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            ],
            successful_boots: [
                u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
                u32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]),
            ],
            slot_state: [
                SlotState::from_u8(bytes[24]),
                SlotState::from_u8(bytes[25]),
            ],
        })
    }
}

impl Default for BootFlag {
    fn default() -> Self {
        Self::initial()
    }
}

/// Additive byte-sum checksum
fn byte_sum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |sum, &b| sum.wrapping_add(u32::from(b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_wire_bytes() {
        // "BTLG" stored little-endian
        let bytes = BootFlag::initial().to_bytes();
        assert_eq!(&bytes[0..4], b"GLTB");
    }

    #[test]
    fn test_roundtrip() {
        let mut flag = BootFlag::initial();
        flag.active_slot = Slot::B;
        flag.boot_slot = Slot::B;
        flag.boot_count = [3, 1];
        flag.successful_boots = [12, 0];
        flag.slot_state = [SlotState::Unbootable, SlotState::Active];

        let parsed = BootFlag::from_bytes(&flag.to_bytes()).unwrap();
        assert_eq!(parsed, flag);
    }

    #[test]
    fn test_checksum_detects_flip() {
        let mut bytes = BootFlag::initial().to_bytes();
        bytes[8] ^= 0x01; // boot_count[0]
        assert_eq!(
            BootFlag::from_bytes(&bytes),
            Err(Error::StorageCorrupted)
        );
    }

    #[test]
    fn test_bad_magic_is_corruption() {
        let mut bytes = BootFlag::initial().to_bytes();
        bytes[0] = 0x00;
        assert_eq!(
            BootFlag::from_bytes(&bytes),
            Err(Error::StorageCorrupted)
        );
    }

    #[test]
    fn test_erased_flash_is_corruption() {
        assert_eq!(
            BootFlag::from_bytes(&[0xFF; BootFlag::SIZE]),
            Err(Error::StorageCorrupted)
        );
    }

    #[test]
    fn test_checksum_is_byte_sum_not_crc() {
        let bytes = BootFlag::initial().to_bytes();
        let sum = byte_sum(&bytes[..BootFlag::CHECKSUM_OFFSET]);
        assert_ne!(sum, crc32fast::hash(&bytes[..BootFlag::CHECKSUM_OFFSET]));
        assert_eq!(
            u32::from_le_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]),
            sum
        );
    }
}
