// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Trusted root public key record
//!
//! The RSA-2048 public key is provisioned at a fixed flash location during
//! manufacturing and loaded once at boot. Unlike the boot flag, a corrupt
//! key record is never "recovered": without a trusted root there is
//! nothing to verify against, so loading fails hard.

use q_common::constants::{PUBLIC_KEY_MAGIC, RSA2048_MODULUS_SIZE};
use q_common::{Error, Result};

use crate::slots::FlashStore;

/// Flash offset of the provisioned public key record
pub const PUBLIC_KEY_OFFSET: u32 = 0x0100;

/// Provisioned RSA-2048 public key (272 bytes)
///
/// Layout:
/// ```text
/// Offset  Size   Field
/// 0x000   4      Magic number ("PUKY")
/// 0x004   4      Modulus size in bytes (always 256)
/// 0x008   256    RSA modulus (big-endian)
/// 0x108   4      RSA public exponent
/// 0x10C   4      CRC32 of the record with this field zeroed
/// ```
#[derive(Clone, Copy)]
pub struct PublicKeyRecord {
    /// Modulus size in bytes
    pub key_size: u32,
    /// RSA modulus, big-endian
    pub modulus: [u8; RSA2048_MODULUS_SIZE],
    /// RSA public exponent (typically 65537)
    pub exponent: u32,
}

impl PublicKeyRecord {
    /// Serialized record size in bytes
    pub const SIZE: usize = 272;

    const CRC_OFFSET: usize = Self::SIZE - 4;

    /// Create a record for an RSA-2048 key
    #[must_use]
    pub const fn new(modulus: [u8; RSA2048_MODULUS_SIZE], exponent: u32) -> Self {
        Self {
            key_size: RSA2048_MODULUS_SIZE as u32,
            modulus,
            exponent,
        }
    }

    /// Serialize with a freshly computed self-check CRC
    ///
    /// The CRC is computed over the full record with the CRC field zeroed,
    /// matching how the provisioning tool writes it.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&PUBLIC_KEY_MAGIC.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.key_size.to_le_bytes());
        bytes[8..264].copy_from_slice(&self.modulus);
        bytes[264..268].copy_from_slice(&self.exponent.to_le_bytes());
        let crc = crc32fast::hash(&bytes);
        bytes[Self::CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        bytes
    }

    /// Parse and validate a persisted record
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(Error::InvalidKey);
        }

        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != PUBLIC_KEY_MAGIC {
            return Err(Error::InvalidKey);
        }

        let key_size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if key_size as usize != RSA2048_MODULUS_SIZE {
            return Err(Error::InvalidKey);
        }

        let stored_crc = u32::from_le_bytes([
            bytes[Self::CRC_OFFSET],
            bytes[Self::CRC_OFFSET + 1],
            bytes[Self::CRC_OFFSET + 2],
            bytes[Self::CRC_OFFSET + 3],
        ]);

        let mut zeroed = [0u8; Self::SIZE];
        zeroed.copy_from_slice(&bytes[..Self::SIZE]);
        zeroed[Self::CRC_OFFSET..].fill(0);
        if stored_crc != crc32fast::hash(&zeroed) {
            return Err(Error::InvalidKey);
        }

        let mut modulus = [0u8; RSA2048_MODULUS_SIZE];
        modulus.copy_from_slice(&bytes[8..264]);

        Ok(Self {
            key_size,
            modulus,
            exponent: u32::from_le_bytes([bytes[264], bytes[265], bytes[266], bytes[267]]),
        })
    }

    /// Load the provisioned key from its fixed flash location
    pub fn load<F: FlashStore>(flash: &F) -> Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        flash.read(PUBLIC_KEY_OFFSET, &mut buf)?;
        Self::from_bytes(&buf)
    }
}

impl core::fmt::Debug for PublicKeyRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PublicKeyRecord")
            .field("key_size", &self.key_size)
            .field("exponent", &self.exponent)
            .finish_non_exhaustive()
    }
}
