// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Firmware image header
//!
//! The header is prepended to the raw application binary by the build and
//! signing tooling. The bootloader only ever reads it; every integrity and
//! authenticity claim it carries is re-checked by [`crate::verify`] before
//! the image may execute.

use q_common::constants::{
    FIRMWARE_MAGIC, MAX_FIRMWARE_SIZE, RSA2048_SIGNATURE_SIZE, SHA256_OUTPUT_SIZE,
};
use q_common::{Error, Result, Version};

/// Firmware image header (384 bytes, prepended to the application binary)
///
/// Layout:
/// ```text
/// Offset  Size   Field
/// 0x000   4      Magic number ("FWMG")
/// 0x004   10     Version (major.minor.patch.build)
/// 0x00E   4      Payload size in bytes (excluding header)
/// 0x012   4      CRC32 of payload
/// 0x016   32     SHA-256 of payload
/// 0x036   256    RSA-2048 signature over the SHA-256 digest
/// 0x136   8      Build timestamp (Unix seconds)
/// 0x13E   66     Reserved (zero)
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FirmwareHeader {
    /// Magic number (must be [`FIRMWARE_MAGIC`])
    pub magic: u32,
    /// Firmware version
    pub version: Version,
    /// Payload size in bytes, excluding this header
    pub size: u32,
    /// CRC32 of the payload
    pub crc32: u32,
    /// SHA-256 digest of the payload
    pub sha256: [u8; SHA256_OUTPUT_SIZE],
    /// RSA-2048 signature over the SHA-256 digest
    pub signature: [u8; RSA2048_SIGNATURE_SIZE],
    /// Build timestamp in Unix seconds
    pub timestamp: u64,
}

impl FirmwareHeader {
    /// Serialized header size in bytes
    pub const SIZE: usize = 384;

    const RESERVED_LEN: usize = 66;

    /// Serialize to the on-flash layout
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.magic.to_le_bytes());
        bytes[4..14].copy_from_slice(&self.version.to_bytes());
        bytes[14..18].copy_from_slice(&self.size.to_le_bytes());
        bytes[18..22].copy_from_slice(&self.crc32.to_le_bytes());
        bytes[22..54].copy_from_slice(&self.sha256);
        bytes[54..310].copy_from_slice(&self.signature);
        bytes[310..318].copy_from_slice(&self.timestamp.to_le_bytes());
        // Remaining RESERVED_LEN bytes stay zero
        bytes
    }

    /// Parse from the on-flash layout
    ///
    /// Only the length is checked here; use [`Self::validate`] for the
    /// structural checks.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(Error::UnexpectedEof);
        }

        let version = Version::from_bytes(&bytes[4..14]).ok_or(Error::MalformedHeader)?;

        let mut sha256 = [0u8; SHA256_OUTPUT_SIZE];
        sha256.copy_from_slice(&bytes[22..54]);
        let mut signature = [0u8; RSA2048_SIGNATURE_SIZE];
        signature.copy_from_slice(&bytes[54..310]);

        Ok(Self {
            magic: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            version,
            size: u32::from_le_bytes([bytes[14], bytes[15], bytes[16], bytes[17]]),
            crc32: u32::from_le_bytes([bytes[18], bytes[19], bytes[20], bytes[21]]),
            sha256,
            signature,
            timestamp: u64::from_le_bytes([
                bytes[310], bytes[311], bytes[312], bytes[313], bytes[314], bytes[315],
                bytes[316], bytes[317],
            ]),
        })
    }

    /// Validate structural fields before any cryptographic check
    pub fn validate(&self) -> Result<()> {
        if self.magic != FIRMWARE_MAGIC {
            return Err(Error::MalformedHeader);
        }
        if self.size == 0 || self.size > MAX_FIRMWARE_SIZE {
            return Err(Error::MalformedHeader);
        }
        Ok(())
    }
}

impl core::fmt::Debug for FirmwareHeader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FirmwareHeader")
            .field("magic", &self.magic)
            .field("version", &self.version)
            .field("size", &self.size)
            .field("crc32", &self.crc32)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}
