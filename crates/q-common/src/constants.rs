// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! System-wide constants for the OTA pipeline
//!
//! Magic numbers and record sizes here are wire-format commitments shared
//! with the build/signing tooling; changing any of them breaks deployed
//! devices.

// =============================================================================
// Wire Format Magics
// =============================================================================

/// Firmware image header magic: "FWMG"
pub const FIRMWARE_MAGIC: u32 = 0x4657_4D47;

/// Delta patch header magic: "DPAT"
pub const PATCH_MAGIC: u32 = 0x5441_5044;

/// Boot flag record magic: "BTLG"
pub const BOOT_FLAG_MAGIC: u32 = 0x4254_4C47;

/// Rollback info record magic: "RLBS"
pub const ROLLBACK_MAGIC: u32 = 0x524C_4253;

/// Public key record magic: "PUKY"
pub const PUBLIC_KEY_MAGIC: u32 = 0x5055_4B59;

// =============================================================================
// Delta Patch Constants
// =============================================================================

/// Highest patch format version this implementation accepts
pub const PATCH_FORMAT_VERSION: u16 = 1;

/// Default diff block size in bytes
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Maximum supported diff block size in bytes
pub const MAX_BLOCK_SIZE: u32 = 4096;

/// Minimum identical-byte run length worth a Run operation
pub const MIN_RUN_LENGTH: usize = 16;

// =============================================================================
// Cryptographic Constants
// =============================================================================

/// SHA-256 output size in bytes
pub const SHA256_OUTPUT_SIZE: usize = 32;

/// RSA-2048 modulus size in bytes
pub const RSA2048_MODULUS_SIZE: usize = 256;

/// RSA-2048 signature size in bytes
pub const RSA2048_SIGNATURE_SIZE: usize = 256;

// =============================================================================
// Boot Constants
// =============================================================================

/// Maximum firmware image size (1MB, per-slot partition size)
pub const MAX_FIRMWARE_SIZE: u32 = 1024 * 1024;

/// Boot attempts allowed before automatic rollback
pub const MAX_BOOT_ATTEMPTS: u8 = 3;

/// Number of firmware slots (A/B)
pub const SLOT_COUNT: usize = 2;

/// Device unique ID size in bytes
pub const DEVICE_ID_SIZE: usize = 16;
