// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Configuration for the OTA pipeline
//!
//! All configuration is compile-time constants selected at build time;
//! there is no runtime configuration parsing in the bootloader.

use crate::constants::{DEFAULT_BLOCK_SIZE, MAX_BOOT_ATTEMPTS};

/// Delta generation configuration
#[derive(Debug, Clone, Copy)]
pub struct DeltaConfig {
    /// Diff block size in bytes
    pub block_size: u32,
    /// Record the compression flag in generated patch headers
    ///
    /// No compressor is wired in; patches carrying the flag are rejected
    /// by the applier.
    pub enable_compression: bool,
}

impl DeltaConfig {
    /// Default delta configuration
    pub const DEFAULT: Self = Self {
        block_size: DEFAULT_BLOCK_SIZE,
        enable_compression: false,
    };
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Boot configuration
#[derive(Debug, Clone, Copy)]
pub struct BootConfig {
    /// Require RSA signature verification before jumping to the image
    pub verify_signature: bool,
    /// Enforce the anti-rollback version floor
    pub enforce_rollback_floor: bool,
    /// Automatically roll back after repeated boot failures
    pub auto_rollback: bool,
    /// Boot attempts allowed before automatic rollback
    pub max_boot_attempts: u8,
}

impl BootConfig {
    /// Default boot configuration
    pub const DEFAULT: Self = Self {
        verify_signature: true,
        enforce_rollback_floor: true,
        auto_rollback: true,
        max_boot_attempts: MAX_BOOT_ATTEMPTS,
    };

    /// Development boot configuration (less restrictive)
    pub const DEVELOPMENT: Self = Self {
        verify_signature: true,
        enforce_rollback_floor: false,
        auto_rollback: true,
        max_boot_attempts: 10,
    };
}

impl Default for BootConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
