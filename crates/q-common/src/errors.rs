// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Error types for the OTA pipeline
//!
//! This module defines the unified error type used throughout the update
//! and boot crates. All errors are no_std compatible and carry no heap
//! allocated context.

use core::fmt;

/// Result type alias for OTA pipeline operations
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the OTA pipeline
///
/// Subsystem-local error enums (`ApplyError`, `SlotError`, `VerifyError`)
/// convert into this type at crate boundaries via `From`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Storage Errors (0x01xx)
    // =========================================================================
    /// Read from the underlying media failed
    StorageReadFailed,
    /// Write to the underlying media failed
    StorageWriteFailed,
    /// Persisted record failed its magic or checksum check
    ///
    /// Recovered locally by reinitializing to safe defaults; a torn write
    /// after power loss lands here rather than being accepted as valid state.
    StorageCorrupted,

    // =========================================================================
    // Patch Errors (0x02xx)
    // =========================================================================
    /// Patch or image header has a bad magic or malformed fields
    MalformedHeader,
    /// Patch format version is newer than this implementation supports
    UnsupportedFormat,
    /// Input or output length does not match the header
    SizeMismatch,
    /// CRC32 or SHA-256 mismatch against the expected digest
    ChecksumMismatch,
    /// Byte stream ended before the expected amount of data
    UnexpectedEof,
    /// Patch application aborted mid-stream
    PatchApplyFailed,

    // =========================================================================
    // Verification Errors (0x03xx)
    // =========================================================================
    /// RSA signature verification failed
    SignatureInvalid,
    /// Candidate version is below the anti-rollback floor
    VersionRejected,
    /// Public key record is invalid or failed its self-check
    InvalidKey,

    // =========================================================================
    // Boot Errors (0x04xx)
    // =========================================================================
    /// Neither slot holds a verifiable image
    NoBootableSlot,
    /// Active slot switch could not be persisted
    PartitionSwitchFailed,
    /// Chain-of-trust verification failed on the boot path
    BootVerificationFailed,

    // =========================================================================
    // General Errors (0xFFxx)
    // =========================================================================
    /// Buffer is too small for the operation
    BufferTooSmall,
    /// Invalid parameter provided
    InvalidParameter,
    /// Operation is not valid in the current state
    InvalidState,
    /// Internal error (should not occur)
    InternalError,
}

impl Error {
    /// Get the error code for this error
    ///
    /// Error codes are organized by category:
    /// - 0x01xx: Storage errors
    /// - 0x02xx: Patch errors
    /// - 0x03xx: Verification errors
    /// - 0x04xx: Boot errors
    /// - 0xFFxx: General errors
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            // Storage errors (0x01xx)
            Self::StorageReadFailed => 0x0101,
            Self::StorageWriteFailed => 0x0102,
            Self::StorageCorrupted => 0x0103,

            // Patch errors (0x02xx)
            Self::MalformedHeader => 0x0201,
            Self::UnsupportedFormat => 0x0202,
            Self::SizeMismatch => 0x0203,
            Self::ChecksumMismatch => 0x0204,
            Self::UnexpectedEof => 0x0205,
            Self::PatchApplyFailed => 0x0206,

            // Verification errors (0x03xx)
            Self::SignatureInvalid => 0x0301,
            Self::VersionRejected => 0x0302,
            Self::InvalidKey => 0x0303,

            // Boot errors (0x04xx)
            Self::NoBootableSlot => 0x0401,
            Self::PartitionSwitchFailed => 0x0402,
            Self::BootVerificationFailed => 0x0403,

            // General errors (0xFFxx)
            Self::BufferTooSmall => 0xFF01,
            Self::InvalidParameter => 0xFF02,
            Self::InvalidState => 0xFF03,
            Self::InternalError => 0xFFFF,
        }
    }

    /// Check if this is a security-critical error
    #[must_use]
    pub const fn is_security_error(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch
                | Self::SignatureInvalid
                | Self::VersionRejected
                | Self::InvalidKey
                | Self::BootVerificationFailed
        )
    }

    /// Get a short description of the error
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::StorageReadFailed => "storage read failed",
            Self::StorageWriteFailed => "storage write failed",
            Self::StorageCorrupted => "persisted state corrupted",
            Self::MalformedHeader => "malformed header",
            Self::UnsupportedFormat => "unsupported patch format",
            Self::SizeMismatch => "size mismatch",
            Self::ChecksumMismatch => "checksum mismatch",
            Self::UnexpectedEof => "unexpected end of stream",
            Self::PatchApplyFailed => "patch apply failed",
            Self::SignatureInvalid => "signature verification failed",
            Self::VersionRejected => "version below rollback floor",
            Self::InvalidKey => "invalid public key record",
            Self::NoBootableSlot => "no bootable slot",
            Self::PartitionSwitchFailed => "partition switch failed",
            Self::BootVerificationFailed => "boot verification failed",
            Self::BufferTooSmall => "buffer too small",
            Self::InvalidParameter => "invalid parameter",
            Self::InvalidState => "invalid state",
            Self::InternalError => "internal error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:04X}] {}", self.code(), self.description())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "[0x{:04X}] {}", self.code(), self.description());
    }
}
