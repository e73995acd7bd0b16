// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Chain-of-trust image verification
//!
//! # Verification Order
//!
//! 1. Validate header structure (magic, size bounds)
//! 2. CRC32 of the payload
//! 3. SHA-256 of the payload, compared in constant time
//! 4. RSA-2048 signature over the digest
//! 5. Anti-rollback version check
//!
//! The chain is strictly ordered and fail-fast: a CRC mismatch never
//! reaches the hash or signature steps. Only when all five checks pass may
//! control transfer to the application, and that transfer is irreversible.
//!
//! The RSA math itself lives behind the [`SignatureVerifier`] trait; this
//! module owns only the call contract (digest, signature bytes, key).

use sha2::{Digest, Sha256};

use q_common::constants::{RSA2048_SIGNATURE_SIZE, SHA256_OUTPUT_SIZE};
use q_common::{BootConfig, Error};

use crate::image::FirmwareHeader;
use crate::pubkey::PublicKeyRecord;
use crate::rollback::{check_version, RollbackInfo, VersionCheck};
use crate::slots::Slot;

// ============================================================================
// Error Types
// ============================================================================

/// Verification failure, in chain order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VerifyError {
    /// Header magic or size bounds invalid
    InvalidHeader,
    /// Image shorter than the header claims
    ImageTruncated,
    /// CRC32 mismatch on the payload
    CrcMismatch,
    /// SHA-256 mismatch on the payload
    HashMismatch,
    /// RSA signature did not verify
    SignatureFailed,
    /// Public key unusable
    KeyInvalid,
    /// Version below the anti-rollback floor
    RollbackAttempt,
    /// Payload too short to carry a vector table
    NoVectorTable,
}

impl From<VerifyError> for Error {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::InvalidHeader => Error::MalformedHeader,
            VerifyError::ImageTruncated | VerifyError::NoVectorTable => Error::SizeMismatch,
            VerifyError::CrcMismatch | VerifyError::HashMismatch => Error::ChecksumMismatch,
            VerifyError::SignatureFailed => Error::SignatureInvalid,
            VerifyError::KeyInvalid => Error::InvalidKey,
            VerifyError::RollbackAttempt => Error::VersionRejected,
        }
    }
}

// ============================================================================
// Signature Verification Seam
// ============================================================================

/// RSA signature verification contract
///
/// The bootloader delegates the RSA math to an external primitive (a
/// hardware accelerator or a vendored library). Implementations check that
/// `signature` is a valid RSA-2048 signature over `digest` under `key`.
pub trait SignatureVerifier {
    /// Verify `signature` over `digest`
    ///
    /// Returns `Ok(false)` for a well-formed but wrong signature and `Err`
    /// only when the primitive itself cannot run (for example a malformed
    /// key).
    fn verify(
        &self,
        digest: &[u8; SHA256_OUTPUT_SIZE],
        signature: &[u8; RSA2048_SIGNATURE_SIZE],
        key: &PublicKeyRecord,
    ) -> Result<bool, VerifyError>;
}

// ============================================================================
// Verification Steps
// ============================================================================

/// Step 1: parse and structurally validate the header
pub fn validate_header(image: &[u8]) -> Result<FirmwareHeader, VerifyError> {
    let header =
        FirmwareHeader::from_bytes(image).map_err(|_| VerifyError::ImageTruncated)?;
    header.validate().map_err(|_| VerifyError::InvalidHeader)?;
    Ok(header)
}

/// Step 2: CRC32 over the payload
#[must_use]
pub fn verify_crc32(payload: &[u8], expected: u32) -> bool {
    crc32fast::hash(payload) == expected
}

/// Step 3: SHA-256 over the payload, compared in constant time
///
/// Early-exit comparison would leak how many digest bytes match through
/// timing on a boot-critical path.
#[must_use]
pub fn verify_sha256(payload: &[u8], expected: &[u8; SHA256_OUTPUT_SIZE]) -> bool {
    let digest = Sha256::digest(payload);
    constant_time_eq::constant_time_eq(digest.as_slice(), expected)
}

/// Run the full verification chain over one image
///
/// `image` is the header followed by the payload, exactly as stored in a
/// slot. Returns the parsed header on success so the caller can reuse the
/// version without re-parsing.
pub fn verify_image<V: SignatureVerifier>(
    image: &[u8],
    key: &PublicKeyRecord,
    rollback: &RollbackInfo,
    verifier: &V,
    config: &BootConfig,
) -> Result<FirmwareHeader, VerifyError> {
    let header = validate_header(image)?;

    let payload = &image[FirmwareHeader::SIZE..];
    if payload.len() != header.size as usize {
        return Err(VerifyError::ImageTruncated);
    }

    if !verify_crc32(payload, header.crc32) {
        return Err(VerifyError::CrcMismatch);
    }

    if !verify_sha256(payload, &header.sha256) {
        return Err(VerifyError::HashMismatch);
    }

    if config.verify_signature
        && !verifier.verify(&header.sha256, &header.signature, key)?
    {
        return Err(VerifyError::SignatureFailed);
    }

    if config.enforce_rollback_floor
        && check_version(header.version, rollback) == VersionCheck::Rejected
    {
        return Err(VerifyError::RollbackAttempt);
    }

    Ok(header)
}

// ============================================================================
// Boot Chain
// ============================================================================

/// Where to transfer control after verification
///
/// Extracted from the payload's first two words: the initial stack
/// pointer, then the reset vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpTarget {
    /// Initial stack pointer value
    pub stack_pointer: u32,
    /// Application entry point
    pub entry_point: u32,
}

impl JumpTarget {
    /// Read the vector table head from a verified payload
    pub fn from_payload(payload: &[u8]) -> Result<Self, VerifyError> {
        if payload.len() < 8 {
            return Err(VerifyError::NoVectorTable);
        }
        Ok(Self {
            stack_pointer: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
            entry_point: u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]),
        })
    }
}

/// Boot decision after verifying both slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootDecision {
    /// Boot the active slot
    Boot {
        /// Where to jump
        target: JumpTarget,
        /// Which slot verified
        slot: Slot,
    },
    /// Active slot failed, boot the fallback slot
    Fallback {
        /// Where to jump
        target: JumpTarget,
        /// Which slot verified
        slot: Slot,
        /// Why the active slot failed
        primary_error: VerifyError,
    },
    /// Both slots failed; halt or hand off to external recovery
    Halt {
        /// Why the active slot failed
        primary_error: VerifyError,
        /// Why the fallback slot failed
        fallback_error: VerifyError,
    },
}

/// Verify the boot chain across the active and fallback slots
///
/// The active slot is tried first; its verification failure routes to the
/// fallback, and failure on both routes to [`BootDecision::Halt`]. There
/// is no path from a failed verification to executing that image.
pub fn verify_boot_chain<V: SignatureVerifier>(
    primary: &[u8],
    fallback: &[u8],
    primary_slot: Slot,
    key: &PublicKeyRecord,
    rollback: &RollbackInfo,
    verifier: &V,
    config: &BootConfig,
) -> BootDecision {
    let primary_error = match verify_slot(primary, key, rollback, verifier, config) {
        Ok(target) => {
            return BootDecision::Boot {
                target,
                slot: primary_slot,
            }
        }
        Err(e) => e,
    };

    match verify_slot(fallback, key, rollback, verifier, config) {
        Ok(target) => BootDecision::Fallback {
            target,
            slot: primary_slot.other(),
            primary_error,
        },
        Err(fallback_error) => BootDecision::Halt {
            primary_error,
            fallback_error,
        },
    }
}

fn verify_slot<V: SignatureVerifier>(
    image: &[u8],
    key: &PublicKeyRecord,
    rollback: &RollbackInfo,
    verifier: &V,
    config: &BootConfig,
) -> Result<JumpTarget, VerifyError> {
    verify_image(image, key, rollback, verifier, config)?;
    JumpTarget::from_payload(&image[FirmwareHeader::SIZE..])
}

// ============================================================================
// Application Handoff
// ============================================================================

/// Transfer control to a verified application
///
/// Single irreversible action: interrupts off, stack pointer from the
/// image's first word, jump to its reset vector. There is no return path.
///
/// # Safety
///
/// The target must come from an image that passed [`verify_image`] and is
/// mapped at its link address. This function never returns.
#[cfg(target_arch = "arm")]
pub unsafe fn jump_to_application(target: JumpTarget) -> ! {
    // SAFETY: cpsid disables interrupts before the handoff so no ISR runs
    // on the stale vector table. No memory or stack effects.
    core::arch::asm!("cpsid i", options(nomem, nostack, preserves_flags));

    // SAFETY: msr msp installs the verified image's initial stack pointer.
    // The caller guarantees `target` came from a verified, mapped image.
    core::arch::asm!(
        "msr msp, {sp}",
        sp = in(reg) target.stack_pointer,
        options(nomem, nostack),
    );

    // SAFETY: The entry point is the verified image's reset vector. The
    // transmute converts it to a diverging function pointer; this is the
    // standard Cortex-M handoff and control never returns.
    let entry: extern "C" fn() -> ! = core::mem::transmute(target.entry_point as usize);
    entry()
}
