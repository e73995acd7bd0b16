// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Qbitel OTA Secure Boot Library
//!
//! This crate provides the boot-time half of the OTA pipeline:
//!
//! - **Image**: firmware header wire format
//! - **Verify**: chain-of-trust verification (CRC32, SHA-256, RSA
//!   signature, anti-rollback) and the application handoff
//! - **Rollback**: monotonic minimum-version floor
//! - **Slots**: A/B slot state machine with automatic rollback
//! - **Boot Log**: persistent boot failure logging
//!
//! # Metadata Flash Layout
//!
//! All persisted records live in one metadata flash region behind the
//! [`slots::FlashStore`] trait:
//!
//! ```text
//! Offset   Size  Record
//! 0x0000   32    BootFlag
//! 0x0040   48    RollbackInfo
//! 0x0100   272   PublicKeyRecord
//! 0x0400   288   Boot log (header + 8 entries)
//! ```
//!
//! Every record carries a magic and a checksum so a torn write is read as
//! corruption, never as valid state.

#![no_std]
#![warn(missing_docs)]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod boot_flag;
pub mod boot_log;
pub mod image;
pub mod pubkey;
pub mod rollback;
pub mod slots;
pub mod verify;

pub use boot_flag::BootFlag;
pub use boot_log::{BootLog, BootLogEntry, BootStage, ErrorCategory};
pub use image::FirmwareHeader;
pub use pubkey::PublicKeyRecord;
pub use rollback::{check_version, RollbackInfo, VersionCheck};
pub use slots::{BootContext, FlashStore, PartitionInfo, Slot, SlotState};
pub use verify::{verify_boot_chain, verify_image, BootDecision, JumpTarget, SignatureVerifier};
