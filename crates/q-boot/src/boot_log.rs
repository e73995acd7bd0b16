// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Persistent boot failure logging
//!
//! A small circular log of boot failures kept in the metadata flash
//! region, surviving reboots so field units can be diagnosed after the
//! fact. Entries and the log header are validated by magic plus CRC32; a
//! corrupt log is reformatted rather than trusted.
//!
//! # Storage Layout
//!
//! ```text
//! Offset  Size    Description
//! 0x00    4       Magic number ("BLOG")
//! 0x04    4       Log format version
//! 0x08    4       Total entries ever written
//! 0x0C    4       Current write index (circular)
//! 0x10    12      Reserved (zero)
//! 0x1C    4       CRC32 of header bytes [0x00, 0x1C)
//! 0x20    8*32    Log entries (8 entries, 32 bytes each)
//! ```

use q_common::{Error, Result};

use crate::slots::{FlashStore, Slot};

/// Flash offset of the boot log region
pub const BOOT_LOG_OFFSET: u32 = 0x0400;

/// Log format magic: "BLOG"
const BOOT_LOG_MAGIC: u32 = 0x474F_4C42;

/// Log format version
const BOOT_LOG_VERSION: u32 = 1;

/// Entries kept before the log wraps
pub const MAX_LOG_ENTRIES: usize = 8;

/// Serialized entry size in bytes
pub const LOG_ENTRY_SIZE: usize = 32;

const HEADER_SIZE: usize = 32;
const HEADER_CRC_OFFSET: usize = 28;
const ENTRY_CRC_OFFSET: usize = LOG_ENTRY_SIZE - 4;

// ============================================================================
// Boot Stage and Error Category
// ============================================================================

/// Boot pipeline stage where a failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BootStage {
    /// Reading the persisted boot flag
    FlagLoad = 0,
    /// Choosing the slot to boot
    SlotSelection = 1,
    /// Firmware header validation
    HeaderValidate = 2,
    /// CRC32 / SHA-256 payload check
    IntegrityCheck = 3,
    /// RSA signature check
    SignatureCheck = 4,
    /// Anti-rollback version policy
    VersionCheck = 5,
    /// Slot rollback in progress
    Rollback = 6,
    /// Handing control to the application
    Jump = 7,
    /// Unknown stage
    Unknown = 255,
}

impl From<u8> for BootStage {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::FlagLoad,
            1 => Self::SlotSelection,
            2 => Self::HeaderValidate,
            3 => Self::IntegrityCheck,
            4 => Self::SignatureCheck,
            5 => Self::VersionCheck,
            6 => Self::Rollback,
            7 => Self::Jump,
            _ => Self::Unknown,
        }
    }
}

/// Failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ErrorCategory {
    /// No error
    None = 0,
    /// Flash read/write failure
    Storage = 1,
    /// Integrity or signature verification failure
    Verification = 2,
    /// Anti-rollback policy rejection
    Rollback = 3,
    /// Persisted-state corruption
    Corruption = 4,
    /// Unknown category
    Unknown = 255,
}

impl From<u8> for ErrorCategory {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::None,
            1 => Self::Storage,
            2 => Self::Verification,
            3 => Self::Rollback,
            4 => Self::Corruption,
            _ => Self::Unknown,
        }
    }
}

// ============================================================================
// Log Entry
// ============================================================================

/// One boot failure record (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootLogEntry {
    /// Boot attempt counter at the time of failure
    pub boot_attempt: u32,
    /// Timestamp in Unix seconds (zero when no clock is available)
    pub timestamp: u64,
    /// Pipeline stage that failed
    pub stage: BootStage,
    /// Failure category
    pub category: ErrorCategory,
    /// Slot being booted
    pub slot: Slot,
    /// Error code from [`q_common::Error`]
    pub error_code: u16,
}

impl BootLogEntry {
    const ENTRY_MAGIC: u32 = 0x4547_4F4C; // "LOGE"

    /// Build an entry for a failed boot
    #[must_use]
    pub fn for_failure(
        boot_attempt: u32,
        timestamp: u64,
        stage: BootStage,
        slot: Slot,
        error: Error,
    ) -> Self {
        let category = match error {
            Error::StorageReadFailed | Error::StorageWriteFailed => ErrorCategory::Storage,
            Error::StorageCorrupted => ErrorCategory::Corruption,
            Error::VersionRejected => ErrorCategory::Rollback,
            e if e.is_security_error() => ErrorCategory::Verification,
            _ => ErrorCategory::Unknown,
        };
        Self {
            boot_attempt,
            timestamp,
            stage,
            category,
            slot,
            error_code: error.code(),
        }
    }

    fn to_bytes(self) -> [u8; LOG_ENTRY_SIZE] {
        let mut bytes = [0u8; LOG_ENTRY_SIZE];
        bytes[0..4].copy_from_slice(&Self::ENTRY_MAGIC.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.boot_attempt.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes[16] = self.stage as u8;
        bytes[17] = self.category as u8;
        bytes[18] = self.slot as u8;
        // bytes[19] reserved
        bytes[20..22].copy_from_slice(&self.error_code.to_le_bytes());
        // bytes[22..28] reserved
        let crc = crc32fast::hash(&bytes[..ENTRY_CRC_OFFSET]);
        bytes[ENTRY_CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8; LOG_ENTRY_SIZE]) -> Option<Self> {
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != Self::ENTRY_MAGIC {
            return None;
        }
        let stored = u32::from_le_bytes([
            bytes[ENTRY_CRC_OFFSET],
            bytes[ENTRY_CRC_OFFSET + 1],
            bytes[ENTRY_CRC_OFFSET + 2],
            bytes[ENTRY_CRC_OFFSET + 3],
        ]);
        if stored != crc32fast::hash(&bytes[..ENTRY_CRC_OFFSET]) {
            return None;
        }
        Some(Self {
            boot_attempt: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            timestamp: u64::from_le_bytes([
                bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14],
                bytes[15],
            ]),
            stage: BootStage::from(bytes[16]),
            category: ErrorCategory::from(bytes[17]),
            slot: Slot::from_u8(bytes[18])?,
            error_code: u16::from_le_bytes([bytes[20], bytes[21]]),
        })
    }
}

// ============================================================================
// Boot Log
// ============================================================================

/// Circular boot failure log over a [`FlashStore`] region
pub struct BootLog<F: FlashStore> {
    flash: F,
    total_entries: u32,
    write_index: u32,
}

impl<F: FlashStore> BootLog<F> {
    /// Open the log, reformatting if the header is corrupt or absent
    pub fn open(flash: F) -> Result<Self> {
        let mut header = [0u8; HEADER_SIZE];
        let parsed = match flash.read(BOOT_LOG_OFFSET, &mut header) {
            Ok(()) => parse_header(&header),
            Err(_) => None,
        };

        match parsed {
            Some((total_entries, write_index)) => Ok(Self {
                flash,
                total_entries,
                write_index,
            }),
            None => {
                let mut log = Self {
                    flash,
                    total_entries: 0,
                    write_index: 0,
                };
                log.format()?;
                Ok(log)
            }
        }
    }

    /// Erase the log and write a fresh header
    pub fn format(&mut self) -> Result<()> {
        self.total_entries = 0;
        self.write_index = 0;
        for index in 0..MAX_LOG_ENTRIES {
            self.flash
                .write(entry_offset(index), &[0u8; LOG_ENTRY_SIZE])?;
        }
        self.write_header()
    }

    /// Append an entry, overwriting the oldest once the log is full
    pub fn record(&mut self, entry: BootLogEntry) -> Result<()> {
        self.flash
            .write(entry_offset(self.write_index as usize), &entry.to_bytes())?;
        self.write_index = (self.write_index + 1) % MAX_LOG_ENTRIES as u32;
        self.total_entries = self.total_entries.saturating_add(1);
        self.write_header()
    }

    /// Number of entries ever written
    #[must_use]
    pub const fn total_entries(&self) -> u32 {
        self.total_entries
    }

    /// Number of entries currently stored
    #[must_use]
    pub fn len(&self) -> usize {
        (self.total_entries as usize).min(MAX_LOG_ENTRIES)
    }

    /// Whether the log holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_entries == 0
    }

    /// Read the stored entry at `index`, oldest first
    ///
    /// Returns `None` past the end or for an entry that fails validation.
    pub fn entry(&self, index: usize) -> Option<BootLogEntry> {
        if index >= self.len() {
            return None;
        }
        let oldest = if (self.total_entries as usize) <= MAX_LOG_ENTRIES {
            0
        } else {
            self.write_index as usize
        };
        let slot_index = (oldest + index) % MAX_LOG_ENTRIES;

        let mut bytes = [0u8; LOG_ENTRY_SIZE];
        self.flash.read(entry_offset(slot_index), &mut bytes).ok()?;
        BootLogEntry::from_bytes(&bytes)
    }

    /// Release the underlying flash store
    pub fn into_flash(self) -> F {
        self.flash
    }

    fn write_header(&mut self) -> Result<()> {
        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(&BOOT_LOG_MAGIC.to_le_bytes());
        header[4..8].copy_from_slice(&BOOT_LOG_VERSION.to_le_bytes());
        header[8..12].copy_from_slice(&self.total_entries.to_le_bytes());
        header[12..16].copy_from_slice(&self.write_index.to_le_bytes());
        let crc = crc32fast::hash(&header[..HEADER_CRC_OFFSET]);
        header[HEADER_CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        self.flash.write(BOOT_LOG_OFFSET, &header)
    }
}

const fn entry_offset(index: usize) -> u32 {
    BOOT_LOG_OFFSET + HEADER_SIZE as u32 + (index * LOG_ENTRY_SIZE) as u32
}

fn parse_header(header: &[u8; HEADER_SIZE]) -> Option<(u32, u32)> {
    let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if magic != BOOT_LOG_MAGIC {
        return None;
    }
    let stored = u32::from_le_bytes([
        header[HEADER_CRC_OFFSET],
        header[HEADER_CRC_OFFSET + 1],
        header[HEADER_CRC_OFFSET + 2],
        header[HEADER_CRC_OFFSET + 3],
    ]);
    if stored != crc32fast::hash(&header[..HEADER_CRC_OFFSET]) {
        return None;
    }
    let total_entries = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
    let write_index = u32::from_le_bytes([header[12], header[13], header[14], header[15]]);
    if write_index as usize >= MAX_LOG_ENTRIES {
        return None;
    }
    Some((total_entries, write_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RamFlash;

    fn failure(attempt: u32) -> BootLogEntry {
        BootLogEntry::for_failure(
            attempt,
            1_700_000_000 + u64::from(attempt),
            BootStage::IntegrityCheck,
            Slot::A,
            Error::ChecksumMismatch,
        )
    }

    #[test]
    fn test_fresh_log_formats() {
        let log = BootLog::open(RamFlash::new()).unwrap();
        assert!(log.is_empty());
        assert_eq!(log.entry(0), None);
    }

    #[test]
    fn test_record_and_read_back() {
        let mut log = BootLog::open(RamFlash::new()).unwrap();
        log.record(failure(1)).unwrap();
        log.record(failure(2)).unwrap();

        assert_eq!(log.len(), 2);
        let first = log.entry(0).unwrap();
        assert_eq!(first.boot_attempt, 1);
        assert_eq!(first.category, ErrorCategory::Verification);
        assert_eq!(first.error_code, Error::ChecksumMismatch.code());
        assert_eq!(log.entry(1).unwrap().boot_attempt, 2);
    }

    #[test]
    fn test_circular_overwrite_keeps_newest() {
        let mut log = BootLog::open(RamFlash::new()).unwrap();
        for attempt in 0..(MAX_LOG_ENTRIES as u32 + 3) {
            log.record(failure(attempt)).unwrap();
        }

        assert_eq!(log.len(), MAX_LOG_ENTRIES);
        assert_eq!(log.total_entries(), MAX_LOG_ENTRIES as u32 + 3);
        // Oldest surviving entry is attempt 3
        assert_eq!(log.entry(0).unwrap().boot_attempt, 3);
        assert_eq!(
            log.entry(MAX_LOG_ENTRIES - 1).unwrap().boot_attempt,
            MAX_LOG_ENTRIES as u32 + 2
        );
    }

    #[test]
    fn test_log_survives_reopen() {
        let mut log = BootLog::open(RamFlash::new()).unwrap();
        log.record(failure(7)).unwrap();
        let flash = log.into_flash();

        let reopened = BootLog::open(flash).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.entry(0).unwrap().boot_attempt, 7);
    }

    #[test]
    fn test_corrupt_header_reformats() {
        let mut log = BootLog::open(RamFlash::new()).unwrap();
        log.record(failure(1)).unwrap();
        let mut flash = log.into_flash();
        flash.data[BOOT_LOG_OFFSET as usize + 8] ^= 0xFF;

        let reopened = BootLog::open(flash).unwrap();
        assert!(reopened.is_empty());
    }

    #[test]
    fn test_category_mapping() {
        let entry = BootLogEntry::for_failure(
            1,
            0,
            BootStage::VersionCheck,
            Slot::B,
            Error::VersionRejected,
        );
        assert_eq!(entry.category, ErrorCategory::Rollback);

        let entry =
            BootLogEntry::for_failure(1, 0, BootStage::FlagLoad, Slot::A, Error::StorageCorrupted);
        assert_eq!(entry.category, ErrorCategory::Corruption);
    }
}
