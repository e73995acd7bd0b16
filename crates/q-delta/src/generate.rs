// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Patch generation (host/build-time companion)
//!
//! The generator runs off-device in build or CI tooling, but lives here
//! because it defines the exact on-wire format the applier accepts. It
//! streams operations straight to the sink: a first counting pass sizes
//! the operation stream so `patch_size` lands in the header without
//! buffering the whole patch.

use sha2::{Digest, Sha256};

use q_common::config::DeltaConfig;
use q_common::constants::{PATCH_FORMAT_VERSION, PATCH_MAGIC, SHA256_OUTPUT_SIZE};
use q_common::stream::{ByteSink, CountingSink};
use q_common::{Error, Result};

use crate::block::{BlockDiffer, DiffStats};
use crate::patch::PatchHeader;

/// Outcome of a generation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateReport {
    /// Total patch size in bytes (header + operation stream)
    pub patch_total: u64,
    /// Operation stream size in bytes
    pub op_stream_size: u64,
    /// Size of the new image in bytes
    pub new_size: u64,
    /// Diff engine counters
    pub stats: DiffStats,
}

impl GenerateReport {
    /// Patch size as a percentage of the new image size
    ///
    /// Values well below 100 mean the delta is worth shipping over a full
    /// image. Returns 0 for an empty new image.
    #[must_use]
    pub const fn compression_ratio_percent(&self) -> u64 {
        if self.new_size == 0 {
            return 0;
        }
        self.patch_total * 100 / self.new_size
    }
}

/// Host-side patch generator
#[derive(Debug, Clone, Copy)]
pub struct PatchGenerator {
    config: DeltaConfig,
    differ: BlockDiffer,
}

impl PatchGenerator {
    /// Create a generator from a delta configuration
    pub fn new(config: DeltaConfig) -> Result<Self> {
        if config.enable_compression {
            // Flag is reserved in the wire format; no compressor is wired in
            return Err(Error::UnsupportedFormat);
        }
        Ok(Self {
            config,
            differ: BlockDiffer::new(config.block_size)?,
        })
    }

    /// The configuration this generator was built with
    #[must_use]
    pub const fn config(&self) -> &DeltaConfig {
        &self.config
    }

    /// Generate a patch transforming `old` into `new`, writing it to `sink`
    pub fn generate<S: ByteSink>(
        &self,
        old: &[u8],
        new: &[u8],
        sink: &mut S,
    ) -> Result<GenerateReport> {
        if old.len() > u32::MAX as usize || new.len() > u32::MAX as usize {
            return Err(Error::InvalidParameter);
        }

        // Sizing pass: the diff is deterministic, so running it into a
        // counting sink yields the exact operation stream length
        let mut counter = CountingSink::new();
        self.differ.diff(old, new, |op| op.encode(&mut counter))?;
        let op_stream_size = counter.count();
        if op_stream_size > u64::from(u32::MAX) {
            return Err(Error::SizeMismatch);
        }

        let header = PatchHeader {
            magic: PATCH_MAGIC,
            format_version: PATCH_FORMAT_VERSION,
            flags: 0,
            old_size: old.len() as u32,
            new_size: new.len() as u32,
            patch_size: op_stream_size as u32,
            block_size: self.config.block_size,
            old_checksum: digest32(old),
            new_checksum: digest32(new),
        };
        sink.write_all(&header.to_bytes())?;

        // Emission pass
        let stats = self.differ.diff(old, new, |op| op.encode(sink))?;

        Ok(GenerateReport {
            patch_total: PatchHeader::SIZE as u64 + op_stream_size,
            op_stream_size,
            new_size: new.len() as u64,
            stats,
        })
    }
}

fn digest32(data: &[u8]) -> [u8; SHA256_OUTPUT_SIZE] {
    let mut out = [0u8; SHA256_OUTPUT_SIZE];
    out.copy_from_slice(Sha256::digest(data).as_slice());
    out
}
