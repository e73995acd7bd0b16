// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Block diff engine
//!
//! Walks the new image in fixed-size blocks and emits the operations that
//! reconstruct it from the old image. Matching is offset-aligned: a new
//! block is only ever compared against the old image at the same linear
//! offset. A 32-bit hash pre-filters candidate matches; the full byte
//! comparison is the correctness-bearing check.
//!
//! Run detection takes priority over copy/add: a block opening with at
//! least [`MIN_RUN_LENGTH`] identical bytes becomes a `Run` operation and
//! the cursor advances past the run, which collapses highly repetitive
//! regions such as erased flash.

use q_common::constants::{MAX_BLOCK_SIZE, MIN_RUN_LENGTH};
use q_common::{Error, Result};

use crate::patch::PatchOperation;

/// Counters reported by a diff pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiffStats {
    /// Diff units examined (matched + different + run units)
    pub total_blocks: u32,
    /// Units emitted as `Copy`
    pub matched_blocks: u32,
    /// Units emitted as `Add`
    pub different_blocks: u32,
    /// Bytes of output produced by `Copy` operations
    pub copy_bytes: u64,
    /// Bytes of output produced by `Add` operations
    pub add_bytes: u64,
    /// Bytes of output produced by `Run` operations
    pub run_bytes: u64,
}

impl DiffStats {
    /// Create zeroed counters
    #[must_use]
    pub const fn new() -> Self {
        Self {
            total_blocks: 0,
            matched_blocks: 0,
            different_blocks: 0,
            copy_bytes: 0,
            add_bytes: 0,
            run_bytes: 0,
        }
    }

    /// Total bytes of output accounted for
    #[must_use]
    pub const fn output_bytes(&self) -> u64 {
        self.copy_bytes + self.add_bytes + self.run_bytes
    }
}

/// djb2-style 32-bit block hash
///
/// Cheap pre-filter only; equal hashes still require a byte comparison.
#[must_use]
pub fn block_hash(block: &[u8]) -> u32 {
    let mut hash: u32 = 5381;
    for &byte in block {
        hash = hash.wrapping_mul(33).wrapping_add(u32::from(byte));
    }
    hash
}

/// Exact block equality with hash pre-filter
///
/// Two blocks are equal only if the full byte comparison succeeds; the
/// hash check just rejects obvious mismatches early.
#[must_use]
pub fn blocks_match(old: &[u8], new: &[u8]) -> bool {
    if old.len() != new.len() {
        return false;
    }
    if block_hash(old) != block_hash(new) {
        return false;
    }
    old == new
}

/// Detect a run of identical bytes opening the block
///
/// Returns `(value, length)` if the block opens with at least
/// [`MIN_RUN_LENGTH`] identical bytes; the run extends as far as the
/// identical bytes continue, past the block boundary if they do.
#[must_use]
pub fn detect_run(data: &[u8]) -> Option<(u8, usize)> {
    let first = *data.first()?;
    let length = data.iter().take_while(|&&b| b == first).count();
    if length >= MIN_RUN_LENGTH {
        Some((first, length))
    } else {
        None
    }
}

/// Offset-aligned block differ
#[derive(Debug, Clone, Copy)]
pub struct BlockDiffer {
    block_size: usize,
}

impl BlockDiffer {
    /// Create a differ with the given block size
    pub fn new(block_size: u32) -> Result<Self> {
        if block_size == 0 || block_size > MAX_BLOCK_SIZE {
            return Err(Error::InvalidParameter);
        }
        Ok(Self {
            block_size: block_size as usize,
        })
    }

    /// Block size this differ walks the new image with
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Diff `new` against `old`, emitting operations in stream order
    ///
    /// The final partial block is diffed as its own unit. An empty new
    /// image emits no operations. Where the old image is too short to
    /// cover the block's offset range, the block is forced to `Add`.
    pub fn diff<F>(&self, old: &[u8], new: &[u8], mut emit: F) -> Result<DiffStats>
    where
        F: FnMut(PatchOperation<'_>) -> Result<()>,
    {
        let mut stats = DiffStats::new();
        let mut pos = 0usize;

        while pos < new.len() {
            let chunk_end = (pos + self.block_size).min(new.len());
            let chunk = &new[pos..chunk_end];

            // Run detection first, and the run may outlive the block
            if let Some((value, run_len)) = detect_run(&new[pos..]) {
                emit(PatchOperation::Run {
                    value,
                    length: run_len as u32,
                })?;
                stats.total_blocks += 1;
                stats.run_bytes += run_len as u64;
                pos += run_len;
                continue;
            }

            let matched = old.len() >= chunk_end && blocks_match(&old[pos..chunk_end], chunk);

            if matched {
                emit(PatchOperation::Copy {
                    offset: pos as u32,
                    length: chunk.len() as u32,
                })?;
                stats.matched_blocks += 1;
                stats.copy_bytes += chunk.len() as u64;
            } else {
                emit(PatchOperation::Add { data: chunk })?;
                stats.different_blocks += 1;
                stats.add_bytes += chunk.len() as u64;
            }
            stats.total_blocks += 1;
            pos = chunk_end;
        }

        Ok(stats)
    }
}
