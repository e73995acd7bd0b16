// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Integration tests for q-delta
//!
//! End-to-end generate/apply round trips, the checksum gate against
//! corrupted patches, and the wire-format properties the bootloader-side
//! applier depends on. These exercise the real crate API on the host.

use q_common::config::DeltaConfig;
use q_common::errors::Error;
use q_common::stream::{SliceSink, SliceSource};
use q_delta::apply::{ApplyState, PatchApplier};
use q_delta::generate::{GenerateReport, PatchGenerator};
use q_delta::patch::PatchHeader;

const PATCH_CAP: usize = 32 * 1024;
const IMAGE_CAP: usize = 32 * 1024;

fn generator(block_size: u32) -> PatchGenerator {
    PatchGenerator::new(DeltaConfig {
        block_size,
        enable_compression: false,
    })
    .unwrap()
}

fn generate(old: &[u8], new: &[u8], block_size: u32) -> (Vec<u8>, GenerateReport) {
    let mut buf = [0u8; PATCH_CAP];
    let mut sink = SliceSink::new(&mut buf);
    let report = generator(block_size).generate(old, new, &mut sink).unwrap();
    (sink.filled().to_vec(), report)
}

fn apply(old: &[u8], patch: &[u8]) -> Result<Vec<u8>, Error> {
    let mut out = [0u8; IMAGE_CAP];
    let mut applier = PatchApplier::new(
        SliceSource::new(old),
        SliceSource::new(patch),
        SliceSink::new(&mut out),
    );
    applier.run()?;
    assert_eq!(applier.state(), ApplyState::Verified);
    Ok(applier.into_output().filled().to_vec())
}

/// Deterministic non-repeating filler so offset shifts never alias
fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(747_796_405).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect()
}

mod roundtrip_tests {
    use super::*;

    #[test]
    fn test_roundtrip_modified_image() {
        let old = noise(10_000, 1);
        let mut new = old.clone();
        new[3000..3300].copy_from_slice(&noise(300, 2));
        new.extend_from_slice(&noise(500, 3));

        let (patch, report) = generate(&old, &new, 256);
        assert_eq!(apply(&old, &patch).unwrap(), new);
        assert!(report.stats.matched_blocks > 0);
        assert!(report.stats.different_blocks > 0);
    }

    #[test]
    fn test_roundtrip_empty_files() {
        let (patch, report) = generate(&[], &[], 4096);
        assert_eq!(apply(&[], &patch).unwrap(), Vec::<u8>::new());
        assert_eq!(report.op_stream_size, 0);
    }

    #[test]
    fn test_roundtrip_empty_old() {
        let new = noise(700, 4);
        let (patch, _) = generate(&[], &new, 256);
        assert_eq!(apply(&[], &patch).unwrap(), new);
    }

    #[test]
    fn test_roundtrip_shrinking_image() {
        let old = noise(8192, 5);
        let new = old[..1000].to_vec();
        let (patch, _) = generate(&old, &new, 512);
        assert_eq!(apply(&old, &patch).unwrap(), new);
    }

    #[test]
    fn test_roundtrip_shorter_than_one_block() {
        let old = noise(100, 6);
        let mut new = old.clone();
        new[50] ^= 0xFF;
        let (patch, report) = generate(&old, &new, 4096);
        assert_eq!(apply(&old, &patch).unwrap(), new);
        // The whole file is a single partial block
        assert_eq!(report.stats.total_blocks, 1);
    }

    #[test]
    fn test_all_copy_patch_is_idempotent() {
        let image = noise(4096, 7);
        let (patch, report) = generate(&image, &image, 256);

        assert_eq!(report.stats.different_blocks, 0);
        assert_eq!(report.stats.matched_blocks, 16);
        assert_eq!(report.stats.copy_bytes, 4096);
        assert_eq!(apply(&image, &patch).unwrap(), image);
    }
}

mod checksum_gate_tests {
    use super::*;

    #[test]
    fn test_every_op_stream_corruption_is_caught() {
        let old = noise(2000, 8);
        let mut new = old.clone();
        new[500..600].copy_from_slice(&noise(100, 9));

        let (patch, _) = generate(&old, &new, 128);

        // Flip every byte of the operation stream in turn; the apply must
        // fail each time, never silently produce an altered image
        for pos in PatchHeader::SIZE..patch.len() {
            let mut corrupt = patch.clone();
            corrupt[pos] ^= 0x01;
            assert!(
                apply(&old, &corrupt).is_err(),
                "corruption at byte {pos} was not caught"
            );
        }
    }

    #[test]
    fn test_literal_corruption_fails_with_checksum_mismatch() {
        let old = noise(512, 10);
        let new = noise(512, 11);
        let (mut patch, _) = generate(&old, &new, 4096);

        // One whole-file Add: first literal byte sits after tag + length
        patch[PatchHeader::SIZE + 5] ^= 0x80;
        assert_eq!(apply(&old, &patch), Err(Error::ChecksumMismatch));
    }

    #[test]
    fn test_header_magic_corruption() {
        let old = noise(256, 12);
        let (mut patch, _) = generate(&old, &old, 256);
        patch[0] ^= 0xFF;
        assert_eq!(apply(&old, &patch), Err(Error::MalformedHeader));
    }

    #[test]
    fn test_truncated_patch() {
        let old = noise(1024, 13);
        let new = noise(1024, 14);
        let (patch, _) = generate(&old, &new, 256);

        let truncated = &patch[..patch.len() - 3];
        assert_eq!(apply(&old, truncated), Err(Error::UnexpectedEof));
    }
}

mod scenario_tests {
    use super::*;

    /// 512 bytes of 0xAA with [100, 164) replaced by 0xBB
    ///
    /// Uniform regions collapse to Run operations (run detection takes
    /// priority over copy), so the patch is a handful of records and far
    /// smaller than the image.
    #[test]
    fn test_small_window_rewrite_yields_tiny_patch() {
        let old = [0xAAu8; 512];
        let mut new = old;
        new[100..164].fill(0xBB);

        let (patch, report) = generate(&old, &new, 64);
        assert_eq!(apply(&old, &patch).unwrap(), new.to_vec());

        assert_eq!(report.stats.run_bytes, 512);
        assert_eq!(report.op_stream_size, 3 * 6);
        assert!(report.patch_total < 512 / 4);
        assert!(report.compression_ratio_percent() < 25);
    }

    #[test]
    fn test_erased_flash_region_collapses_to_run() {
        let old = noise(4096, 15);
        let mut new = old.clone();
        new[1024..3072].fill(0xFF); // erased flash pattern

        let (patch, report) = generate(&old, &new, 256);
        assert_eq!(apply(&old, &patch).unwrap(), new);
        // The run covers at least the erased region; it may extend past it
        // when the neighbouring byte happens to match the fill value
        assert!(report.stats.run_bytes >= 2048);
        assert!(report.patch_total < new.len() as u64);
    }

    #[test]
    fn test_progress_reaches_total() {
        let old = noise(3000, 16);
        let mut new = old.clone();
        new[100..200].fill(0);
        let (patch, _) = generate(&old, &new, 256);

        let mut last = (0u64, 0u64);
        let mut cb = |processed: u64, total: u64| last = (processed, total);

        let mut out = [0u8; IMAGE_CAP];
        let mut applier = PatchApplier::new(
            SliceSource::new(&old),
            SliceSource::new(&patch),
            SliceSink::new(&mut out),
        )
        .with_progress(&mut cb);
        applier.run().unwrap();
        assert_eq!(applier.progress_percent(), 100);
        drop(applier);

        assert_eq!(last, (new.len() as u64, new.len() as u64));
    }
}
