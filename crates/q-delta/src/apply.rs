// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Patch application
//!
//! [`PatchApplier`] reconstructs the new image from the old image and a
//! patch stream. The old image is opened read-only and never mutated, so
//! a failure mid-apply leaves the previously active image intact; the
//! caller discards the incomplete output.
//!
//! The applier is a one-way state machine:
//!
//! ```text
//! Initialized -> HeaderValidated -> Applying -> Verified
//!                     |                 |
//!                     +-----> Failed <--+
//! ```
//!
//! `Failed` is terminal. No output byte is written before the base image
//! has been checked against the header, and the output is only reported
//! `Verified` after its length and SHA-256 match the header.

use constant_time_eq::constant_time_eq;
use sha2::{Digest, Sha256};

use q_common::stream::{ByteSink, ByteSource, SeekSource};
use q_common::{Error, Result};

use crate::patch::{PatchHeader, RawOperation};

/// Working buffer size for streaming copies
const APPLY_CHUNK: usize = 512;

/// Applier lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ApplyState {
    /// Streams opened, header not yet read
    Initialized,
    /// Header parsed and the base image verified against it
    HeaderValidated,
    /// Operation stream being consumed
    Applying,
    /// Output length and checksum confirmed
    Verified,
    /// A previous step failed; the applier is unusable
    Failed,
}

/// Progress callback: `(processed_bytes, total_bytes)`
///
/// Invoked synchronously after every operation; it must not block or it
/// stalls patch application.
pub type ProgressFn<'a> = &'a mut dyn FnMut(u64, u64);

/// Streaming patch applier
pub struct PatchApplier<'cb, O, P, N>
where
    O: SeekSource,
    P: ByteSource,
    N: ByteSink,
{
    old: O,
    patch: P,
    output: N,
    header: Option<PatchHeader>,
    state: ApplyState,
    processed: u64,
    hasher: Sha256,
    progress: Option<ProgressFn<'cb>>,
}

impl<'cb, O, P, N> PatchApplier<'cb, O, P, N>
where
    O: SeekSource,
    P: ByteSource,
    N: ByteSink,
{
    /// Create an applier over the three byte streams
    pub fn new(old: O, patch: P, output: N) -> Self {
        Self {
            old,
            patch,
            output,
            header: None,
            state: ApplyState::Initialized,
            processed: 0,
            hasher: Sha256::new(),
            progress: None,
        }
    }

    /// Attach a progress callback
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn<'cb>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> ApplyState {
        self.state
    }

    /// The parsed patch header, once validated
    #[must_use]
    pub const fn header(&self) -> Option<&PatchHeader> {
        self.header.as_ref()
    }

    /// Progress as `(processed_bytes, total_bytes)`
    #[must_use]
    pub fn progress(&self) -> (u64, u64) {
        let total = self.header.map_or(0, |h| u64::from(h.new_size));
        (self.processed, total)
    }

    /// Progress as a percentage of the output image
    #[must_use]
    pub fn progress_percent(&self) -> u8 {
        let (processed, total) = self.progress();
        if total == 0 {
            return 0;
        }
        ((processed * 100) / total).min(100) as u8
    }

    /// Parse the patch header and verify the base image against it
    ///
    /// Recomputes the SHA-256 of the entire old image and compares it to
    /// `old_checksum`, and checks the old image length against `old_size`.
    /// Any mismatch fails before a single output byte is written; this
    /// guards against applying a patch meant for a different base image.
    pub fn validate_header(&mut self) -> Result<()> {
        let result = self.validate_header_inner();
        if result.is_err() {
            self.state = ApplyState::Failed;
        }
        result
    }

    fn validate_header_inner(&mut self) -> Result<()> {
        if self.state != ApplyState::Initialized {
            return Err(Error::InvalidState);
        }

        let mut header_bytes = [0u8; PatchHeader::SIZE];
        self.patch.read_exact(&mut header_bytes)?;
        let header = PatchHeader::from_bytes(&header_bytes)?;
        header.validate()?;
        if header.is_compressed() {
            return Err(Error::UnsupportedFormat);
        }

        if self.old.stream_len()? != u64::from(header.old_size) {
            return Err(Error::SizeMismatch);
        }

        let mut hasher = Sha256::new();
        let mut buf = [0u8; APPLY_CHUNK];
        self.old.seek(0)?;
        loop {
            let n = self.old.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let digest = hasher.finalize();
        if !constant_time_eq(digest.as_slice(), &header.old_checksum) {
            return Err(Error::ChecksumMismatch);
        }

        self.header = Some(header);
        self.state = ApplyState::HeaderValidated;
        Ok(())
    }

    /// Consume the operation stream and verify the reconstructed image
    pub fn apply(&mut self) -> Result<()> {
        let result = self.apply_inner();
        if result.is_err() {
            self.state = ApplyState::Failed;
        }
        result
    }

    fn apply_inner(&mut self) -> Result<()> {
        if self.state != ApplyState::HeaderValidated {
            return Err(Error::InvalidState);
        }
        let header = self.header.ok_or(Error::InternalError)?;
        self.state = ApplyState::Applying;

        let patch_size = u64::from(header.patch_size);
        let total = u64::from(header.new_size);
        let mut consumed = 0u64;
        let mut buf = [0u8; APPLY_CHUNK];

        while consumed < patch_size {
            let op = RawOperation::decode(&mut self.patch)?;
            consumed += op.record_len();

            match op {
                RawOperation::Copy { offset, length } => {
                    self.old.seek(u64::from(offset))?;
                    let mut remaining = length as usize;
                    while remaining > 0 {
                        let chunk = remaining.min(APPLY_CHUNK);
                        self.old.read_exact(&mut buf[..chunk])?;
                        self.hasher.update(&buf[..chunk]);
                        self.output.write_all(&buf[..chunk])?;
                        remaining -= chunk;
                    }
                }
                RawOperation::Add { length } => {
                    consumed += u64::from(length);
                    let mut remaining = length as usize;
                    while remaining > 0 {
                        let chunk = remaining.min(APPLY_CHUNK);
                        self.patch.read_exact(&mut buf[..chunk])?;
                        self.hasher.update(&buf[..chunk]);
                        self.output.write_all(&buf[..chunk])?;
                        remaining -= chunk;
                    }
                }
                RawOperation::Run { value, length } => {
                    buf.fill(value);
                    let mut remaining = length as usize;
                    while remaining > 0 {
                        let chunk = remaining.min(APPLY_CHUNK);
                        self.hasher.update(&buf[..chunk]);
                        self.output.write_all(&buf[..chunk])?;
                        remaining -= chunk;
                    }
                }
            }

            self.processed += op.output_len();
            if let Some(cb) = self.progress.as_mut() {
                cb(self.processed, total);
            }
        }

        // A record straddling the declared stream end means corruption
        if consumed != patch_size {
            return Err(Error::PatchApplyFailed);
        }

        if self.processed != total {
            return Err(Error::SizeMismatch);
        }

        let digest = core::mem::replace(&mut self.hasher, Sha256::new()).finalize();
        if !constant_time_eq(digest.as_slice(), &header.new_checksum) {
            return Err(Error::ChecksumMismatch);
        }

        self.state = ApplyState::Verified;
        Ok(())
    }

    /// Run the full pipeline: header validation then application
    pub fn run(&mut self) -> Result<()> {
        self.validate_header()?;
        self.apply()
    }

    /// Consume the applier and return the output sink
    ///
    /// Only meaningful once the applier reached `Verified`; callers that
    /// tear down a failed apply should discard the sink contents.
    pub fn into_output(self) -> N {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::PatchOperation;
    use q_common::constants::{PATCH_FORMAT_VERSION, PATCH_MAGIC};
    use q_common::stream::{SliceSink, SliceSource};

    fn sha(data: &[u8]) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(Sha256::digest(data).as_slice());
        out
    }

    /// Hand-build a patch: header + encoded ops
    fn build_patch(old: &[u8], new: &[u8], ops: &[PatchOperation<'_>]) -> std::vec::Vec<u8> {
        let mut body: std::vec::Vec<u8> = std::vec::Vec::new();
        for op in ops {
            let mut chunk = [0u8; 8192];
            let mut sink = SliceSink::new(&mut chunk);
            op.encode(&mut sink).unwrap();
            body.extend_from_slice(sink.filled());
        }

        let header = PatchHeader {
            magic: PATCH_MAGIC,
            format_version: PATCH_FORMAT_VERSION,
            flags: 0,
            old_size: old.len() as u32,
            new_size: new.len() as u32,
            patch_size: body.len() as u32,
            block_size: 64,
            old_checksum: sha(old),
            new_checksum: sha(new),
        };

        let mut patch = std::vec::Vec::new();
        patch.extend_from_slice(&header.to_bytes());
        patch.extend_from_slice(&body);
        patch
    }

    #[test]
    fn test_apply_copy_add_run() {
        let old = b"0123456789abcdef";
        let new = b"0123456789XXXXXXXXXXXXXXXXXXXXok";

        let ops = [
            PatchOperation::Copy {
                offset: 0,
                length: 10,
            },
            PatchOperation::Run {
                value: b'X',
                length: 20,
            },
            PatchOperation::Add { data: b"ok" },
        ];
        let patch = build_patch(old, new, &ops);

        let mut out = [0u8; 64];
        let mut applier = PatchApplier::new(
            SliceSource::new(old),
            SliceSource::new(&patch),
            SliceSink::new(&mut out),
        );
        applier.run().unwrap();
        assert_eq!(applier.state(), ApplyState::Verified);

        let sink = applier.into_output();
        assert_eq!(sink.filled(), new);
    }

    #[test]
    fn test_wrong_base_image_rejected_before_output() {
        let old = b"the real base image bytes";
        let other = b"a different base image!!!";
        let new = b"anything";

        let patch = build_patch(old, new, &[PatchOperation::Add { data: new }]);

        let mut out = [0u8; 64];
        let mut applier = PatchApplier::new(
            SliceSource::new(other),
            SliceSource::new(&patch),
            SliceSink::new(&mut out),
        );
        assert_eq!(applier.validate_header(), Err(Error::ChecksumMismatch));
        assert_eq!(applier.state(), ApplyState::Failed);

        // No output byte was written
        assert_eq!(applier.into_output().written(), 0);
    }

    #[test]
    fn test_old_length_mismatch() {
        let old = b"0123456789";
        let new = b"0123";
        let patch = build_patch(old, new, &[PatchOperation::Add { data: new }]);

        let truncated_old = &old[..8];
        let mut out = [0u8; 16];
        let mut applier = PatchApplier::new(
            SliceSource::new(truncated_old),
            SliceSource::new(&patch),
            SliceSink::new(&mut out),
        );
        assert_eq!(applier.validate_header(), Err(Error::SizeMismatch));
    }

    #[test]
    fn test_corrupted_literal_fails_checksum() {
        let old = b"base";
        let new = b"replacement payload bytes";
        let mut patch = build_patch(old, new, &[PatchOperation::Add { data: new }]);

        // Flip one literal byte past the record header
        let literal_start = PatchHeader::SIZE + 5;
        patch[literal_start + 3] ^= 0x01;

        let mut out = [0u8; 64];
        let mut applier = PatchApplier::new(
            SliceSource::new(old),
            SliceSource::new(&patch),
            SliceSink::new(&mut out),
        );
        assert_eq!(applier.run(), Err(Error::ChecksumMismatch));
        assert_eq!(applier.state(), ApplyState::Failed);
    }

    #[test]
    fn test_output_size_gate() {
        let old = b"base";
        let new = b"0123456789";
        // Header claims new is 10 bytes but the ops only produce 4
        let patch = build_patch(old, new, &[PatchOperation::Add { data: b"0123" }]);

        let mut out = [0u8; 16];
        let mut applier = PatchApplier::new(
            SliceSource::new(old),
            SliceSource::new(&patch),
            SliceSink::new(&mut out),
        );
        assert_eq!(applier.run(), Err(Error::SizeMismatch));
    }

    #[test]
    fn test_compressed_flag_rejected() {
        let old = b"base";
        let new = b"next";
        let mut patch = build_patch(old, new, &[PatchOperation::Add { data: new }]);
        patch[6] |= 0x01; // set FLAG_COMPRESSED

        let mut out = [0u8; 16];
        let mut applier = PatchApplier::new(
            SliceSource::new(old),
            SliceSource::new(&patch),
            SliceSink::new(&mut out),
        );
        assert_eq!(applier.validate_header(), Err(Error::UnsupportedFormat));
    }

    #[test]
    fn test_apply_requires_validated_header() {
        let mut out = [0u8; 4];
        let mut applier = PatchApplier::new(
            SliceSource::new(b"old"),
            SliceSource::new(b""),
            SliceSink::new(&mut out),
        );
        assert_eq!(applier.apply(), Err(Error::InvalidState));
    }

    #[test]
    fn test_progress_reported_per_operation() {
        let old = b"0123456789abcdef";
        let new = b"0123456789abcdefXY";
        let ops = [
            PatchOperation::Copy {
                offset: 0,
                length: 16,
            },
            PatchOperation::Add { data: b"XY" },
        ];
        let patch = build_patch(old, new, &ops);

        let mut seen: std::vec::Vec<(u64, u64)> = std::vec::Vec::new();
        let mut cb = |processed: u64, total: u64| seen.push((processed, total));

        let mut out = [0u8; 32];
        let mut applier = PatchApplier::new(
            SliceSource::new(old),
            SliceSource::new(&patch),
            SliceSink::new(&mut out),
        )
        .with_progress(&mut cb);
        applier.run().unwrap();
        drop(applier);

        assert_eq!(seen, std::vec![(16, 18), (18, 18)]);
    }

    #[test]
    fn test_empty_new_image() {
        let old = b"something";
        let new: &[u8] = b"";
        let patch = build_patch(old, new, &[]);

        let mut out = [0u8; 4];
        let mut applier = PatchApplier::new(
            SliceSource::new(old),
            SliceSource::new(&patch),
            SliceSink::new(&mut out),
        );
        applier.run().unwrap();
        assert_eq!(applier.state(), ApplyState::Verified);
        assert_eq!(applier.into_output().written(), 0);
    }
}
