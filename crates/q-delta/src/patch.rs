// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Delta patch wire format
//!
//! A patch is a fixed-size [`PatchHeader`] followed by a stream of
//! operation records. Each record is a 1-byte tag then tag-specific
//! little-endian fields; `Add` records are followed by their literal
//! bytes. The format is shared with the host-side generator and must not
//! change without bumping the format version.

use q_common::constants::{MAX_BLOCK_SIZE, PATCH_FORMAT_VERSION, PATCH_MAGIC, SHA256_OUTPUT_SIZE};
use q_common::stream::{ByteSink, ByteSource};
use q_common::{Error, Result};

/// Operation tag: copy from the old image
pub const OP_COPY: u8 = 0;
/// Operation tag: literal bytes carried in the patch
pub const OP_ADD: u8 = 1;
/// Operation tag: run-length-encoded fill
pub const OP_RUN: u8 = 2;

/// Header flag: operation stream is compressed
pub const FLAG_COMPRESSED: u16 = 1 << 0;

/// Delta patch header
///
/// Wire layout (all integers little-endian, 88 bytes total):
///
/// ```text
/// Offset  Size  Field
/// 0       4     magic ("DPAT" = 0x54415044)
/// 4       2     format_version
/// 6       2     flags (bit 0: compressed)
/// 8       4     old_size
/// 12      4     new_size
/// 16      4     patch_size (operation stream bytes after this header)
/// 20      4     block_size
/// 24      32    old_checksum (SHA-256 of the base image)
/// 56      32    new_checksum (SHA-256 of the reconstructed image)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchHeader {
    /// Magic number, must equal [`PATCH_MAGIC`]
    pub magic: u32,
    /// Patch format version
    pub format_version: u16,
    /// Format flags
    pub flags: u16,
    /// Size of the base image in bytes
    pub old_size: u32,
    /// Size of the reconstructed image in bytes
    pub new_size: u32,
    /// Size of the operation stream in bytes
    pub patch_size: u32,
    /// Diff block size the generator used
    pub block_size: u32,
    /// SHA-256 of the base image
    pub old_checksum: [u8; SHA256_OUTPUT_SIZE],
    /// SHA-256 of the reconstructed image
    pub new_checksum: [u8; SHA256_OUTPUT_SIZE],
}

impl PatchHeader {
    /// Serialized header size in bytes
    pub const SIZE: usize = 24 + 2 * SHA256_OUTPUT_SIZE;

    /// Serialize the header field by field
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.magic.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.flags.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.old_size.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.new_size.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.patch_size.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.block_size.to_le_bytes());
        bytes[24..56].copy_from_slice(&self.old_checksum);
        bytes[56..88].copy_from_slice(&self.new_checksum);
        bytes
    }

    /// Deserialize a header from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(Error::UnexpectedEof);
        }

        let mut old_checksum = [0u8; SHA256_OUTPUT_SIZE];
        old_checksum.copy_from_slice(&bytes[24..56]);
        let mut new_checksum = [0u8; SHA256_OUTPUT_SIZE];
        new_checksum.copy_from_slice(&bytes[56..88]);

        Ok(Self {
            magic: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            format_version: u16::from_le_bytes([bytes[4], bytes[5]]),
            flags: u16::from_le_bytes([bytes[6], bytes[7]]),
            old_size: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            new_size: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            patch_size: u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
            block_size: u32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]),
            old_checksum,
            new_checksum,
        })
    }

    /// Structurally validate the header
    ///
    /// Checks magic, supported format version and a sane block size.
    /// Size/checksum agreement with the actual streams is the applier's job.
    pub fn validate(&self) -> Result<()> {
        if self.magic != PATCH_MAGIC {
            return Err(Error::MalformedHeader);
        }
        if self.format_version > PATCH_FORMAT_VERSION {
            return Err(Error::UnsupportedFormat);
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(Error::MalformedHeader);
        }
        Ok(())
    }

    /// Check whether the compressed flag is set
    #[must_use]
    pub const fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }
}

/// A single patch operation with its payload
///
/// `Add` borrows its literal bytes from the caller; the encoded record
/// carries them inline after the length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOperation<'a> {
    /// Copy `length` bytes from the old image at `offset`
    Copy {
        /// Absolute offset into the old image
        offset: u32,
        /// Number of bytes to copy
        length: u32,
    },
    /// Emit literal bytes carried in the patch
    Add {
        /// The literal bytes
        data: &'a [u8],
    },
    /// Emit `length` repetitions of `value`
    Run {
        /// Fill byte
        value: u8,
        /// Repetition count
        length: u32,
    },
}

impl PatchOperation<'_> {
    /// Encode this operation (tag, fields, literal payload) to a sink
    pub fn encode<S: ByteSink>(&self, sink: &mut S) -> Result<()> {
        match self {
            Self::Copy { offset, length } => {
                sink.write_all(&[OP_COPY])?;
                sink.write_all(&offset.to_le_bytes())?;
                sink.write_all(&length.to_le_bytes())?;
            }
            Self::Add { data } => {
                sink.write_all(&[OP_ADD])?;
                sink.write_all(&(data.len() as u32).to_le_bytes())?;
                sink.write_all(data)?;
            }
            Self::Run { value, length } => {
                sink.write_all(&[OP_RUN])?;
                sink.write_all(&[*value])?;
                sink.write_all(&length.to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// Encoded size of this operation including any literal payload
    #[must_use]
    pub const fn encoded_len(&self) -> u64 {
        match self {
            Self::Copy { .. } => 9,
            Self::Add { data } => 5 + data.len() as u64,
            Self::Run { .. } => 6,
        }
    }

    /// Bytes this operation contributes to the reconstructed image
    #[must_use]
    pub const fn output_len(&self) -> u64 {
        match self {
            Self::Copy { length, .. } | Self::Run { length, .. } => *length as u64,
            Self::Add { data } => data.len() as u64,
        }
    }
}

/// An operation record as decoded from the patch stream
///
/// `Add` literals are not buffered: the record carries only the length and
/// the applier streams the following bytes directly from the patch source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawOperation {
    /// Copy from the old image
    Copy {
        /// Absolute offset into the old image
        offset: u32,
        /// Number of bytes to copy
        length: u32,
    },
    /// Literal bytes follow this record in the patch stream
    Add {
        /// Number of literal bytes following
        length: u32,
    },
    /// Run-length fill
    Run {
        /// Fill byte
        value: u8,
        /// Repetition count
        length: u32,
    },
}

impl RawOperation {
    /// Decode the next operation record from a source
    ///
    /// An unknown tag means the stream is corrupt and aborts the apply.
    pub fn decode<S: ByteSource>(source: &mut S) -> Result<Self> {
        let mut tag = [0u8; 1];
        source.read_exact(&mut tag)?;

        match tag[0] {
            OP_COPY => {
                let mut fields = [0u8; 8];
                source.read_exact(&mut fields)?;
                Ok(Self::Copy {
                    offset: u32::from_le_bytes([fields[0], fields[1], fields[2], fields[3]]),
                    length: u32::from_le_bytes([fields[4], fields[5], fields[6], fields[7]]),
                })
            }
            OP_ADD => {
                let mut fields = [0u8; 4];
                source.read_exact(&mut fields)?;
                Ok(Self::Add {
                    length: u32::from_le_bytes(fields),
                })
            }
            OP_RUN => {
                let mut fields = [0u8; 5];
                source.read_exact(&mut fields)?;
                Ok(Self::Run {
                    value: fields[0],
                    length: u32::from_le_bytes([fields[1], fields[2], fields[3], fields[4]]),
                })
            }
            _ => Err(Error::PatchApplyFailed),
        }
    }

    /// Encoded size of the record itself, excluding any Add literal
    #[must_use]
    pub const fn record_len(&self) -> u64 {
        match self {
            Self::Copy { .. } => 9,
            Self::Add { .. } => 5,
            Self::Run { .. } => 6,
        }
    }

    /// Bytes this operation contributes to the reconstructed image
    #[must_use]
    pub const fn output_len(&self) -> u64 {
        match self {
            Self::Copy { length, .. } | Self::Add { length } | Self::Run { length, .. } => {
                *length as u64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use q_common::stream::{SliceSink, SliceSource};

    fn test_header() -> PatchHeader {
        PatchHeader {
            magic: PATCH_MAGIC,
            format_version: PATCH_FORMAT_VERSION,
            flags: 0,
            old_size: 1000,
            new_size: 1100,
            patch_size: 230,
            block_size: 4096,
            old_checksum: [0x11; 32],
            new_checksum: [0x22; 32],
        }
    }

    #[test]
    fn test_header_size() {
        assert_eq!(PatchHeader::SIZE, 88);
    }

    #[test]
    fn test_header_roundtrip() {
        let header = test_header();
        let bytes = header.to_bytes();
        let parsed = PatchHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_header_magic_spells_dpat() {
        // Little-endian layout puts "DPAT" at the start of the wire header
        let bytes = test_header().to_bytes();
        assert_eq!(&bytes[0..4], b"DPAT");
    }

    #[test]
    fn test_header_validation() {
        let mut header = test_header();
        assert!(header.validate().is_ok());

        header.magic = 0xDEAD_BEEF;
        assert_eq!(header.validate(), Err(Error::MalformedHeader));

        header = test_header();
        header.format_version = PATCH_FORMAT_VERSION + 1;
        assert_eq!(header.validate(), Err(Error::UnsupportedFormat));

        header = test_header();
        header.block_size = 0;
        assert_eq!(header.validate(), Err(Error::MalformedHeader));

        header = test_header();
        header.block_size = MAX_BLOCK_SIZE + 1;
        assert_eq!(header.validate(), Err(Error::MalformedHeader));
    }

    #[test]
    fn test_header_truncated() {
        let bytes = test_header().to_bytes();
        assert_eq!(
            PatchHeader::from_bytes(&bytes[..40]),
            Err(Error::UnexpectedEof)
        );
    }

    #[test]
    fn test_copy_encode_decode() {
        let op = PatchOperation::Copy {
            offset: 0x1234,
            length: 0x5678,
        };
        let mut buf = [0u8; 16];
        let mut sink = SliceSink::new(&mut buf);
        op.encode(&mut sink).unwrap();
        assert_eq!(sink.written() as u64, op.encoded_len());

        let mut src = SliceSource::new(sink.filled());
        let decoded = RawOperation::decode(&mut src).unwrap();
        assert_eq!(
            decoded,
            RawOperation::Copy {
                offset: 0x1234,
                length: 0x5678
            }
        );
    }

    #[test]
    fn test_add_encode_decode() {
        let data = [9u8, 8, 7];
        let op = PatchOperation::Add { data: &data };
        let mut buf = [0u8; 16];
        let mut sink = SliceSink::new(&mut buf);
        op.encode(&mut sink).unwrap();
        assert_eq!(sink.written(), 8);

        let mut src = SliceSource::new(sink.filled());
        let decoded = RawOperation::decode(&mut src).unwrap();
        assert_eq!(decoded, RawOperation::Add { length: 3 });

        // Literal bytes follow the record
        let mut literal = [0u8; 3];
        src.read_exact(&mut literal).unwrap();
        assert_eq!(literal, data);
    }

    #[test]
    fn test_run_encode_decode() {
        let op = PatchOperation::Run {
            value: 0xFF,
            length: 4096,
        };
        let mut buf = [0u8; 8];
        let mut sink = SliceSink::new(&mut buf);
        op.encode(&mut sink).unwrap();
        assert_eq!(sink.written(), 6);

        let mut src = SliceSource::new(sink.filled());
        assert_eq!(
            RawOperation::decode(&mut src).unwrap(),
            RawOperation::Run {
                value: 0xFF,
                length: 4096
            }
        );
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let bytes = [3u8, 0, 0, 0, 0];
        let mut src = SliceSource::new(&bytes);
        assert_eq!(
            RawOperation::decode(&mut src),
            Err(Error::PatchApplyFailed)
        );
    }

    #[test]
    fn test_truncated_record_rejected() {
        let bytes = [OP_COPY, 1, 2];
        let mut src = SliceSource::new(&bytes);
        assert_eq!(RawOperation::decode(&mut src), Err(Error::UnexpectedEof));
    }
}
