//! Container stream: the on-disk store of reference-compressed alignment records.
//!
//! ## Layout
//!
//! ```text
//! magic "CNTR" | version u8 | header length u32 LE | SAM header text
//! container*   = ContainerHeader (fixed size) | encoded payload
//! EOF container = ContainerHeader::eof() with an empty payload
//! ```
//!
//! Each payload is a [`ContainerBody`] serialized with `bincode` and packed by a
//! [`codec::BlockCodec`]. Mapped records do not store their bases; they carry a list
//! of [`Feature`]s that are replayed against the reference on decode.

use serde::{Deserialize, Serialize};

use crate::core::record::{Mate, TagKey, TagValue};

pub mod codec;
pub mod index;
pub mod reader;
pub mod writer;

/// File magic at offset 0
pub const MAGIC: &[u8; 4] = b"CNTR";

/// Current layout version
pub const FORMAT_VERSION: u8 = 1;

/// Reference id of containers holding only unplaced reads
pub const UNMAPPED_REFERENCE_ID: i32 = -1;

/// Reference id of containers spanning several references
pub const MULTI_REFERENCE_ID: i32 = -2;

/// Alignment start carried by the EOF container
pub const EOF_ALIGNMENT_START: i64 = 4_542_278;

/// Serialized size of a [`ContainerHeader`] (bincode fixed-width integers)
pub const CONTAINER_HEADER_LEN: usize = 4 + 8 + 8 + 4 + 8 + 4 + 4;

/// Per-container metadata preceding each payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHeader {
    pub reference_id: i32,
    /// 1-based start of the first record, 0 for unplaced containers
    pub alignment_start: i64,
    pub alignment_span: i64,
    pub record_count: u32,
    /// Global 0-based index of the first record in this container
    pub record_counter: u64,
    pub payload_length: u32,
    /// CRC32 of the encoded payload
    pub checksum: u32,
}

impl ContainerHeader {
    /// The sentinel container marking a clean end of stream
    #[must_use]
    pub fn eof() -> Self {
        Self {
            reference_id: UNMAPPED_REFERENCE_ID,
            alignment_start: EOF_ALIGNMENT_START,
            alignment_span: 0,
            record_count: 0,
            record_counter: 0,
            payload_length: 0,
            checksum: 0,
        }
    }

    pub fn is_eof(&self) -> bool {
        *self == Self::eof()
    }
}

/// Per-reference-base ordering of the four alternative bases.
///
/// Rows are indexed by reference base `A, C, G, T, N`; a substitution code selects
/// the read base within the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstitutionMatrix(pub [[u8; 4]; 5]);

impl Default for SubstitutionMatrix {
    fn default() -> Self {
        Self([
            *b"CGTN", // A
            *b"AGTN", // C
            *b"ACTN", // G
            *b"ACGN", // T
            *b"ACGT", // N
        ])
    }
}

impl SubstitutionMatrix {
    fn row(reference_base: u8) -> usize {
        match reference_base.to_ascii_uppercase() {
            b'A' => 0,
            b'C' => 1,
            b'G' => 2,
            b'T' => 3,
            _ => 4,
        }
    }

    /// Read base for `code` against `reference_base`, or `None` for a code above 3
    pub fn read_base(&self, reference_base: u8, code: u8) -> Option<u8> {
        self.0[Self::row(reference_base)].get(usize::from(code)).copied()
    }

    /// Code that turns `reference_base` into `read_base`, if the pair is a substitution
    pub fn code(&self, reference_base: u8, read_base: u8) -> Option<u8> {
        let read_base = read_base.to_ascii_uppercase();
        self.0[Self::row(reference_base)]
            .iter()
            .position(|&b| b == read_base)
            .and_then(|i| u8::try_from(i).ok())
    }
}

/// A stored edit relative to the reference, at a 1-based read position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feature {
    /// Mismatch encoded through the substitution matrix
    Substitution { position: usize, code: u8 },
    /// Mismatch stored as a literal base
    ReadBase { position: usize, base: u8 },
    Insertion { position: usize, bases: Vec<u8> },
    InsertBase { position: usize, base: u8 },
    Deletion { position: usize, len: usize },
    ReferenceSkip { position: usize, len: usize },
    SoftClip { position: usize, bases: Vec<u8> },
    Padding { position: usize, len: usize },
    HardClip { position: usize, len: usize },
}

impl Feature {
    pub fn position(&self) -> usize {
        match self {
            Self::Substitution { position, .. }
            | Self::ReadBase { position, .. }
            | Self::Insertion { position, .. }
            | Self::InsertBase { position, .. }
            | Self::Deletion { position, .. }
            | Self::ReferenceSkip { position, .. }
            | Self::SoftClip { position, .. }
            | Self::Padding { position, .. }
            | Self::HardClip { position, .. } => *position,
        }
    }
}

/// A record as stored in a container payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub name: Option<String>,
    pub flags: u16,
    pub reference_id: Option<usize>,
    /// 1-based
    pub alignment_start: Option<usize>,
    pub mapping_quality: Option<u8>,
    pub read_length: usize,
    /// Edits in ascending read position; mapped records only
    pub features: Vec<Feature>,
    /// Verbatim bases; unmapped records only
    pub bases: Vec<u8>,
    pub quality_scores: Vec<u8>,
    pub mate: Mate,
    pub tags: Vec<(TagKey, TagValue)>,
}

impl StoredRecord {
    pub fn is_unmapped(&self) -> bool {
        self.flags & 0x4 != 0
    }
}

/// Decoded payload of one container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerBody {
    pub substitution_matrix: SubstitutionMatrix,
    pub records: Vec<StoredRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_len_matches_bincode() {
        let encoded = bincode::serialize(&ContainerHeader::eof()).unwrap();
        assert_eq!(encoded.len(), CONTAINER_HEADER_LEN);
    }

    #[test]
    fn test_eof_header() {
        assert!(ContainerHeader::eof().is_eof());

        let mut header = ContainerHeader::eof();
        header.record_count = 1;
        assert!(!header.is_eof());
    }

    #[test]
    fn test_substitution_matrix() {
        let matrix = SubstitutionMatrix::default();
        assert_eq!(matrix.read_base(b'A', 0), Some(b'C'));
        assert_eq!(matrix.read_base(b'a', 2), Some(b'T'));
        assert_eq!(matrix.read_base(b'N', 3), Some(b'T'));
        assert_eq!(matrix.read_base(b'R', 0), Some(b'A')); // ambiguity codes use the N row
        assert_eq!(matrix.read_base(b'G', 4), None);

        for reference in *b"ACGTN" {
            for code in 0..4 {
                let base = matrix.read_base(reference, code).unwrap();
                assert_eq!(matrix.code(reference, base), Some(code));
            }
        }
        assert_eq!(matrix.code(b'A', b'A'), None);
    }
}
